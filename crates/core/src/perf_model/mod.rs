//! The per-core performance model: consumes a stream of dynamic
//! instructions, costs each against the core's dyn-info FIFO and branch
//! predictor, and advances the core's elapsed simulated time.
//!
//! Grounded on spec §4.5. The "park and retry on next push" starvation
//! handling (spec §7: "never an error") is implemented as an internal
//! pending queue drained in order every time new dyn-info arrives —
//! preserving the FIFO ordering guarantee from spec §5 rather than letting
//! a later-arriving instruction's info jump the queue.

pub mod branch;
pub mod dyninfo;
pub mod instruction;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::sync::Arc;

use crate::common::{CoreId, Period, SimTime};
use crate::config::BranchPredictorConfig;
use crate::stats::StatsRegistry;

pub use branch::BranchPredictor;
pub use dyninfo::{DynInfoQueue, DynamicInstructionInfo};
pub use instruction::{DynamicInstruction, StaticKind};

/// One core's performance model: dyn-info FIFO, branch predictor, elapsed
/// simulated time, and a pending queue for instructions parked on
/// not-yet-arrived dyn-info.
pub struct CorePerformanceModel {
    core: CoreId,
    period: Period,
    elapsed: SimTime,
    dyn_info: DynInfoQueue,
    pending: VecDeque<DynamicInstruction>,
    predictor: Box<dyn BranchPredictor>,
    mispredict_penalty_cycles: u64,
    branch_correct: Arc<AtomicU64>,
    branch_incorrect: Arc<AtomicU64>,
}

impl CorePerformanceModel {
    /// Builds a performance model for `core`, starting at `period` and
    /// zero elapsed time, registering branch-prediction counters with
    /// `stats`.
    #[must_use]
    pub fn new(core: CoreId, period: Period, config: &BranchPredictorConfig, stats: &StatsRegistry) -> Self {
        Self {
            core,
            period,
            elapsed: SimTime::ZERO,
            dyn_info: DynInfoQueue::new(),
            pending: VecDeque::new(),
            predictor: branch::build(config),
            mispredict_penalty_cycles: config.mispredict_penalty,
            branch_correct: stats.register("branch-predictor", core.get(), "correct"),
            branch_incorrect: stats.register("branch-predictor", core.get(), "incorrect"),
        }
    }

    /// This core's identity.
    #[must_use]
    pub const fn core(&self) -> CoreId {
        self.core
    }

    /// The core's total elapsed simulated time.
    #[must_use]
    pub const fn elapsed(&self) -> SimTime {
        self.elapsed
    }

    /// Swaps the core's frequency domain (the DVFS operation). Already
    /// parked instructions are unaffected; only instructions costed after
    /// this call use the new period.
    pub fn set_period(&mut self, period: Period) {
        self.period = period;
    }

    /// Number of dyn-info records still queued, unconsumed.
    #[must_use]
    pub fn pending_dyn_info(&self) -> usize {
        self.dyn_info.len()
    }

    /// Number of instructions parked awaiting dyn-info.
    #[must_use]
    pub fn parked_instructions(&self) -> usize {
        self.pending.len()
    }

    /// Pushes a dyn-info record produced by the instrumentation stream,
    /// then retries any parked instructions in FIFO order.
    pub fn push_info(&mut self, info: DynamicInstructionInfo) {
        self.dyn_info.push(info);
        self.drain_pending();
    }

    /// Submits the next dynamic instruction. If it can execute immediately
    /// (no missing dyn-info), its cost is applied now; otherwise it is
    /// parked and will be retried as dyn-info arrives via
    /// [`Self::push_info`].
    pub fn submit(&mut self, instruction: DynamicInstruction) {
        if self.pending.is_empty() && self.try_execute(&instruction) {
            return;
        }
        self.pending.push_back(instruction);
    }

    fn drain_pending(&mut self) {
        while let Some(front) = self.pending.front().copied() {
            if self.try_execute(&front) {
                self.pending.pop_front();
            } else {
                break;
            }
        }
    }

    /// Attempts to cost and retire `instruction`. Returns `false` only for
    /// a `String` instruction whose required dyn-info has not yet arrived.
    fn try_execute(&mut self, instruction: &DynamicInstruction) -> bool {
        match *instruction {
            DynamicInstruction::Fixed(cost) => {
                self.elapsed += cost;
                true
            }
            DynamicInstruction::Static { cycles, .. } => {
                self.elapsed += self.period.cycles_to_time(cycles);
                true
            }
            DynamicInstruction::String { num_ops } => {
                if self.dyn_info.len() < num_ops {
                    return false;
                }
                let mut total = SimTime::ZERO;
                for _ in 0..num_ops {
                    let info = self.dyn_info.pop().expect("length checked above");
                    total += info.latency();
                }
                self.elapsed += total;
                true
            }
            DynamicInstruction::Branch { pc, taken, .. } => {
                let predicted = self.predictor.predict(pc);
                self.predictor.train(pc, taken);
                let correct = predicted == Some(taken);
                if correct {
                    self.branch_correct.fetch_add(1, Relaxed);
                    self.elapsed += self.period.cycles_to_time(1);
                } else {
                    self.branch_incorrect.fetch_add(1, Relaxed);
                    self.elapsed += self.period.cycles_to_time(self.mispredict_penalty_cycles);
                }
                true
            }
            DynamicInstruction::Spawn(time) => {
                self.elapsed = self.elapsed.max(time);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BranchPredictorConfig, BranchPredictorKind};

    fn model() -> CorePerformanceModel {
        let stats = StatsRegistry::new();
        let config = BranchPredictorConfig {
            kind: BranchPredictorKind::OneBit,
            size: 16,
            mispredict_penalty: 10,
        };
        CorePerformanceModel::new(CoreId::new(0), Period::from_mhz(1000), &config, &stats)
    }

    #[test]
    fn fixed_instruction_advances_elapsed_directly() {
        let mut m = model();
        m.submit(DynamicInstruction::Fixed(SimTime::from_ns(150)));
        assert_eq!(m.elapsed(), SimTime::from_ns(150));
    }

    #[test]
    fn spawn_only_advances_forward() {
        let mut m = model();
        m.submit(DynamicInstruction::Fixed(SimTime::from_ns(100)));
        m.submit(DynamicInstruction::Spawn(SimTime::from_ns(50)));
        assert_eq!(m.elapsed(), SimTime::from_ns(100));
        m.submit(DynamicInstruction::Spawn(SimTime::from_ns(200)));
        assert_eq!(m.elapsed(), SimTime::from_ns(200));
    }

    #[test]
    fn string_instruction_parks_until_dyn_info_arrives() {
        let mut m = model();
        m.submit(DynamicInstruction::String { num_ops: 2 });
        assert_eq!(m.parked_instructions(), 1);
        m.push_info(DynamicInstructionInfo::MemoryRead { address: 0, latency: SimTime::from_ns(10) });
        assert_eq!(m.parked_instructions(), 1, "still waiting on the second op");
        m.push_info(DynamicInstructionInfo::MemoryWrite { address: 4, latency: SimTime::from_ns(20) });
        assert_eq!(m.parked_instructions(), 0);
        assert_eq!(m.elapsed(), SimTime::from_ns(30));
    }

    #[test]
    fn branch_first_guess_on_one_bit_predictor_is_not_taken() {
        let mut m = model();
        m.submit(DynamicInstruction::Branch { pc: 0x1000, target: 0x2000, taken: true });
        // OneBit starts false (not-taken); actual is taken, so this mispredicts.
        assert_eq!(m.elapsed(), Period::from_mhz(1000).cycles_to_time(10));
    }

    #[test]
    fn branch_repeat_after_training_is_correctly_predicted() {
        let mut m = model();
        m.submit(DynamicInstruction::Branch { pc: 0x1000, target: 0x2000, taken: true });
        let after_first = m.elapsed();
        m.submit(DynamicInstruction::Branch { pc: 0x1000, target: 0x2000, taken: true });
        let delta = m.elapsed() - after_first;
        assert_eq!(delta, Period::from_mhz(1000).cycles_to_time(1));
    }
}
