//! Dynamic instruction cost model, per spec §3's `DynamicInstruction`
//! tagged variant.

use crate::common::SimTime;

/// A coarse instruction-class tag for the `Static` variant's per-kind
/// configured cycle cost. Not a full ISA breakdown — the instrumentation
/// front-end is expected to classify instructions into these buckets
/// before handing them to the performance model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticKind {
    /// Integer ALU operation.
    Alu,
    /// Floating-point operation.
    FloatingPoint,
    /// Any instruction not otherwise classified.
    Other,
}

/// One dynamic instruction the performance model costs and retires.
#[derive(Debug, Clone, Copy)]
pub enum DynamicInstruction {
    /// A fixed cost regardless of core state, e.g. a `SYNC` stall whose
    /// duration came from an MCP round-trip.
    Fixed(SimTime),
    /// Costs `cycles` at the core's current [`crate::common::Period`].
    Static {
        /// Instruction class, kept for statistics breakdowns.
        kind: StaticKind,
        /// Configured cycle cost for this class.
        cycles: u64,
    },
    /// A string/vector-style operation whose cost is the sum of `num_ops`
    /// pending [`super::dyninfo::DynamicInstructionInfo`] latencies.
    String {
        /// Number of dyn-info records this instruction consumes.
        num_ops: usize,
    },
    /// A conditional branch, already resolved by the instrumentation
    /// stream: `taken` is ground truth, not a guess.
    Branch {
        /// Program counter of the branch.
        pc: u64,
        /// Resolved branch target (informational; the predictor in this
        /// engine keys only on `pc`).
        target: u64,
        /// Whether the branch was actually taken.
        taken: bool,
    },
    /// A thread-spawn marker: sets the core's elapsed time to at least
    /// `time` but is never itself costed.
    Spawn(SimTime),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_are_copy() {
        let instr = DynamicInstruction::Fixed(SimTime::from_ns(1));
        let copy = instr;
        assert!(matches!(copy, DynamicInstruction::Fixed(_)));
    }
}
