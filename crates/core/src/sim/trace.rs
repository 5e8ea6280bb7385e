//! Trace ingestion: a per-core JSON-Lines event stream that stands in for
//! the instrumentation front-end spec §1 declares out of scope ("binary
//! rewriting and instruction decoding ... are external collaborators").
//! No trace-file format exists in the original source to mirror, so this
//! is designed plumbing — one instrumentation/sync event per line,
//! addressed to the core that issues it, replayed in file order by
//! [`super::Simulator::run`].

use std::io::BufRead;
use std::path::Path;

use serde::Deserialize;

use crate::common::error::{Error, Result};
use crate::common::CoreId;
use crate::net::message::FutexOp;

/// One line of a trace file: the emitting core plus the event it issues.
#[derive(Debug, Clone, Deserialize)]
struct TraceLine {
    core: u32,
    event: TraceEvent,
}

/// One trace event a core's host thread replays, in file order.
///
/// Compute/branch/spawn events cost the performance model directly; memory
/// events route through [`crate::memory::MemorySubsystem`]; the remainder
/// round-trip through the MCP exactly as the pthread/futex/magic wrapper
/// library they stand in for would.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TraceEvent {
    /// An integer ALU instruction costing `cycles` at the core's period.
    Alu {
        /// Configured cycle cost.
        cycles: u64,
    },
    /// A floating-point instruction costing `cycles` at the core's period.
    FloatingPoint {
        /// Configured cycle cost.
        cycles: u64,
    },
    /// Any other classified instruction costing `cycles` at the core's period.
    Other {
        /// Configured cycle cost.
        cycles: u64,
    },
    /// A resolved conditional branch.
    Branch {
        /// Program counter of the branch.
        pc: u64,
        /// Resolved branch target.
        target: u64,
        /// Whether the branch was actually taken.
        taken: bool,
    },
    /// A thread-spawn marker: the spawned thread's clock starts no earlier
    /// than `time_ns`.
    Spawn {
        /// The spawned thread's starting simulated time, in nanoseconds.
        time_ns: u64,
    },
    /// A `size_bytes` load at `address`.
    MemoryRead {
        /// Address read.
        address: u64,
        /// Access size, bytes.
        size_bytes: u64,
    },
    /// A `size_bytes` store to `address`.
    MemoryWrite {
        /// Address written.
        address: u64,
        /// Access size, bytes.
        size_bytes: u64,
    },
    /// Acquire mutex `id`, blocking if already held.
    MutexLock {
        /// Application-assigned mutex id.
        id: u32,
    },
    /// Release mutex `id`.
    MutexUnlock {
        /// Application-assigned mutex id.
        id: u32,
    },
    /// Atomically release `mutex_id` and wait on condition variable `id`.
    CondWait {
        /// Application-assigned condition-variable id.
        id: u32,
        /// The mutex released for the duration of the wait.
        mutex_id: u32,
        /// Optional timeout, nanoseconds from the call.
        #[serde(default)]
        timeout_ns: Option<u64>,
    },
    /// Wake one waiter on condition variable `id`.
    CondSignal {
        /// Application-assigned condition-variable id.
        id: u32,
    },
    /// Wake every waiter on condition variable `id`.
    CondBroadcast {
        /// Application-assigned condition-variable id.
        id: u32,
    },
    /// Establish barrier `id`'s arrival count. Must precede any
    /// `BarrierWait` on the same id.
    BarrierInit {
        /// Application-assigned barrier id.
        id: u32,
        /// Number of arrivals required to release the barrier.
        count: u32,
    },
    /// Arrive at barrier `id`, blocking until `count` arrivals are seen.
    BarrierWait {
        /// Application-assigned barrier id.
        id: u32,
    },
    /// A raw futex call, op-dependent argument overlay per
    /// [`crate::net::message::FutexArg3`]: `timeout_ns` is read for
    /// `WAIT`/`WAIT_BITSET`, `val2` for every other supported op.
    Futex {
        /// Which futex operation.
        op: FutexOp,
        /// The futex word's address.
        uaddr: u64,
        /// Primary integer argument (wake count, expected value, ...).
        val: u32,
        /// `WAIT`/`WAIT_BITSET` timeout, nanoseconds from the call.
        #[serde(default)]
        timeout_ns: Option<u64>,
        /// `REQUEUE`/`CMP_REQUEUE`/`WAKE_OP` auxiliary integer argument.
        #[serde(default)]
        val2: u32,
        /// Secondary futex word, used by `REQUEUE`/`WAKE_OP`.
        #[serde(default)]
        uaddr2: u64,
        /// Bitset filter for `WAIT_BITSET`/`WAKE_BITSET`, or the `WAKE_OP` op word.
        #[serde(default)]
        val3: u32,
    },
    /// Marks the start of the region of interest.
    RoiBegin,
    /// Marks the end of the region of interest.
    RoiEnd,
    /// Sets this core's clock frequency (the DVFS operation).
    SetMhz {
        /// New frequency, in MHz.
        mhz: u32,
    },
}

/// A parsed trace: every core's event stream, keyed by [`CoreId`].
#[derive(Debug, Clone, Default)]
pub struct Trace {
    per_core: std::collections::HashMap<CoreId, Vec<TraceEvent>>,
}

impl Trace {
    /// Parses a JSON-Lines trace file: one `{"core": <u32>, "event": {...}}`
    /// object per non-blank, non-`#`-comment line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the file cannot be read or a
    /// line fails to parse as a [`TraceLine`].
    pub fn load_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| Error::Configuration(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(std::io::BufReader::new(file), path)
    }

    pub(crate) fn parse(reader: impl BufRead, path: &Path) -> Result<Self> {
        let mut per_core: std::collections::HashMap<CoreId, Vec<TraceEvent>> = std::collections::HashMap::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = line.map_err(|e| Error::Configuration(format!("{}: {e}", path.display())))?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let parsed: TraceLine = serde_json::from_str(trimmed)
                .map_err(|e| Error::Configuration(format!("{}:{}: {e}", path.display(), lineno + 1)))?;
            per_core.entry(CoreId::new(parsed.core)).or_default().push(parsed.event);
        }
        Ok(Self { per_core })
    }

    /// The event stream for `core`, in file order. A core with no lines at
    /// all gets an empty stream rather than an error.
    #[must_use]
    pub fn events_for(&self, core: CoreId) -> Vec<TraceEvent> {
        self.per_core.get(&core).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(text: &str) -> Trace {
        Trace::parse(Cursor::new(text.as_bytes()), Path::new("<test>")).unwrap()
    }

    #[test]
    fn parses_a_compute_and_a_memory_line() {
        let trace = parse(
            "{\"core\": 0, \"event\": {\"op\": \"alu\", \"cycles\": 3}}\n\
             {\"core\": 0, \"event\": {\"op\": \"memory_read\", \"address\": 4096, \"size_bytes\": 64}}\n",
        );
        let events = trace.events_for(CoreId::new(0));
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], TraceEvent::Alu { cycles: 3 }));
        assert!(matches!(events[1], TraceEvent::MemoryRead { address: 4096, size_bytes: 64 }));
    }

    #[test]
    fn blank_lines_and_comments_are_skipped() {
        let trace = parse("\n# a comment\n{\"core\": 1, \"event\": {\"op\": \"roi_begin\"}}\n");
        assert_eq!(trace.events_for(CoreId::new(1)).len(), 1);
    }

    #[test]
    fn unaddressed_core_has_an_empty_stream() {
        let trace = parse("{\"core\": 0, \"event\": {\"op\": \"roi_begin\"}}\n");
        assert!(trace.events_for(CoreId::new(7)).is_empty());
    }

    #[test]
    fn mutex_and_barrier_lines_round_trip() {
        let trace = parse(
            "{\"core\": 2, \"event\": {\"op\": \"mutex_lock\", \"id\": 1}}\n\
             {\"core\": 2, \"event\": {\"op\": \"barrier_init\", \"id\": 7, \"count\": 4}}\n",
        );
        let events = trace.events_for(CoreId::new(2));
        assert!(matches!(events[0], TraceEvent::MutexLock { id: 1 }));
        assert!(matches!(events[1], TraceEvent::BarrierInit { id: 7, count: 4 }));
    }

    #[test]
    fn malformed_line_is_a_configuration_error() {
        let err = Trace::parse(Cursor::new(b"not json".as_slice()), Path::new("<test>")).unwrap_err();
        assert!(err.is_fatal());
    }
}
