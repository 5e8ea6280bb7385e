//! Crate-wide error type and recovery classification.
//!
//! Two of the four kinds are fatal (`Configuration`, `InvariantViolation`):
//! the simulator's output is meaningless once they fire, so callers are
//! expected to abort rather than attempt to continue. The other two
//! (`UnsupportedOperation`, `TransientOs`) are recoverable locally — see
//! each variant's documentation.

use thiserror::Error;

/// Convenience alias for fallible engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// All error kinds the engine can report.
#[derive(Debug, Error)]
pub enum Error {
    /// A required config key was missing, an enum value was unrecognized, or
    /// the topology is self-contradictory (e.g. `lite` mode with more than
    /// one process). Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A directory-state contradiction, a non-monotone timestamp, or a
    /// utilization value outside `[0, 1)` was observed. Fatal: once an
    /// invariant like this breaks, nothing downstream can be trusted.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// An `ioctl` request other than `TCGETS`, a `pthread` attribute other
    /// than the recognized set, or similar. Recoverable: log a warning and
    /// fall back to a best-effort default.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A host syscall failed inside the syscall server. Recoverable: the
    /// errno is propagated back to the workload through the MCP response
    /// rather than aborting the simulation.
    #[error("transient OS error: errno {0}")]
    TransientOs(i32),
}

impl Error {
    /// Whether this error must abort the simulation (`Configuration` and
    /// `InvariantViolation`), as opposed to being handled locally.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::InvariantViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_and_invariant_errors_are_fatal() {
        assert!(Error::Configuration(String::new()).is_fatal());
        assert!(Error::InvariantViolation(String::new()).is_fatal());
    }

    #[test]
    fn unsupported_and_transient_are_recoverable() {
        assert!(!Error::UnsupportedOperation(String::new()).is_fatal());
        assert!(!Error::TransientOs(5).is_fatal());
    }
}
