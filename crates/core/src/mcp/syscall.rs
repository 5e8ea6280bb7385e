//! The syscall server: the MCP side of the request/response contract with
//! the (out-of-scope) host system-call pass-through layer.
//!
//! Marshalling a specific syscall's arguments and performing it on the host
//! is explicitly not this engine's concern (spec §1 non-goals) — what is
//! in scope is the contract: an opaque request comes in, and either a
//! recognized reply or the "not intercepted" fallback marker goes out, per
//! spec §4.4's failure semantics.

use crate::net::message::{SyscallRequest, SyscallResponse};

/// Handles [`SyscallRequest`]s the syscall server does not itself emulate
/// by always returning the "not intercepted" marker, so the caller falls
/// back to native execution.
#[derive(Debug, Default)]
pub struct SyscallServer;

impl SyscallServer {
    /// Builds a new syscall server.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Handles `request`. This engine models only the wire contract, not
    /// syscall emulation itself, so every call is reported unintercepted.
    #[must_use]
    pub fn handle(&self, request: &SyscallRequest) -> SyscallResponse {
        SyscallResponse {
            number: request.number,
            status: 0,
            intercepted: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_syscall_falls_back_to_native_execution() {
        let server = SyscallServer::new();
        let response = server.handle(&SyscallRequest { number: 42, args: [0; 6] });
        assert_eq!(response.number, 42);
        assert!(!response.intercepted);
    }
}
