//! The Master Control Process: the single logical endpoint that serializes
//! system-call emulation, mutex/cond/barrier/futex synchronization,
//! utilization gossip, and the ROI/MHz magic control plane, per spec §4.4.
//!
//! Composes the standalone servers below behind one request dispatcher
//! that matches the two-message wire contract from [`crate::net::message`]
//! (`MCP_REQUEST_TYPE`/`MCP_RESPONSE_TYPE`). The clock-skew server
//! ([`clock_skew`]) is deliberately *not* part of this dispatch: per spec
//! §5 it bounds host-thread progress directly rather than riding the
//! modeled network, so [`crate::sim::Simulator`] holds it independently of
//! the [`Mcp`] it also owns.

/// Clock-skew minimization: bounds inter-core simulated-time drift.
pub mod clock_skew;
/// ROI toggles and per-core clock control.
pub mod magic;
/// Mutex/cond/barrier/futex primitive tables.
pub mod sync;
/// The syscall server's wire contract.
pub mod syscall;
/// Global-utilization aggregation and broadcast.
pub mod utilization;

use tracing::warn;

use crate::common::error::{Error, Result};
use crate::common::{CoreId, SimTime};
use crate::net::message::{McpRequest, McpResponse};

pub use clock_skew::{ClockSkewServer, Scheme as ClockSkewScheme};
pub use magic::MagicServer;
pub use sync::{Release, SyncServer};
pub use syscall::SyscallServer;
pub use utilization::UtilizationAggregator;

/// Everything dispatching one [`McpRequest`] can produce.
#[derive(Debug, Default)]
pub struct McpOutcome {
    /// The immediate reply to the requester, if the operation doesn't
    /// block (a blocked caller — `MutexLock` on a held mutex, `CondWait`,
    /// an unsatisfied `BarrierWait`, a blocking `Futex` wait — gets `None`
    /// here and is released later via `side_effects`).
    pub reply: Option<McpResponse>,
    /// Deferred grants to other (or, for barriers, the same) waiting
    /// cores, each tagged with its destination.
    pub side_effects: Vec<Release>,
    /// A freshly aggregated global utilization to broadcast to every NoC
    /// node, present only when this request was an `UtilizationUpdate`.
    pub broadcast_utilization: Option<f64>,
}

/// The MCP. Single-threaded by construction (spec §5: "the MCP itself
/// runs as a single thread draining a single inbound request channel"),
/// so none of its primitive tables need their own locking — serialization
/// comes from requests being dispatched one at a time through
/// [`Mcp::handle_request`].
pub struct Mcp {
    sync: SyncServer,
    syscall: SyscallServer,
    magic: MagicServer,
    utilization: UtilizationAggregator,
}

impl Mcp {
    /// Builds an MCP with every core starting at `default_mhz` (the
    /// magic server's initial clock reading).
    #[must_use]
    pub fn new(default_mhz: u32) -> Self {
        Self {
            sync: SyncServer::new(),
            syscall: SyscallServer::new(),
            magic: MagicServer::new(default_mhz),
            utilization: UtilizationAggregator::new(),
        }
    }

    /// Read-only access to the magic server, e.g. for a driver checking
    /// whether the run is currently inside its region of interest.
    #[must_use]
    pub const fn magic(&self) -> &MagicServer {
        &self.magic
    }

    /// The most recently aggregated global utilization.
    #[must_use]
    pub const fn global_utilization(&self) -> f64 {
        self.utilization.current()
    }

    /// Dispatches one request arriving from `requester` at simulated time
    /// `t_req`, per spec §4.4's per-primitive algorithms.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] for a `BarrierWait` on a
    /// barrier id that was never `BarrierInit`-ed — fatal per spec §7.
    /// A futex's [`Error::UnsupportedOperation`] (the `*_PI` ops and the
    /// obsolete `FD` op) is caught here and downgraded to a logged warning
    /// plus an `Ack`, matching spec §7's "Unsupported operation: Warning +
    /// best-effort fallback" recovery — it never reaches the caller.
    pub fn handle_request(&mut self, request: McpRequest, requester: CoreId, t_req: SimTime) -> Result<McpOutcome> {
        let mut outcome = McpOutcome::default();
        match request {
            McpRequest::Syscall(req) => {
                outcome.reply = Some(McpResponse::Syscall(self.syscall.handle(&req)));
            }
            McpRequest::MutexLock { id, t_req } => {
                outcome.reply = self.sync.mutex_lock(id, requester, t_req).map(|(_, reply)| reply);
            }
            McpRequest::MutexUnlock { id, t_req } => {
                if let Some(release) = self.sync.mutex_unlock(id, requester, t_req) {
                    outcome.side_effects.push(release);
                }
                outcome.reply = Some(McpResponse::Ack);
            }
            McpRequest::CondWait { id, mutex_id, t_req, timeout } => {
                if let Some(release) = self.sync.cond_wait(id, mutex_id, requester, t_req, timeout) {
                    outcome.side_effects.push(release);
                }
            }
            McpRequest::CondSignal { id } => {
                if let Some(release) = self.sync.cond_signal(id) {
                    outcome.side_effects.push(release);
                }
                outcome.reply = Some(McpResponse::Ack);
            }
            McpRequest::CondBroadcast { id } => {
                outcome.side_effects = self.sync.cond_broadcast(id);
                outcome.reply = Some(McpResponse::Ack);
            }
            McpRequest::BarrierInit { id, count } => {
                self.sync.barrier_init(id, count);
                outcome.reply = Some(McpResponse::Ack);
            }
            McpRequest::BarrierWait { id, t_req } => {
                if let Some(releases) = self.sync.barrier_wait(id, requester, t_req)? {
                    outcome.side_effects = releases;
                }
            }
            McpRequest::Futex {
                op,
                uaddr,
                val,
                arg3,
                uaddr2,
                val3,
                requester: futex_requester,
                t_req,
            } => match self.sync.futex(op, uaddr, val, arg3, uaddr2, val3, futex_requester, t_req) {
                Ok((reply, woken)) => {
                    outcome.reply = reply;
                    outcome.side_effects = woken;
                }
                Err(err @ Error::UnsupportedOperation(_)) => {
                    warn!(%err, op = ?op, "futex op not supported, falling back to ack");
                    outcome.reply = Some(McpResponse::Ack);
                }
                Err(err) => return Err(err),
            },
            McpRequest::UtilizationUpdate { source: _, utilization } => {
                outcome.broadcast_utilization = Some(self.utilization.record(utilization));
            }
            McpRequest::Magic(req) => {
                outcome.reply = Some(McpResponse::Magic(self.magic.handle(req)));
            }
        }
        Ok(outcome)
    }

    /// Expires any condition-variable or futex deadline that has passed
    /// `now`, per spec §5's "cancellation & timeouts". A driver calls this
    /// periodically (see `sim::Simulator`); the MCP itself has no timer of
    /// its own.
    pub fn expire_timeouts(&mut self, now: SimTime) -> Vec<Release> {
        self.sync.expire_timeouts(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::message::MagicRequest;

    fn core(id: u32) -> CoreId {
        CoreId::new(id)
    }

    #[test]
    fn mutex_contention_scenario_matches_spec_scenario_5() {
        let mut mcp = Mcp::new(1000);
        let a_outcome = mcp
            .handle_request(McpRequest::MutexLock { id: 1, t_req: SimTime::from_ns(100) }, core(0), SimTime::from_ns(100))
            .unwrap();
        assert_eq!(a_outcome.reply, Some(McpResponse::Release { time: SimTime::from_ns(100) }));

        let b_outcome = mcp
            .handle_request(McpRequest::MutexLock { id: 1, t_req: SimTime::from_ns(150) }, core(1), SimTime::from_ns(150))
            .unwrap();
        assert_eq!(b_outcome.reply, None, "B blocks since A holds the mutex");

        let unlock_outcome = mcp
            .handle_request(McpRequest::MutexUnlock { id: 1, t_req: SimTime::from_ns(300) }, core(0), SimTime::from_ns(300))
            .unwrap();
        assert_eq!(unlock_outcome.reply, Some(McpResponse::Ack));
        assert_eq!(
            unlock_outcome.side_effects,
            vec![(core(1), McpResponse::Release { time: SimTime::from_ns(300) })]
        );
    }

    #[test]
    fn barrier_of_four_matches_spec_scenario_6() {
        let mut mcp = Mcp::new(1000);
        mcp.handle_request(McpRequest::BarrierInit { id: 7, count: 4 }, core(0), SimTime::ZERO)
            .unwrap();

        for (core_id, ns) in [(0, 100), (1, 150), (2, 90)] {
            let outcome = mcp
                .handle_request(McpRequest::BarrierWait { id: 7, t_req: SimTime::from_ns(ns) }, core(core_id), SimTime::from_ns(ns))
                .unwrap();
            assert!(outcome.side_effects.is_empty());
        }
        let last = mcp
            .handle_request(McpRequest::BarrierWait { id: 7, t_req: SimTime::from_ns(200) }, core(3), SimTime::from_ns(200))
            .unwrap();
        assert_eq!(last.side_effects.len(), 4);
        for (_, response) in &last.side_effects {
            assert_eq!(*response, McpResponse::Release { time: SimTime::from_ns(200) });
        }
    }

    #[test]
    fn unknown_syscall_falls_back_to_native() {
        let mut mcp = Mcp::new(1000);
        let request = McpRequest::Syscall(crate::net::message::SyscallRequest { number: 99, args: [0; 6] });
        let outcome = mcp.handle_request(request, core(0), SimTime::ZERO).unwrap();
        match outcome.reply {
            Some(McpResponse::Syscall(resp)) => assert!(!resp.intercepted),
            other => panic!("expected a syscall response, got {other:?}"),
        }
    }

    #[test]
    fn unsupported_futex_op_downgrades_to_ack_rather_than_erroring() {
        use crate::net::message::{FutexArg3, FutexOp};
        let mut mcp = Mcp::new(1000);
        let request = McpRequest::Futex {
            op: FutexOp::LockPi,
            uaddr: 0,
            val: 0,
            arg3: FutexArg3::Val2(0),
            uaddr2: 0,
            val3: 0,
            requester: core(0),
            t_req: SimTime::ZERO,
        };
        let outcome = mcp.handle_request(request, core(0), SimTime::ZERO).unwrap();
        assert_eq!(outcome.reply, Some(McpResponse::Ack));
    }

    #[test]
    fn barrier_wait_without_init_propagates_invariant_violation() {
        let mut mcp = Mcp::new(1000);
        let err = mcp
            .handle_request(McpRequest::BarrierWait { id: 42, t_req: SimTime::ZERO }, core(0), SimTime::ZERO)
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn utilization_update_reports_broadcast_value() {
        let mut mcp = Mcp::new(1000);
        let outcome = mcp
            .handle_request(McpRequest::UtilizationUpdate { source: core(0), utilization: 0.4 }, core(0), SimTime::ZERO)
            .unwrap();
        assert_eq!(outcome.broadcast_utilization, Some(0.4));
        assert!((mcp.global_utilization() - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn magic_roi_round_trips_through_dispatch() {
        let mut mcp = Mcp::new(2000);
        mcp.handle_request(McpRequest::Magic(MagicRequest::RoiBegin), core(0), SimTime::ZERO)
            .unwrap();
        assert!(mcp.magic().in_roi());
        let get = mcp
            .handle_request(McpRequest::Magic(MagicRequest::GetMhz { core: core(0) }), core(0), SimTime::ZERO)
            .unwrap();
        assert_eq!(get.reply, Some(McpResponse::Magic(crate::net::message::MagicResponse::Mhz(2000))));
    }
}
