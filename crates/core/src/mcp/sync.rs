//! The synchronization server: mutex, condition-variable, barrier, and raw
//! futex primitives, all keyed by an application-assigned `u32` id.
//!
//! Grounded on spec §4.4's worked algorithm and on `cond.cc`'s
//! wait/signal/broadcast shape (a condition variable as a futex word plus a
//! wait queue). Every primitive table lives behind the single-threaded
//! [`super::Mcp`], so no locking is needed here — ordering is serialized by
//! the MCP processing one request at a time, per spec §5.

use std::collections::{HashMap, VecDeque};

use crate::common::error::{Error, Result};
use crate::common::{CoreId, SimTime};
use crate::net::message::{FutexArg3, FutexOp, McpResponse};

/// A `(destination core, response)` pair produced by a sync operation,
/// either as the immediate reply to the caller or as a deferred grant to a
/// previously blocked waiter.
pub type Release = (CoreId, McpResponse);

#[derive(Debug, Default)]
struct MutexState {
    held: bool,
    waiters: VecDeque<(CoreId, SimTime)>,
}

#[derive(Debug)]
struct CondWaiter {
    core: CoreId,
    mutex_id: u32,
    t_req: SimTime,
    deadline: Option<SimTime>,
}

#[derive(Debug, Default)]
struct CondState {
    waiters: VecDeque<CondWaiter>,
}

#[derive(Debug)]
struct BarrierState {
    count: u32,
    arrivals: Vec<(CoreId, SimTime)>,
}

#[derive(Debug)]
struct FutexWaiter {
    core: CoreId,
    bitset: u32,
    t_req: SimTime,
    deadline: Option<SimTime>,
}

/// Mutex/cond/barrier/futex state tables and the algorithms from spec
/// §4.4 that operate on them.
#[derive(Debug, Default)]
pub struct SyncServer {
    mutexes: HashMap<u32, MutexState>,
    conds: HashMap<u32, CondState>,
    barriers: HashMap<u32, BarrierState>,
    futex_waiters: HashMap<u64, VecDeque<FutexWaiter>>,
}

impl SyncServer {
    /// Builds an empty sync server.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `MutexLock(id, requester, t_req)`: grants immediately if free,
    /// otherwise enqueues the caller until `mutex_unlock` wakes it.
    pub fn mutex_lock(&mut self, id: u32, requester: CoreId, t_req: SimTime) -> Option<Release> {
        let mutex = self.mutexes.entry(id).or_default();
        if mutex.held {
            mutex.waiters.push_back((requester, t_req));
            None
        } else {
            mutex.held = true;
            Some((requester, McpResponse::Release { time: t_req }))
        }
    }

    /// `MutexUnlock(id, requester, t_req)`: wakes the head of the waiter
    /// queue, if any, granting it at `max(waiter's t_req, t_req)`; otherwise
    /// marks the mutex free.
    pub fn mutex_unlock(&mut self, id: u32, _requester: CoreId, t_req: SimTime) -> Option<Release> {
        let mutex = self.mutexes.entry(id).or_default();
        match mutex.waiters.pop_front() {
            Some((core, waiter_t_req)) => Some((core, McpResponse::Release { time: waiter_t_req.max(t_req) })),
            None => {
                mutex.held = false;
                None
            }
        }
    }

    /// `CondWait(id, mutex_id, requester, t_req, timeout)`: atomically
    /// releases `mutex_id` (possibly granting the next waiter on it) and
    /// parks the caller on the condition variable. The caller itself gets
    /// no immediate response; its eventual release comes from a later
    /// `cond_signal`/`cond_broadcast` or timeout expiry.
    pub fn cond_wait(
        &mut self,
        id: u32,
        mutex_id: u32,
        requester: CoreId,
        t_req: SimTime,
        timeout: Option<SimTime>,
    ) -> Option<Release> {
        let unlock_side_effect = self.mutex_unlock(mutex_id, requester, t_req);
        let deadline = timeout.map(|d| t_req + d);
        self.conds.entry(id).or_default().waiters.push_back(CondWaiter {
            core: requester,
            mutex_id,
            t_req,
            deadline,
        });
        unlock_side_effect
    }

    /// `CondSignal(id)`: moves one waiter from the condition variable's
    /// queue back onto its mutex, granting it immediately if that mutex is
    /// free.
    pub fn cond_signal(&mut self, id: u32) -> Option<Release> {
        let waiter = self.conds.get_mut(&id)?.waiters.pop_front()?;
        self.mutex_lock(waiter.mutex_id, waiter.core, waiter.t_req)
    }

    /// `CondBroadcast(id)`: moves every waiter from the condition
    /// variable's queue back onto its mutex. Mutex exclusivity still
    /// applies, so only the first (per mutex) is granted immediately; the
    /// rest re-enter that mutex's own waiter queue.
    pub fn cond_broadcast(&mut self, id: u32) -> Vec<Release> {
        let Some(cond) = self.conds.get_mut(&id) else {
            return Vec::new();
        };
        let waiters: Vec<_> = cond.waiters.drain(..).collect();
        waiters
            .into_iter()
            .filter_map(|w| self.mutex_lock(w.mutex_id, w.core, w.t_req))
            .collect()
    }

    /// `BarrierInit(id, count)`: establishes (or resets) a barrier's
    /// arrival count.
    pub fn barrier_init(&mut self, id: u32, count: u32) {
        self.barriers.insert(
            id,
            BarrierState {
                count,
                arrivals: Vec::new(),
            },
        );
    }

    /// `BarrierWait(id, requester, t_req)`: accumulates arrivals; once the
    /// configured count is reached, releases every arrival at the maximum
    /// arrival timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if `id` was never initialized
    /// via `barrier_init`.
    pub fn barrier_wait(&mut self, id: u32, requester: CoreId, t_req: SimTime) -> Result<Option<Vec<Release>>> {
        let barrier = self
            .barriers
            .get_mut(&id)
            .ok_or_else(|| Error::InvariantViolation(format!("BarrierWait on uninitialized barrier {id}")))?;
        barrier.arrivals.push((requester, t_req));
        if barrier.arrivals.len() < barrier.count as usize {
            return Ok(None);
        }
        let release_time = barrier.arrivals.iter().map(|(_, t)| *t).max().unwrap_or(t_req);
        let arrivals = std::mem::take(&mut barrier.arrivals);
        Ok(Some(
            arrivals
                .into_iter()
                .map(|(core, _)| (core, McpResponse::Release { time: release_time }))
                .collect(),
        ))
    }

    /// Dispatches a raw futex call. Returns the immediate reply to the
    /// caller (`None` for `WAIT`-class ops, which block) and any waiters
    /// woken as a side effect.
    ///
    /// `REQUEUE`/`CMP_REQUEUE`/`WAKE_OP` do not model the target word's
    /// actual memory contents (this simulator has no byte-addressable
    /// memory state backing `uaddr2`), so the conditional/value-compare
    /// forms behave identically to their unconditional counterparts — a
    /// documented simplification, not the Linux kernel's exact semantics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperation`] for the priority-inheriting
    /// and obsolete `FD` futex operations.
    #[allow(clippy::too_many_arguments)]
    pub fn futex(
        &mut self,
        op: FutexOp,
        uaddr: u64,
        val: u32,
        arg3: FutexArg3,
        uaddr2: u64,
        val3: u32,
        requester: CoreId,
        t_req: SimTime,
    ) -> Result<(Option<McpResponse>, Vec<Release>)> {
        if !op.is_supported() {
            return Err(Error::UnsupportedOperation(format!("futex op {op:?} is not supported")));
        }
        match op {
            FutexOp::Wait | FutexOp::WaitBitset => {
                let bitset = if matches!(op, FutexOp::WaitBitset) { val3 } else { u32::MAX };
                let deadline = match arg3 {
                    FutexArg3::Timeout(Some(timeout)) => Some(t_req + timeout),
                    _ => None,
                };
                self.futex_waiters.entry(uaddr).or_default().push_back(FutexWaiter {
                    core: requester,
                    bitset,
                    t_req,
                    deadline,
                });
                Ok((None, Vec::new()))
            }
            FutexOp::Wake | FutexOp::WakeBitset => {
                let bitset = if matches!(op, FutexOp::WakeBitset) { val3 } else { u32::MAX };
                let woken = self.wake(uaddr, val, bitset, t_req);
                Ok((Some(McpResponse::Release { time: t_req }), woken))
            }
            FutexOp::Requeue | FutexOp::CmpRequeue => {
                let mut woken = self.wake(uaddr, val, u32::MAX, t_req);
                let requeue_count = match arg3 {
                    FutexArg3::Val2(n) => n,
                    FutexArg3::Timeout(_) => 0,
                };
                self.requeue(uaddr, uaddr2, requeue_count);
                woken.sort_by_key(|(core, _)| core.get());
                Ok((Some(McpResponse::Release { time: t_req }), woken))
            }
            FutexOp::WakeOp => {
                let mut woken = self.wake(uaddr, val, u32::MAX, t_req);
                let val2 = match arg3 {
                    FutexArg3::Val2(n) => n,
                    FutexArg3::Timeout(_) => 0,
                };
                woken.extend(self.wake(uaddr2, val2, u32::MAX, t_req));
                Ok((Some(McpResponse::Release { time: t_req }), woken))
            }
            FutexOp::Fd | FutexOp::LockPi | FutexOp::UnlockPi | FutexOp::TryLockPi | FutexOp::WaitRequeuePi | FutexOp::CmpRequeuePi => {
                unreachable!("filtered by is_supported above")
            }
        }
    }

    fn wake(&mut self, uaddr: u64, max_count: u32, bitset: u32, t_req: SimTime) -> Vec<Release> {
        let Some(queue) = self.futex_waiters.get_mut(&uaddr) else {
            return Vec::new();
        };
        let mut woken = Vec::new();
        let mut remaining = VecDeque::new();
        while let Some(waiter) = queue.pop_front() {
            if woken.len() < max_count as usize && (waiter.bitset & bitset) != 0 {
                woken.push((waiter.core, McpResponse::Release { time: waiter.t_req.max(t_req) }));
            } else {
                remaining.push_back(waiter);
            }
        }
        *queue = remaining;
        woken
    }

    fn requeue(&mut self, from: u64, to: u64, count: u32) {
        let Some(source) = self.futex_waiters.get_mut(&from) else {
            return;
        };
        let moved: Vec<_> = source.drain(..(count as usize).min(source.len())).collect();
        self.futex_waiters.entry(to).or_default().extend(moved);
    }

    /// Expires any condition-variable or futex wait whose deadline has
    /// passed. Cond timeouts re-acquire their mutex exactly as a signal
    /// would ("an error-less return and the same re-acquire step", spec
    /// §4.4); futex timeouts get a distinguished [`McpResponse::FutexTimeout`].
    pub fn expire_timeouts(&mut self, now: SimTime) -> Vec<Release> {
        let mut out = Vec::new();

        let mut timed_out_cond_waiters = Vec::new();
        for cond in self.conds.values_mut() {
            let mut remaining = VecDeque::new();
            while let Some(waiter) = cond.waiters.pop_front() {
                if waiter.deadline.is_some_and(|d| d <= now) {
                    timed_out_cond_waiters.push(waiter);
                } else {
                    remaining.push_back(waiter);
                }
            }
            cond.waiters = remaining;
        }
        for waiter in timed_out_cond_waiters {
            if let Some(release) = self.mutex_lock(waiter.mutex_id, waiter.core, waiter.t_req) {
                out.push(release);
            }
        }

        for queue in self.futex_waiters.values_mut() {
            let mut remaining = VecDeque::new();
            while let Some(waiter) = queue.pop_front() {
                if waiter.deadline.is_some_and(|d| d <= now) {
                    out.push((waiter.core, McpResponse::FutexTimeout));
                } else {
                    remaining.push_back(waiter);
                }
            }
            *queue = remaining;
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core(id: u32) -> CoreId {
        CoreId::new(id)
    }

    #[test]
    fn mutex_lock_then_unlock_returns_to_free_state() {
        let mut sync = SyncServer::new();
        let grant = sync.mutex_lock(1, core(0), SimTime::from_ns(10));
        assert_eq!(grant, Some((core(0), McpResponse::Release { time: SimTime::from_ns(10) })));
        let wake = sync.mutex_unlock(1, core(0), SimTime::from_ns(20));
        assert_eq!(wake, None);
        let reacquire = sync.mutex_lock(1, core(1), SimTime::from_ns(25));
        assert_eq!(reacquire, Some((core(1), McpResponse::Release { time: SimTime::from_ns(25) })));
    }

    #[test]
    fn mutex_contention_scenario_matches_worked_example() {
        // spec §8 scenario 5: A locks at 100ns, holds to 300ns; B requests at 150ns.
        let mut sync = SyncServer::new();
        let a_grant = sync.mutex_lock(1, core(0), SimTime::from_ns(100));
        assert_eq!(a_grant, Some((core(0), McpResponse::Release { time: SimTime::from_ns(100) })));

        let b_request = sync.mutex_lock(1, core(1), SimTime::from_ns(150));
        assert_eq!(b_request, None, "B must block since A holds the mutex");

        let b_grant = sync.mutex_unlock(1, core(0), SimTime::from_ns(300));
        assert_eq!(b_grant, Some((core(1), McpResponse::Release { time: SimTime::from_ns(300) })));
    }

    #[test]
    fn barrier_of_four_releases_all_at_max_arrival() {
        // spec §8 scenario 6: arrivals at {100, 150, 90, 200} all release at 200ns.
        let mut sync = SyncServer::new();
        sync.barrier_init(7, 4);
        assert_eq!(sync.barrier_wait(7, core(0), SimTime::from_ns(100)).unwrap(), None);
        assert_eq!(sync.barrier_wait(7, core(1), SimTime::from_ns(150)).unwrap(), None);
        assert_eq!(sync.barrier_wait(7, core(2), SimTime::from_ns(90)).unwrap(), None);
        let releases = sync.barrier_wait(7, core(3), SimTime::from_ns(200)).unwrap().unwrap();
        assert_eq!(releases.len(), 4);
        for (_, response) in releases {
            assert_eq!(response, McpResponse::Release { time: SimTime::from_ns(200) });
        }
    }

    #[test]
    fn barrier_wait_without_init_is_an_invariant_violation() {
        let mut sync = SyncServer::new();
        let err = sync.barrier_wait(99, core(0), SimTime::ZERO).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn cond_wait_releases_mutex_then_signal_reacquires_it() {
        let mut sync = SyncServer::new();
        sync.mutex_lock(1, core(0), SimTime::from_ns(0));
        let unlock_side_effect = sync.cond_wait(5, 1, core(0), SimTime::from_ns(10), None);
        assert_eq!(unlock_side_effect, None, "no other mutex waiter yet");

        let signal_grant = sync.cond_signal(5).expect("waiter should be granted the now-free mutex");
        assert_eq!(signal_grant, (core(0), McpResponse::Release { time: SimTime::from_ns(10) }));
    }

    #[test]
    fn futex_wake_releases_waiter_no_earlier_than_its_own_wait_time() {
        let mut sync = SyncServer::new();
        let (reply, woken) = sync
            .futex(FutexOp::Wait, 0x1000, 0, FutexArg3::Timeout(None), 0, 0, core(0), SimTime::from_ns(5))
            .unwrap();
        assert_eq!(reply, None);
        assert!(woken.is_empty());

        let (wake_reply, woken) = sync
            .futex(FutexOp::Wake, 0x1000, 1, FutexArg3::Timeout(None), 0, 0, core(1), SimTime::from_ns(50))
            .unwrap();
        assert_eq!(wake_reply, Some(McpResponse::Release { time: SimTime::from_ns(50) }));
        assert_eq!(woken, vec![(core(0), McpResponse::Release { time: SimTime::from_ns(50) })]);
    }

    #[test]
    fn futex_wait_times_out_when_deadline_passes() {
        let mut sync = SyncServer::new();
        sync.futex(
            FutexOp::Wait,
            0x2000,
            0,
            FutexArg3::Timeout(Some(SimTime::from_ns(100))),
            0,
            0,
            core(0),
            SimTime::from_ns(10),
        )
        .unwrap();
        assert!(sync.expire_timeouts(SimTime::from_ns(50)).is_empty());
        let timeouts = sync.expire_timeouts(SimTime::from_ns(110));
        assert_eq!(timeouts, vec![(core(0), McpResponse::FutexTimeout)]);
    }

    #[test]
    fn unsupported_futex_op_is_rejected() {
        let mut sync = SyncServer::new();
        let err = sync
            .futex(FutexOp::LockPi, 0, 0, FutexArg3::Val2(0), 0, 0, core(0), SimTime::ZERO)
            .unwrap_err();
        assert!(!err.is_fatal());
    }
}
