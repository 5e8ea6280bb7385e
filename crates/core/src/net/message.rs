//! Wire message types carried as [`super::NetPacket`] payloads.
//!
//! Pure data, no behavior — the shared contract between the memory
//! subsystem, the MCP, and the NoC gossip channel, mirroring
//! `message_types.h` in the original source. Kept in one module so none of
//! `net`, `memory`, or `mcp` needs to depend on the others for their wire
//! types.

use crate::common::{CoreId, MemComponent, SimTime};

/// Coherence traffic between caches/directory on the memory network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShmemMessage {
    /// Shared-read request for a cache block.
    ReadReq { address: u64, requester: CoreId },
    /// Reply to a read request; `dirty` means the data came from a modified owner.
    ReadRep { address: u64, dirty: bool },
    /// Exclusive-write request for a cache block.
    WriteReq { address: u64, requester: CoreId },
    /// Grants exclusive ownership.
    WriteRep { address: u64 },
    /// Directory-issued invalidation.
    InvReq { address: u64 },
    /// Acknowledges an invalidation.
    InvRep { address: u64 },
    /// Requests a dirty owner flush its data back to the directory.
    FlushReq { address: u64 },
    /// Flush reply, reporting whether the flushed line was dirty.
    FlushRep { address: u64, dirty: bool },
}

impl ShmemMessage {
    /// The address this message concerns.
    #[must_use]
    pub const fn address(&self) -> u64 {
        match self {
            Self::ReadReq { address, .. }
            | Self::ReadRep { address, .. }
            | Self::WriteReq { address, .. }
            | Self::WriteRep { address }
            | Self::InvReq { address }
            | Self::InvRep { address }
            | Self::FlushReq { address }
            | Self::FlushRep { address, .. } => *address,
        }
    }
}

/// The 13 futex operations recognized by the syscall server, matching
/// `SyscallMdl::futex_names` in `syscall_model.cc`. The `*_PI`
/// (priority-inheritance) variants and the obsolete `FD` op are enumerated
/// for wire completeness but are always
/// [`crate::common::Error::UnsupportedOperation`] — see `SPEC_FULL.md` §4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FutexOp {
    /// Block until woken, optionally bounded by a timeout.
    Wait,
    /// Wake up to `val` waiters.
    Wake,
    /// Obsolete file-descriptor-backed futex. Unsupported.
    Fd,
    /// Requeue waiters from one futex word onto another.
    Requeue,
    /// Conditionally requeue waiters if the futex word still matches.
    CmpRequeue,
    /// Wake with an auxiliary op applied to a second futex word.
    WakeOp,
    /// Acquire a priority-inheriting lock. Unsupported.
    LockPi,
    /// Release a priority-inheriting lock. Unsupported.
    UnlockPi,
    /// Try to acquire a priority-inheriting lock without blocking. Unsupported.
    TryLockPi,
    /// `Wait` filtered by a bitset.
    WaitBitset,
    /// `Wake` filtered by a bitset.
    WakeBitset,
    /// Priority-inheriting wait-then-requeue. Unsupported.
    WaitRequeuePi,
    /// Priority-inheriting conditional requeue. Unsupported.
    CmpRequeuePi,
}

impl FutexOp {
    /// Whether this op routes to the mutex/cond/barrier primitives (`true`)
    /// or is a priority-inheritance/obsolete op the MCP treats as
    /// unsupported (`false`).
    #[must_use]
    pub const fn is_supported(self) -> bool {
        !matches!(
            self,
            Self::Fd | Self::LockPi | Self::UnlockPi | Self::TryLockPi | Self::WaitRequeuePi | Self::CmpRequeuePi
        )
    }
}

/// The overlaid third argument of a futex call: a `timespec`-derived
/// timeout for `WAIT`/`WAIT_BITSET`, or an integer `val2`/`val3` for
/// `REQUEUE`/`CMP_REQUEUE`/`WAKE_OP`. Resolved Open Question from spec §9:
/// the original reads `arg3` as either depending on `op`, so we make the
/// two interpretations distinct enum arms instead of a bare integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FutexArg3 {
    /// `WAIT`/`WAIT_BITSET`: an optional deadline, `None` meaning block forever.
    Timeout(Option<SimTime>),
    /// `REQUEUE`/`CMP_REQUEUE`/`WAKE_OP`: the auxiliary integer argument.
    Val2(u32),
}

/// One syscall-server request, `{syscall_number, args...}` per spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallRequest {
    /// Host syscall number.
    pub number: u32,
    /// Raw argument words.
    pub args: [u64; 6],
}

/// The syscall-server response. `intercepted = false` is the "not
/// intercepted" marker that tells the caller to fall back to native
/// execution, per spec §4.4's failure semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyscallResponse {
    /// Echoes the original syscall number.
    pub number: u32,
    /// Host return value, or errno encoded negative on failure.
    pub status: i64,
    /// Whether the syscall server recognized and handled this call.
    pub intercepted: bool,
}

/// Magic-interface operations: ROI toggles, instrumentation-mode
/// transitions, and MHz get/set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicRequest {
    /// Marks the start of the region of interest.
    RoiBegin,
    /// Marks the end of the region of interest.
    RoiEnd,
    /// Sets a core's clock frequency (the DVFS operation).
    SetMhz { core: CoreId, mhz: u32 },
    /// Reads a core's current clock frequency.
    GetMhz { core: CoreId },
}

/// Reply to a [`MagicRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MagicResponse {
    /// Acknowledges a state-mutating request.
    Ack,
    /// The requested core's clock frequency, in MHz.
    Mhz(u32),
}

/// Every request the MCP's single inbound queue accepts, tagged by the
/// two-message wire contract of spec §4.4 (`MCP_REQUEST_TYPE` carries one
/// of these; `MCP_RESPONSE_TYPE` carries the matching [`McpResponse`]).
#[derive(Debug, Clone, Copy)]
pub enum McpRequest {
    /// Syscall emulation.
    Syscall(SyscallRequest),
    /// Acquire a mutex, blocking if held.
    MutexLock { id: u32, t_req: SimTime },
    /// Release a held mutex.
    MutexUnlock { id: u32, t_req: SimTime },
    /// Atomically release a mutex and wait on a condition variable.
    CondWait {
        id: u32,
        mutex_id: u32,
        t_req: SimTime,
        timeout: Option<SimTime>,
    },
    /// Wake one condition-variable waiter.
    CondSignal { id: u32 },
    /// Wake all condition-variable waiters.
    CondBroadcast { id: u32 },
    /// Establishes a barrier's arrival count. Must precede any
    /// `BarrierWait` on the same `id`, mirroring `CarbonBarrierInit`/
    /// `pthread_barrier_init` in the original source.
    BarrierInit { id: u32, count: u32 },
    /// Arrive at a barrier, blocking until the configured count is reached.
    BarrierWait { id: u32, t_req: SimTime },
    /// Futex operation, op-dependent argument overlay per [`FutexArg3`].
    Futex {
        op: FutexOp,
        uaddr: u64,
        val: u32,
        arg3: FutexArg3,
        uaddr2: u64,
        val3: u32,
        /// The calling core and the simulated time it issued the call, used
        /// to compute a `WAKE`d waiter's release time the same way the
        /// higher-level mutex/cond primitives do.
        requester: CoreId,
        t_req: SimTime,
    },
    /// Asynchronous local-utilization gossip from a NoC node.
    UtilizationUpdate { source: CoreId, utilization: f64 },
    /// ROI/instrumentation-mode/MHz control plane.
    Magic(MagicRequest),
}

/// Every response the MCP emits, matching the request that provoked it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum McpResponse {
    /// Reply to [`McpRequest::Syscall`].
    Syscall(SyscallResponse),
    /// Reply to a sync-primitive grant: the simulated time the requester
    /// may proceed (its elapsed time becomes this value).
    Release { time: SimTime },
    /// Acknowledges a state-establishing request with no release time of
    /// its own, e.g. [`McpRequest::BarrierInit`].
    Ack,
    /// A futex `WAIT`/`WAIT_BITSET` timed out before being woken.
    FutexTimeout,
    /// Broadcast aggregate utilization, sent unsolicited to every node.
    GlobalUtilization { utilization: f64 },
    /// Reply to [`McpRequest::Magic`].
    Magic(MagicResponse),
}

/// The routing/type tag carried in the packet header alongside the
/// payload, matching `NetPacket::type` in spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Cache-coherence traffic.
    Shmem,
    /// An MCP request, per spec §4.4's `MCP_REQUEST_TYPE`.
    McpRequest,
    /// An MCP response, per spec §4.4's `MCP_RESPONSE_TYPE`.
    McpResponse,
}

/// The payload of a [`super::NetPacket`]: a typed tagged union owning its
/// data inline. The receiver takes ownership on delivery; Rust's normal
/// drop glue releases it at scope exit, replacing the original's
/// ad-hoc `void*` allocation/free pairing (see `DESIGN.md`).
#[derive(Debug, Clone)]
pub enum Payload {
    /// Coherence message.
    Shmem(ShmemMessage),
    /// MCP request.
    McpRequest(McpRequest),
    /// MCP response.
    McpResponse(McpResponse),
}

impl Payload {
    /// The routing tag for this payload.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Shmem(_) => MessageKind::Shmem,
            Self::McpRequest(_) => MessageKind::McpRequest,
            Self::McpResponse(_) => MessageKind::McpResponse,
        }
    }

    /// An approximate wire length in bytes, used by the NoC model to
    /// compute flit count. Every variant here is a small fixed-size
    /// struct/enum, so this is a conservative constant per kind rather
    /// than a precise `size_of`.
    #[must_use]
    pub const fn wire_len_bytes(&self) -> u32 {
        match self {
            Self::Shmem(_) => 16,
            Self::McpRequest(_) => 48,
            Self::McpResponse(_) => 24,
        }
    }
}

/// The component (cache level, directory, DRAM, core) a message is
/// addressed to or from, for routing/sharer-set bookkeeping independent of
/// the NoC's core-to-core addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentAddress {
    /// The logical core hosting the component.
    pub core: CoreId,
    /// Which component within that core's hierarchy.
    pub component: MemComponent,
}
