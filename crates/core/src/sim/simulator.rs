//! The top-level driver: owns every subsystem for one run and replays a
//! [`Trace`] against them, one host thread per application core plus one
//! for the MCP, per spec §5's "one OS thread per simulated core, serialized
//! through a single MCP thread" concurrency model.
//!
//! Grounded on the teacher's `Simulator` (owns the pieces a run needs
//! side-by-side and exposes `new`/`run`), generalized from a single-CPU
//! tick loop to the multi-core, multi-subsystem orchestration this engine's
//! scope requires. `std::thread::scope` lets every worker borrow `&Self`
//! directly — the scope guarantees every spawned thread joins before
//! `run` returns, so no subsystem needs an `Arc`.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::common::error::{Error, Result};
use crate::common::{CoreId, Period, SimTime, Topology};
use crate::config::Config;
use crate::mcp::{ClockSkewServer, Mcp};
use crate::memory::MemorySubsystem;
use crate::net::message::{FutexArg3, MagicRequest, McpRequest, McpResponse, Payload};
use crate::net::{Channel, NetPacket, Network};
use crate::perf_model::{CorePerformanceModel, DynamicInstruction, StaticKind};
use crate::stats::StatsRegistry;

use super::hooks::{HookArg, HookType, HooksManager};
use super::trace::{Trace, TraceEvent};

/// Every channel the MCP's aggregated global utilization is fanned out on.
/// [`McpRequest::UtilizationUpdate`] carries no channel of its own, so the
/// broadcast reaches all five rather than just the one the sample arrived
/// on — a deliberate simplification, recorded in `DESIGN.md`.
const ALL_CHANNELS: [Channel; 5] = [Channel::User1, Channel::User2, Channel::Memory1, Channel::Memory2, Channel::System];

/// A completed run's summary: how many logical cores participated and each
/// application core's final elapsed simulated time.
#[derive(Debug, Clone)]
pub struct SimulationReport {
    /// Total logical cores in the topology (application + thread-spawner + MCP).
    pub total_cores: u32,
    /// Each application core's elapsed simulated time at the end of its trace.
    pub elapsed: HashMap<CoreId, SimTime>,
}

/// Owns every subsystem for one simulation run: the topology, the network
/// fabric, the MCP, the clock-skew server, the memory subsystem, the
/// statistics registry, and the lifecycle hook registry.
pub struct Simulator {
    config: Config,
    topology: Topology,
    network: Network,
    stats: StatsRegistry,
    mcp: Mutex<Mcp>,
    clock_skew: ClockSkewServer,
    memory: Mutex<MemorySubsystem>,
    hooks: HooksManager,
}

impl fmt::Debug for Simulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulator")
            .field("topology", &self.topology)
            .finish_non_exhaustive()
    }
}

impl Simulator {
    /// Builds every subsystem for `config`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let topology = Topology::new(config.general.total_cores, config.general.num_processes, config.network.analytical.n);
        let stats = StatsRegistry::new();
        let network = Network::new(&config.network, topology);
        let mcp = Mcp::new(config.general.core_mhz);
        let clock_skew = ClockSkewServer::new(&config.clock_skew_minimization, topology.total_cores() as usize);
        let memory = MemorySubsystem::new(topology, &config, &stats);
        Self {
            config,
            topology,
            network,
            stats,
            mcp: Mutex::new(mcp),
            clock_skew,
            memory: Mutex::new(memory),
            hooks: HooksManager::new(),
        }
    }

    /// The lifecycle hook registry. Callers register callbacks before
    /// calling [`Self::run`].
    #[must_use]
    pub const fn hooks(&self) -> &HooksManager {
        &self.hooks
    }

    /// The statistics registry, populated as the run progresses.
    #[must_use]
    pub const fn stats(&self) -> &StatsRegistry {
        &self.stats
    }

    /// The topology this simulator was built over.
    #[must_use]
    pub const fn topology(&self) -> Topology {
        self.topology
    }

    /// Replays `trace` against every application core, each on its own host
    /// thread, serialized through one MCP thread, until every core's event
    /// stream is exhausted.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`Error`] (`Configuration`/`InvariantViolation`)
    /// raised by any core or the MCP; a panicking worker thread is reported
    /// as [`Error::InvariantViolation`].
    pub fn run(&self, trace: &Trace) -> Result<SimulationReport> {
        self.hooks.call(HookType::SimStart, HookArg::None);
        let mcp_core = self.topology.mcp_core();
        let mcp_inbox = self.network.inbox(mcp_core);
        let (stop_tx, stop_rx) = crossbeam_channel::unbounded::<()>();

        let elapsed = std::thread::scope(|scope| -> Result<HashMap<CoreId, SimTime>> {
            let mcp_handle = scope.spawn(|| run_mcp_thread(self, mcp_core, &mcp_inbox, &stop_rx));

            let mut core_handles = Vec::with_capacity(self.topology.app_cores() as usize);
            for i in 0..self.topology.app_cores() {
                let core = CoreId::new(i);
                let events = trace.events_for(core);
                core_handles.push((core, scope.spawn(move || run_core(self, core, &events))));
            }

            let mut elapsed = HashMap::new();
            for (core, handle) in core_handles {
                elapsed.insert(core, join_or_err(handle.join())??);
            }

            let _ = stop_tx.send(());
            join_or_err(mcp_handle.join())??;
            Ok(elapsed)
        })?;

        self.hooks.call(HookType::SimEnd, HookArg::None);
        Ok(SimulationReport { total_cores: self.topology.total_cores(), elapsed })
    }

    /// Dumps every registered statistic to `general.output_dir`/`general.output_file`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the output file cannot be created.
    pub fn shutdown(&self) -> Result<()> {
        let path = Path::new(&self.config.general.output_dir).join(&self.config.general.output_file);
        info!(path = %path.display(), "writing statistics");
        self.stats.dump_to_file("carbon_sim", &path)
    }
}

fn join_or_err<T>(result: std::thread::Result<T>) -> Result<T> {
    result.map_err(|_| Error::InvariantViolation("worker thread panicked".to_string()))
}

/// Sends `request` from `core` to the MCP and blocks until the matching
/// [`McpResponse`] arrives on `core`'s own inbox. Stray coherence traffic
/// delivered to the same inbox (application cores also receive `Shmem`
/// packets routed by [`MemorySubsystem`]) is skipped rather than treated as
/// the reply, since the MCP never addresses an `McpResponse` to anyone but
/// the request's own requester.
fn send_and_await(sim: &Simulator, core: CoreId, inbox: &Receiver<NetPacket>, request: McpRequest, t_req: SimTime) -> McpResponse {
    let payload = Payload::McpRequest(request);
    let packet = NetPacket {
        sender: core,
        receiver: sim.topology.mcp_core(),
        time: t_req,
        length: payload.wire_len_bytes(),
        payload,
    };
    sim.network.send(Channel::System, packet);
    loop {
        match inbox.recv() {
            Ok(reply) => {
                if let Payload::McpResponse(response) = reply.payload {
                    return response;
                }
            }
            Err(_) => return McpResponse::Ack,
        }
    }
}

fn run_core(sim: &Simulator, core: CoreId, events: &[TraceEvent]) -> Result<SimTime> {
    let inbox = sim.network.inbox(core);
    let mut perf = CorePerformanceModel::new(
        core,
        Period::from_mhz(sim.config.general.core_mhz),
        &sim.config.perf_model.branch_predictor,
        &sim.stats,
    );

    for event in events {
        match *event {
            TraceEvent::Alu { cycles } => perf.submit(DynamicInstruction::Static { kind: StaticKind::Alu, cycles }),
            TraceEvent::FloatingPoint { cycles } => {
                perf.submit(DynamicInstruction::Static { kind: StaticKind::FloatingPoint, cycles });
            }
            TraceEvent::Other { cycles } => perf.submit(DynamicInstruction::Static { kind: StaticKind::Other, cycles }),
            TraceEvent::Branch { pc, target, taken } => perf.submit(DynamicInstruction::Branch { pc, target, taken }),
            TraceEvent::Spawn { time_ns } => perf.submit(DynamicInstruction::Spawn(SimTime::from_ns(time_ns))),
            TraceEvent::MemoryRead { address, size_bytes } => {
                let outcome = sim.memory.lock().read(&sim.network, core, address, size_bytes, perf.elapsed())?;
                perf.submit(DynamicInstruction::Fixed(outcome.latency));
            }
            TraceEvent::MemoryWrite { address, size_bytes } => {
                let outcome = sim.memory.lock().write(&sim.network, core, address, size_bytes, perf.elapsed())?;
                perf.submit(DynamicInstruction::Fixed(outcome.latency));
            }
            TraceEvent::MutexLock { id } => {
                let response = send_and_await(sim, core, &inbox, McpRequest::MutexLock { id, t_req: perf.elapsed() }, perf.elapsed());
                apply_release(&mut perf, response);
            }
            TraceEvent::MutexUnlock { id } => {
                send_and_await(sim, core, &inbox, McpRequest::MutexUnlock { id, t_req: perf.elapsed() }, perf.elapsed());
            }
            TraceEvent::CondWait { id, mutex_id, timeout_ns } => {
                let request = McpRequest::CondWait {
                    id,
                    mutex_id,
                    t_req: perf.elapsed(),
                    timeout: timeout_ns.map(SimTime::from_ns),
                };
                let response = send_and_await(sim, core, &inbox, request, perf.elapsed());
                apply_release(&mut perf, response);
            }
            TraceEvent::CondSignal { id } => {
                send_and_await(sim, core, &inbox, McpRequest::CondSignal { id }, perf.elapsed());
            }
            TraceEvent::CondBroadcast { id } => {
                send_and_await(sim, core, &inbox, McpRequest::CondBroadcast { id }, perf.elapsed());
            }
            TraceEvent::BarrierInit { id, count } => {
                send_and_await(sim, core, &inbox, McpRequest::BarrierInit { id, count }, perf.elapsed());
            }
            TraceEvent::BarrierWait { id } => {
                let response = send_and_await(sim, core, &inbox, McpRequest::BarrierWait { id, t_req: perf.elapsed() }, perf.elapsed());
                apply_release(&mut perf, response);
            }
            TraceEvent::Futex { op, uaddr, val, timeout_ns, val2, uaddr2, val3 } => {
                let arg3 = if matches!(op, crate::net::message::FutexOp::Wait | crate::net::message::FutexOp::WaitBitset) {
                    FutexArg3::Timeout(timeout_ns.map(SimTime::from_ns))
                } else {
                    FutexArg3::Val2(val2)
                };
                let request = McpRequest::Futex {
                    op,
                    uaddr,
                    val,
                    arg3,
                    uaddr2,
                    val3,
                    requester: core,
                    t_req: perf.elapsed(),
                };
                let response = send_and_await(sim, core, &inbox, request, perf.elapsed());
                apply_release(&mut perf, response);
            }
            TraceEvent::RoiBegin => {
                send_and_await(sim, core, &inbox, McpRequest::Magic(MagicRequest::RoiBegin), perf.elapsed());
                sim.hooks.call(HookType::RoiBegin, HookArg::Core(core));
            }
            TraceEvent::RoiEnd => {
                send_and_await(sim, core, &inbox, McpRequest::Magic(MagicRequest::RoiEnd), perf.elapsed());
                sim.hooks.call(HookType::RoiEnd, HookArg::Core(core));
            }
            TraceEvent::SetMhz { mhz } => {
                send_and_await(sim, core, &inbox, McpRequest::Magic(MagicRequest::SetMhz { core, mhz }), perf.elapsed());
                perf.set_period(Period::from_mhz(mhz));
                sim.hooks.call(HookType::CpufreqChange, HookArg::Mhz { core, mhz });
            }
        }
        sim.network.poll_and_gossip_utilization(Channel::User1, core, perf.elapsed());
        sim.clock_skew.sync(core, perf.elapsed());
    }

    debug!(core = core.get(), elapsed = ?perf.elapsed(), "core trace exhausted");
    Ok(perf.elapsed())
}

/// A `Release`/`Magic(Ack)` reply advances a blocked core's clock to the
/// granted time via [`DynamicInstruction::Spawn`]'s "never move backward"
/// semantics; any other reply (an immediate `Ack`, a futex timeout, a
/// syscall/magic reply) carries no time of its own and is a no-op here.
fn apply_release(perf: &mut CorePerformanceModel, response: McpResponse) {
    if let McpResponse::Release { time } = response {
        perf.submit(DynamicInstruction::Spawn(time));
    }
}

/// The MCP's own host thread: drains `inbox`, dispatches each request
/// through [`Mcp::handle_request`], and relays replies/side effects back
/// over the system channel. Polls [`Mcp::expire_timeouts`] on an idle tick
/// so a blocked `CondWait`/`Futex` with a deadline is released even while no
/// new request arrives.
///
/// The "now" passed to `expire_timeouts` is the latest request timestamp
/// this thread has observed rather than an independent wall clock — the
/// MCP has none of its own (see `DESIGN.md`).
fn run_mcp_thread(sim: &Simulator, mcp_core: CoreId, inbox: &Receiver<NetPacket>, stop_rx: &Receiver<()>) -> Result<()> {
    let mut latest_seen = SimTime::ZERO;
    loop {
        crossbeam_channel::select! {
            recv(inbox) -> packet => match packet {
                Ok(packet) => {
                    latest_seen = latest_seen.max(packet.time);
                    process_packet(sim, mcp_core, packet, &mut latest_seen)?;
                }
                Err(_) => break,
            },
            recv(stop_rx) -> _ => break,
            default(std::time::Duration::from_micros(200)) => {
                for (dest, response) in sim.mcp.lock().expire_timeouts(latest_seen) {
                    send_response(sim, mcp_core, dest, response, latest_seen);
                }
            }
        }
    }

    while let Ok(packet) = inbox.try_recv() {
        latest_seen = latest_seen.max(packet.time);
        process_packet(sim, mcp_core, packet, &mut latest_seen)?;
    }
    Ok(())
}

fn process_packet(sim: &Simulator, mcp_core: CoreId, packet: NetPacket, latest_seen: &mut SimTime) -> Result<()> {
    let Payload::McpRequest(request) = packet.payload else {
        return Ok(());
    };
    let outcome = sim.mcp.lock().handle_request(request, packet.sender, packet.time)?;

    if let Some(reply) = outcome.reply {
        send_response(sim, mcp_core, packet.sender, reply, packet.time);
    }
    for (dest, response) in outcome.side_effects {
        send_response(sim, mcp_core, dest, response, *latest_seen);
    }
    if let Some(utilization) = outcome.broadcast_utilization {
        for channel in ALL_CHANNELS {
            sim.network.broadcast_global_utilization(channel, utilization);
        }
    }
    Ok(())
}

fn send_response(sim: &Simulator, mcp_core: CoreId, dest: CoreId, response: McpResponse, time: SimTime) {
    let payload = Payload::McpResponse(response);
    let packet = NetPacket {
        sender: mcp_core,
        receiver: dest,
        time,
        length: payload.wire_len_bytes(),
        payload,
    };
    sim.network.send(Channel::System, packet);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn trace_from(lines: &[&str]) -> Trace {
        let joined = lines.join("\n");
        Trace::parse(std::io::Cursor::new(joined.into_bytes()), Path::new("<test>")).unwrap()
    }

    #[test]
    fn single_core_compute_only_trace_advances_elapsed() {
        let config = Config::default();
        let sim = Simulator::new(config);
        let trace = trace_from(&[r#"{"core": 0, "event": {"op": "alu", "cycles": 1000}}"#]);
        let report = sim.run(&trace).unwrap();
        assert!(report.elapsed[&CoreId::new(0)] > SimTime::ZERO);
    }

    #[test]
    fn roi_begin_fires_registered_hook() {
        let config = Config::default();
        let sim = Simulator::new(config);
        let fired = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = std::sync::Arc::clone(&fired);
        sim.hooks().register(HookType::RoiBegin, move |_| {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        });
        let trace = trace_from(&[r#"{"core": 0, "event": {"op": "roi_begin"}}"#]);
        sim.run(&trace).unwrap();
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn two_cores_contend_a_mutex_without_deadlocking() {
        let config = Config::default();
        let sim = Simulator::new(config);
        let trace = trace_from(&[
            r#"{"core": 0, "event": {"op": "mutex_lock", "id": 1}}"#,
            r#"{"core": 0, "event": {"op": "alu", "cycles": 100}}"#,
            r#"{"core": 0, "event": {"op": "mutex_unlock", "id": 1}}"#,
            r#"{"core": 1, "event": {"op": "mutex_lock", "id": 1}}"#,
            r#"{"core": 1, "event": {"op": "mutex_unlock", "id": 1}}"#,
        ]);
        let report = sim.run(&trace).unwrap();
        assert_eq!(report.total_cores, sim.topology().total_cores());
    }
}
