//! The on-chip network: packet/hop types, the routing capability every
//! model implements, and the [`Network`] registry that owns one routing
//! node per named channel and delivers packets to per-core inboxes.
//!
//! Grounded on the original's `Network`/`NetworkModel` split
//! (`common/network/network.h`, `network_model_analytical.cc`): one
//! `NetworkModel` instance per `(core, network_name)` pair, addressed
//! through `netSend`/`netRecv`. Per spec §5, routing computation never
//! suspends a host thread — [`Network::send`] computes the delivered
//! [`SimTime`] synchronously and hands the packet to the receiver's
//! `crossbeam_channel` inbox; only MCP round-trips and clock-skew waits
//! block a core's thread.

pub mod analytical;
pub mod message;

use std::collections::HashMap;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::common::{CoreId, SimTime, Topology};
use crate::config::{AnalyticalNetworkConfig, NetworkConfig, NetworkModelKind};

pub use message::{
    ComponentAddress, FutexArg3, FutexOp, MagicRequest, MagicResponse, McpRequest, McpResponse,
    MessageKind, Payload, ShmemMessage, SyscallRequest, SyscallResponse,
};

/// One message in flight: sender, receiver, the simulated time it was
/// handed to the network, its byte length, and its payload. Matches
/// `NetPacket` in spec §3, whose `length` field drives the NoC's flit
/// count — callers that don't know a more precise size fall back to
/// [`Payload::wire_len_bytes`].
#[derive(Debug, Clone)]
pub struct NetPacket {
    /// Originating core.
    pub sender: CoreId,
    /// Destination core.
    pub receiver: CoreId,
    /// The simulated time the sender handed this packet to the network.
    pub time: SimTime,
    /// The packet's size in bytes, used by [`analytical::Analytical`] to
    /// compute its flit count.
    pub length: u32,
    /// The carried message.
    pub payload: Payload,
}

/// One routing hop: a packet's final destination, the next node on its
/// path (identical to `final_dest` for the magic-routed models this crate
/// implements), and the simulated arrival time at that hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hop {
    /// The packet's ultimate destination core.
    pub final_dest: CoreId,
    /// The next core on the route (always `final_dest` here: every model in
    /// this crate is magic-routed, one hop per packet).
    pub next_dest: CoreId,
    /// Simulated time of arrival at `next_dest`.
    pub arrival_time: SimTime,
}

/// The capability every network routing model implements: given a packet,
/// produce the hop(s) it takes and, for models that track contention,
/// optionally surface a periodic local-utilization sample.
pub trait RouteLatency: Send {
    /// Routes `packet`, returning the (possibly multi-hop, though every
    /// model here returns exactly one) path with arrival times filled in.
    fn route(&mut self, packet: &NetPacket) -> Vec<Hop>;

    /// Called after every routed packet with the sending core's total
    /// elapsed simulated time; returns `Some(local_utilization)` once the
    /// configured gossip interval has elapsed, `None` otherwise. The
    /// default implementation never gossips.
    fn poll_utilization_update(&mut self, core_elapsed: SimTime) -> Option<f64> {
        let _ = core_elapsed;
        None
    }

    /// Delivers the MCP's broadcast global utilization `p`. The default
    /// implementation ignores it (models with no contention term have no
    /// use for it).
    fn receive_global_utilization(&mut self, utilization: f64) {
        let _ = utilization;
    }
}

/// Which of the five named channels (spec §4.3/§6) a packet travels on.
/// Two user networks, two memory networks, and one system network, each
/// independently configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// `network/user_model_1`: general user-level message passing.
    User1,
    /// `network/user_model_2`: a second independent user channel.
    User2,
    /// `network/memory_model_1`: cache-coherence traffic to/from the directory.
    Memory1,
    /// `network/memory_model_2`: a second independent memory channel.
    Memory2,
    /// `network/system_model`: MCP request/response traffic.
    System,
}

fn build_model(kind: NetworkModelKind, analytical: &AnalyticalNetworkConfig, topology: Topology, proc_cost_ns: u64) -> Box<dyn RouteLatency> {
    match kind {
        NetworkModelKind::Magic => Box::new(analytical::Magic),
        NetworkModelKind::Analytical => Box::new(analytical::Analytical::new(
            analytical,
            topology,
            SimTime::from_ns(proc_cost_ns),
        )),
    }
}

/// One channel's per-core fleet of routing nodes, each independently
/// locked per spec §5 (a node may be consulted concurrently by its core's
/// host thread and, for utilization delivery, the MCP's aggregation pass).
struct ChannelNodes {
    nodes: HashMap<CoreId, Mutex<Box<dyn RouteLatency>>>,
}

/// The on-chip network fabric: owns one [`RouteLatency`] node per
/// `(channel, core)` pair and a `crossbeam_channel` inbox per core.
///
/// Constructed once per simulation (see `sim::Simulator`) over the run's
/// [`Topology`]; cores hand packets to [`Network::send`] and drain their
/// own inbox with the `Receiver` returned from [`Network::inbox`].
pub struct Network {
    topology: Topology,
    channels: HashMap<Channel, ChannelNodes>,
    inboxes: HashMap<CoreId, (Sender<NetPacket>, Receiver<NetPacket>)>,
}

impl Network {
    /// Builds the network fabric for `topology`, instantiating one routing
    /// node per configured channel for every core and an inbox per core.
    #[must_use]
    pub fn new(config: &NetworkConfig, topology: Topology) -> Self {
        let mut channels = HashMap::new();
        let user_proc_cost = config.analytical.processing_cost_ns;
        let specs = [
            (Channel::User1, config.user_model_1, user_proc_cost),
            (Channel::User2, config.user_model_2, user_proc_cost),
            (Channel::Memory1, config.memory_model_1, 0),
            (Channel::Memory2, config.memory_model_2, 0),
            (Channel::System, config.system_model, 0),
        ];
        for (channel, kind, proc_cost_ns) in specs {
            let mut nodes = HashMap::new();
            for core in 0..topology.total_cores() {
                let core = CoreId::new(core);
                nodes.insert(
                    core,
                    Mutex::new(build_model(kind, &config.analytical, topology, proc_cost_ns)),
                );
            }
            channels.insert(channel, ChannelNodes { nodes });
        }

        let mut inboxes = HashMap::new();
        for core in 0..topology.total_cores() {
            inboxes.insert(CoreId::new(core), crossbeam_channel::unbounded());
        }

        Self {
            topology,
            channels,
            inboxes,
        }
    }

    /// The topology this network was built over.
    #[must_use]
    pub const fn topology(&self) -> Topology {
        self.topology
    }

    /// The receiving half of `core`'s inbox. Each core drains its own
    /// inbox from its own host thread; cloning a `Receiver` is cheap but
    /// callers should keep exactly one consumer per core to preserve
    /// delivery order.
    #[must_use]
    pub fn inbox(&self, core: CoreId) -> Receiver<NetPacket> {
        self.inboxes[&core].1.clone()
    }

    /// Routes `packet` on `channel` using the sender's node (the original's
    /// convention: the injecting core's `NetworkModel` instance computes
    /// the latency, since it alone tracks that core's link utilization),
    /// then delivers it to the receiver's inbox with `time` advanced to
    /// the computed arrival.
    ///
    /// Returns the arrival [`SimTime`] at the final destination.
    pub fn send(&self, channel: Channel, packet: NetPacket) -> SimTime {
        let nodes = &self.channels[&channel].nodes;
        let hop = {
            let mut node = nodes[&packet.sender].lock();
            node.route(&packet)
                .pop()
                .expect("every RouteLatency implementation returns at least one hop")
        };

        let delivered = NetPacket {
            time: hop.arrival_time,
            ..packet
        };
        if let Some((sender, _)) = self.inboxes.get(&delivered.receiver) {
            let _ = sender.send(delivered);
        }
        hop.arrival_time
    }

    /// Polls `channel`'s node for `core` for a utilization-gossip sample;
    /// if one is due, wraps it as an [`McpRequest::UtilizationUpdate`] and
    /// sends it to the MCP over the system channel, returning the global
    /// utilization update it provoked, if any was already buffered (see
    /// `mcp::UtilizationAggregator`).
    pub fn poll_and_gossip_utilization(&self, channel: Channel, core: CoreId, core_elapsed: SimTime) {
        let sample = {
            let mut node = self.channels[&channel].nodes[&core].lock();
            node.poll_utilization_update(core_elapsed)
        };
        let Some(utilization) = sample else {
            return;
        };
        let payload = Payload::McpRequest(McpRequest::UtilizationUpdate { source: core, utilization });
        let request = NetPacket {
            sender: core,
            receiver: self.topology.mcp_core(),
            time: core_elapsed,
            length: payload.wire_len_bytes(),
            payload,
        };
        self.send(Channel::System, request);
    }

    /// Broadcasts a freshly aggregated global utilization to every core's
    /// node on `channel` (called by the MCP's utilization aggregator once
    /// it has combined the latest per-sender samples).
    pub fn broadcast_global_utilization(&self, channel: Channel, utilization: f64) {
        for node in self.channels[&channel].nodes.values() {
            node.lock().receive_global_utilization(utilization);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;

    fn net() -> Network {
        let topo = Topology::new(4, 0, 2);
        Network::new(&NetworkConfig::default(), topo)
    }

    #[test]
    fn packet_is_delivered_to_receiver_inbox() {
        let net = net();
        let receiver_inbox = net.inbox(CoreId::new(2));
        let payload = Payload::Shmem(ShmemMessage::ReadReq {
            address: 0x1000,
            requester: CoreId::new(0),
        });
        let packet = NetPacket {
            sender: CoreId::new(0),
            receiver: CoreId::new(2),
            time: SimTime::from_ns(10),
            length: payload.wire_len_bytes(),
            payload,
        };
        let arrival = net.send(Channel::Memory1, packet);
        let delivered = receiver_inbox.recv().unwrap();
        assert_eq!(delivered.receiver, CoreId::new(2));
        assert_eq!(delivered.time, arrival);
        assert!(arrival >= SimTime::from_ns(10));
    }

    #[test]
    fn self_send_arrives_immediately() {
        let net = net();
        let inbox = net.inbox(CoreId::new(1));
        let payload = Payload::Shmem(ShmemMessage::InvReq { address: 0 });
        let packet = NetPacket {
            sender: CoreId::new(1),
            receiver: CoreId::new(1),
            time: SimTime::from_ns(5),
            length: payload.wire_len_bytes(),
            payload,
        };
        let arrival = net.send(Channel::Memory1, packet);
        assert_eq!(arrival, SimTime::from_ns(5));
        assert_eq!(inbox.recv().unwrap().time, SimTime::from_ns(5));
    }

    #[test]
    fn utilization_broadcast_reaches_every_node() {
        let net = net();
        net.broadcast_global_utilization(Channel::User1, 0.42);
        // no direct accessor; routing a packet afterward exercises the
        // updated node without panicking, which is the behavior under test.
        let payload = Payload::Shmem(ShmemMessage::ReadReq {
            address: 0,
            requester: CoreId::new(0),
        });
        let packet = NetPacket {
            sender: CoreId::new(0),
            receiver: CoreId::new(3),
            time: SimTime::ZERO,
            length: payload.wire_len_bytes(),
            payload,
        };
        let _ = net.send(Channel::User1, packet);
    }
}
