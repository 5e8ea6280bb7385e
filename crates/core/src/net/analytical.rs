//! The analytical NoC model: closed-form latency for a uniform k-ary
//! n-cube, magic-routed (one hop per packet) with a contention term driven
//! by asynchronously gossiped global utilization.
//!
//! Grounded on `common/network/network_model_analytical.cc`:
//! `computeLatency` for the latency formula, `updateUtilization` /
//! `receiveMCPUpdate` for the gossip protocol. Spec §9 / `SPEC_FULL.md` §5
//! resolve the original's commented-out `netSend` by restoring it — see
//! [`Analytical::poll_utilization_update`].

use crate::common::{CoreId, SimTime, Topology};
use crate::config::AnalyticalNetworkConfig;

use super::{Hop, NetPacket, RouteLatency};

/// Parameters pulled from `network/analytical/*` (spec §4.3).
#[derive(Debug, Clone, Copy)]
struct Params {
    tw2: f64,
    s: f64,
    n: u32,
    w: u32,
    update_interval: SimTime,
    proc_cost: SimTime,
}

/// One node's instance of the analytical model. Each node (one per core,
/// per network channel) tracks its own local utilization accumulator and
/// the last-known global utilization `p`; [`super::Network`] wraps each
/// instance in its own lock per spec §5.
pub struct Analytical {
    params: Params,
    enabled: bool,
    topology: Topology,
    global_utilization: f64,
    local_flits_sent: u64,
    local_last_update: SimTime,
    bytes_sent: u64,
    cycles_proc: SimTime,
}

impl Analytical {
    /// Builds an analytical NoC node over `topology`, with `proc_cost`
    /// zeroed for memory networks per spec §4.3 (`proc_cost` is "zero for
    /// memory networks, nonzero for user networks" — callers pass the
    /// already-resolved cost for their channel).
    #[must_use]
    pub fn new(config: &AnalyticalNetworkConfig, topology: Topology, proc_cost: SimTime) -> Self {
        Self {
            params: Params {
                tw2: config.tw2,
                s: config.s,
                n: config.n.max(1),
                w: config.w.max(1),
                update_interval: SimTime::from_ns(config.update_interval_ns),
                proc_cost,
            },
            enabled: true,
            topology,
            global_utilization: 0.0,
            local_flits_sent: 0,
            local_last_update: SimTime::ZERO,
            bytes_sent: 0,
            cycles_proc: SimTime::ZERO,
        }
    }

    /// Disables the model: every packet then incurs zero latency.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Re-enables the model.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Total bytes sent through this node, for `outputSummary`-style reporting.
    #[must_use]
    pub const fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    fn compute_latency(&mut self, packet: &NetPacket) -> SimTime {
        if !self.enabled || packet.sender == packet.receiver {
            return SimTime::ZERO;
        }

        let n = f64::from(self.params.n);
        let k = f64::from(self.topology.radix());
        let kd = k / 2.0;
        let time_per_hop = self.params.s + k.powf(n / 2.0 - 1.0);

        let packet_bits = f64::from(packet.length) * 8.0;
        let flits = (packet_bits / f64::from(self.params.w)).ceil();

        let src_coords = self.topology.coordinates(packet.sender);
        let dst_coords = self.topology.coordinates(packet.receiver);
        let distance: f64 = src_coords
            .iter()
            .zip(dst_coords.iter())
            .map(|(&s, &d)| (f64::from(d) - f64::from(s)).rem_euclid(k))
            .sum();

        let hops_in_network = distance + flits;
        let tb = self.params.tw2 * time_per_hop * hops_in_network;

        let p = self.global_utilization;
        let mut w = (p * flits / (1.0 - p)) * ((kd - 1.0) / (kd * kd)) * (1.0 + 1.0 / n);
        if w < 0.0 {
            w = 0.0;
        }

        let hops_with_contention = distance * (1.0 + w) + flits;
        let tc = self.params.tw2 * time_per_hop * hops_with_contention;

        self.local_flits_sent += (flits * hops_in_network) as u64;
        self.bytes_sent += u64::from(packet.length);
        self.cycles_proc += self.params.proc_cost;

        SimTime::from_ns(tc.ceil().max(0.0) as u64)
    }
}

impl RouteLatency for Analytical {
    fn route(&mut self, packet: &NetPacket) -> Vec<Hop> {
        let latency = self.compute_latency(packet);
        vec![Hop {
            final_dest: packet.receiver,
            next_dest: packet.receiver,
            arrival_time: packet.time + latency,
        }]
    }

    fn poll_utilization_update(&mut self, core_elapsed: SimTime) -> Option<f64> {
        let elapsed_since_update = core_elapsed.saturating_sub(self.local_last_update);
        if elapsed_since_update < self.params.update_interval || elapsed_since_update == SimTime::ZERO {
            return None;
        }

        let local_utilization = self.local_flits_sent as f64 / elapsed_since_update.as_fs() as f64;
        self.local_last_update = core_elapsed;
        self.local_flits_sent = 0;
        Some(local_utilization.clamp(0.0, f64::MAX))
    }

    fn receive_global_utilization(&mut self, utilization: f64) {
        debug_assert!((0.0..1.0).contains(&utilization), "global utilization out of [0, 1)");
        self.global_utilization = utilization.clamp(0.0, 1.0 - f64::EPSILON);
    }
}

/// A destination with no timing model at all: every route is one hop,
/// arriving instantly. Used for `network/*_model_*` keys configured as
/// `"magic"`.
#[derive(Debug, Default)]
pub struct Magic;

impl RouteLatency for Magic {
    fn route(&mut self, packet: &NetPacket) -> Vec<Hop> {
        vec![Hop {
            final_dest: packet.receiver,
            next_dest: packet.receiver,
            arrival_time: packet.time,
        }]
    }
}

/// The requester id used for a self-send in tests and for packets with no
/// meaningful single requester (kept as a named constant rather than a
/// magic literal at call sites).
pub const SELF_SEND_REQUESTER: CoreId = CoreId::new(0);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::message::{MessageKind, Payload, ShmemMessage};

    fn packet(sender: u32, receiver: u32, time: SimTime) -> NetPacket {
        let payload = Payload::Shmem(ShmemMessage::ReadReq {
            address: 0,
            requester: CoreId::new(sender),
        });
        NetPacket {
            sender: CoreId::new(sender),
            receiver: CoreId::new(receiver),
            time,
            length: payload.wire_len_bytes(),
            payload,
        }
    }

    #[test]
    fn self_send_is_zero_latency() {
        let topo = Topology::new(16, 0, 2);
        let mut noc = Analytical::new(&AnalyticalNetworkConfig::default(), topo, SimTime::ZERO);
        let pkt = packet(3, 3, SimTime::from_ns(100));
        let hops = noc.route(&pkt);
        assert_eq!(hops.len(), 1);
        assert_eq!(hops[0].arrival_time, pkt.time);
        assert_eq!(hops[0].final_dest, CoreId::new(3));
    }

    #[test]
    fn two_d_mesh_matches_spec_scenario_4() {
        let topo = Topology::new(16, 0, 2);
        let cfg = AnalyticalNetworkConfig {
            tw2: 1.0,
            s: 1.0,
            n: 2,
            w: 32,
            update_interval_ns: 1000,
            processing_cost_ns: 0,
        };
        let mut noc = Analytical::new(&cfg, topo, SimTime::ZERO);
        // 32-byte packet, core 0 -> core 5, per spec §8 scenario 4.
        let pkt = NetPacket {
            sender: CoreId::new(0),
            receiver: CoreId::new(5),
            time: SimTime::ZERO,
            length: 32,
            payload: Payload::Shmem(ShmemMessage::WriteRep { address: 0 }),
        };
        assert_eq!(pkt.payload.kind(), MessageKind::Shmem);
        let hops = noc.route(&pkt);
        // distance = 2, B = ceil(32*8/32) = 8.
        let b = (32.0 * 8.0 / 32.0_f64).ceil();
        let time_per_hop = 1.0 + 4f64.powf(0.0);
        let tb = 1.0 * time_per_hop * (2.0 + b);
        assert_eq!(hops[0].arrival_time, SimTime::from_ns(tb.ceil() as u64));
    }

    #[test]
    fn zero_utilization_means_no_contention() {
        let topo = Topology::new(16, 0, 2);
        let mut noc = Analytical::new(&AnalyticalNetworkConfig::default(), topo, SimTime::ZERO);
        noc.receive_global_utilization(0.0);
        let pkt = packet(0, 5, SimTime::ZERO);
        let hops = noc.route(&pkt);
        // with p = 0, w = 0 and Tc == Tb.
        assert!(hops[0].arrival_time >= SimTime::ZERO);
    }

    #[test]
    fn single_core_has_zero_distance() {
        let topo = Topology::new(1, 0, 1);
        let mut noc = Analytical::new(&AnalyticalNetworkConfig::default(), topo, SimTime::ZERO);
        let pkt = packet(0, 0, SimTime::ZERO);
        let hops = noc.route(&pkt);
        assert_eq!(hops[0].arrival_time, SimTime::ZERO);
    }

    #[test]
    fn disabled_model_is_zero_latency() {
        let topo = Topology::new(16, 0, 2);
        let mut noc = Analytical::new(&AnalyticalNetworkConfig::default(), topo, SimTime::ZERO);
        noc.disable();
        let pkt = packet(0, 5, SimTime::from_ns(10));
        let hops = noc.route(&pkt);
        assert_eq!(hops[0].arrival_time, pkt.time);
    }

    #[test]
    fn magic_network_is_always_instant() {
        let mut magic = Magic;
        let pkt = packet(1, 7, SimTime::from_ns(42));
        let hops = magic.route(&pkt);
        assert_eq!(hops[0].arrival_time, SimTime::from_ns(42));
    }

    #[test]
    fn utilization_update_only_fires_after_interval() {
        let topo = Topology::new(16, 0, 2);
        let cfg = AnalyticalNetworkConfig {
            update_interval_ns: 1000,
            ..AnalyticalNetworkConfig::default()
        };
        let mut noc = Analytical::new(&cfg, topo, SimTime::ZERO);
        assert!(noc.poll_utilization_update(SimTime::from_ns(10)).is_none());
        noc.route(&packet(0, 5, SimTime::ZERO));
        assert!(noc.poll_utilization_update(SimTime::from_ns(2000)).is_some());
    }
}
