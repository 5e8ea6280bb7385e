//! DRAM performance model: bandwidth × queue model × fixed access cost.
//!
//! Grounded on `common/performance_model/dram_perf_model_constant.cc` (the
//! `Constant` variant) with `ReadWrite` and `Normal` added per spec §4.2 and
//! `SPEC_FULL.md` §5. One controller is assumed per application core;
//! aggregate bandwidth across controllers is linear in controller count, so
//! each [`DramController`] only models its own share.

use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use crate::common::{CoreId, MemComponent, SimTime};
use crate::config::{DramConfig, DramModelKind};
use crate::queue::{self, QueueModel};
use crate::stats::StatsRegistry;

/// Read or write, dispatched by the `ReadWrite` variant; carried through
/// unchanged by `Constant` and `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// Load.
    Read,
    /// Store.
    Write,
}

/// One phase timestamp in a [`ShmemPerfBreakdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Time the request entered the controller's queue.
    DramQueue,
    /// Time the request started occupying the bus.
    DramBus,
    /// Time the DRAM device itself finished servicing the request.
    DramDevice,
}

/// An ordered sequence of (timestamp, phase) pairs recording a request's
/// progress through the memory hierarchy. Monotone non-decreasing by
/// timestamp: [`ShmemPerfBreakdown::update_time`] only records a phase if
/// its timestamp is no earlier than the last recorded timestamp.
#[derive(Debug, Clone, Default)]
pub struct ShmemPerfBreakdown {
    entries: Vec<(SimTime, Option<Phase>)>,
}

impl ShmemPerfBreakdown {
    /// Creates an empty breakdown.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `time` (optionally tagged with `phase`) unless it would
    /// violate monotonicity, matching `ShmemPerf::updateTime`'s
    /// overwrite-only-if-earlier semantics.
    pub fn update_time(&mut self, time: SimTime, phase: Option<Phase>) {
        let is_monotone = self.entries.last().is_none_or(|(last, _)| time >= *last);
        if is_monotone {
            self.entries.push((time, phase));
        }
    }

    /// The recorded (timestamp, phase) sequence, in update order.
    #[must_use]
    pub fn entries(&self) -> &[(SimTime, Option<Phase>)] {
        &self.entries
    }
}

/// Bandwidth stored in bits per femtosecond, matching the original's
/// "bits per clock cycle" representation generalized to `SimTime`.
#[derive(Debug, Clone, Copy)]
struct Bandwidth {
    bits_per_fs: f64,
}

impl Bandwidth {
    fn from_bytes_per_ns(bytes_per_ns: f64) -> Self {
        // bytes/ns -> bits/ns -> bits/fs.
        Self {
            bits_per_fs: (bytes_per_ns * 8.0) / 1_000_000.0,
        }
    }

    /// `round_latency`: the `SimTime` needed to transfer `bits`, rounded to
    /// whole femtoseconds (the internal `SimTime` unit).
    fn round_latency(self, bits: f64) -> SimTime {
        if self.bits_per_fs <= 0.0 {
            return SimTime::ZERO;
        }
        SimTime::from_fs((bits / self.bits_per_fs).ceil() as u64)
    }
}

/// The common statistics every DRAM controller variant maintains and
/// registers with the [`StatsRegistry`].
struct Counters {
    num_accesses: std::sync::Arc<std::sync::atomic::AtomicU64>,
    total_latency_fs: std::sync::Arc<std::sync::atomic::AtomicU64>,
    total_queue_delay_fs: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

impl Counters {
    fn register(stats: &StatsRegistry, core: CoreId) -> Self {
        Self {
            num_accesses: stats.register("dram", core.get(), "total-accesses"),
            total_latency_fs: stats.register("dram", core.get(), "total-access-latency-fs"),
            total_queue_delay_fs: stats.register("dram", core.get(), "total-queueing-delay-fs"),
        }
    }

    fn record(&self, latency: SimTime, queue_delay: SimTime) {
        use std::sync::atomic::Ordering::Relaxed;
        self.num_accesses.fetch_add(1, Relaxed);
        self.total_latency_fs.fetch_add(latency.as_fs(), Relaxed);
        self.total_queue_delay_fs.fetch_add(queue_delay.as_fs(), Relaxed);
    }
}

/// One application core's DRAM controller. Disabled controllers (and
/// requests from non-application cores) return zero latency and record no
/// statistics, per spec §4.2.
pub struct DramController {
    enabled: bool,
    app_core_count: u32,
    bandwidth: Bandwidth,
    queue_model: Option<Box<dyn QueueModel>>,
    kind: Kind,
    counters: Counters,
}

enum Kind {
    Constant { access_cost: SimTime },
    ReadWrite { read_cost: SimTime, write_cost: SimTime },
    Normal { normal: Normal<f64>, rng: rand::rngs::StdRng },
}

impl DramController {
    /// Builds a controller for `core` from `config`, registering its
    /// counters with `stats`. `app_core_count` is the application-core
    /// population; requests from cores at or above it are treated as
    /// non-application and always return zero latency.
    ///
    /// # Panics
    ///
    /// Never panics; an invalid `stddev` simply yields a degenerate normal
    /// distribution sampled at its mean.
    #[must_use]
    pub fn new(core: CoreId, app_core_count: u32, config: &DramConfig, stats: &StatsRegistry) -> Self {
        let bandwidth = Bandwidth::from_bytes_per_ns(config.per_controller_bandwidth);
        let kind = match config.kind {
            DramModelKind::Constant => Kind::Constant {
                access_cost: SimTime::from_fs((config.latency_ns * 1_000_000.0) as u64),
            },
            DramModelKind::ReadWrite => Kind::ReadWrite {
                read_cost: SimTime::from_fs((config.read_latency_ns * 1_000_000.0) as u64),
                write_cost: SimTime::from_fs((config.write_latency_ns * 1_000_000.0) as u64),
            },
            DramModelKind::Normal => Kind::Normal {
                normal: Normal::new(config.normal_mean_ns, config.normal_stddev_ns.max(0.0))
                    .unwrap_or_else(|_| Normal::new(config.normal_mean_ns, 1.0).expect("fallback normal is valid")),
                rng: rand::rngs::StdRng::seed_from_u64(config.normal_seed ^ u64::from(core.get())),
            },
        };
        Self {
            enabled: true,
            app_core_count,
            bandwidth,
            queue_model: queue::build(&config.queue_model),
            kind,
            counters: Counters::register(stats, core),
        }
    }

    /// Disables the controller: every subsequent access is free.
    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// Re-enables the controller.
    pub fn enable(&mut self) {
        self.enabled = true;
    }

    fn access_cost(&mut self, kind: AccessKind) -> SimTime {
        match &mut self.kind {
            Kind::Constant { access_cost } => *access_cost,
            Kind::ReadWrite { read_cost, write_cost } => match kind {
                AccessKind::Read => *read_cost,
                AccessKind::Write => *write_cost,
            },
            Kind::Normal { normal, rng } => {
                let ns = normal.sample(rng).max(0.0);
                SimTime::from_fs((ns * 1_000_000.0) as u64)
            }
        }
    }

    /// Computes the access latency for a request of `size_bytes` arriving
    /// at `arrive` from `requester`, per the five-step algorithm in spec
    /// §4.2. Updates `perf` with the `DRAM_QUEUE`/`DRAM_BUS`/`DRAM_DEVICE`
    /// timestamps and this controller's statistics as a side effect.
    pub fn access_latency(
        &mut self,
        arrive: SimTime,
        size_bytes: u64,
        requester: CoreId,
        _address: u64,
        kind: AccessKind,
        perf: &mut ShmemPerfBreakdown,
    ) -> SimTime {
        if !self.enabled || requester.get() >= self.app_core_count {
            return SimTime::ZERO;
        }

        let processing = self.bandwidth.round_latency(8.0 * size_bytes as f64);
        let queue_delay = self
            .queue_model
            .as_mut()
            .map_or(SimTime::ZERO, |q| q.compute_delay(arrive, processing, requester));
        let access_cost = self.access_cost(kind);
        let latency = queue_delay + processing + access_cost;

        perf.update_time(arrive, None);
        perf.update_time(arrive + queue_delay, Some(Phase::DramQueue));
        perf.update_time(arrive + queue_delay + processing, Some(Phase::DramBus));
        perf.update_time(arrive + queue_delay + processing + access_cost, Some(Phase::DramDevice));

        self.counters.record(latency, queue_delay);
        latency
    }
}

/// Marker trait implemented by components that own `DRAM`/`DRAM_DIR` state,
/// used to type-check routing destinations in [`crate::memory`].
pub const OWNING_COMPONENT: MemComponent = MemComponent::Dram;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueModelConfig;

    fn test_config() -> DramConfig {
        DramConfig {
            kind: DramModelKind::Constant,
            per_controller_bandwidth: 8.0, // bytes/ns == 8 GB/s
            latency_ns: 50.0,
            queue_model: QueueModelConfig {
                enabled: false,
                ..QueueModelConfig::default()
            },
            ..DramConfig::default()
        }
    }

    #[test]
    fn disabled_model_is_free_and_untracked() {
        let stats = StatsRegistry::new();
        let mut dram = DramController::new(CoreId::new(0), 4, &test_config(), &stats);
        dram.disable();
        let mut perf = ShmemPerfBreakdown::new();
        let latency = dram.access_latency(
            SimTime::from_ns(10),
            64,
            CoreId::new(0),
            0,
            AccessKind::Read,
            &mut perf,
        );
        assert_eq!(latency, SimTime::ZERO);
        assert!(perf.entries().is_empty());
    }

    #[test]
    fn enabled_no_queue_matches_spec_scenario_2() {
        let stats = StatsRegistry::new();
        let mut dram = DramController::new(CoreId::new(0), 4, &test_config(), &stats);
        let mut perf = ShmemPerfBreakdown::new();
        let arrive = SimTime::from_ns(1000);
        let latency = dram.access_latency(arrive, 64, CoreId::new(0), 0, AccessKind::Read, &mut perf);
        // processing = 8*64 bits / (8 bytes/ns in bits/fs) = 512 bits / 0.064 bits/fs = 8000 fs = 8 ns
        assert_eq!(latency, SimTime::from_ns(58));
        assert_eq!(perf.entries().len(), 4);
        assert_eq!(perf.entries()[0].0, arrive);
        assert_eq!(perf.entries()[3].0, arrive + SimTime::from_ns(58));
    }

    #[test]
    fn non_application_core_requester_is_free() {
        let stats = StatsRegistry::new();
        let mut dram = DramController::new(CoreId::new(5), 4, &test_config(), &stats);
        let mut perf = ShmemPerfBreakdown::new();
        let latency = dram.access_latency(
            SimTime::from_ns(10),
            64,
            CoreId::new(10),
            0,
            AccessKind::Read,
            &mut perf,
        );
        assert_eq!(latency, SimTime::ZERO);
    }

    #[test]
    fn readwrite_dispatches_by_kind() {
        let cfg = DramConfig {
            kind: DramModelKind::ReadWrite,
            read_latency_ns: 40.0,
            write_latency_ns: 60.0,
            per_controller_bandwidth: 1e9, // effectively free transfer time
            queue_model: QueueModelConfig {
                enabled: false,
                ..QueueModelConfig::default()
            },
            ..DramConfig::default()
        };
        let stats = StatsRegistry::new();
        let mut dram = DramController::new(CoreId::new(0), 4, &cfg, &stats);
        let mut perf = ShmemPerfBreakdown::new();
        let read = dram.access_latency(SimTime::ZERO, 64, CoreId::new(0), 0, AccessKind::Read, &mut perf);
        let write = dram.access_latency(SimTime::ZERO, 64, CoreId::new(0), 0, AccessKind::Write, &mut perf);
        assert!(write > read);
    }

    #[test]
    fn shmem_perf_breakdown_rejects_non_monotone_updates() {
        let mut perf = ShmemPerfBreakdown::new();
        perf.update_time(SimTime::from_ns(10), None);
        perf.update_time(SimTime::from_ns(5), Some(Phase::DramQueue));
        assert_eq!(perf.entries().len(), 1);
    }

    #[test]
    fn total_latency_equals_sum_of_returned_latencies() {
        let stats = StatsRegistry::new();
        let mut dram = DramController::new(CoreId::new(0), 4, &test_config(), &stats);
        let mut perf = ShmemPerfBreakdown::new();
        let mut sum = SimTime::ZERO;
        for ns in [0, 10, 20] {
            sum += dram.access_latency(SimTime::from_ns(ns), 64, CoreId::new(0), 0, AccessKind::Read, &mut perf);
        }
        let mut buf = Vec::new();
        stats.dump("sim", &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let total_line = text
            .lines()
            .find(|l| l.contains("total-access-latency-fs"))
            .unwrap();
        let reported: u64 = total_line.split(' ').last().unwrap().parse().unwrap();
        assert_eq!(reported, sum.as_fs());
    }
}
