//! Integrates the per-core private caches, the shared DRAM directory, and
//! the per-core DRAM controllers behind one read/write entry point, routing
//! any resulting invalidation/flush traffic over the modeled memory
//! network as it goes.
//!
//! Grounded on spec §4's "Memory subsystem / coherence" component: the
//! state-machine correctness lives in [`super::directory`] and
//! [`super::cache`] (both already tested against spec §3's invariants);
//! this module is the integration glue `sim::Simulator` needs to drive a
//! read or write through them. One private [`Cache`] and one
//! [`DramController`] per application core; a single [`Directory`] plays
//! the role of the DRAM-side home directory, which this crate's directory
//! type (deliberately) does not attach to any particular `CoreId` — only
//! the invalidation/flush side effects it produces have a real
//! destination core, so only those are routed on [`Channel::Memory1`].
//! The requester-to-directory round trip itself is treated as already
//! folded into the DRAM controller's access-cost terms, the simpler of
//! the two ways to account for it (see `DESIGN.md`).

use std::collections::HashMap;

use crate::common::error::{Error, Result};
use crate::common::{CoreId, SimTime, Topology};
use crate::config::Config;
use crate::dram::{AccessKind, DramController, ShmemPerfBreakdown};
use crate::memory::cache::{Cache, CacheState};
use crate::memory::directory::Directory;
use crate::net::message::{Payload, ShmemMessage};
use crate::net::{Channel, NetPacket, Network};
use crate::perf_model::DynamicInstructionInfo;
use crate::stats::StatsRegistry;

/// The outcome of routing one memory access through the subsystem: the
/// total latency to add to the requesting core's elapsed time, and the
/// [`DynamicInstructionInfo`] its performance model should be fed so a
/// parked `String` instruction can retire.
#[derive(Debug, Clone, Copy)]
pub struct AccessOutcome {
    /// Total added latency, folding in coherence-side-effect network
    /// transit and the DRAM access cost.
    pub latency: SimTime,
    /// The record to push onto the requester's dyn-info queue.
    pub info: DynamicInstructionInfo,
}

/// Owns every application core's private cache and DRAM controller plus
/// the one shared directory, and exposes read/write as a single call.
pub struct MemorySubsystem {
    directory: Directory,
    caches: HashMap<CoreId, Cache>,
    dram: HashMap<CoreId, DramController>,
}

impl MemorySubsystem {
    /// Builds a subsystem for every application core in `topology`, sizing
    /// each private cache from `config.perf_model.l1_dcache` and each DRAM
    /// controller from `config.perf_model.dram`.
    #[must_use]
    pub fn new(topology: Topology, config: &Config, stats: &StatsRegistry) -> Self {
        let mut caches = HashMap::new();
        let mut dram = HashMap::new();
        let cache_cfg = &config.perf_model.l1_dcache;
        for i in 0..topology.app_cores() {
            let core = CoreId::new(i);
            caches.insert(
                core,
                Cache::new(cache_cfg.sets, cache_cfg.ways, cache_cfg.line_bytes, cache_cfg.policy),
            );
            dram.insert(
                core,
                DramController::new(core, topology.app_cores(), &config.perf_model.dram, stats),
            );
        }
        Self {
            directory: Directory::new(),
            caches,
            dram,
        }
    }

    fn cache_for(&mut self, core: CoreId) -> Result<&mut Cache> {
        self.caches
            .get_mut(&core)
            .ok_or_else(|| Error::InvariantViolation(format!("no private cache configured for core {core}")))
    }

    fn dram_for(&mut self, core: CoreId) -> Result<&mut DramController> {
        self.dram
            .get_mut(&core)
            .ok_or_else(|| Error::InvariantViolation(format!("no DRAM controller configured for core {core}")))
    }

    fn route_side_effects(
        &self,
        network: &Network,
        core: CoreId,
        arrive: SimTime,
        size_bytes: u64,
        side_effects: Vec<(CoreId, ShmemMessage)>,
    ) -> SimTime {
        let mut max_extra = SimTime::ZERO;
        for (dest, message) in side_effects {
            let payload = Payload::Shmem(message);
            let packet = NetPacket {
                sender: core,
                receiver: dest,
                time: arrive,
                length: u32::try_from(size_bytes).unwrap_or(u32::MAX),
                payload,
            };
            let arrival = network.send(Channel::Memory1, packet);
            max_extra = max_extra.max(arrival.saturating_sub(arrive));
        }
        max_extra
    }

    /// Services a `size_bytes` read by `core` at address `address`,
    /// arriving at simulated time `arrive`. A private-cache hit costs
    /// nothing further; a miss consults the directory (routing any
    /// resulting invalidation/flush over `network`), then the requester's
    /// DRAM controller, then installs the line `Shared`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if `core` has no configured
    /// cache/controller (not an application core) or if the directory
    /// transition would violate spec §3's invariants.
    pub fn read(&mut self, network: &Network, core: CoreId, address: u64, size_bytes: u64, arrive: SimTime) -> Result<AccessOutcome> {
        if self.cache_for(core)?.lookup(address).is_some() {
            return Ok(AccessOutcome {
                latency: SimTime::ZERO,
                info: DynamicInstructionInfo::MemoryRead { address, latency: SimTime::ZERO },
            });
        }

        let (reply, side_effects) = self.directory.handle_read_request(address, core)?;
        let side_effect_latency = self.route_side_effects(network, core, arrive, size_bytes, side_effects);

        let mut perf = ShmemPerfBreakdown::new();
        let dram_latency = self.dram_for(core)?.access_latency(arrive, size_bytes, core, address, AccessKind::Read, &mut perf);
        let latency = side_effect_latency + dram_latency;

        // A dirty reply means some other core's Modified copy was flushed to DRAM as
        // part of satisfying this read; either way the requester ends up Shared.
        let _ = reply;
        self.cache_for(core)?.install(address, CacheState::Shared);

        Ok(AccessOutcome {
            latency,
            info: DynamicInstructionInfo::MemoryRead { address, latency },
        })
    }

    /// Services a `size_bytes` write by `core` at address `address`,
    /// arriving at simulated time `arrive`. Goes exclusive in the
    /// directory, invalidating every other sharer (routed over `network`),
    /// then installs the line `Modified` and dirty in the requester's
    /// private cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if `core` has no configured
    /// cache/controller or if the directory transition would violate spec
    /// §3's invariants.
    pub fn write(&mut self, network: &Network, core: CoreId, address: u64, size_bytes: u64, arrive: SimTime) -> Result<AccessOutcome> {
        let already_exclusive = self
            .cache_for(core)?
            .lookup(address)
            .is_some_and(|block| block.state() == CacheState::Modified);

        let (_reply, invalidations) = self.directory.handle_write_request(address, core)?;
        let side_effect_latency = self.route_side_effects(network, core, arrive, size_bytes, invalidations);

        let mut perf = ShmemPerfBreakdown::new();
        let dram_latency = if already_exclusive {
            SimTime::ZERO
        } else {
            self.dram_for(core)?.access_latency(arrive, size_bytes, core, address, AccessKind::Write, &mut perf)
        };
        let latency = side_effect_latency + dram_latency;

        let cache = self.cache_for(core)?;
        if let Some(block) = cache.lookup(address) {
            block.set_state(CacheState::Modified);
            block.mark_dirty();
        } else {
            let evicted = cache.install(address, CacheState::Modified);
            if let Some(mut evicted) = evicted {
                evicted.mark_dirty();
            }
            if let Some(block) = cache.lookup(address) {
                block.mark_dirty();
            }
        }

        Ok(AccessOutcome {
            latency,
            info: DynamicInstructionInfo::MemoryWrite { address, latency },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn subsystem() -> (MemorySubsystem, Network, StatsRegistry) {
        let config = Config::default();
        let topology = Topology::new(4, 0, 2);
        let stats = StatsRegistry::new();
        let network = Network::new(&config.network, topology);
        (MemorySubsystem::new(topology, &config, &stats), network, stats)
    }

    #[test]
    fn first_read_misses_and_installs_the_line() {
        let (mut mem, net, _stats) = subsystem();
        let outcome = mem.read(&net, CoreId::new(0), 0x1000, 64, SimTime::from_ns(10)).unwrap();
        assert!(outcome.latency > SimTime::ZERO, "a cold miss pays DRAM latency");
    }

    #[test]
    fn second_read_of_same_line_is_a_free_hit() {
        let (mut mem, net, _stats) = subsystem();
        mem.read(&net, CoreId::new(0), 0x1000, 64, SimTime::from_ns(10)).unwrap();
        let outcome = mem.read(&net, CoreId::new(0), 0x1000, 64, SimTime::from_ns(20)).unwrap();
        assert_eq!(outcome.latency, SimTime::ZERO);
    }

    #[test]
    fn write_invalidates_other_sharers_and_goes_exclusive() {
        let (mut mem, net, _stats) = subsystem();
        mem.read(&net, CoreId::new(0), 0x2000, 64, SimTime::from_ns(0)).unwrap();
        mem.read(&net, CoreId::new(1), 0x2000, 64, SimTime::from_ns(0)).unwrap();
        let outcome = mem.write(&net, CoreId::new(2), 0x2000, 64, SimTime::from_ns(30)).unwrap();
        assert!(outcome.latency > SimTime::ZERO);
    }

    #[test]
    fn unconfigured_core_is_an_invariant_violation() {
        let (mut mem, net, _stats) = subsystem();
        let err = mem.read(&net, CoreId::new(99), 0x1000, 64, SimTime::ZERO).unwrap_err();
        assert!(err.is_fatal());
    }
}
