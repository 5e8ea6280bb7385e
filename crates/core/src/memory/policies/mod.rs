//! Cache replacement policies for set-associative private and shared
//! caches.
//!
//! Implements various algorithms for selecting victim lines in
//! set-associative caches. Kept verbatim from the cache hierarchy this
//! engine's line-level bookkeeping is adapted from; only the cache and
//! directory layers above them change to model coherence state instead of
//! data contents.
//!
//! # Policies
//!
//! - `Fifo`: First-In, First-Out.
//! - `Lru`: Least Recently Used.
//! - `Mru`: Most Recently Used.
//! - `Plru`: Pseudo-LRU (tree-based).
//! - `Random`: Random selection.

/// First-In, First-Out replacement policy.
pub mod fifo;

/// Least Recently Used replacement policy.
pub mod lru;

/// Most Recently Used replacement policy.
pub mod mru;

/// Pseudo-LRU (tree-based) replacement policy.
pub mod plru;

/// Random replacement policy.
pub mod random;

pub use fifo::FifoPolicy;
pub use lru::LruPolicy;
pub use mru::MruPolicy;
pub use plru::PlruPolicy;
pub use random::RandomPolicy;

/// Trait for cache replacement policies.
///
/// Defines the interface for updating usage state and selecting victim
/// lines.
pub trait ReplacementPolicy: Send + Sync {
    /// Updates the policy state when a line is accessed.
    fn update(&mut self, set: usize, way: usize);

    /// Selects a victim line to evict from a specific set.
    fn get_victim(&mut self, set: usize) -> usize;
}

/// Which [`ReplacementPolicy`] a cache level was configured to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyKind {
    /// First-In, First-Out.
    Fifo,
    /// Least Recently Used.
    #[default]
    Lru,
    /// Most Recently Used.
    Mru,
    /// Tree-based pseudo-LRU.
    Plru,
    /// Uniform random victim selection.
    Random,
}

/// Builds the configured policy for a cache with `sets` sets and `ways`
/// ways per set.
#[must_use]
pub fn build(kind: PolicyKind, sets: usize, ways: usize) -> Box<dyn ReplacementPolicy> {
    match kind {
        PolicyKind::Fifo => Box::new(FifoPolicy::new(sets, ways)),
        PolicyKind::Lru => Box::new(LruPolicy::new(sets, ways)),
        PolicyKind::Mru => Box::new(MruPolicy::new(sets, ways)),
        PolicyKind::Plru => Box::new(PlruPolicy::new(sets, ways)),
        PolicyKind::Random => Box::new(RandomPolicy::new(sets, ways)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_policy_returns_a_victim_within_ways() {
        for kind in [
            PolicyKind::Fifo,
            PolicyKind::Lru,
            PolicyKind::Mru,
            PolicyKind::Plru,
            PolicyKind::Random,
        ] {
            let mut policy = build(kind, 4, 8);
            for set in 0..4 {
                let victim = policy.get_victim(set);
                assert!(victim < 8, "{kind:?} produced out-of-range victim {victim}");
                policy.update(set, victim);
            }
        }
    }
}
