//! The DRAM directory: per-line cross-core coherence state and the MSI
//! protocol handlers that keep it consistent.
//!
//! Grounded on spec §3's `DirectoryEntry` invariants and §4's "Memory
//! subsystem / coherence (DRAM-directory MSI)" component; the directory is
//! addressed by physical line address and issues [`ShmemMessage`] replies
//! and side-effect messages (invalidations, flush requests) the caller
//! routes on the memory network.

use std::collections::HashMap;

use crate::common::{CoreId, Error, Result};
use crate::net::message::ShmemMessage;

/// A directory entry's coherence state, independent of any individual
/// cache's private [`crate::memory::cache::CacheState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirectoryState {
    /// No core holds a copy.
    #[default]
    Uncached,
    /// One or more cores hold a read-only copy.
    Shared,
    /// Exactly one core holds a writable copy.
    Exclusive,
}

/// One line's cross-core coherence bookkeeping. `sharers` is a bitmap over
/// `CoreId` (bit `i` set means core `i` holds a copy), distinct from
/// [`crate::memory::cache::CacheBlockInfo::add_sharer`]'s intra-core
/// `MemComponent` bitmap.
#[derive(Debug, Clone, Copy)]
pub struct DirectoryEntry {
    address: u64,
    state: DirectoryState,
    owner: Option<CoreId>,
    sharers: u32,
}

impl DirectoryEntry {
    /// A freshly allocated, uncached entry for `address`.
    #[must_use]
    pub const fn uncached(address: u64) -> Self {
        Self {
            address,
            state: DirectoryState::Uncached,
            owner: None,
            sharers: 0,
        }
    }

    /// The line address this entry describes.
    #[must_use]
    pub const fn address(&self) -> u64 {
        self.address
    }

    /// The current coherence state.
    #[must_use]
    pub const fn state(&self) -> DirectoryState {
        self.state
    }

    /// The exclusive owner, if any.
    #[must_use]
    pub const fn owner(&self) -> Option<CoreId> {
        self.owner
    }

    /// Whether `core` is in the sharer set.
    #[must_use]
    pub const fn is_sharer(&self, core: CoreId) -> bool {
        self.sharers & (1 << core.get()) != 0
    }

    /// The sharer set as an iterator of core indices present in the bitmap,
    /// up to the 32-core bitmap limit (spec §3's `MemComponent::MAX < 32`
    /// constraint applies identically here: at most 32 cores share a line
    /// before this bitmap representation would need widening).
    pub fn sharers(&self) -> impl Iterator<Item = CoreId> + '_ {
        (0..32u32).filter(|&i| self.sharers & (1 << i) != 0).map(CoreId::new)
    }

    fn add_sharer(&mut self, core: CoreId) {
        self.sharers |= 1 << core.get();
    }

    fn clear_sharers(&mut self) {
        self.sharers = 0;
    }

    /// Checks the three invariants from spec §3:
    /// `Exclusive ⇒ |sharers| = 1 ∧ owner ∈ sharers`;
    /// `Shared ⇒ |sharers| ≥ 1`;
    /// `Uncached ⇒ sharers = ∅`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if any invariant is broken.
    pub fn validate(&self) -> Result<()> {
        let count = self.sharers.count_ones();
        match self.state {
            DirectoryState::Exclusive => {
                let owner_is_sharer = self.owner.is_some_and(|o| self.is_sharer(o));
                if count == 1 && owner_is_sharer {
                    Ok(())
                } else {
                    Err(Error::InvariantViolation(format!(
                        "directory entry {:#x}: exclusive with {count} sharers, owner={:?}",
                        self.address, self.owner
                    )))
                }
            }
            DirectoryState::Shared => {
                if count >= 1 {
                    Ok(())
                } else {
                    Err(Error::InvariantViolation(format!(
                        "directory entry {:#x}: shared with zero sharers",
                        self.address
                    )))
                }
            }
            DirectoryState::Uncached => {
                if count == 0 {
                    Ok(())
                } else {
                    Err(Error::InvariantViolation(format!(
                        "directory entry {:#x}: uncached with {count} sharers",
                        self.address
                    )))
                }
            }
        }
    }
}

/// The DRAM directory: a map of line address to [`DirectoryEntry`], plus
/// the MSI protocol handlers that keep every entry's invariants intact.
///
/// Every handler validates the resulting entry before returning, per spec
/// §8 ("for all directory states, the three invariants of §3 hold after
/// every handled message") — a broken invariant is a programming error in
/// this module, surfaced as [`Error::InvariantViolation`] rather than
/// silently tolerated.
#[derive(Debug, Default)]
pub struct Directory {
    entries: HashMap<u64, DirectoryEntry>,
}

impl Directory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the entry for `address`, allocating an uncached one if this
    /// is the first reference.
    fn entry_mut(&mut self, address: u64) -> &mut DirectoryEntry {
        self.entries
            .entry(address)
            .or_insert_with(|| DirectoryEntry::uncached(address))
    }

    /// Looks up the current entry for `address`, if one has ever been
    /// allocated.
    #[must_use]
    pub fn entry(&self, address: u64) -> Option<&DirectoryEntry> {
        self.entries.get(&address)
    }

    /// Handles a shared-read request from `requester`, returning the
    /// `ReadRep` to send back plus any side-effect messages, each tagged
    /// with the core it must be routed to (a `FlushReq` to a prior
    /// exclusive owner being downgraded to `Shared`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if the resulting entry would
    /// violate spec §3's directory invariants.
    pub fn handle_read_request(
        &mut self,
        address: u64,
        requester: CoreId,
    ) -> Result<(ShmemMessage, Vec<(CoreId, ShmemMessage)>)> {
        let entry = self.entry_mut(address);
        let (reply, side_effects) = match entry.state {
            DirectoryState::Uncached => {
                entry.state = DirectoryState::Shared;
                entry.add_sharer(requester);
                (ShmemMessage::ReadRep { address, dirty: false }, Vec::new())
            }
            DirectoryState::Shared => {
                entry.add_sharer(requester);
                (ShmemMessage::ReadRep { address, dirty: false }, Vec::new())
            }
            DirectoryState::Exclusive if entry.owner == Some(requester) => {
                (ShmemMessage::ReadRep { address, dirty: true }, Vec::new())
            }
            DirectoryState::Exclusive => {
                let owner = entry.owner.expect("exclusive entry always has an owner");
                entry.state = DirectoryState::Shared;
                entry.add_sharer(requester);
                (
                    ShmemMessage::ReadRep { address, dirty: true },
                    vec![(owner, ShmemMessage::FlushReq { address })],
                )
            }
        };
        entry.validate()?;
        Ok((reply, side_effects))
    }

    /// Handles an exclusive-write request from `requester`: every other
    /// sharer is invalidated, `requester` becomes the sole owner. Returns
    /// the `WriteRep` plus one `(core, InvReq)` per invalidated sharer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if the resulting entry would
    /// violate spec §3's directory invariants.
    pub fn handle_write_request(
        &mut self,
        address: u64,
        requester: CoreId,
    ) -> Result<(ShmemMessage, Vec<(CoreId, ShmemMessage)>)> {
        let entry = self.entry_mut(address);
        let invalidations: Vec<(CoreId, ShmemMessage)> = entry
            .sharers()
            .filter(|&core| core != requester)
            .map(|core| (core, ShmemMessage::InvReq { address }))
            .collect();

        entry.clear_sharers();
        entry.add_sharer(requester);
        entry.state = DirectoryState::Exclusive;
        entry.owner = Some(requester);
        entry.validate()?;

        Ok((ShmemMessage::WriteRep { address }, invalidations))
    }

    /// Handles an invalidation acknowledgment from a former sharer,
    /// removing it from the entry's sharer set. If this drains the last
    /// sharer the entry reverts to `Uncached`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if the resulting entry would
    /// violate spec §3's directory invariants.
    pub fn handle_inv_rep(&mut self, address: u64, core: CoreId) -> Result<()> {
        let entry = self.entry_mut(address);
        entry.sharers &= !(1 << core.get());
        if entry.sharers == 0 {
            entry.state = DirectoryState::Uncached;
            entry.owner = None;
        }
        entry.validate()
    }

    /// Handles a flush reply from a downgraded former exclusive owner: the
    /// dirty bit travels with the reply so a future full cache model can
    /// write the data back, but the directory's own bookkeeping (owner
    /// already cleared by [`Self::handle_read_request`]'s downgrade) needs
    /// no further change here beyond validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvariantViolation`] if the entry's invariants do
    /// not hold.
    pub fn handle_flush_rep(&self, address: u64) -> Result<()> {
        match self.entries.get(&address) {
            Some(entry) => entry.validate(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_read_transitions_uncached_to_shared() {
        let mut dir = Directory::new();
        let (reply, side_effects) = dir.handle_read_request(0x100, CoreId::new(0)).unwrap();
        assert!(matches!(reply, ShmemMessage::ReadRep { dirty: false, .. }));
        assert!(side_effects.is_empty());
        assert_eq!(dir.entry(0x100).unwrap().state(), DirectoryState::Shared);
    }

    #[test]
    fn second_reader_joins_sharer_set() {
        let mut dir = Directory::new();
        dir.handle_read_request(0x100, CoreId::new(0)).unwrap();
        dir.handle_read_request(0x100, CoreId::new(1)).unwrap();
        let entry = dir.entry(0x100).unwrap();
        assert!(entry.is_sharer(CoreId::new(0)));
        assert!(entry.is_sharer(CoreId::new(1)));
    }

    #[test]
    fn write_request_invalidates_other_sharers_and_goes_exclusive() {
        let mut dir = Directory::new();
        dir.handle_read_request(0x100, CoreId::new(0)).unwrap();
        dir.handle_read_request(0x100, CoreId::new(1)).unwrap();
        let (reply, invalidations) = dir.handle_write_request(0x100, CoreId::new(2)).unwrap();
        assert!(matches!(reply, ShmemMessage::WriteRep { .. }));
        assert_eq!(invalidations.len(), 2);
        let entry = dir.entry(0x100).unwrap();
        assert_eq!(entry.state(), DirectoryState::Exclusive);
        assert_eq!(entry.owner(), Some(CoreId::new(2)));
    }

    #[test]
    fn read_from_exclusive_owner_does_not_downgrade() {
        let mut dir = Directory::new();
        dir.handle_write_request(0x100, CoreId::new(0)).unwrap();
        let (reply, side_effects) = dir.handle_read_request(0x100, CoreId::new(0)).unwrap();
        assert!(matches!(reply, ShmemMessage::ReadRep { dirty: true, .. }));
        assert!(side_effects.is_empty());
        assert_eq!(dir.entry(0x100).unwrap().state(), DirectoryState::Exclusive);
    }

    #[test]
    fn read_from_non_owner_downgrades_exclusive_to_shared() {
        let mut dir = Directory::new();
        dir.handle_write_request(0x100, CoreId::new(0)).unwrap();
        let (reply, side_effects) = dir.handle_read_request(0x100, CoreId::new(1)).unwrap();
        assert!(matches!(reply, ShmemMessage::ReadRep { dirty: true, .. }));
        assert_eq!(side_effects.len(), 1);
        let entry = dir.entry(0x100).unwrap();
        assert_eq!(entry.state(), DirectoryState::Shared);
        assert!(entry.is_sharer(CoreId::new(0)));
        assert!(entry.is_sharer(CoreId::new(1)));
    }

    #[test]
    fn last_invalidation_ack_reverts_to_uncached() {
        let mut dir = Directory::new();
        dir.handle_write_request(0x100, CoreId::new(0)).unwrap();
        dir.handle_inv_rep(0x100, CoreId::new(0)).unwrap();
        let entry = dir.entry(0x100).unwrap();
        assert_eq!(entry.state(), DirectoryState::Uncached);
        assert_eq!(entry.owner(), None);
    }

    #[test]
    fn fresh_entry_defaults_are_invariant_clean() {
        let entry = DirectoryEntry::uncached(0x42);
        assert!(entry.validate().is_ok());
    }
}
