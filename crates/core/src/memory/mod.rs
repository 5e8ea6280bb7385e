//! The memory subsystem: per-core private caches, the DRAM directory, and
//! the coherence messages that flow between them on the memory network.
//!
//! Grounded on spec §3/§4's "Memory subsystem / coherence (DRAM-directory
//! MSI)" component. [`cache`] models private per-line state; [`directory`]
//! models the cross-core MSI protocol; [`policies`] supplies the
//! replacement policies each cache level is configured with; [`subsystem`]
//! wires all three together with the per-core DRAM controllers and the
//! memory network into the single read/write entry point a core's driver
//! loop calls.

pub mod cache;
pub mod directory;
pub mod policies;
pub mod subsystem;

pub use cache::{Cache, CacheBlockInfo, CacheState};
pub use directory::{Directory, DirectoryEntry, DirectoryState};
pub use policies::{PolicyKind, ReplacementPolicy};
pub use subsystem::{AccessOutcome, MemorySubsystem};
