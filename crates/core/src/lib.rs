//! Timing-accurate multicore architectural simulator engine.
//!
//! This crate implements a trace-driven multicore architectural simulator
//! with the following:
//! 1. **Common:** fixed-point simulated time, DVFS frequency domains, dense
//!    core/thread/process identifiers, and the crate-wide error type.
//! 2. **Config:** a hierarchical `.cfg` configuration store with a typed,
//!    validated [`Config`].
//! 3. **Perf model:** per-core dynamic-instruction costing, branch
//!    prediction, and the dyn-info FIFO that bridges instrumentation and
//!    memory latency.
//! 4. **Memory:** private MSI caches, a DRAM-side coherence directory, and
//!    per-core DRAM controllers.
//! 5. **Net:** the on-chip network fabric (analytical and magic routing
//!    models) and the wire message types carried over it.
//! 6. **MCP:** the Master Control Process — syscall emulation,
//!    mutex/cond/barrier/futex synchronization, utilization gossip, the
//!    ROI/MHz magic control plane, and clock-skew minimization.
//! 7. **Sim:** the top-level [`Simulator`] driver, its lifecycle hook
//!    registry, and JSON-Lines trace ingestion.

/// Fixed-point simulated time, DVFS periods, dense ids, topology, and the
/// crate-wide error type.
pub mod common;
/// Hierarchical `.cfg` configuration parsing and typed, validated settings.
pub mod config;
/// DRAM controller performance model.
pub mod dram;
/// The Master Control Process: syscalls, sync primitives, magic, utilization.
pub mod mcp;
/// Private caches, coherence directory, and per-core DRAM controllers.
pub mod memory;
/// On-chip network fabric, routing models, and wire message types.
pub mod net;
/// Per-core dynamic-instruction costing and branch prediction.
pub mod perf_model;
/// Queue-delay models for contended shared resources.
pub mod queue;
/// The top-level driver, lifecycle hooks, and trace ingestion.
pub mod sim;
/// Append-only statistics registry and histograms.
pub mod stats;

/// Crate-wide error type and `Result` alias.
pub use crate::common::{Error, Result};
/// Root configuration type; use `Config::default()` or `Config::load_file`.
pub use crate::config::Config;
/// Top-level simulator; owns every subsystem and replays a trace.
pub use crate::sim::Simulator;
