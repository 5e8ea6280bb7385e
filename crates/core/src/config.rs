//! Configuration system for the simulation engine.
//!
//! Two layers, mirroring the teacher's `config.rs` split between raw storage
//! and typed accessors:
//!
//! 1. [`RawConfig`]: a hierarchical dotted-key store parsed from a
//!    `.cfg`-style text format (`[section]` headers, `key = value` lines),
//!    matching `carbon_sim.cfg` in the original source. Typed accessors
//!    (`get_int`, `get_float`, `get_bool`, `get_string`) mirror
//!    `Sim()->getCfg()->getInt(...)`.
//! 2. [`Config`]: the structured view the rest of the engine consumes,
//!    built from a `RawConfig` with defaults filled in from the `defaults`
//!    module and required keys validated.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use crate::common::error::{Error, Result};
use crate::memory::policies::PolicyKind;

/// Default configuration constants, used when a `.cfg` key is absent.
///
/// These are not arbitrary: each mirrors a bracketed default in spec §6
/// (`general/magic [false]`, `.../max_list_size [100]`, etc.) or a typical
/// value from the original `carbon_sim.cfg`.
pub mod defaults {
    /// Default application core count.
    pub const TOTAL_CORES: u32 = 16;
    /// Default process count (thread-spawner cores).
    pub const NUM_PROCESSES: u32 = 1;
    /// Default output directory, relative to the working directory.
    pub const OUTPUT_DIR: &str = ".";
    /// Default statistics file name.
    pub const OUTPUT_FILE: &str = "sim.stats";

    /// Default per-controller DRAM bandwidth, bytes/ns.
    pub const DRAM_BANDWIDTH_BYTES_PER_NS: f64 = 8.0;
    /// Default fixed DRAM access latency, ns.
    pub const DRAM_LATENCY_NS: f64 = 45.0;
    /// Default bounded history-list window.
    pub const QUEUE_HISTORY_MAX_LIST_SIZE: usize = 100;
    /// Default stddev for the `normal` DRAM access-time distribution, ns.
    pub const DRAM_NORMAL_STDDEV_NS: f64 = 5.0;

    /// Default branch mispredict penalty, cycles.
    pub const MISPREDICT_PENALTY_CYCLES: u64 = 10;
    /// Default one-bit predictor table size (entries).
    pub const BRANCH_PREDICTOR_SIZE: usize = 1024;

    /// Default wire cycles per hop (`Tw2`).
    pub const ANALYTICAL_TW2: f64 = 1.0;
    /// Default switching cycles (`s`).
    pub const ANALYTICAL_S: f64 = 1.0;
    /// Default mesh dimensionality (`n`).
    pub const ANALYTICAL_N: u32 = 2;
    /// Default channel width, bits (`W`).
    pub const ANALYTICAL_W: u32 = 32;
    /// Default utilization-gossip interval, ns.
    pub const ANALYTICAL_UPDATE_INTERVAL_NS: u64 = 1000;
    /// Default per-hop processing cost for user networks, ns (zero for memory networks).
    pub const ANALYTICAL_PROCESSING_COST_NS: u64 = 0;

    /// Default core clock, MHz.
    pub const CORE_MHZ: u32 = 1000;

    /// Default `lax` clock-skew scheme slack, ns.
    pub const CLOCK_SKEW_LAX_SLACK_NS: u64 = 1000;

    /// Default private L1 data cache set count.
    pub const L1_DCACHE_SETS: usize = 64;
    /// Default private L1 data cache associativity.
    pub const L1_DCACHE_WAYS: usize = 4;
    /// Default private L1 data cache line size, bytes.
    pub const L1_DCACHE_LINE_BYTES: usize = 64;
}

/// Top-level simulation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimMode {
    /// Full-detail multi-process simulation.
    #[default]
    Full,
    /// Single-process, reduced-detail simulation. Incompatible with
    /// `num_processes > 1`.
    Lite,
}

/// DRAM access-cost model variants (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DramModelKind {
    /// Fixed access cost regardless of read/write.
    #[default]
    Constant,
    /// Distinct fixed costs for reads and writes.
    ReadWrite,
    /// Access cost drawn from a normal distribution.
    Normal,
}

/// Queue discipline variants (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueModelKind {
    /// No queueing delay is ever added.
    #[default]
    None,
    /// Bounded window of recent (start, end) intervals per server.
    HistoryList,
    /// Single `busy_until` watermark.
    Basic,
}

/// Branch predictor variants (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BranchPredictorKind {
    /// No predictor; every branch costs the mispredict penalty... no, costs
    /// nothing extra (no predictor present to be wrong).
    #[default]
    None,
    /// Direct-mapped one-bit table.
    OneBit,
    /// Global-history + BTB predictor in the style of the Pentium M.
    PentiumM,
}

/// Per-network routing model (only `Analytical` has a detailed contract;
/// `Magic` is zero-latency pass-through, used for networks the spec treats
/// as out of scope for timing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NetworkModelKind {
    /// Zero-latency delivery; used for debug/no-timing configurations.
    Magic,
    /// The analytical k-ary n-cube model (spec §4.3).
    #[default]
    Analytical,
}

/// Root configuration, the structured view the engine consumes.
#[derive(Debug, Clone)]
pub struct Config {
    /// `general/*`.
    pub general: GeneralConfig,
    /// `perf_model/*`.
    pub perf_model: PerfModelConfig,
    /// `network/*`.
    pub network: NetworkConfig,
    /// `osemu/*`.
    pub osemu: OsEmuConfig,
    /// `clock_skew_minimization/*`.
    pub clock_skew_minimization: ClockSkewConfig,
}

/// `general/*` settings.
#[derive(Debug, Clone)]
pub struct GeneralConfig {
    /// Number of application cores, `A`.
    pub total_cores: u32,
    /// Number of processes (and thread-spawner cores).
    pub num_processes: u32,
    /// `full` or `lite`.
    pub mode: SimMode,
    /// Whether the memory subsystem participates in coherence at all.
    pub enable_shared_mem: bool,
    /// Directory the statistics file is written under.
    pub output_dir: String,
    /// Statistics file name (ignored in multi-process mode; see §6).
    pub output_file: String,
    /// Whether the magic (ROI/mode-transition) client interface is active.
    pub magic: bool,
    /// Core clock, MHz; the initial `Period` for every application core.
    pub core_mhz: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            total_cores: defaults::TOTAL_CORES,
            num_processes: defaults::NUM_PROCESSES,
            mode: SimMode::default(),
            enable_shared_mem: true,
            output_dir: defaults::OUTPUT_DIR.to_string(),
            output_file: defaults::OUTPUT_FILE.to_string(),
            magic: false,
            core_mhz: defaults::CORE_MHZ,
        }
    }
}

/// `perf_model/*` settings.
#[derive(Debug, Clone, Default)]
pub struct PerfModelConfig {
    /// `perf_model/dram/*`.
    pub dram: DramConfig,
    /// `perf_model/branch_predictor/*`.
    pub branch_predictor: BranchPredictorConfig,
    /// `perf_model/l1_dcache/*`.
    pub l1_dcache: CacheConfig,
}

/// A private cache level's geometry and replacement policy
/// (`perf_model/l1_dcache/*`).
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Number of sets.
    pub sets: usize,
    /// Associativity (ways per set).
    pub ways: usize,
    /// Line size, bytes.
    pub line_bytes: usize,
    /// Replacement policy.
    pub policy: PolicyKind,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sets: defaults::L1_DCACHE_SETS,
            ways: defaults::L1_DCACHE_WAYS,
            line_bytes: defaults::L1_DCACHE_LINE_BYTES,
            policy: PolicyKind::default(),
        }
    }
}

/// `perf_model/dram/*` settings.
#[derive(Debug, Clone)]
pub struct DramConfig {
    /// Access-cost model variant.
    pub kind: DramModelKind,
    /// Per-controller bandwidth, bytes/ns.
    pub per_controller_bandwidth: f64,
    /// Fixed access cost, ns (the `Constant` variant's only cost term; the
    /// `ReadWrite` variant's fallback).
    pub latency_ns: f64,
    /// `ReadWrite` variant: read-specific fixed cost, ns.
    pub read_latency_ns: f64,
    /// `ReadWrite` variant: write-specific fixed cost, ns.
    pub write_latency_ns: f64,
    /// `Normal` variant: mean access cost, ns.
    pub normal_mean_ns: f64,
    /// `Normal` variant: standard deviation, ns.
    pub normal_stddev_ns: f64,
    /// `Normal` variant: RNG seed (deterministic given the seed).
    pub normal_seed: u64,
    /// `perf_model/dram/queue_model/*`.
    pub queue_model: QueueModelConfig,
}

impl Default for DramConfig {
    fn default() -> Self {
        Self {
            kind: DramModelKind::default(),
            per_controller_bandwidth: defaults::DRAM_BANDWIDTH_BYTES_PER_NS,
            latency_ns: defaults::DRAM_LATENCY_NS,
            read_latency_ns: defaults::DRAM_LATENCY_NS,
            write_latency_ns: defaults::DRAM_LATENCY_NS,
            normal_mean_ns: defaults::DRAM_LATENCY_NS,
            normal_stddev_ns: defaults::DRAM_NORMAL_STDDEV_NS,
            normal_seed: 0,
            queue_model: QueueModelConfig::default(),
        }
    }
}

/// `perf_model/dram/queue_model/*` settings.
#[derive(Debug, Clone)]
pub struct QueueModelConfig {
    /// Whether a queue model is consulted at all.
    pub enabled: bool,
    /// Queueing discipline.
    pub kind: QueueModelKind,
    /// `.../history_list/max_list_size`.
    pub history_list_max_size: usize,
}

impl Default for QueueModelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            kind: QueueModelKind::Basic,
            history_list_max_size: defaults::QUEUE_HISTORY_MAX_LIST_SIZE,
        }
    }
}

/// `perf_model/branch_predictor/*` settings.
#[derive(Debug, Clone)]
pub struct BranchPredictorConfig {
    /// Predictor variant.
    pub kind: BranchPredictorKind,
    /// Table size (entries), meaning depends on `kind`.
    pub size: usize,
    /// Mispredict penalty, cycles.
    pub mispredict_penalty: u64,
}

impl Default for BranchPredictorConfig {
    fn default() -> Self {
        Self {
            kind: BranchPredictorKind::default(),
            size: defaults::BRANCH_PREDICTOR_SIZE,
            mispredict_penalty: defaults::MISPREDICT_PENALTY_CYCLES,
        }
    }
}

/// `network/*` settings: five named networks (two user, two memory, one
/// system), each a model selector, plus the shared analytical parameters.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// `network/user_model_1`.
    pub user_model_1: NetworkModelKind,
    /// `network/user_model_2`.
    pub user_model_2: NetworkModelKind,
    /// `network/memory_model_1`.
    pub memory_model_1: NetworkModelKind,
    /// `network/memory_model_2`.
    pub memory_model_2: NetworkModelKind,
    /// `network/system_model`.
    pub system_model: NetworkModelKind,
    /// `network/analytical/*`.
    pub analytical: AnalyticalNetworkConfig,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            user_model_1: NetworkModelKind::Analytical,
            user_model_2: NetworkModelKind::Analytical,
            memory_model_1: NetworkModelKind::Analytical,
            memory_model_2: NetworkModelKind::Analytical,
            system_model: NetworkModelKind::Analytical,
            analytical: AnalyticalNetworkConfig::default(),
        }
    }
}

/// `network/analytical/*` settings (spec §4.3).
#[derive(Debug, Clone)]
pub struct AnalyticalNetworkConfig {
    /// Per-hop wire cycles.
    pub tw2: f64,
    /// Switching cycles.
    pub s: f64,
    /// Mesh dimensionality.
    pub n: u32,
    /// Channel width, bits.
    pub w: u32,
    /// Utilization-gossip interval.
    pub update_interval_ns: u64,
    /// Per-hop processing cost; zero is appropriate for memory networks.
    pub processing_cost_ns: u64,
}

impl Default for AnalyticalNetworkConfig {
    fn default() -> Self {
        Self {
            tw2: defaults::ANALYTICAL_TW2,
            s: defaults::ANALYTICAL_S,
            n: defaults::ANALYTICAL_N,
            w: defaults::ANALYTICAL_W,
            update_interval_ns: defaults::ANALYTICAL_UPDATE_INTERVAL_NS,
            processing_cost_ns: defaults::ANALYTICAL_PROCESSING_COST_NS,
        }
    }
}

/// `osemu/*` settings (syscall-emulation plumbing; see spec §1 non-goals —
/// only the contract with the MCP is modeled here).
#[derive(Debug, Clone)]
pub struct OsEmuConfig {
    /// Whether pthread primitives are redirected through the MCP sync server.
    pub pthread_replace: bool,
    /// Processes to emulate; `0` means auto-detect from `num_processes`.
    pub nprocs: u32,
}

impl Default for OsEmuConfig {
    fn default() -> Self {
        Self {
            pthread_replace: true,
            nprocs: 0,
        }
    }
}

/// `clock_skew_minimization/*` settings.
#[derive(Debug, Clone)]
pub struct ClockSkewConfig {
    /// `"barrier"`, `"lax"`, or `"none"`.
    pub scheme: String,
    /// Whether skew statistics are reported at shutdown.
    pub report: bool,
    /// `lax` scheme only: how far, in ns, a core may run ahead of the
    /// slowest core before it is made to wait.
    pub lax_slack_ns: u64,
}

impl Default for ClockSkewConfig {
    fn default() -> Self {
        Self {
            scheme: "barrier".to_string(),
            report: false,
            lax_slack_ns: defaults::CLOCK_SKEW_LAX_SLACK_NS,
        }
    }
}

impl Config {
    /// Loads and validates a `.cfg` file from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the file cannot be read, the
    /// `.cfg` syntax is malformed, a required key is missing, an enum value
    /// is unrecognized, or the topology is self-contradictory.
    pub fn load_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("cannot read {}: {e}", path.display())))?;
        Self::from_raw(&RawConfig::parse(&text)?)
    }

    /// Builds a typed [`Config`] from a parsed [`RawConfig`], filling
    /// unset keys from `defaults` and validating cross-key invariants.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] on an unrecognized enum value or a
    /// self-contradictory topology (e.g. `lite` mode with more than one
    /// process).
    pub fn from_raw(raw: &RawConfig) -> Result<Self> {
        let mode = match raw.get_string_or("general.mode", "full")?.as_str() {
            "full" => SimMode::Full,
            "lite" => SimMode::Lite,
            other => {
                return Err(Error::Configuration(format!(
                    "unrecognized general/mode: {other}"
                )))
            }
        };
        let num_processes = raw.get_int_or("general.num_processes", i64::from(defaults::NUM_PROCESSES))?;
        if mode == SimMode::Lite && num_processes > 1 {
            return Err(Error::Configuration(
                "lite mode is incompatible with num_processes > 1".to_string(),
            ));
        }

        let general = GeneralConfig {
            total_cores: raw.get_int_or("general.total_cores", i64::from(defaults::TOTAL_CORES))? as u32,
            num_processes: num_processes as u32,
            mode,
            enable_shared_mem: raw.get_bool_or("general.enable_shared_mem", true)?,
            output_dir: raw.get_string_or("general.output_dir", defaults::OUTPUT_DIR)?,
            output_file: raw.get_string_or("general.output_file", defaults::OUTPUT_FILE)?,
            magic: raw.get_bool_or("general.magic", false)?,
            core_mhz: raw.get_int_or("general.core_mhz", i64::from(defaults::CORE_MHZ))? as u32,
        };

        let dram_kind = match raw.get_string_or("perf_model.dram.type", "constant")?.as_str() {
            "constant" => DramModelKind::Constant,
            "readwrite" => DramModelKind::ReadWrite,
            "normal" => DramModelKind::Normal,
            other => {
                return Err(Error::Configuration(format!(
                    "unrecognized perf_model/dram/type: {other}"
                )))
            }
        };
        let queue_kind = match raw
            .get_string_or("perf_model.dram.queue_model.type", "basic")?
            .as_str()
        {
            "none" => QueueModelKind::None,
            "history_list" => QueueModelKind::HistoryList,
            "basic" => QueueModelKind::Basic,
            other => {
                return Err(Error::Configuration(format!(
                    "unrecognized queue_model/type: {other}"
                )))
            }
        };
        let dram = DramConfig {
            kind: dram_kind,
            per_controller_bandwidth: raw.get_float_or(
                "perf_model.dram.per_controller_bandwidth",
                defaults::DRAM_BANDWIDTH_BYTES_PER_NS,
            )?,
            latency_ns: raw.get_float_or("perf_model.dram.latency", defaults::DRAM_LATENCY_NS)?,
            read_latency_ns: raw.get_float_or(
                "perf_model.dram.read_latency",
                defaults::DRAM_LATENCY_NS,
            )?,
            write_latency_ns: raw.get_float_or(
                "perf_model.dram.write_latency",
                defaults::DRAM_LATENCY_NS,
            )?,
            normal_mean_ns: raw.get_float_or(
                "perf_model.dram.normal.mean",
                defaults::DRAM_LATENCY_NS,
            )?,
            normal_stddev_ns: raw.get_float_or(
                "perf_model.dram.normal.stddev",
                defaults::DRAM_NORMAL_STDDEV_NS,
            )?,
            normal_seed: raw.get_int_or("perf_model.dram.normal.seed", 0)? as u64,
            queue_model: QueueModelConfig {
                enabled: raw.get_bool_or("perf_model.dram.queue_model.enabled", true)?,
                kind: queue_kind,
                history_list_max_size: raw.get_int_or(
                    "perf_model.dram.queue_model.history_list.max_list_size",
                    defaults::QUEUE_HISTORY_MAX_LIST_SIZE as i64,
                )? as usize,
            },
        };

        let bp_kind = match raw
            .get_string_or("perf_model.branch_predictor.type", "one_bit")?
            .as_str()
        {
            "none" => BranchPredictorKind::None,
            "one_bit" => BranchPredictorKind::OneBit,
            "pentium_m" => BranchPredictorKind::PentiumM,
            other => {
                return Err(Error::Configuration(format!(
                    "unrecognized branch_predictor/type: {other}"
                )))
            }
        };
        let branch_predictor = BranchPredictorConfig {
            kind: bp_kind,
            size: raw.get_int_or(
                "perf_model.branch_predictor.size",
                defaults::BRANCH_PREDICTOR_SIZE as i64,
            )? as usize,
            mispredict_penalty: raw.get_int_or(
                "perf_model.branch_predictor.mispredict_penalty",
                defaults::MISPREDICT_PENALTY_CYCLES as i64,
            )? as u64,
        };

        let l1_policy = match raw
            .get_string_or("perf_model.l1_dcache.replacement_policy", "lru")?
            .as_str()
        {
            "fifo" => PolicyKind::Fifo,
            "lru" => PolicyKind::Lru,
            "mru" => PolicyKind::Mru,
            "plru" => PolicyKind::Plru,
            "random" => PolicyKind::Random,
            other => {
                return Err(Error::Configuration(format!(
                    "unrecognized perf_model/l1_dcache/replacement_policy: {other}"
                )))
            }
        };
        let l1_dcache = CacheConfig {
            sets: raw.get_int_or("perf_model.l1_dcache.sets", defaults::L1_DCACHE_SETS as i64)? as usize,
            ways: raw.get_int_or(
                "perf_model.l1_dcache.associativity",
                defaults::L1_DCACHE_WAYS as i64,
            )? as usize,
            line_bytes: raw.get_int_or(
                "perf_model.l1_dcache.line_size",
                defaults::L1_DCACHE_LINE_BYTES as i64,
            )? as usize,
            policy: l1_policy,
        };

        let parse_net_kind = |raw: &RawConfig, key: &str| -> Result<NetworkModelKind> {
            match raw.get_string_or(key, "analytical")?.as_str() {
                "magic" => Ok(NetworkModelKind::Magic),
                "analytical" => Ok(NetworkModelKind::Analytical),
                other => Err(Error::Configuration(format!(
                    "unrecognized network model for {key}: {other}"
                ))),
            }
        };
        let network = NetworkConfig {
            user_model_1: parse_net_kind(raw, "network.user_model_1")?,
            user_model_2: parse_net_kind(raw, "network.user_model_2")?,
            memory_model_1: parse_net_kind(raw, "network.memory_model_1")?,
            memory_model_2: parse_net_kind(raw, "network.memory_model_2")?,
            system_model: parse_net_kind(raw, "network.system_model")?,
            analytical: AnalyticalNetworkConfig {
                tw2: raw.get_float_or("network.analytical.Tw2", defaults::ANALYTICAL_TW2)?,
                s: raw.get_float_or("network.analytical.s", defaults::ANALYTICAL_S)?,
                n: raw.get_int_or("network.analytical.n", i64::from(defaults::ANALYTICAL_N))? as u32,
                w: raw.get_int_or("network.analytical.W", i64::from(defaults::ANALYTICAL_W))? as u32,
                update_interval_ns: raw.get_int_or(
                    "network.analytical.update_interval",
                    defaults::ANALYTICAL_UPDATE_INTERVAL_NS as i64,
                )? as u64,
                processing_cost_ns: raw.get_int_or(
                    "network.analytical.processing_cost",
                    defaults::ANALYTICAL_PROCESSING_COST_NS as i64,
                )? as u64,
            },
        };

        let osemu = OsEmuConfig {
            pthread_replace: raw.get_bool_or("osemu.pthread_replace", true)?,
            nprocs: raw.get_int_or("osemu.nprocs", 0)? as u32,
        };

        let clock_skew_minimization = ClockSkewConfig {
            scheme: raw.get_string_or("clock_skew_minimization.scheme", "barrier")?,
            report: raw.get_bool_or("clock_skew_minimization.report", false)?,
            lax_slack_ns: raw.get_int_or(
                "clock_skew_minimization.lax_slack_ns",
                defaults::CLOCK_SKEW_LAX_SLACK_NS as i64,
            )? as u64,
        };

        Ok(Self {
            general,
            perf_model: PerfModelConfig {
                dram,
                branch_predictor,
                l1_dcache,
            },
            network,
            osemu,
            clock_skew_minimization,
        })
    }
}

impl Default for Config {
    /// The configuration a bare CLI invocation uses when no `.cfg` file is
    /// given: every section's own `Default`.
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            perf_model: PerfModelConfig::default(),
            network: NetworkConfig::default(),
            osemu: OsEmuConfig::default(),
            clock_skew_minimization: ClockSkewConfig::default(),
        }
    }
}

/// A hierarchical dotted-key configuration store, parsed from `.cfg` text:
/// `[section]` headers followed by `key = value` lines, `#` line comments.
/// Keys are stored fully dotted (`section.key`).
#[derive(Debug, Clone, Default)]
pub struct RawConfig {
    values: BTreeMap<String, String>,
}

impl RawConfig {
    /// Parses `.cfg`-style text into a dotted-key store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] on a line that is neither a
    /// `[section]` header, a `key = value` pair, blank, nor a `#` comment.
    pub fn parse(text: &str) -> Result<Self> {
        let mut values = BTreeMap::new();
        let mut section = String::new();
        for (lineno, raw_line) in text.lines().enumerate() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if let Some(stripped) = line.strip_prefix('[') {
                let name = stripped.strip_suffix(']').ok_or_else(|| {
                    Error::Configuration(format!("malformed section header at line {}", lineno + 1))
                })?;
                section = name.trim().replace('/', ".");
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::Configuration(format!(
                    "malformed config line {}: {line:?}",
                    lineno + 1
                )));
            };
            let key = key.trim();
            let dotted = if section.is_empty() {
                key.to_string()
            } else {
                format!("{section}.{key}")
            };
            values.insert(dotted, value.trim().to_string());
        }
        Ok(Self { values })
    }

    /// Returns the raw string at `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns the string at `key`, or `default` if absent.
    ///
    /// # Errors
    ///
    /// Never errors; kept fallible for symmetry with the numeric accessors.
    pub fn get_string_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self.get(key).unwrap_or(default).to_string())
    }

    /// Parses the integer at `key`, or returns `default` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the value is present but not a
    /// valid integer.
    pub fn get_int_or(&self, key: &str, default: i64) -> Result<i64> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Configuration(format!("{key}: not an integer: {raw:?}"))),
        }
    }

    /// Parses the float at `key`, or returns `default` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the value is present but not a
    /// valid float.
    pub fn get_float_or(&self, key: &str, default: f64) -> Result<f64> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::Configuration(format!("{key}: not a float: {raw:?}"))),
        }
    }

    /// Parses the boolean at `key` (`true`/`false`/`1`/`0`), or returns
    /// `default` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the value is present but not a
    /// recognized boolean spelling.
    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some("true" | "1") => Ok(true),
            Some("false" | "0") => Ok(false),
            Some(raw) => Err(Error::Configuration(format!(
                "{key}: not a boolean: {raw:?}"
            ))),
        }
    }

    /// Parses the string at `key`, failing if it is absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `key` is not set.
    pub fn require_string(&self, key: &str) -> Result<String> {
        self.get(key)
            .map(str::to_string)
            .ok_or_else(|| Error::Configuration(format!("missing required key: {key}")))
    }
}

impl fmt::Display for RawConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, v) in &self.values {
            writeln!(f, "{k} = {v}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sections_and_keys() {
        let raw = RawConfig::parse(
            "# comment\n[general]\ntotal_cores = 8\nmode = lite\n\n[perf_model/dram]\ntype = normal\n",
        )
        .unwrap();
        assert_eq!(raw.get("general.total_cores"), Some("8"));
        assert_eq!(raw.get("general.mode"), Some("lite"));
        assert_eq!(raw.get("perf_model.dram.type"), Some("normal"));
    }

    #[test]
    fn missing_required_key_is_configuration_error() {
        let raw = RawConfig::parse("").unwrap();
        assert!(matches!(
            raw.require_string("general.total_cores"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn lite_mode_with_multiple_processes_is_rejected() {
        let raw = RawConfig::parse("[general]\nmode = lite\nnum_processes = 2\n").unwrap();
        assert!(matches!(Config::from_raw(&raw), Err(Error::Configuration(_))));
    }

    #[test]
    fn unrecognized_enum_value_is_configuration_error() {
        let raw = RawConfig::parse("[general]\nmode = weird\n").unwrap();
        assert!(matches!(Config::from_raw(&raw), Err(Error::Configuration(_))));
    }

    #[test]
    fn defaults_fill_in_when_raw_is_empty() {
        let raw = RawConfig::parse("").unwrap();
        let cfg = Config::from_raw(&raw).unwrap();
        assert_eq!(cfg.general.total_cores, defaults::TOTAL_CORES);
        assert_eq!(cfg.perf_model.dram.kind, DramModelKind::Constant);
        assert_eq!(cfg.perf_model.l1_dcache.sets, defaults::L1_DCACHE_SETS);
        assert_eq!(cfg.perf_model.l1_dcache.policy, PolicyKind::Lru);
    }

    #[test]
    fn unrecognized_replacement_policy_is_configuration_error() {
        let raw = RawConfig::parse("[perf_model/l1_dcache]\nreplacement_policy = bogus\n").unwrap();
        assert!(matches!(Config::from_raw(&raw), Err(Error::Configuration(_))));
    }
}
