//! Simulation statistics: a process-wide registry of named, per-object,
//! per-index counters, plus a log-scaled histogram accumulator.
//!
//! Grounded on `common/misc/stats.cc`: `StatsManager::registerMetric` keeps
//! a flat list of metric handles; `recordStats` walks the list and writes
//! `prefix.object[index].metric value` lines. `StatHist` keeps count, sum,
//! sum-of-squares, min, max, and per-bucket counts at `floor(log2(v)) + 1`.
//!
//! The registry is append-only during setup and read-only at dump time;
//! per spec §5, counter writes are relaxed — mild raciness is accepted by
//! design rather than paying for a lock on every increment.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::Result;

/// A registered statistic: an atomic counter shared between the owning
/// component and the registry, tagged with the dotted name it reports
/// under.
#[derive(Clone)]
struct Registration {
    object: &'static str,
    index: u32,
    name: &'static str,
    value: Arc<AtomicU64>,
}

/// Process-wide (well, simulation-wide — see [`StatsRegistry::new`])
/// registry of statistics.
///
/// `register` hands back an [`Arc<AtomicU64>`] the caller increments
/// directly with relaxed ordering; `dump` walks every registration in
/// registration order and writes one line each.
#[derive(Clone, Default)]
pub struct StatsRegistry {
    inner: Arc<Mutex<Vec<Registration>>>,
}

impl StatsRegistry {
    /// Creates an empty registry. Despite the original's process-wide
    /// singleton, this is constructed once per simulation context (see
    /// `sim::Simulator`) so tests can run independent instances in
    /// parallel without sharing state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a named counter for `object[index]` and returns a shared
    /// handle the caller updates with [`AtomicU64::fetch_add`] or
    /// [`AtomicU64::store`].
    pub fn register(&self, object: &'static str, index: u32, name: &'static str) -> Arc<AtomicU64> {
        let value = Arc::new(AtomicU64::new(0));
        self.inner.lock().push(Registration {
            object,
            index,
            name,
            value: Arc::clone(&value),
        });
        value
    }

    /// Writes `prefix.object[index].name value` for every registration, in
    /// registration order, to `destination`.
    ///
    /// # Errors
    ///
    /// Propagates any I/O error from writing to `destination`.
    pub fn dump(&self, prefix: &str, destination: &mut dyn Write) -> std::io::Result<()> {
        for reg in self.inner.lock().iter() {
            writeln!(
                destination,
                "{prefix}.{}[{}].{} {}",
                reg.object,
                reg.index,
                reg.name,
                reg.value.load(Ordering::Relaxed)
            )?;
        }
        Ok(())
    }

    /// Writes the registry to a file at `path`, creating parent
    /// directories as needed. Matches the original's
    /// `sim-<pid>.stats`/`sim.stats` naming convention at the call site
    /// (see `sim::Simulator::shutdown`).
    ///
    /// # Errors
    ///
    /// Returns [`crate::common::Error`] wrapping any I/O failure.
    pub fn dump_to_file(&self, prefix: &str, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::common::Error::Configuration(format!("{}: {e}", parent.display())))?;
        }
        let mut file = std::fs::File::create(path)
            .map_err(|e| crate::common::Error::Configuration(format!("{}: {e}", path.display())))?;
        self.dump(prefix, &mut file)
            .map_err(|e| crate::common::Error::Configuration(format!("{}: {e}", path.display())))
    }
}

/// Number of log2 buckets a [`Histogram`] keeps; values whose
/// `floor(log2(v)) + 1` exceeds this are folded into the last bucket.
pub const HISTOGRAM_BUCKETS: usize = 64;

/// A log-scaled histogram accumulator: count, sum, sum-of-squares, min,
/// max, and per-bucket counts at `floor(log2(v)) + 1`. Mirrors `StatHist`
/// in the original `stats.cc`.
#[derive(Debug, Clone)]
pub struct Histogram {
    count: u64,
    sum: u64,
    sum_sq: u128,
    min: u64,
    max: u64,
    buckets: [u64; HISTOGRAM_BUCKETS],
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0,
            sum_sq: 0,
            min: 0,
            max: 0,
            buckets: [0; HISTOGRAM_BUCKETS],
        }
    }
}

impl Histogram {
    /// Creates an empty histogram.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one observation.
    pub fn update(&mut self, value: u64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        self.sum_sq += u128::from(value) * u128::from(value);

        let bin = if value == 0 {
            0
        } else {
            (63 - value.leading_zeros() as usize + 1).min(HISTOGRAM_BUCKETS - 1)
        };
        self.buckets[bin] += 1;
    }

    /// Merges `other`'s observations into `self`, matching `StatHist::operator+=`.
    pub fn merge(&mut self, other: &Self) {
        if self.count == 0 {
            self.min = other.min;
            self.max = other.max;
        } else if other.count > 0 {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
        self.count += other.count;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
        for (a, b) in self.buckets.iter_mut().zip(other.buckets.iter()) {
            *a += b;
        }
    }

    /// Number of observations.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Arithmetic mean, or `0.0` if no observations were recorded.
    #[must_use]
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum as f64 / self.count as f64
        }
    }

    /// Sample standard deviation, or `0.0` with fewer than two observations.
    #[must_use]
    pub fn stddev(&self) -> f64 {
        if self.count < 2 {
            return 0.0;
        }
        let n = self.count as f64;
        let mean = self.sum as f64 / n;
        let variance = (self.sum_sq as f64 / n - mean * mean) * n / (n - 1.0);
        variance.max(0.0).sqrt()
    }

    /// Smallest observed value.
    #[must_use]
    pub const fn min(&self) -> u64 {
        self.min
    }

    /// Largest observed value.
    #[must_use]
    pub const fn max(&self) -> u64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn register_and_dump_produces_expected_line() {
        let registry = StatsRegistry::new();
        let counter = registry.register("dram", 3, "total-accesses");
        counter.fetch_add(7, Ordering::Relaxed);

        let mut buf = Vec::new();
        registry.dump("sim", &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "sim.dram[3].total-accesses 7\n"
        );
    }

    #[test]
    fn histogram_tracks_min_max_mean() {
        let mut hist = Histogram::new();
        for v in [1, 2, 4, 8] {
            hist.update(v);
        }
        assert_eq!(hist.count(), 4);
        assert_eq!(hist.min(), 1);
        assert_eq!(hist.max(), 8);
        assert!((hist.mean() - 3.75).abs() < 1e-9);
    }

    #[test]
    fn histogram_merge_combines_counts() {
        let mut a = Histogram::new();
        a.update(1);
        let mut b = Histogram::new();
        b.update(100);
        a.merge(&b);
        assert_eq!(a.count(), 2);
        assert_eq!(a.max(), 100);
    }
}
