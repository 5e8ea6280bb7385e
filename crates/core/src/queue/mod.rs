//! Queue models: given an arrival time and a service time, return the extra
//! delay a requester waits before service can start.
//!
//! Three disciplines, matching `QueueModel::create` in the original source:
//! [`NoQueue`] (always zero), [`HistoryList`] (bounded window of recent
//! intervals), and [`Basic`] (single watermark). All three are capability
//! traits chosen at construction from [`crate::config::QueueModelConfig`];
//! there is no virtual dispatch once built.

use std::collections::VecDeque;

use crate::common::{CoreId, SimTime};
use crate::config::{QueueModelConfig, QueueModelKind};

/// `compute_delay(arrival, service, requester) -> extra wait time`.
///
/// Implementations must be monotone (a later `busy_until` watermark never
/// moves backward) and total: there is no error path once constructed.
pub trait QueueModel: Send {
    /// Returns the additional waiting time `requester` experiences before
    /// its request of duration `service` can start, given it arrived at
    /// `arrival`.
    fn compute_delay(&mut self, arrival: SimTime, service: SimTime, requester: CoreId) -> SimTime;
}

/// Builds the configured [`QueueModel`], or `None` if queueing is disabled.
#[must_use]
pub fn build(config: &QueueModelConfig) -> Option<Box<dyn QueueModel>> {
    if !config.enabled {
        return None;
    }
    Some(match config.kind {
        QueueModelKind::None => Box::new(NoQueue) as Box<dyn QueueModel>,
        QueueModelKind::HistoryList => Box::new(HistoryList::new(config.history_list_max_size)),
        QueueModelKind::Basic => Box::new(Basic::new()),
    })
}

/// Always returns zero delay.
#[derive(Debug, Default)]
pub struct NoQueue;

impl QueueModel for NoQueue {
    fn compute_delay(&mut self, _arrival: SimTime, _service: SimTime, _requester: CoreId) -> SimTime {
        SimTime::ZERO
    }
}

/// A completed (or in-flight) service interval, `[start, end)`.
#[derive(Debug, Clone, Copy)]
struct Interval {
    start: SimTime,
    end: SimTime,
}

/// Keeps a bounded window of up to `max_list_size` recent service intervals
/// and reports delay as the gap between `arrival` and the latest interval's
/// end. The oldest entry is evicted once the window is full.
#[derive(Debug)]
pub struct HistoryList {
    max_list_size: usize,
    intervals: VecDeque<Interval>,
}

impl HistoryList {
    /// Creates a history-list queue model with the given window size.
    /// `max_list_size == 0` is clamped to 1 so the model always has room
    /// for the most recent interval.
    #[must_use]
    pub fn new(max_list_size: usize) -> Self {
        Self {
            max_list_size: max_list_size.max(1),
            intervals: VecDeque::new(),
        }
    }

    fn busy_until(&self) -> SimTime {
        self.intervals
            .back()
            .map_or(SimTime::ZERO, |interval| interval.end)
    }
}

impl QueueModel for HistoryList {
    fn compute_delay(&mut self, arrival: SimTime, service: SimTime, _requester: CoreId) -> SimTime {
        let delay = self.busy_until().saturating_sub(arrival);
        let start = arrival.max(self.busy_until());
        let end = start + service;

        if self.intervals.len() == self.max_list_size {
            self.intervals.pop_front();
        }
        self.intervals.push_back(Interval { start, end });

        delay
    }
}

/// A single `busy_until` watermark, advanced by every request.
#[derive(Debug, Default)]
pub struct Basic {
    busy_until: SimTime,
}

impl Basic {
    /// Creates a `Basic` queue model with the server initially idle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl QueueModel for Basic {
    fn compute_delay(&mut self, arrival: SimTime, service: SimTime, _requester: CoreId) -> SimTime {
        let delay = self.busy_until.saturating_sub(arrival);
        self.busy_until = arrival + delay + service;
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_queue_is_always_zero() {
        let mut q = NoQueue;
        let d = q.compute_delay(SimTime::from_ns(100), SimTime::from_ns(50), CoreId::new(0));
        assert_eq!(d, SimTime::ZERO);
    }

    #[test]
    fn basic_serializes_back_to_back_requests() {
        let mut q = Basic::new();
        let requester = CoreId::new(0);
        let d1 = q.compute_delay(SimTime::from_ns(0), SimTime::from_ns(10), requester);
        assert_eq!(d1, SimTime::ZERO);
        // second request arrives before the first finishes servicing.
        let d2 = q.compute_delay(SimTime::from_ns(5), SimTime::from_ns(10), requester);
        assert_eq!(d2, SimTime::from_ns(5));
    }

    #[test]
    fn basic_start_time_is_non_decreasing_for_sorted_arrivals() {
        let mut q = Basic::new();
        let requester = CoreId::new(0);
        let arrivals = [0, 2, 3, 3, 20];
        let mut last_start = SimTime::ZERO;
        for ns in arrivals {
            let arrive = SimTime::from_ns(ns);
            let delay = q.compute_delay(arrive, SimTime::from_ns(5), requester);
            let start = arrive + delay;
            assert!(start >= last_start);
            last_start = start;
        }
    }

    #[test]
    fn zero_service_is_identity_on_arrival() {
        let mut q = Basic::new();
        let requester = CoreId::new(0);
        let arrive = SimTime::from_ns(42);
        let delay = q.compute_delay(arrive, SimTime::ZERO, requester);
        assert_eq!(arrive + delay, arrive);
    }

    #[test]
    fn history_list_evicts_oldest_entry() {
        let mut q = HistoryList::new(2);
        let requester = CoreId::new(0);
        q.compute_delay(SimTime::from_ns(0), SimTime::from_ns(10), requester);
        q.compute_delay(SimTime::from_ns(1), SimTime::from_ns(10), requester);
        q.compute_delay(SimTime::from_ns(2), SimTime::from_ns(10), requester);
        assert_eq!(q.intervals.len(), 2);
    }

    #[test]
    fn history_list_delay_tracks_latest_busy_until() {
        let mut q = HistoryList::new(100);
        let requester = CoreId::new(0);
        q.compute_delay(SimTime::from_ns(0), SimTime::from_ns(10), requester);
        let delay = q.compute_delay(SimTime::from_ns(5), SimTime::from_ns(5), requester);
        assert_eq!(delay, SimTime::from_ns(5));
    }
}
