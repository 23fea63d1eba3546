//! Throughput and ETA tracking for a sync run

use std::time::{Duration, Instant};

use log::info;

use super::timing::{estimate_remaining, format_duration, rate_per_second};

/// Counts processed items and reports throughput against a known total
#[derive(Debug)]
pub struct ProgressTracker {
    started_at: Instant,
    /// Items the loop attempted to store, regardless of outcome
    processed: usize,
    /// Items received from the remote side
    fetched: usize,
    /// Maximum items to process (0 = unbounded)
    limit: usize,
}

impl ProgressTracker {
    pub fn new(limit: usize) -> Self {
        Self {
            started_at: Instant::now(),
            processed: 0,
            fetched: 0,
            limit,
        }
    }

    pub fn increment(&mut self) {
        self.processed += 1;
    }

    pub fn add_fetched(&mut self, count: usize) {
        self.fetched += count;
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn fetched(&self) -> usize {
        self.fetched
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn limit_reached(&self) -> bool {
        self.limit > 0 && self.processed >= self.limit
    }

    /// Elapsed time since start and items processed per second
    pub fn stats(&self) -> (Duration, f64) {
        let elapsed = self.started_at.elapsed();
        (elapsed, rate_per_second(self.processed, elapsed))
    }

    /// The total used for ETA: the limit if it is smaller than what is available
    pub fn effective_total(&self, total_available: usize) -> usize {
        if self.limit > 0 && self.limit < total_available {
            self.limit
        } else {
            total_available
        }
    }

    /// Estimated time until `effective_total` items have been processed
    pub fn eta(&self, current: usize, total_available: usize) -> Option<Duration> {
        let (_, rate) = self.stats();
        let remaining = self.effective_total(total_available).saturating_sub(current);
        estimate_remaining(remaining, rate)
    }

    /// Log a throughput/ETA line
    pub fn report(&self, resource: &str, current: usize, total_available: usize) {
        let (elapsed, rate) = self.stats();
        let percent = if total_available > 0 {
            current as f64 / total_available as f64 * 100.0
        } else {
            100.0
        };
        let eta = self
            .eta(current, total_available)
            .map(|d| format!(", ETA {}", format_duration(d)))
            .unwrap_or_default();

        info!(
            "Fetched {} {} ({:.1}/sec, {:.1}% of {} total, {}{})",
            current,
            resource,
            rate,
            percent,
            total_available,
            format_duration(elapsed),
            eta
        );
    }
}
