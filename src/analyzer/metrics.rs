// src/analyzer/metrics.rs
// Request counters for the analyzer, readable without locking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, Default)]
pub struct Metrics {
    total_requests: AtomicU64,
    active_requests: AtomicU64,
    total_duration_us: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub active_requests: u64,
    pub total_duration_ms: u64,
    pub avg_duration_ms: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    // Marks a request as in flight until the guard is dropped
    pub fn start_request(&self) -> ActiveRequest<'_> {
        self.active_requests.fetch_add(1, Ordering::Relaxed);
        ActiveRequest { metrics: self }
    }

    pub fn record_duration(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_duration_us.fetch_add(micros, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let total_requests = self.total_requests.load(Ordering::Relaxed);
        let total_duration_us = self.total_duration_us.load(Ordering::Relaxed);
        let avg_duration_us = total_duration_us.checked_div(total_requests).unwrap_or(0);

        MetricsSnapshot {
            total_requests,
            active_requests: self.active_requests.load(Ordering::Relaxed),
            total_duration_ms: total_duration_us / 1000,
            avg_duration_ms: avg_duration_us / 1000,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
        }
    }
}

pub struct ActiveRequest<'a> {
    metrics: &'a Metrics,
}

impl Drop for ActiveRequest<'_> {
    fn drop(&mut self) {
        self.metrics.active_requests.fetch_sub(1, Ordering::Relaxed);
    }
}
