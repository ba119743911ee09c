//! Metrics collection for the composition service
//!
//! Thread-safe counters over atomics; one collector is shared by every
//! request. Snapshots are taken for the metrics endpoint.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector for the composition service
#[derive(Debug, Default)]
pub struct StitchMetrics {
    // Request statistics
    total_requests: AtomicU64,
    primary_responses: AtomicU64,
    failed_requests: AtomicU64,

    // Fragment statistics
    total_fragments: AtomicU64,
    failed_fragments: AtomicU64,
    fragment_fallbacks: AtomicU64,
    fragment_timeouts: AtomicU64,

    // Byte statistics
    bytes_to_client: AtomicU64,
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub total_requests: u64,
    pub primary_responses: u64,
    pub failed_requests: u64,
    pub total_fragments: u64,
    pub failed_fragments: u64,
    pub fragment_fallbacks: u64,
    pub fragment_timeouts: u64,
    pub bytes_to_client: u64,
}

impl MetricsSnapshot {
    /// Fragment failure rate as a percentage
    pub fn fragment_failure_rate(&self) -> f64 {
        if self.total_fragments == 0 {
            return 0.0;
        }
        (self.failed_fragments as f64 / self.total_fragments as f64) * 100.0
    }
}

impl StitchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one composed request
    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a response whose status came from a primary fragment
    pub fn record_primary_response(&self) {
        self.primary_responses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request answered with a 500
    pub fn record_failed_request(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one fragment fetch outcome
    ///
    /// # Arguments
    /// * `success` - whether a usable response arrived (fallback included)
    pub fn record_fragment(&self, success: bool) {
        self.total_fragments.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_fragments.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a fallback attempt
    pub fn record_fragment_fallback(&self) {
        self.fragment_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fragment head timeout
    pub fn record_fragment_timeout(&self) {
        self.fragment_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record bytes written to the client
    pub fn record_bytes_to_client(&self, bytes: u64) {
        self.bytes_to_client.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot of all counters
    pub fn get_stats(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            primary_responses: self.primary_responses.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            total_fragments: self.total_fragments.load(Ordering::Relaxed),
            failed_fragments: self.failed_fragments.load(Ordering::Relaxed),
            fragment_fallbacks: self.fragment_fallbacks.load(Ordering::Relaxed),
            fragment_timeouts: self.fragment_timeouts.load(Ordering::Relaxed),
            bytes_to_client: self.bytes_to_client.load(Ordering::Relaxed),
        }
    }
}
