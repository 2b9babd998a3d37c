//! Lock-free metrics collection and periodic reporting
//!
//! Uses atomics for hot-path counters to avoid mutex contention.
//!
//! NOTE: All atomics use Relaxed ordering intentionally - these are
//! statistical counters only. Do NOT use them for coordination or
//! logic decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Lock-free metrics collector for the ingestion pipeline
pub struct Metrics {
    /// Reports successfully normalized (monotonic)
    reports_received: AtomicU64,
    /// Inbound payloads dropped: malformed JSON or invalid UTF-8
    parse_failures: AtomicU64,
    /// Inbound payloads dropped: unrecognized topic
    unrecognized_topics: AtomicU64,
    /// Reports rejected by the reconciler: untracked device id
    unknown_devices: AtomicU64,
    /// Reports dropped because the pipeline channel was full
    channel_drops: AtomicU64,
    /// Records appended to the report store
    persisted: AtomicU64,
    /// Store append failures
    persist_failures: AtomicU64,
    /// Updates fanned out to observers (one per delivered frame)
    broadcasts: AtomicU64,
    /// Commands accepted by the relay
    commands_sent: AtomicU64,
    /// Commands rejected by the relay
    command_failures: AtomicU64,
    /// Report window start, for rate computation
    window_start: parking_lot::Mutex<Instant>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            reports_received: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            unrecognized_topics: AtomicU64::new(0),
            unknown_devices: AtomicU64::new(0),
            channel_drops: AtomicU64::new(0),
            persisted: AtomicU64::new(0),
            persist_failures: AtomicU64::new(0),
            broadcasts: AtomicU64::new(0),
            commands_sent: AtomicU64::new(0),
            command_failures: AtomicU64::new(0),
            window_start: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_report_received(&self) {
        self.reports_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unrecognized_topic(&self) {
        self.unrecognized_topics.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unknown_device(&self) {
        self.unknown_devices.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_channel_drop(&self) {
        self.channel_drops.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_persisted(&self) {
        self.persisted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_broadcast(&self, delivered: u64) {
        self.broadcasts.fetch_add(delivered, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_command_sent(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_command_failure(&self) {
        self.command_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot the counters and log a one-line summary.
    ///
    /// Monotonic counters are read without reset; the window timer is
    /// reset to compute the per-window report rate.
    pub fn report(&self, tracked_devices: usize, observer_sessions: usize) {
        let elapsed = {
            let mut start = self.window_start.lock();
            let elapsed = start.elapsed().as_secs_f64();
            *start = Instant::now();
            elapsed
        };

        let received = self.reports_received.load(Ordering::Relaxed);
        let reports_per_sec =
            if elapsed > 0.0 { received as f64 / elapsed } else { 0.0 };

        info!(
            reports_received = %received,
            reports_per_sec = %format!("{:.1}", reports_per_sec),
            parse_failures = %self.parse_failures.load(Ordering::Relaxed),
            unrecognized_topics = %self.unrecognized_topics.load(Ordering::Relaxed),
            unknown_devices = %self.unknown_devices.load(Ordering::Relaxed),
            channel_drops = %self.channel_drops.load(Ordering::Relaxed),
            persisted = %self.persisted.load(Ordering::Relaxed),
            persist_failures = %self.persist_failures.load(Ordering::Relaxed),
            broadcasts = %self.broadcasts.load(Ordering::Relaxed),
            commands_sent = %self.commands_sent.load(Ordering::Relaxed),
            command_failures = %self.command_failures.load(Ordering::Relaxed),
            tracked_devices = %tracked_devices,
            observer_sessions = %observer_sessions,
            "metrics_report"
        );
    }

    #[cfg(test)]
    pub fn persisted_count(&self) -> u64 {
        self.persisted.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub fn persist_failure_count(&self) -> u64 {
        self.persist_failures.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub fn unknown_device_count(&self) -> u64 {
        self.unknown_devices.load(Ordering::Relaxed)
    }
}
