use std::{ops::Deref, sync::Arc, time::Duration};

use prometheus_client::{
    metrics::{
        counter::Counter,
        gauge::Gauge,
        histogram::{exponential_buckets, Histogram},
    },
    registry::Registry,
};
use viridian_types::Height;

/// Metrics for the execution data requester.
#[derive(Clone, Debug)]
pub struct RequesterMetrics(Arc<Inner>);

impl Deref for RequesterMetrics {
    type Target = Inner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug)]
pub struct Inner {
    // Fetch metrics
    fetches_started: Counter,
    fetches_succeeded: Counter,
    fetches_failed: Counter,
    fetch_retries: Counter,
    fetch_duration: Histogram,
    last_fetched_height: Gauge,

    // Notification metrics
    notifications_sent: Counter,
    last_notified_height: Gauge,

    // Lifecycle
    halted: Gauge,
}

impl Inner {
    pub fn new() -> Self {
        Self {
            fetches_started: Counter::default(),
            fetches_succeeded: Counter::default(),
            fetches_failed: Counter::default(),
            fetch_retries: Counter::default(),
            fetch_duration: Histogram::new(exponential_buckets(0.05, 2.0, 12)),
            last_fetched_height: Gauge::default(),

            notifications_sent: Counter::default(),
            last_notified_height: Gauge::default(),

            halted: Gauge::default(),
        }
    }
}

impl Default for Inner {
    fn default() -> Self {
        Self::new()
    }
}

impl RequesterMetrics {
    pub fn new() -> Self {
        Self(Arc::new(Inner::new()))
    }

    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::new();
        let registry = registry.sub_registry_with_prefix("execution_data_requester");

        registry.register(
            "fetches_started_total",
            "Execution data download attempts",
            metrics.fetches_started.clone(),
        );

        registry.register(
            "fetches_succeeded_total",
            "Execution data download attempts that succeeded",
            metrics.fetches_succeeded.clone(),
        );

        registry.register(
            "fetches_failed_total",
            "Execution data download attempts that failed",
            metrics.fetches_failed.clone(),
        );

        registry.register(
            "fetch_retries_total",
            "Download attempts after the first for a height",
            metrics.fetch_retries.clone(),
        );

        registry.register(
            "fetch_duration",
            "Time spent downloading execution data for one height (seconds)",
            metrics.fetch_duration.clone(),
        );

        registry.register(
            "last_fetched_height",
            "Height of the most recent completed download",
            metrics.last_fetched_height.clone(),
        );

        registry.register(
            "notifications_sent_total",
            "Execution data notifications delivered to subscribers",
            metrics.notifications_sent.clone(),
        );

        registry.register(
            "last_notified_height",
            "Highest height delivered to subscribers",
            metrics.last_notified_height.clone(),
        );

        registry.register(
            "halted",
            "1 once the requester has halted on invalid execution data",
            metrics.halted.clone(),
        );

        metrics
    }

    /// Capture a snapshot of the current counter and gauge values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            fetches_started: self.fetches_started.get(),
            fetches_succeeded: self.fetches_succeeded.get(),
            fetches_failed: self.fetches_failed.get(),
            fetch_retries: self.fetch_retries.get(),
            last_fetched_height: self.last_fetched_height.get(),
            notifications_sent: self.notifications_sent.get(),
            last_notified_height: self.last_notified_height.get(),
            halted: self.halted.get() != 0,
        }
    }

    pub fn record_fetch_started(&self) {
        self.fetches_started.inc();
    }

    pub fn record_fetch_finished(&self, duration: Duration, success: bool, height: Height) {
        self.fetch_duration.observe(duration.as_secs_f64());
        if success {
            self.fetches_succeeded.inc();
            self.last_fetched_height.set(height.as_u64() as i64);
        } else {
            self.fetches_failed.inc();
        }
    }

    pub fn record_fetch_retried(&self) {
        self.fetch_retries.inc();
    }

    pub fn record_notification_sent(&self, height: Height) {
        self.notifications_sent.inc();
        self.last_notified_height.set(height.as_u64() as i64);
    }

    pub fn record_halted(&self) {
        self.halted.set(1);
    }
}

impl Default for RequesterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable snapshot of the requester metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub fetches_started: u64,
    pub fetches_succeeded: u64,
    pub fetches_failed: u64,
    pub fetch_retries: u64,
    pub last_fetched_height: i64,
    pub notifications_sent: u64,
    pub last_notified_height: i64,
    pub halted: bool,
}
