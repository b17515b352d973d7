//! Configuration for the execution data requester.
//!
//! Lives in the types crate so that host-node wiring can build a config
//! without depending on the requester crate itself.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::height::Height;

/// Configuration for the execution data requester.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequesterConfig {
    /// First block height for which to request execution data (inclusive).
    pub start_height: Height,

    /// Max number of fetched-but-unnotified entries kept in memory.
    /// Dropped entries are refetched from the local blob store at
    /// notification time.
    #[serde(default = "default_max_cached_entries")]
    pub max_cached_entries: u64,

    /// Max number of unsent notifications to allow before pausing new
    /// fetches. Prevents unbounded memory use if the requester gets stuck
    /// on a specific height.
    #[serde(default = "default_max_search_ahead")]
    pub max_search_ahead: u64,

    /// Per-attempt deadline in seconds for fetching an execution-data tree.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Initial delay in milliseconds for the download retry backoff.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Cap in milliseconds for the download retry backoff.
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,

    /// Whether to run the local datastore consistency check on startup.
    #[serde(default)]
    pub check_enabled: bool,

    /// Number of workers downloading execution data from the network.
    #[serde(default = "default_fetch_workers")]
    pub fetch_workers: usize,
}

impl RequesterConfig {
    pub fn new(start_height: Height) -> Self {
        Self { start_height, ..Self::default() }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            start_height: Height::new(0),
            max_cached_entries: default_max_cached_entries(),
            max_search_ahead: default_max_search_ahead(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            check_enabled: false,
            fetch_workers: default_fetch_workers(),
        }
    }
}

fn default_max_cached_entries() -> u64 {
    50
}

fn default_max_search_ahead() -> u64 {
    5000
}

fn default_fetch_timeout_secs() -> u64 {
    300
}

fn default_retry_delay_ms() -> u64 {
    10_000
}

fn default_max_retry_delay_ms() -> u64 {
    300_000
}

fn default_fetch_workers() -> usize {
    4
}
