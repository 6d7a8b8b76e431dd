//! SimulatedFetcher - an in-process source for running the binary without a backend

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info};

use super::error::FetchError;
use super::fetcher::{Batch, Fetcher};
use crate::domain::Item;

/// How often the simulated source fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum FailMode {
    /// Every fetch fails
    #[default]
    Always,
    /// No fetch fails
    Never,
    /// Each fetch fails with probability `failure-rate`
    Flaky,
}

/// SimulatedFetcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatedFetcherConfig {
    /// Time each fetch takes
    #[serde(rename = "latency-ms", default = "default_latency_ms")]
    pub latency_ms: u64,

    /// Delay the source asks for before the next fetch
    #[serde(rename = "next-after-ms", default = "default_next_after_ms")]
    pub next_after_ms: u64,

    /// Items per successful fetch
    #[serde(rename = "batch-size", default = "default_batch_size")]
    pub batch_size: usize,

    /// Items repeated from the previous batch
    #[serde(default = "default_overlap")]
    pub overlap: usize,

    #[serde(rename = "fail-mode", default)]
    pub fail_mode: FailMode,

    /// Failure probability for [`FailMode::Flaky`]
    #[serde(rename = "failure-rate", default = "default_failure_rate")]
    pub failure_rate: f64,

    #[serde(rename = "error-message", default = "default_error_message")]
    pub error_message: String,
}

fn default_latency_ms() -> u64 {
    1000
}

fn default_next_after_ms() -> u64 {
    3000
}

fn default_batch_size() -> usize {
    5
}

fn default_overlap() -> usize {
    1
}

fn default_failure_rate() -> f64 {
    0.5
}

fn default_error_message() -> String {
    "still error from fetch".to_string()
}

impl Default for SimulatedFetcherConfig {
    fn default() -> Self {
        Self {
            latency_ms: default_latency_ms(),
            next_after_ms: default_next_after_ms(),
            batch_size: default_batch_size(),
            overlap: default_overlap(),
            fail_mode: FailMode::default(),
            failure_rate: default_failure_rate(),
            error_message: default_error_message(),
        }
    }
}

/// Produces numbered items after a fixed latency
///
/// Each batch repeats the last `overlap` items of the previous one so the
/// subscription's deduplication has something to do.
pub struct SimulatedFetcher {
    config: SimulatedFetcherConfig,
    cursor: AtomicU64,
    calls: AtomicU64,
}

impl SimulatedFetcher {
    pub fn new(config: SimulatedFetcherConfig) -> Self {
        debug!(?config, "SimulatedFetcher::new: called");
        Self {
            config,
            cursor: AtomicU64::new(0),
            calls: AtomicU64::new(0),
        }
    }

    /// Number of fetches started so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn should_fail(&self) -> bool {
        match self.config.fail_mode {
            FailMode::Always => true,
            FailMode::Never => false,
            FailMode::Flaky => rand::random_bool(self.config.failure_rate.clamp(0.0, 1.0)),
        }
    }

    fn next_batch(&self, call: u64) -> Vec<Item> {
        let overlap = self.config.overlap.min(self.config.batch_size) as u64;
        let fresh = self.config.batch_size as u64 - overlap;
        let start = self.cursor.fetch_add(fresh, Ordering::SeqCst);

        (start.saturating_sub(overlap)..start + fresh)
            .map(|seq| Item::with_data(format!("item-{}", seq), serde_json::json!({ "seq": seq, "call": call })))
            .collect()
    }
}

impl Default for SimulatedFetcher {
    fn default() -> Self {
        Self::new(SimulatedFetcherConfig::default())
    }
}

#[async_trait]
impl Fetcher for SimulatedFetcher {
    async fn fetch(&self) -> Result<Batch, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        info!(call, "Fetch invoked");

        tokio::time::sleep(Duration::from_millis(self.config.latency_ms)).await;

        if self.should_fail() {
            debug!(call, "SimulatedFetcher::fetch: failing");
            return Err(FetchError::source(self.config.error_message.clone()));
        }

        let items = self.next_batch(call);
        debug!(call, count = items.len(), "SimulatedFetcher::fetch: produced batch");
        Ok(Batch::new(
            items,
            Instant::now() + Duration::from_millis(self.config.next_after_ms),
        ))
    }
}
