//! ScriptedFetcher - replays a fixed sequence of fetch results

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::error::FetchError;
use super::fetcher::{Batch, Fetcher};
use crate::domain::Item;

/// Once the script runs out, the source asks to be left alone this long
const EXHAUSTED_BACKOFF: Duration = Duration::from_secs(3600);

/// One scripted fetch result
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Succeed with these items, eligible again after `next_after`
    Items { items: Vec<Item>, next_after: Duration },
    /// Fail with a source error
    Error(String),
    /// Never complete
    Hang,
}

/// Fetcher that plays back [`ScriptStep`]s in order
///
/// Records when each call started and the highest number of calls running at
/// once, for checking the single-flight guarantee.
pub struct ScriptedFetcher {
    steps: Mutex<VecDeque<ScriptStep>>,
    latency: Duration,
    calls: AtomicU64,
    active: AtomicUsize,
    max_active: AtomicUsize,
    call_times: Mutex<Vec<Instant>>,
}

impl ScriptedFetcher {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            latency: Duration::ZERO,
            calls: AtomicU64::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            call_times: Mutex::new(Vec::new()),
        }
    }

    /// Delay every call by `latency` before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed running concurrently
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// Start time of every call so far
    pub async fn call_times(&self) -> Vec<Instant> {
        self.call_times.lock().await.clone()
    }
}

/// Decrements the active count when a call ends, including by cancellation
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self) -> Result<Batch, FetchError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.call_times.lock().await.push(Instant::now());

        let step = self.steps.lock().await.pop_front();
        debug!(call, ?step, "ScriptedFetcher::fetch: called");

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match step {
            Some(ScriptStep::Items { items, next_after }) => Ok(Batch::new(items, Instant::now() + next_after)),
            Some(ScriptStep::Error(message)) => Err(FetchError::Source(message)),
            Some(ScriptStep::Hang) => std::future::pending().await,
            None => Ok(Batch::new(Vec::new(), Instant::now() + EXHAUSTED_BACKOFF)),
        }
    }
}
