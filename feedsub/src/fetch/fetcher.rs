//! The Fetcher trait

use async_trait::async_trait;
use tokio::time::Instant;

use super::error::FetchError;
use crate::domain::Item;

/// Result of one successful fetch
#[derive(Debug, Clone)]
pub struct Batch {
    /// Items in source order, possibly including ones seen before
    pub items: Vec<Item>,

    /// Earliest time the source wants to be asked again
    pub next_eligible: Instant,
}

impl Batch {
    pub fn new(items: Vec<Item>, next_eligible: Instant) -> Self {
        Self { items, next_eligible }
    }
}

/// A slow, fallible source of items
///
/// Implementations are called from a task separate from the subscription loop
/// and must not retry internally; retry pacing belongs to the subscription.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the next batch of items
    async fn fetch(&self) -> Result<Batch, FetchError>;
}
