//! feedsub - Single-flight fetch loop with deduplication and backpressure
//!
//! A [`Subscription`] polls a slow, fallible [`Fetcher`] and republishes the
//! items it returns to a single consumer, one at a time.
//!
//! # Guarantees
//!
//! - **Single flight**: at most one fetch is outstanding at any moment
//! - **Deduplication**: an item ID is delivered at most once per subscription
//! - **Backpressure**: no fetch starts while the pending queue is over its
//!   bound, so the queue exceeds it by at most one batch
//! - **Non-blocking**: a slow fetch never delays delivery or shutdown
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use feedsub::{SimulatedFetcher, Subscription, SubscriptionConfig};
//!
//! let (handle, mut updates, _task) =
//!     Subscription::spawn(SubscriptionConfig::default(), Arc::new(SimulatedFetcher::default()))?;
//! while let Some(item) = updates.recv().await {
//!     println!("-> {}", item.id);
//! }
//! let last_error = handle.close().await?;
//! ```
//!
//! # Modules
//!
//! - [`subscription`] - the loop, its handles and configuration
//! - [`fetch`] - fetcher trait, single-flight supervisor, test sources
//! - [`domain`] - items and their identity
//! - [`config`] - configuration file loading
//! - [`cli`] - command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod fetch;
pub mod subscription;

// Re-export commonly used types
pub use config::Config;
pub use domain::{Item, ItemId};
pub use fetch::{
    Batch, FailMode, FetchError, FetchOutcome, FetchSupervisor, Fetcher, InFlight, ScriptStep, ScriptedFetcher,
    SimulatedFetcher, SimulatedFetcherConfig,
};
pub use subscription::{
    Gate, LastError, PendingQueue, Subscription, SubscriptionConfig, SubscriptionError, SubscriptionHandle,
    SubscriptionMetrics, Updates,
};
