//! Retrieval side of a subscription
//!
//! A [`Fetcher`] is the slow, fallible source. The [`FetchSupervisor`] runs one
//! fetch at a time on its own task and reports back through a single-slot
//! channel, so the subscription loop never waits on the source itself.

mod error;
mod fetcher;
mod scripted;
mod simulated;
mod supervisor;

pub use error::FetchError;
pub use fetcher::{Batch, Fetcher};
pub use scripted::{ScriptStep, ScriptedFetcher};
pub use simulated::{FailMode, SimulatedFetcher, SimulatedFetcherConfig};
pub use supervisor::{FetchOutcome, FetchSupervisor, InFlight};
