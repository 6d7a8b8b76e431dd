//! Subscription loop: single-flight fetching, deduplication and delivery
//!
//! One task owns all state and multiplexes over a fixed set of event sources:
//! - **Control:** close (with reply), metrics, external cancellation
//! - **Fetch:** start a fetch when gated open, absorb its outcome
//! - **Delivery:** hand the oldest pending item to the consumer
//! - **Idle:** a liveness tick when nothing else happens

mod config;
mod core;
mod error;
mod gate;
mod handle;
mod messages;
mod pending;

pub use config::{Gate, SubscriptionConfig};
pub use core::Subscription;
pub use error::SubscriptionError;
pub use gate::{Enabled, GateInputs};
pub use handle::{SubscriptionHandle, Updates};
pub use messages::{Control, LastError, SubscriptionMetrics, Termination};
pub use pending::{MergeStats, PendingQueue};
