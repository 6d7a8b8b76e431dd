//! Subscription error types

use thiserror::Error;

/// Errors returned to callers of a subscription handle
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Subscription has terminated")]
    Terminated,

    #[error("Invalid subscription config: {0}")]
    InvalidConfig(String),
}
