//! Message types for the subscription loop

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::fetch::FetchError;

/// Most recent fetch failure, shared with whoever closes the subscription
pub type LastError = Option<Arc<FetchError>>;

/// Requests sent to the loop over the control channel
#[derive(Debug)]
pub enum Control {
    /// Stop the loop and reply with the last fetch error
    Close { reply_tx: oneshot::Sender<LastError> },

    /// Get a snapshot of the loop's counters
    GetMetrics {
        reply_tx: oneshot::Sender<SubscriptionMetrics>,
    },
}

/// Why the loop is stopping
///
/// Close and cancellation arrive on separate sources but meet at the same wait
/// point. When both are ready in one iteration, Close is taken, so its caller
/// always gets a reply.
#[derive(Debug)]
pub enum Termination {
    /// A caller asked to close and waits for the last error
    Close(oneshot::Sender<LastError>),

    /// The cancellation token fired; nobody is answered
    Cancel,

    /// Every control handle was dropped
    Orphaned,
}

impl Termination {
    pub fn reason(&self) -> &'static str {
        match self {
            Termination::Close(_) => "close",
            Termination::Cancel => "cancel",
            Termination::Orphaned => "orphaned",
        }
    }
}

/// Subscription counters for observability
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionMetrics {
    pub fetches_started: u64,
    pub fetches_failed: u64,
    pub items_accepted: u64,
    pub duplicates_dropped: u64,
    pub items_delivered: u64,
    pub idle_ticks: u64,
    pub pending: usize,
    pub peak_pending: usize,
    /// Distinct IDs ever enqueued; the dedup set never shrinks
    pub seen: usize,
    pub in_flight: bool,
    /// A receive is parked with the loop
    pub consumer_waiting: bool,
}
