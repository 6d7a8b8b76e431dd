//! Client-side handles: control for the owner, updates for the consumer

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::SubscriptionError;
use super::messages::{Control, LastError, SubscriptionMetrics};
use crate::domain::Item;

/// Handle for controlling a running subscription
///
/// Cloneable; the loop stops once every clone is dropped.
#[derive(Clone)]
pub struct SubscriptionHandle {
    tx: mpsc::Sender<Control>,
    cancel: CancellationToken,
}

impl SubscriptionHandle {
    pub(crate) fn new(tx: mpsc::Sender<Control>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    /// Stop the subscription and return the last fetch error
    ///
    /// Waits until the loop has answered. After this returns no further items
    /// are handed to the consumer, and its stream ends once drained.
    pub async fn close(&self) -> Result<LastError, SubscriptionError> {
        debug!("SubscriptionHandle::close: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(Control::Close { reply_tx })
            .await
            .map_err(|_| SubscriptionError::Terminated)?;

        debug!("SubscriptionHandle::close: waiting for reply");
        reply_rx.await.map_err(|_| SubscriptionError::Terminated)
    }

    /// Stop the subscription without waiting and without a reply
    pub fn cancel(&self) {
        debug!("SubscriptionHandle::cancel: called");
        self.cancel.cancel();
    }

    /// Token that stops the subscription when cancelled
    ///
    /// Useful for wiring the subscription into a wider shutdown tree.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Check whether the loop has stopped accepting control requests
    pub fn is_terminated(&self) -> bool {
        self.tx.is_closed()
    }

    /// Get current subscription metrics
    pub async fn metrics(&self) -> Result<SubscriptionMetrics, SubscriptionError> {
        debug!("SubscriptionHandle::metrics: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(Control::GetMetrics { reply_tx })
            .await
            .map_err(|_| SubscriptionError::Terminated)?;

        reply_rx.await.map_err(|_| SubscriptionError::Terminated)
    }
}

/// A parked request for the next item, answered by the loop
pub(crate) type ItemRequest = oneshot::Sender<Item>;

/// Consumer side of a subscription
///
/// Each receive parks one request with the loop, and the loop hands the front
/// pending item straight to it. Nothing is buffered in between, so an item
/// leaves the pending queue only when a receiver is waiting for it. `None`
/// means the subscription has stopped.
///
/// Receiving is cancel-safe: a request abandoned mid-wait stays parked and
/// the next receive picks up whatever it was answered with.
pub struct Updates {
    requests: mpsc::UnboundedSender<ItemRequest>,
    waiting: Option<oneshot::Receiver<Item>>,
}

impl Updates {
    pub(crate) fn new(requests: mpsc::UnboundedSender<ItemRequest>) -> Self {
        Self {
            requests,
            waiting: None,
        }
    }

    /// Wait for the next item
    pub async fn recv(&mut self) -> Option<Item> {
        self.next().await
    }
}

impl Stream for Updates {
    type Item = Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if this.waiting.is_none() {
            let (item_tx, item_rx) = oneshot::channel();
            if this.requests.send(item_tx).is_err() {
                return Poll::Ready(None);
            }
            this.waiting = Some(item_rx);
        }

        let Some(item_rx) = this.waiting.as_mut() else {
            return Poll::Ready(None);
        };

        match Pin::new(item_rx).poll(cx) {
            Poll::Ready(result) => {
                this.waiting = None;
                Poll::Ready(result.ok())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
