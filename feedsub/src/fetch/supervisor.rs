//! FetchSupervisor - runs one fetch on its own task

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use super::error::FetchError;
use super::fetcher::{Batch, Fetcher};

/// What a launched fetch reports back
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched(Batch),
    Failed { error: FetchError, at: Instant },
}

/// Launches fetches without waiting on them
///
/// The supervisor does not limit how many fetches are outstanding; the
/// subscription loop only launches when it holds no [`InFlight`].
pub struct FetchSupervisor {
    fetcher: Arc<dyn Fetcher>,
    timeout: Option<Duration>,
}

impl FetchSupervisor {
    pub fn new(fetcher: Arc<dyn Fetcher>, timeout: Option<Duration>) -> Self {
        debug!(?timeout, "FetchSupervisor::new: called");
        Self { fetcher, timeout }
    }

    /// Start a fetch on a new task and return a handle to its outcome
    ///
    /// The outcome is sent through a oneshot, so a fetch that finishes after
    /// its handle was dropped completes without blocking.
    pub fn launch(&self) -> InFlight {
        let (tx, rx) = oneshot::channel();
        let fetcher = Arc::clone(&self.fetcher);
        let timeout = self.timeout;
        let started_at = Instant::now();

        tokio::spawn(async move {
            let result = match timeout {
                Some(limit) => match tokio::time::timeout(limit, fetcher.fetch()).await {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Timeout(limit)),
                },
                None => fetcher.fetch().await,
            };

            let outcome = match result {
                Ok(batch) => FetchOutcome::Fetched(batch),
                Err(error) => FetchOutcome::Failed {
                    error,
                    at: Instant::now(),
                },
            };

            if tx.send(outcome).is_err() {
                debug!("FetchSupervisor::launch: handle dropped, discarding outcome");
            }
        });

        debug!("FetchSupervisor::launch: fetch spawned");
        InFlight { rx, started_at }
    }
}

/// A fetch that has been launched and not yet observed
///
/// Resolves to exactly one [`FetchOutcome`]. If the fetch task dies without
/// reporting, resolves to [`FetchError::Aborted`].
#[derive(Debug)]
pub struct InFlight {
    rx: oneshot::Receiver<FetchOutcome>,
    started_at: Instant,
}

impl InFlight {
    /// When the fetch was launched
    pub fn started_at(&self) -> Instant {
        self.started_at
    }
}

impl Future for InFlight {
    type Output = FetchOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(FetchOutcome::Failed {
                error: FetchError::Aborted,
                at: Instant::now(),
            }),
            Poll::Pending => Poll::Pending,
        }
    }
}
