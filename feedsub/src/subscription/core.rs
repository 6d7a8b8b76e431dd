//! Main subscription loop implementation

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::config::SubscriptionConfig;
use super::error::SubscriptionError;
use super::gate::{Enabled, GateInputs};
use super::handle::{ItemRequest, SubscriptionHandle, Updates};
use super::messages::{Control, LastError, SubscriptionMetrics, Termination};
use super::pending::PendingQueue;
use crate::fetch::{FetchOutcome, FetchSupervisor, Fetcher, InFlight};

/// A subscription to a fetcher
///
/// Fetches at most one batch at a time, deduplicates items by ID, and hands
/// them to the consumer in arrival order. Holds no locks: all mutable state
/// lives inside [`Subscription::run`] and is reached only through channels.
pub struct Subscription {
    config: SubscriptionConfig,
    supervisor: FetchSupervisor,
    requests_rx: mpsc::UnboundedReceiver<ItemRequest>,
    control_rx: mpsc::Receiver<Control>,
    cancel: CancellationToken,
}

/// One ready event, chosen by the wait in [`Subscription::run`]
enum Event {
    Terminate(Termination),
    Metrics(oneshot::Sender<SubscriptionMetrics>),
    FetchDone(FetchOutcome),
    StartFetch,
    ConsumerWaiting(ItemRequest),
    ConsumerGone,
    Deliver,
    Idle,
}

enum Step {
    Continue,
    Stop(Termination),
}

/// Everything the loop owns; only touched between waits
struct LoopState {
    pending: PendingQueue,
    in_flight: Option<InFlight>,
    next_eligible: Instant,
    last_error: LastError,
    parked: Option<ItemRequest>,
    consumer_open: bool,
    metrics: SubscriptionMetrics,
}

impl LoopState {
    fn new(now: Instant) -> Self {
        Self {
            pending: PendingQueue::new(),
            in_flight: None,
            next_eligible: now,
            last_error: None,
            parked: None,
            consumer_open: true,
            metrics: SubscriptionMetrics::default(),
        }
    }

    fn gate_inputs(&self) -> GateInputs {
        GateInputs {
            pending_len: self.pending.len(),
            in_flight: self.in_flight.is_some(),
            next_eligible: self.next_eligible,
            consumer_waiting: self.parked.is_some(),
            consumer_open: self.consumer_open,
        }
    }

    fn snapshot(&self) -> SubscriptionMetrics {
        SubscriptionMetrics {
            pending: self.pending.len(),
            seen: self.pending.seen_len(),
            in_flight: self.in_flight.is_some(),
            consumer_waiting: self.parked.is_some(),
            ..self.metrics.clone()
        }
    }

    /// Apply one event. Never awaits.
    fn apply(&mut self, event: Event, supervisor: &FetchSupervisor, retry_backoff: Duration) -> Step {
        match event {
            Event::Terminate(termination) => {
                info!(
                    reason = termination.reason(),
                    pending = self.pending.len(),
                    in_flight = self.in_flight.is_some(),
                    "Subscription terminating"
                );
                return Step::Stop(termination);
            }

            Event::Metrics(reply_tx) => {
                let _ = reply_tx.send(self.snapshot());
            }

            Event::StartFetch => {
                debug_assert!(self.in_flight.is_none(), "fetch started while another is in flight");
                debug!(pending = self.pending.len(), "Starting fetch");
                self.in_flight = Some(supervisor.launch());
                self.metrics.fetches_started += 1;
            }

            Event::FetchDone(outcome) => {
                let elapsed = self
                    .in_flight
                    .take()
                    .map(|fetch| fetch.started_at().elapsed())
                    .unwrap_or_default();
                self.absorb(outcome, elapsed, retry_backoff);
            }

            Event::ConsumerWaiting(request) => {
                trace!("Consumer waiting for an item");
                self.parked = Some(request);
            }

            Event::ConsumerGone => {
                warn!(
                    pending = self.pending.len(),
                    "Consumer dropped its updates, delivery disabled"
                );
                self.consumer_open = false;
            }

            Event::Deliver => self.deliver(),

            Event::Idle => {
                self.metrics.idle_ticks += 1;
                debug!(
                    pending = self.pending.len(),
                    in_flight = self.in_flight.is_some(),
                    "Idle timeout elapsed"
                );
            }
        }

        Step::Continue
    }

    /// Hand the front item to the parked request
    ///
    /// The item leaves the queue only if the request is still being awaited.
    fn deliver(&mut self) {
        let Some(request) = self.parked.take() else {
            return;
        };
        let Some(item) = self.pending.pop_front() else {
            self.parked = Some(request);
            return;
        };

        let id = item.id.clone();
        match request.send(item) {
            Ok(()) => {
                trace!(%id, "Delivered item");
                self.metrics.items_delivered += 1;
            }
            Err(item) => {
                debug!(%id, "Consumer stopped waiting, item stays queued");
                self.pending.requeue_front(item);
            }
        }
    }

    fn absorb(&mut self, outcome: FetchOutcome, elapsed: Duration, retry_backoff: Duration) {
        match outcome {
            FetchOutcome::Fetched(batch) => {
                let fetched = batch.items.len();
                let stats = self.pending.merge(batch.items);
                self.next_eligible = batch.next_eligible;
                self.last_error = None;

                self.metrics.items_accepted += stats.accepted as u64;
                self.metrics.duplicates_dropped += stats.duplicates as u64;
                self.metrics.peak_pending = self.metrics.peak_pending.max(self.pending.len());

                debug!(
                    fetched,
                    accepted = stats.accepted,
                    duplicates = stats.duplicates,
                    pending = self.pending.len(),
                    ?elapsed,
                    "Fetch succeeded"
                );
            }
            FetchOutcome::Failed { error, at } => {
                warn!(error = %error, ?elapsed, backoff = ?retry_backoff, "Fetch failed");
                self.next_eligible = at + retry_backoff;
                self.last_error = Some(Arc::new(error));
                self.metrics.fetches_failed += 1;
            }
        }
    }
}

/// Resolve the outstanding fetch, or never if there is none
async fn wait_in_flight(in_flight: &mut Option<InFlight>) -> FetchOutcome {
    match in_flight {
        Some(fetch) => fetch.await,
        None => std::future::pending().await,
    }
}

/// Answer the terminating request and any close requests queued behind it
fn finish(termination: Termination, control_rx: &mut mpsc::Receiver<Control>, last_error: LastError) {
    control_rx.close();

    match termination {
        Termination::Close(reply_tx) => {
            let _ = reply_tx.send(last_error.clone());
            while let Ok(control) = control_rx.try_recv() {
                if let Control::Close { reply_tx } = control {
                    let _ = reply_tx.send(last_error.clone());
                }
            }
        }
        // Cancellation answers nobody; queued closers see Terminated
        Termination::Cancel | Termination::Orphaned => {}
    }
}

impl Subscription {
    /// Create a subscription and the handles to drive it
    ///
    /// The subscription does nothing until [`Subscription::run`] is awaited.
    pub fn new(
        config: SubscriptionConfig,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<(Self, SubscriptionHandle, Updates), SubscriptionError> {
        config.validate()?;
        debug!(?config, "Subscription::new: called");

        // Unbounded, but a single Updates never has more than one request out
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::channel(config.control_buffer);
        let cancel = CancellationToken::new();

        let subscription = Self {
            supervisor: FetchSupervisor::new(fetcher, config.fetch_timeout()),
            config,
            requests_rx,
            control_rx,
            cancel: cancel.clone(),
        };

        Ok((
            subscription,
            SubscriptionHandle::new(control_tx, cancel),
            Updates::new(requests_tx),
        ))
    }

    /// Create a subscription and run it on a new task
    pub fn spawn(
        config: SubscriptionConfig,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<(SubscriptionHandle, Updates, JoinHandle<()>), SubscriptionError> {
        let (subscription, handle, updates) = Self::new(config, fetcher)?;
        let task = tokio::spawn(subscription.run());
        Ok((handle, updates, task))
    }

    /// Run the loop until closed, cancelled, or orphaned
    ///
    /// Each iteration recomputes which events are enabled, waits for the
    /// first one, and applies it. When several are ready at once the order is
    /// fixed: control, cancellation, fetch outcome, fetch start, consumer
    /// request, delivery, idle. Fetch outcome and fetch start are never
    /// enabled together, nor are consumer request and delivery.
    pub async fn run(self) {
        let Subscription {
            config,
            supervisor,
            mut requests_rx,
            mut control_rx,
            cancel,
        } = self;

        let idle_timeout = config.idle_timeout();
        let retry_backoff = config.retry_backoff();
        let mut state = LoopState::new(Instant::now());

        // One timer per role, rearmed every iteration
        let fetch_timer = time::sleep_until(state.next_eligible);
        let idle_timer = time::sleep(idle_timeout);
        tokio::pin!(fetch_timer, idle_timer);

        info!(max_pending = config.max_pending, gate = ?config.gate, "Subscription started");

        let termination = loop {
            let now = Instant::now();
            let enabled = Enabled::compute(config.gate, config.max_pending, state.gate_inputs(), now);
            fetch_timer.as_mut().reset(enabled.fetch_deadline);
            idle_timer.as_mut().reset(now + idle_timeout);

            let event = tokio::select! {
                biased;

                control = control_rx.recv() => match control {
                    Some(Control::Close { reply_tx }) => Event::Terminate(Termination::Close(reply_tx)),
                    Some(Control::GetMetrics { reply_tx }) => Event::Metrics(reply_tx),
                    None => Event::Terminate(Termination::Orphaned),
                },

                _ = cancel.cancelled() => Event::Terminate(Termination::Cancel),

                outcome = wait_in_flight(&mut state.in_flight), if enabled.fetch_done => Event::FetchDone(outcome),

                _ = &mut fetch_timer, if enabled.start_fetch => Event::StartFetch,

                request = requests_rx.recv(), if enabled.accept_request => match request {
                    Some(request) => Event::ConsumerWaiting(request),
                    None => Event::ConsumerGone,
                },

                _ = std::future::ready(()), if enabled.deliver => Event::Deliver,

                _ = &mut idle_timer => Event::Idle,
            };

            if let Step::Stop(termination) = state.apply(event, &supervisor, retry_backoff) {
                break termination;
            }
            trace!("End of iteration");
        };

        // End the consumer's stream before anyone learns we stopped
        state.parked = None;
        drop(requests_rx);
        finish(termination, &mut control_rx, state.last_error.clone());

        info!(
            delivered = state.metrics.items_delivered,
            abandoned = state.pending.len(),
            "Subscription stopped"
        );
    }
}
