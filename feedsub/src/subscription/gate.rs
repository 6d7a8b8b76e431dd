//! Which events the loop may wait on this iteration
//!
//! Computed fresh from state before every wait. Termination and the idle tick
//! are always enabled and so are not represented here.

use tokio::time::Instant;

use super::config::Gate;

/// The state the gates depend on
#[derive(Debug, Clone, Copy)]
pub struct GateInputs {
    pub pending_len: usize,
    pub in_flight: bool,
    pub next_eligible: Instant,
    /// A receive request is parked with the loop
    pub consumer_waiting: bool,
    /// Some `Updates` still exists to send requests
    pub consumer_open: bool,
}

/// Event sources enabled for one iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enabled {
    /// A new fetch may start once `fetch_deadline` is reached
    pub start_fetch: bool,

    /// `max(next_eligible, now)`; the fetch timer is armed for this instant
    pub fetch_deadline: Instant,

    /// A fetch is outstanding and its outcome can be received
    pub fetch_done: bool,

    /// The next receive request can be taken from the consumer
    pub accept_request: bool,

    /// The front item can be handed to the parked request
    pub deliver: bool,
}

impl Enabled {
    pub fn compute(gate: Gate, max_pending: usize, inputs: GateInputs, now: Instant) -> Self {
        let room = match gate {
            Gate::Bounded => inputs.pending_len <= max_pending,
            Gate::EligibleTime => true,
        };

        Self {
            start_fetch: !inputs.in_flight && room,
            fetch_deadline: inputs.next_eligible.max(now),
            fetch_done: inputs.in_flight,
            accept_request: inputs.consumer_open && !inputs.consumer_waiting,
            deliver: inputs.consumer_waiting && inputs.pending_len > 0,
        }
    }
}
