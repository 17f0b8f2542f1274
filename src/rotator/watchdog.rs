//! Receive timeout tracking for the serial rotators
//!
//! `Idle -> AwaitingFirstResponse -> Receiving`, with `Faulted` reachable from
//! either armed state when the deadline passes. `Faulted` is terminal until
//! [`ResponseWatchdog::reset`].

use std::time::Duration;
use tokio::time::Instant;

/// Health of a rotator link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkState {
    #[default]
    Idle,
    AwaitingFirstResponse,
    Receiving,
    Faulted,
}

/// How the receive timeout is re-armed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Armed once at start, disarmed by the first valid frame
    OneShot,
    /// Re-armed by every valid frame
    Rolling,
}

#[derive(Debug, Clone)]
pub struct ResponseWatchdog {
    policy: TimeoutPolicy,
    timeout: Duration,
    state: LinkState,
    deadline: Option<Instant>,
}

impl ResponseWatchdog {
    pub fn new(policy: TimeoutPolicy, timeout: Duration) -> Self {
        Self {
            policy,
            timeout,
            state: LinkState::Idle,
            deadline: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// When the current wait runs out, if armed
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Start waiting for the first response
    pub fn arm(&mut self) {
        self.state = LinkState::AwaitingFirstResponse;
        self.deadline = Some(Instant::now() + self.timeout);
    }

    /// Note a valid frame. Returns `false` (and changes nothing) once faulted.
    pub fn record_valid(&mut self) -> bool {
        if self.state == LinkState::Faulted {
            return false;
        }

        self.state = LinkState::Receiving;
        self.deadline = match self.policy {
            TimeoutPolicy::OneShot => None,
            TimeoutPolicy::Rolling => Some(Instant::now() + self.timeout),
        };
        true
    }

    /// Move to `Faulted`. Returns `true` only for the transition itself.
    pub fn expire(&mut self) -> bool {
        if self.deadline.is_none() {
            return false;
        }
        self.fault()
    }

    /// Fault without waiting for the deadline, e.g. when the link dies.
    /// Returns `true` only for the transition itself.
    pub fn fault(&mut self) -> bool {
        if self.state == LinkState::Faulted {
            return false;
        }
        self.state = LinkState::Faulted;
        self.deadline = None;
        true
    }

    pub fn reset(&mut self) {
        self.state = LinkState::Idle;
        self.deadline = None;
    }
}
