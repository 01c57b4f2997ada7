//! Process-global circuit breaker
//!
//! Protects the upstream from failure storms. One breaker guards all
//! dispatches:
//! - Closed: failures count up, successes count down; at the threshold the
//!   breaker opens
//! - Open: every dispatch is refused until the open window elapses, then the
//!   next attempt becomes the half-open trial
//! - HalfOpen: exactly one trial runs; success closes the breaker, failure
//!   reopens it with a fresh window

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    /// State label for logging and stats.
    pub fn label(&self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

struct Inner {
    state: BreakerState,
    failure_count: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

/// Three-state breaker shared by every dispatch.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    failure_threshold: u32,
    open_duration: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                opened_at: None,
                trial_in_flight: false,
            }),
            failure_threshold,
            open_duration,
        }
    }

    /// Whether a dispatch may proceed. In the open state this is where the
    /// open-window expiry check happens: the first caller after the window
    /// becomes the half-open trial, everyone else keeps getting refused
    /// until that trial reports back.
    pub fn allow(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let expired = inner
                    .opened_at
                    .is_none_or(|at| at.elapsed() >= self.open_duration);
                if expired {
                    info!("circuit breaker half-open, allowing one trial");
                    inner.state = BreakerState::HalfOpen;
                    inner.trial_in_flight = true;
                    true
                } else {
                    false
                }
            }
            BreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        }
    }

    /// Report the overall outcome of one dispatch.
    pub fn record(&self, success: bool) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        match inner.state {
            BreakerState::Closed => {
                if success {
                    inner.failure_count = inner.failure_count.saturating_sub(1);
                } else {
                    inner.failure_count += 1;
                    if inner.failure_count >= self.failure_threshold {
                        warn!(
                            failures = inner.failure_count,
                            "circuit breaker opened, refusing dispatches"
                        );
                        inner.state = BreakerState::Open;
                        inner.opened_at = Some(Instant::now());
                    }
                }
            }
            BreakerState::HalfOpen => {
                inner.trial_in_flight = false;
                if success {
                    info!("circuit breaker trial succeeded, closing");
                    inner.state = BreakerState::Closed;
                    inner.failure_count = 0;
                    inner.opened_at = None;
                } else {
                    warn!("circuit breaker trial failed, reopening");
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            // A dispatch that started before the trip finishing late — the
            // open window stands on its own clock.
            BreakerState::Open => {}
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner
            .lock()
            .expect("breaker lock poisoned")
            .failure_count
    }
}
