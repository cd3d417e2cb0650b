// src/analyzer/breaker.rs
// =============================================================================
// Circuit breaker around page fetches.
//
// When a run of fetches fails in a row, the upstream (or our own network)
// is most likely in trouble. The breaker then rejects calls outright for a
// while instead of tying up a request for the full fetch timeout each time.
//
// States:
// - Closed: calls go through; `failure_threshold` consecutive failures open it
// - Open: calls are rejected until `open_timeout` has passed since the last
//   failure, then the next call is let through as a trial (HalfOpen)
// - HalfOpen: `success_threshold` successes close it; any failure reopens it
// =============================================================================

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    half_open_successes: u32,
    last_failure: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    success_threshold: u32,
    open_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_timeout: Duration, success_threshold: u32) -> Self {
        Self {
            // A threshold of 0 would never let anything through
            failure_threshold: failure_threshold.max(1),
            success_threshold: success_threshold.max(1),
            open_timeout,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                half_open_successes: 0,
                last_failure: None,
            }),
        }
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    // Asks permission for one call. An open breaker whose timeout has
    // passed moves to HalfOpen and lets the call through.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let cooled_down = inner
                    .last_failure
                    .map_or(true, |at| at.elapsed() >= self.open_timeout);
                if cooled_down {
                    inner.state = BreakerState::HalfOpen;
                    inner.half_open_successes = 0;
                    info!("circuit breaker half-open, allowing trial request");
                }
                cooled_down
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures = 0;
        if inner.state == BreakerState::HalfOpen {
            inner.half_open_successes += 1;
            if inner.half_open_successes >= self.success_threshold {
                inner.state = BreakerState::Closed;
                inner.half_open_successes = 0;
                info!("circuit breaker closed");
            }
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.consecutive_failures += 1;
        inner.last_failure = Some(Instant::now());

        let trip = match inner.state {
            BreakerState::Closed => inner.consecutive_failures >= self.failure_threshold,
            BreakerState::HalfOpen => true,
            BreakerState::Open => false,
        };
        if trip {
            inner.state = BreakerState::Open;
            inner.half_open_successes = 0;
            warn!(
                consecutive_failures = inner.consecutive_failures,
                open_for_ms = self.open_timeout.as_millis() as u64,
                "circuit breaker opened"
            );
        }
    }

    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.half_open_successes = 0;
        inner.last_failure = None;
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
