//! Order-flow circuit breaker
//!
//! Blocks new orders after a run of consecutive failures and probes
//! recovery after a cooldown.
//!
//! ```text
//! CLOSED ──[consecutive failures >= threshold]──► OPEN
//! OPEN   ──[now − opened_at >= cooldown]─────────► HALF_OPEN
//! HALF_OPEN ──[probe succeeds]───────────────────► CLOSED
//! HALF_OPEN ──[probe fails]──────────────────────► OPEN (opened_at := now)
//! ```
//!
//! HALF_OPEN admits exactly one probe order at a time. All methods take
//! the clock as a parameter; the caller (the risk gate) holds the lock
//! that serializes them.

use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "CLOSED"),
            BreakerState::Open => write!(f, "OPEN"),
            BreakerState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Gate decision for one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerDecision {
    Allow,
    /// Allowed as the single HALF_OPEN probe; its outcome decides the
    /// next state.
    AllowProbe,
    Block,
}

/// A state change, reported so the caller can audit it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerTransition {
    pub from: BreakerState,
    pub to: BreakerState,
    pub reason: String,
}

pub struct CircuitBreaker {
    state: BreakerState,
    threshold: u32,
    cooldown: Duration,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
    total_trips: u64,
    last_trip_reason: Option<String>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: BreakerState::Closed,
            threshold,
            cooldown,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
            total_trips: 0,
            last_trip_reason: None,
        }
    }

    #[inline]
    pub fn state(&self) -> BreakerState {
        self.state
    }

    #[inline]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    #[inline]
    pub fn total_trips(&self) -> u64 {
        self.total_trips
    }

    pub fn reconfigure(&mut self, threshold: u32, cooldown: Duration) {
        self.threshold = threshold;
        self.cooldown = cooldown;
    }

    /// Gate one order. Moves OPEN to HALF_OPEN once the cooldown has
    /// elapsed; the transition (if any) is returned for auditing.
    pub fn check(&mut self, now: Instant) -> (BreakerDecision, Option<BreakerTransition>) {
        match self.state {
            BreakerState::Closed => (BreakerDecision::Allow, None),
            BreakerState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or_default();
                if elapsed >= self.cooldown {
                    let transition = self.transition(BreakerState::HalfOpen, "cooldown elapsed");
                    self.probe_in_flight = true;
                    (BreakerDecision::AllowProbe, Some(transition))
                } else {
                    (BreakerDecision::Block, None)
                }
            }
            BreakerState::HalfOpen => {
                if self.probe_in_flight {
                    (BreakerDecision::Block, None)
                } else {
                    self.probe_in_flight = true;
                    (BreakerDecision::AllowProbe, None)
                }
            }
        }
    }

    /// Record a non-probe rejection. Opens the breaker once the
    /// consecutive count reaches the threshold.
    pub fn record_failure(&mut self, now: Instant, reason: &str) -> Option<BreakerTransition> {
        match self.state {
            BreakerState::Closed => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.threshold {
                    self.opened_at = Some(now);
                    self.total_trips += 1;
                    self.last_trip_reason = Some(reason.to_string());
                    warn!(
                        failures = self.consecutive_failures,
                        threshold = self.threshold,
                        reason,
                        "circuit breaker opened"
                    );
                    Some(self.transition(BreakerState::Open, reason))
                } else {
                    None
                }
            }
            // Failures while already open only refresh the window.
            BreakerState::Open => {
                self.opened_at = Some(now);
                None
            }
            BreakerState::HalfOpen => None,
        }
    }

    /// Record the outcome of the HALF_OPEN probe.
    pub fn record_probe_outcome(
        &mut self,
        now: Instant,
        success: bool,
        reason: &str,
    ) -> Option<BreakerTransition> {
        if self.state != BreakerState::HalfOpen {
            return None;
        }
        self.probe_in_flight = false;
        if success {
            self.consecutive_failures = 0;
            info!("circuit breaker probe succeeded, closing");
            Some(self.transition(BreakerState::Closed, "probe succeeded"))
        } else {
            self.opened_at = Some(now);
            self.total_trips += 1;
            self.last_trip_reason = Some(reason.to_string());
            warn!(reason, "circuit breaker probe failed, reopening");
            Some(self.transition(BreakerState::Open, reason))
        }
    }

    /// A successful non-probe approval breaks the failure run.
    pub fn record_success(&mut self) {
        if self.state == BreakerState::Closed {
            self.consecutive_failures = 0;
        }
    }

    /// Force OPEN regardless of the failure count.
    pub fn trip(&mut self, now: Instant, reason: &str) -> Option<BreakerTransition> {
        if self.state == BreakerState::Open {
            self.opened_at = Some(now);
            return None;
        }
        self.opened_at = Some(now);
        self.probe_in_flight = false;
        self.total_trips += 1;
        self.last_trip_reason = Some(reason.to_string());
        warn!(reason, "circuit breaker tripped manually");
        Some(self.transition(BreakerState::Open, reason))
    }

    /// Return to CLOSED and clear the failure counter.
    pub fn reset(&mut self) -> Option<BreakerTransition> {
        self.consecutive_failures = 0;
        self.probe_in_flight = false;
        self.opened_at = None;
        if self.state == BreakerState::Closed {
            return None;
        }
        Some(self.transition(BreakerState::Closed, "manual reset"))
    }

    fn transition(&mut self, to: BreakerState, reason: &str) -> BreakerTransition {
        let from = self.state;
        self.state = to;
        BreakerTransition {
            from,
            to,
            reason: reason.to_string(),
        }
    }
}
