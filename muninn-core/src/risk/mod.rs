//! Risk management
//!
//! The synchronous pre-trade gate plus intraday accounting. One check
//! runs on the submission path before a `NEW_ORDER` event is enqueued:
//!
//! ```text
//! submit ──► enabled flag ──► circuit breaker ──► rule chain ──► approve
//!                 │                 │                  │
//!                 └── reject        └── reject         └── reject
//!                     (stored           (breaker           (first failing
//!                      reason)           open)              rule wins)
//! ```
//!
//! Rejections are reason strings, always audit-logged, and count toward
//! the circuit breaker's consecutive-failure run. Daily counters are
//! mutated under the same lock as the gate, so no check ever straddles a
//! reset.

pub mod circuit_breaker;
pub mod rules;
pub mod types;

pub use circuit_breaker::{BreakerDecision, BreakerState, BreakerTransition, CircuitBreaker};
pub use rules::{standard_rules, RiskRule};
pub use types::{DailyCounters, RiskContext, RiskLimits, RiskVerdict};

use crate::core::audit::{AuditEvent, AuditKind, AuditSink};
use crate::core::types::{fixed, Order, Trade};
use crate::positions::PositionBook;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

struct Inner {
    limits: RiskLimits,
    rules: Vec<Box<dyn RiskRule>>,
    breaker: CircuitBreaker,
    enabled: bool,
    disabled_reason: Option<String>,
    orders_submitted_today: i64,
    notional_traded_today_cents: i64,
    daily_pnl_cents: i64,
}

/// The risk engine. One per trading engine.
pub struct RiskEngine {
    inner: Mutex<Inner>,
    book: Arc<PositionBook>,
    audit: AuditSink,
}

impl RiskEngine {
    pub fn new(limits: RiskLimits, book: Arc<PositionBook>, audit: AuditSink) -> Self {
        let breaker = CircuitBreaker::new(
            limits.circuit_breaker_threshold,
            Duration::from_millis(limits.circuit_breaker_cooldown_ms),
        );
        Self {
            inner: Mutex::new(Inner {
                limits,
                rules: standard_rules(),
                breaker,
                enabled: true,
                disabled_reason: None,
                orders_submitted_today: 0,
                notional_traded_today_cents: 0,
                daily_pnl_cents: 0,
            }),
            book,
            audit,
        }
    }

    /// The synchronous pre-trade gate.
    pub fn pre_trade_check(&self, order: &Order) -> RiskVerdict {
        let mut inner = self.inner.lock();

        if !inner.enabled {
            let reason = format!(
                "trading disabled: {}",
                inner.disabled_reason.as_deref().unwrap_or("no reason recorded")
            );
            self.audit_rejection(order, &reason);
            return RiskVerdict::Rejected(reason);
        }

        let now = Instant::now();
        let (decision, transition) = inner.breaker.check(now);
        self.audit_breaker(transition);

        let probe = match decision {
            BreakerDecision::Block => {
                let reason = "circuit breaker open: new orders blocked".to_string();
                self.audit_rejection(order, &reason);
                return RiskVerdict::Rejected(reason);
            }
            BreakerDecision::AllowProbe => true,
            BreakerDecision::Allow => false,
        };

        // Reborrow the guard so the rule iteration and breaker updates
        // take disjoint field borrows.
        let inner = &mut *inner;
        let ctx = self.build_context(inner, order);
        for rule in &inner.rules {
            if let Err(reason) = rule.check(order, &ctx, &inner.limits) {
                let transition = if probe {
                    inner.breaker.record_probe_outcome(now, false, &reason)
                } else {
                    inner.breaker.record_failure(now, &reason)
                };
                self.audit_breaker(transition);
                self.audit_rejection(order, &reason);
                return RiskVerdict::Rejected(reason);
            }
        }

        if probe {
            let transition = inner.breaker.record_probe_outcome(now, true, "");
            self.audit_breaker(transition);
        } else {
            inner.breaker.record_success();
        }
        inner.orders_submitted_today += 1;
        RiskVerdict::Approved
    }

    /// Post-trade accounting for one fill.
    ///
    /// `realized_delta` is the realized P&L contribution in the trade's
    /// minor units; both it and the traded notional are normalised to
    /// cents before accumulation.
    pub fn record_fill(&self, trade: &Trade, realized_delta: i64) {
        let mut inner = self.inner.lock();
        inner.notional_traded_today_cents +=
            fixed::to_cents(trade.notional().abs(), trade.price_scale);
        inner.daily_pnl_cents += fixed::to_cents(realized_delta, trade.price_scale);
    }

    /// An asynchronous exchange rejection also feeds the breaker.
    pub fn record_exchange_failure(&self, reason: &str) {
        let mut inner = self.inner.lock();
        let transition = inner.breaker.record_failure(Instant::now(), reason);
        self.audit_breaker(transition);
    }

    pub fn get_limits(&self) -> RiskLimits {
        self.inner.lock().limits.clone()
    }

    pub fn set_limits(&self, limits: RiskLimits) {
        let mut inner = self.inner.lock();
        inner.breaker.reconfigure(
            limits.circuit_breaker_threshold,
            Duration::from_millis(limits.circuit_breaker_cooldown_ms),
        );
        info!(?limits, "risk limits updated");
        inner.limits = limits;
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.lock().enabled
    }

    pub fn enable_trading(&self) {
        let mut inner = self.inner.lock();
        inner.enabled = true;
        inner.disabled_reason = None;
        info!("trading enabled");
    }

    pub fn disable_trading(&self, reason: &str) {
        let mut inner = self.inner.lock();
        inner.enabled = false;
        inner.disabled_reason = Some(reason.to_string());
        warn!(reason, "trading disabled");
        self.audit.emit(AuditEvent::new(AuditKind::TradingDisabled, reason));
    }

    /// Zero the daily counters. Runs under the gate lock, so no pre-trade
    /// check straddles the reset. Does not touch the breaker failure
    /// count; that is [`RiskEngine::reset_circuit_breaker`].
    pub fn reset_daily_counters(&self) {
        let mut inner = self.inner.lock();
        inner.orders_submitted_today = 0;
        inner.notional_traded_today_cents = 0;
        inner.daily_pnl_cents = 0;
        info!("daily risk counters reset");
    }

    pub fn reset_circuit_breaker(&self) {
        let mut inner = self.inner.lock();
        let transition = inner.breaker.reset();
        self.audit_breaker(transition);
    }

    pub fn trip_circuit_breaker(&self, reason: &str) {
        let mut inner = self.inner.lock();
        let transition = inner.breaker.trip(Instant::now(), reason);
        self.audit_breaker(transition);
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.inner.lock().breaker.state()
    }

    pub fn daily_counters(&self) -> DailyCounters {
        let inner = self.inner.lock();
        DailyCounters {
            orders_submitted_today: inner.orders_submitted_today,
            notional_traded_today_cents: inner.notional_traded_today_cents,
            daily_pnl_cents: inner.daily_pnl_cents,
        }
    }

    fn build_context(&self, inner: &Inner, order: &Order) -> RiskContext {
        let current_position_qty = self
            .book
            .get(&order.symbol)
            .map(|p| p.quantity)
            .unwrap_or(0);
        RiskContext {
            current_position_qty,
            net_exposure_cents: self.book.net_exposure_cents(),
            gross_exposure_cents: self.book.gross_exposure_cents(),
            orders_submitted_today: inner.orders_submitted_today,
            notional_traded_today_cents: inner.notional_traded_today_cents,
            daily_pnl_cents: inner.daily_pnl_cents,
        }
    }

    fn audit_rejection(&self, order: &Order, reason: &str) {
        self.audit.emit(
            AuditEvent::new(AuditKind::RiskCheckFailed, reason).with_details(serde_json::json!({
                "client_order_id": order.client_order_id,
                "symbol": order.symbol.ticker,
                "side": order.side.to_string(),
                "quantity": order.quantity,
            })),
        );
    }

    fn audit_breaker(&self, transition: Option<BreakerTransition>) {
        if let Some(t) = transition {
            self.audit.emit(
                AuditEvent::new(
                    AuditKind::CircuitBreakerTripped,
                    format!("circuit breaker {} -> {}: {}", t.from, t.to, t.reason),
                )
                .with_details(serde_json::json!({
                    "from": t.from.to_string(),
                    "to": t.to.to_string(),
                })),
            );
        }
    }
}
