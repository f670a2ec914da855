//! Risk limit configuration and the pre-trade verdict types

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hard limits the pre-trade gate enforces.
///
/// Every monetary limit is in cents; positions and orders on non-cent
/// venues are normalised before comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Maximum quantity per order (scaled units).
    pub max_order_size: i64,
    /// Maximum notional per order, cents.
    pub max_order_notional: i64,
    /// Maximum absolute position per symbol (scaled units).
    pub max_position_size: i64,
    /// Maximum absolute net exposure across positions, cents.
    pub max_net_exposure: i64,
    /// Maximum gross exposure across positions, cents.
    pub max_gross_exposure: i64,
    /// Maximum approved submissions per trading day.
    pub max_orders_per_day: i64,
    /// Maximum notional traded per day, cents.
    pub max_daily_notional: i64,
    /// Maximum daily loss, cents (positive number).
    pub max_daily_loss: i64,
    /// Consecutive failures before the breaker opens.
    pub circuit_breaker_threshold: u32,
    /// Cooldown before an open breaker allows a probe, milliseconds.
    pub circuit_breaker_cooldown_ms: u64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_order_size: 1_000_000,
            max_order_notional: 100_000_000,      // $1M
            max_position_size: 10_000_000,
            max_net_exposure: 500_000_000,        // $5M
            max_gross_exposure: 1_000_000_000,    // $10M
            max_orders_per_day: 100_000,
            max_daily_notional: 10_000_000_000,   // $100M
            max_daily_loss: 10_000_000,           // $100k
            circuit_breaker_threshold: 5,
            circuit_breaker_cooldown_ms: 30_000,
        }
    }
}

impl RiskLimits {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("max_order_size", self.max_order_size),
            ("max_order_notional", self.max_order_notional),
            ("max_position_size", self.max_position_size),
            ("max_net_exposure", self.max_net_exposure),
            ("max_gross_exposure", self.max_gross_exposure),
            ("max_orders_per_day", self.max_orders_per_day),
            ("max_daily_notional", self.max_daily_notional),
            ("max_daily_loss", self.max_daily_loss),
        ] {
            if value <= 0 {
                bail!("risk limit {} must be positive, got {}", name, value);
            }
        }
        if self.circuit_breaker_threshold == 0 {
            bail!("circuit_breaker_threshold must be at least 1");
        }
        Ok(())
    }
}

/// Outcome of the pre-trade gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskVerdict {
    Approved,
    Rejected(String),
}

impl RiskVerdict {
    #[inline]
    pub fn is_approved(&self) -> bool {
        matches!(self, RiskVerdict::Approved)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            RiskVerdict::Approved => None,
            RiskVerdict::Rejected(reason) => Some(reason),
        }
    }
}

impl fmt::Display for RiskVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskVerdict::Approved => write!(f, "approved"),
            RiskVerdict::Rejected(reason) => write!(f, "rejected: {}", reason),
        }
    }
}

/// Read-only view the rules evaluate against.
///
/// Built once per check from the position book and the daily counters, so
/// every rule in the chain sees the same numbers.
#[derive(Debug, Clone, Copy)]
pub struct RiskContext {
    /// Current signed quantity for the order's symbol.
    pub current_position_qty: i64,
    /// Signed net exposure across all positions, cents.
    pub net_exposure_cents: i64,
    /// Gross exposure across all positions, cents.
    pub gross_exposure_cents: i64,
    /// Approved submissions so far today.
    pub orders_submitted_today: i64,
    /// Notional traded so far today, cents.
    pub notional_traded_today_cents: i64,
    /// Realized P&L so far today, cents (negative is a loss).
    pub daily_pnl_cents: i64,
}

/// Daily counter snapshot for admin surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DailyCounters {
    pub orders_submitted_today: i64,
    pub notional_traded_today_cents: i64,
    pub daily_pnl_cents: i64,
}
