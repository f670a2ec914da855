//! The pre-trade rule chain
//!
//! Rules run in declared priority order and short-circuit on the first
//! rejection, so a breach of several limits always reports the same
//! highest-priority reason. Every reason string starts with the rule
//! name.

use super::types::{RiskContext, RiskLimits};
use crate::core::types::{fixed, Order};

/// One pre-trade rule. Implementations are stateless; everything they
/// need arrives through the order, the context, and the limits.
pub trait RiskRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Err(reason)` rejects the order.
    fn check(&self, order: &Order, ctx: &RiskContext, limits: &RiskLimits)
        -> Result<(), String>;
}

/// Order notional normalised to cents.
#[inline]
fn order_notional_cents(order: &Order) -> i64 {
    fixed::to_cents(order.notional(), order.price_scale)
}

pub struct MaxOrderSize;

impl RiskRule for MaxOrderSize {
    fn name(&self) -> &'static str {
        "MaxOrderSize"
    }

    fn check(&self, order: &Order, _ctx: &RiskContext, limits: &RiskLimits)
        -> Result<(), String> {
        if order.quantity > limits.max_order_size {
            return Err(format!(
                "MaxOrderSize: quantity {} exceeds limit {}",
                order.quantity, limits.max_order_size
            ));
        }
        Ok(())
    }
}

pub struct MaxOrderNotional;

impl RiskRule for MaxOrderNotional {
    fn name(&self) -> &'static str {
        "MaxOrderNotional"
    }

    fn check(&self, order: &Order, _ctx: &RiskContext, limits: &RiskLimits)
        -> Result<(), String> {
        let notional = order_notional_cents(order);
        if notional > limits.max_order_notional {
            return Err(format!(
                "MaxOrderNotional: notional {}c exceeds limit {}c",
                notional, limits.max_order_notional
            ));
        }
        Ok(())
    }
}

pub struct MaxPositionSize;

impl RiskRule for MaxPositionSize {
    fn name(&self) -> &'static str {
        "MaxPositionSize"
    }

    fn check(&self, order: &Order, ctx: &RiskContext, limits: &RiskLimits)
        -> Result<(), String> {
        let projected = ctx.current_position_qty + order.side.signed(order.quantity);
        if projected.abs() > limits.max_position_size {
            return Err(format!(
                "MaxPositionSize: projected position {} exceeds limit {}",
                projected, limits.max_position_size
            ));
        }
        Ok(())
    }
}

pub struct MaxNetExposure;

impl RiskRule for MaxNetExposure {
    fn name(&self) -> &'static str {
        "MaxNetExposure"
    }

    fn check(&self, order: &Order, ctx: &RiskContext, limits: &RiskLimits)
        -> Result<(), String> {
        let signed_notional = order.side.signed(order_notional_cents(order));
        let projected = ctx.net_exposure_cents + signed_notional;
        if projected.abs() > limits.max_net_exposure {
            return Err(format!(
                "MaxNetExposure: projected net exposure {}c exceeds limit {}c",
                projected, limits.max_net_exposure
            ));
        }
        Ok(())
    }
}

pub struct MaxGrossExposure;

impl RiskRule for MaxGrossExposure {
    fn name(&self) -> &'static str {
        "MaxGrossExposure"
    }

    fn check(&self, order: &Order, ctx: &RiskContext, limits: &RiskLimits)
        -> Result<(), String> {
        // Conservative projection: an order can only add to gross.
        let projected = ctx.gross_exposure_cents + order_notional_cents(order);
        if projected > limits.max_gross_exposure {
            return Err(format!(
                "MaxGrossExposure: projected gross exposure {}c exceeds limit {}c",
                projected, limits.max_gross_exposure
            ));
        }
        Ok(())
    }
}

pub struct MaxDailyOrders;

impl RiskRule for MaxDailyOrders {
    fn name(&self) -> &'static str {
        "MaxDailyOrders"
    }

    fn check(&self, _order: &Order, ctx: &RiskContext, limits: &RiskLimits)
        -> Result<(), String> {
        if ctx.orders_submitted_today + 1 > limits.max_orders_per_day {
            return Err(format!(
                "MaxDailyOrders: {} orders already submitted today, limit {}",
                ctx.orders_submitted_today, limits.max_orders_per_day
            ));
        }
        Ok(())
    }
}

pub struct MaxDailyNotional;

impl RiskRule for MaxDailyNotional {
    fn name(&self) -> &'static str {
        "MaxDailyNotional"
    }

    fn check(&self, order: &Order, ctx: &RiskContext, limits: &RiskLimits)
        -> Result<(), String> {
        let projected = ctx.notional_traded_today_cents + order_notional_cents(order);
        if projected > limits.max_daily_notional {
            return Err(format!(
                "MaxDailyNotional: projected daily notional {}c exceeds limit {}c",
                projected, limits.max_daily_notional
            ));
        }
        Ok(())
    }
}

pub struct MaxDailyLoss;

impl RiskRule for MaxDailyLoss {
    fn name(&self) -> &'static str {
        "MaxDailyLoss"
    }

    fn check(&self, _order: &Order, ctx: &RiskContext, limits: &RiskLimits)
        -> Result<(), String> {
        if -ctx.daily_pnl_cents > limits.max_daily_loss {
            return Err(format!(
                "MaxDailyLoss: daily loss {}c exceeds limit {}c",
                -ctx.daily_pnl_cents, limits.max_daily_loss
            ));
        }
        Ok(())
    }
}

/// The standard chain, in priority order.
pub fn standard_rules() -> Vec<Box<dyn RiskRule>> {
    vec![
        Box::new(MaxOrderSize),
        Box::new(MaxOrderNotional),
        Box::new(MaxPositionSize),
        Box::new(MaxNetExposure),
        Box::new(MaxGrossExposure),
        Box::new(MaxDailyOrders),
        Box::new(MaxDailyNotional),
        Box::new(MaxDailyLoss),
    ]
}
