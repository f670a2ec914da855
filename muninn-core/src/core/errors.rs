//! Domain error types for engine operations
//!
//! Validation errors are caller programming faults and are surfaced
//! synchronously. Illegal state transitions are a bug class and fail
//! loudly. Both are kept separate from risk rejections, which are plain
//! reason strings and never reach these enums.

use crate::core::types::OrderStatus;
use std::fmt;

/// Caller programming faults detected before an order enters the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Quantity must be strictly positive
    NonPositiveQuantity { quantity: i64 },
    /// Limit and stop-limit orders need a positive limit price
    MissingLimitPrice,
    /// Stop and stop-limit orders need a positive stop price
    MissingStopPrice,
    /// Symbol ticker is empty
    EmptyTicker,
    /// Price scale must be strictly positive
    BadPriceScale { price_scale: i64 },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NonPositiveQuantity { quantity } => {
                write!(f, "order quantity must be positive, got {}", quantity)
            }
            ValidationError::MissingLimitPrice => {
                write!(f, "limit order requires a positive limit price")
            }
            ValidationError::MissingStopPrice => {
                write!(f, "stop order requires a positive stop price")
            }
            ValidationError::EmptyTicker => write!(f, "symbol ticker is empty"),
            ValidationError::BadPriceScale { price_scale } => {
                write!(f, "price scale must be positive, got {}", price_scale)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Failures inside the engine's order and position bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// A forward transition the status machine does not allow
    IllegalTransition {
        client_order_id: i64,
        from: OrderStatus,
        to: OrderStatus,
    },
    /// `track` called twice with the same client order id
    DuplicateOrder { client_order_id: i64 },
    /// Lookup by an id the manager has never seen
    UnknownOrder { client_order_id: i64 },
    /// A fill whose quantity exceeds the order's remaining quantity
    Overfill {
        client_order_id: i64,
        fill_quantity: i64,
        remaining: i64,
    },
    /// A fill with zero or negative quantity or price
    BadFill {
        client_order_id: i64,
        quantity: i64,
        price: i64,
    },
    /// A trade whose price scale disagrees with the position it updates
    PriceScaleMismatch {
        ticker: String,
        position_scale: i64,
        trade_scale: i64,
    },
    /// The engine is not running
    NotRunning,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::IllegalTransition {
                client_order_id,
                from,
                to,
            } => write!(
                f,
                "illegal transition for order {}: {} -> {}",
                client_order_id, from, to
            ),
            EngineError::DuplicateOrder { client_order_id } => {
                write!(f, "duplicate client order id {}", client_order_id)
            }
            EngineError::UnknownOrder { client_order_id } => {
                write!(f, "unknown client order id {}", client_order_id)
            }
            EngineError::Overfill {
                client_order_id,
                fill_quantity,
                remaining,
            } => write!(
                f,
                "fill of {} exceeds remaining {} on order {}",
                fill_quantity, remaining, client_order_id
            ),
            EngineError::BadFill {
                client_order_id,
                quantity,
                price,
            } => write!(
                f,
                "invalid fill on order {}: quantity={} price={}",
                client_order_id, quantity, price
            ),
            EngineError::PriceScaleMismatch {
                ticker,
                position_scale,
                trade_scale,
            } => write!(
                f,
                "price scale mismatch on {}: position has {}, trade has {}",
                ticker, position_scale, trade_scale
            ),
            EngineError::NotRunning => write!(f, "engine is not running"),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illegal_transition_display() {
        let err = EngineError::IllegalTransition {
            client_order_id: 7,
            from: OrderStatus::Filled,
            to: OrderStatus::Accepted,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("illegal transition"));
        assert!(msg.contains("FILLED"));
        assert!(msg.contains("ACCEPTED"));
    }

    #[test]
    fn test_validation_display() {
        let err = ValidationError::NonPositiveQuantity { quantity: -5 };
        assert!(format!("{}", err).contains("-5"));

        let err = ValidationError::BadPriceScale { price_scale: 0 };
        assert!(format!("{}", err).contains("price scale"));
    }

    #[test]
    fn test_price_scale_mismatch_display() {
        let err = EngineError::PriceScaleMismatch {
            ticker: "BTCUSDT".to_string(),
            position_scale: 100_000_000,
            trade_scale: 100,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("BTCUSDT"));
        assert!(msg.contains("100000000"));
    }
}
