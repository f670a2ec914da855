//! Position book
//!
//! One running [`Position`] per symbol ever touched, updated on every fill
//! and marked to market on every quote. Quantities are signed (long
//! positive, short negative); prices are minor units at the position's
//! price scale. All P&L arithmetic widens to i128 and truncates toward
//! zero.
//!
//! Trade application has three branches on the sign relationship between
//! the current quantity `q` and the signed trade size `t`:
//!
//! 1. increasing exposure (flat, or same sign): re-average the entry price
//! 2. reducing exposure (`|t| <= |q|`): realize `|t| * (p - entry) * sign(q)
//!    / scale`, entry unchanged
//! 3. flipping (`|t| > |q|`): realize on the `|q|` portion, then open the
//!    remainder at the trade price with a fresh `opened_at`
//!
//! Mutation happens only on the position-handler thread; readers take
//! short read guards and receive clones.

use crate::core::errors::EngineError;
use crate::core::types::{fixed, Symbol, Trade};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Invoked synchronously after every position change, on the handler
/// thread. Listeners must not publish events and must not block.
pub type PositionListener = Box<dyn Fn(&Position) + Send + Sync>;

/// Per-symbol running position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    /// Signed: long positive, short negative, zero flat.
    pub quantity: i64,
    /// Weighted mean price of the open exposure, minor units.
    pub average_entry_price: i64,
    /// Cost of the open exposure, minor units: |quantity| * entry / scale.
    pub total_cost: i64,
    /// Cumulative realized P&L, minor units.
    pub realized_pnl: i64,
    /// Last mark price, minor units.
    pub current_price: i64,
    /// quantity * current_price / scale, minor units (signed).
    pub market_value: i64,
    /// quantity * (current_price - entry) / scale, minor units.
    pub unrealized_pnl: i64,
    /// Lowest total P&L (realized + unrealized) observed since open.
    pub max_drawdown: i64,
    /// Epoch nanoseconds of the first fill of the current exposure.
    pub opened_at: i64,
    pub price_scale: i64,
}

impl Position {
    fn flat(symbol: Symbol, price_scale: i64) -> Self {
        Self {
            symbol,
            quantity: 0,
            average_entry_price: 0,
            total_cost: 0,
            realized_pnl: 0,
            current_price: 0,
            market_value: 0,
            unrealized_pnl: 0,
            max_drawdown: 0,
            opened_at: 0,
            price_scale,
        }
    }

    #[inline]
    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    #[inline]
    pub fn is_long(&self) -> bool {
        self.quantity > 0
    }

    #[inline]
    pub fn is_short(&self) -> bool {
        self.quantity < 0
    }

    /// Realized plus unrealized, minor units.
    #[inline]
    pub fn total_pnl(&self) -> i64 {
        self.realized_pnl + self.unrealized_pnl
    }

    /// Total P&L normalised to cents for cross-venue comparison.
    #[inline]
    pub fn total_pnl_cents(&self) -> i64 {
        fixed::to_cents(self.total_pnl(), self.price_scale)
    }

    fn remark(&mut self, price: i64) {
        self.current_price = price;
        self.market_value = fixed::notional(self.quantity, price, self.price_scale);
        self.unrealized_pnl = if self.quantity == 0 {
            0
        } else {
            fixed::notional(self.quantity, price - self.average_entry_price, self.price_scale)
        };
        let total = self.total_pnl();
        if total < self.max_drawdown {
            self.max_drawdown = total;
        }
    }
}

/// Outcome of applying one trade.
#[derive(Debug, Clone)]
pub struct AppliedTrade {
    /// Realized P&L contributed by this trade, minor units at the
    /// position's scale.
    pub realized_delta: i64,
    /// Position state after the trade.
    pub position: Position,
}

/// Engine-owned book of positions.
pub struct PositionBook {
    positions: RwLock<HashMap<Symbol, Position>>,
    listeners: RwLock<Vec<PositionListener>>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self {
            positions: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn add_listener(&self, listener: PositionListener) {
        self.listeners.write().push(listener);
    }

    /// Apply a fill to the symbol's position.
    ///
    /// A trade whose price scale disagrees with an existing position is
    /// rejected outright; coercion would silently corrupt cross-scale
    /// P&L normalisation.
    pub fn apply_trade(&self, trade: &Trade) -> Result<AppliedTrade, EngineError> {
        let snapshot = {
            let mut positions = self.positions.write();
            let position = positions
                .entry(trade.symbol.clone())
                .or_insert_with(|| Position::flat(trade.symbol.clone(), trade.price_scale));

            if position.price_scale != trade.price_scale {
                return Err(EngineError::PriceScaleMismatch {
                    ticker: trade.symbol.ticker.clone(),
                    position_scale: position.price_scale,
                    trade_scale: trade.price_scale,
                });
            }

            let realized_delta = apply(position, trade);
            AppliedTrade {
                realized_delta,
                position: position.clone(),
            }
        };

        self.notify(&snapshot.position);
        Ok(snapshot)
    }

    /// Re-mark a symbol against a new price. No-op for untouched symbols.
    pub fn update_market_value(&self, symbol: &Symbol, price: i64) -> Option<Position> {
        let snapshot = {
            let mut positions = self.positions.write();
            let position = positions.get_mut(symbol)?;
            position.remark(price);
            position.clone()
        };
        self.notify(&snapshot);
        Some(snapshot)
    }

    /// Rebuild a position from a persisted snapshot without replaying
    /// trades. Used at cold start; does not notify listeners.
    pub fn restore_position(&self, position: Position) {
        self.positions
            .write()
            .insert(position.symbol.clone(), position);
    }

    pub fn get(&self, symbol: &Symbol) -> Option<Position> {
        self.positions.read().get(symbol).cloned()
    }

    pub fn all(&self) -> Vec<Position> {
        self.positions.read().values().cloned().collect()
    }

    /// Count of non-flat positions.
    pub fn open_count(&self) -> usize {
        self.positions
            .read()
            .values()
            .filter(|p| !p.is_flat())
            .count()
    }

    /// Signed sum of position market values, normalised to cents.
    pub fn net_exposure_cents(&self) -> i64 {
        self.positions
            .read()
            .values()
            .map(|p| fixed::to_cents(p.market_value, p.price_scale))
            .sum()
    }

    /// Sum of absolute position market values, normalised to cents.
    pub fn gross_exposure_cents(&self) -> i64 {
        self.positions
            .read()
            .values()
            .map(|p| fixed::to_cents(p.market_value.abs(), p.price_scale))
            .sum()
    }

    /// Total P&L across positions, normalised to cents.
    pub fn total_pnl_cents(&self) -> i64 {
        self.positions
            .read()
            .values()
            .map(|p| p.total_pnl_cents())
            .sum()
    }

    fn notify(&self, position: &Position) {
        for listener in self.listeners.read().iter() {
            listener(position);
        }
    }
}

impl Default for PositionBook {
    fn default() -> Self {
        Self::new()
    }
}

/// The three-branch trade application. Returns the realized P&L delta in
/// minor units.
fn apply(position: &mut Position, trade: &Trade) -> i64 {
    let q = position.quantity;
    let t = trade.signed_quantity();
    let p = trade.price;
    let scale = position.price_scale;

    let realized_delta = if q == 0 || (q > 0) == (t > 0) {
        // Increasing exposure: re-average the entry.
        position.average_entry_price = fixed::weighted_average(
            position.average_entry_price,
            q.abs(),
            p,
            t.abs(),
        );
        if q == 0 {
            position.opened_at = trade.executed_at;
            position.max_drawdown = position.max_drawdown.min(0);
        }
        position.quantity = q + t;
        0
    } else if t.abs() <= q.abs() {
        // Reducing exposure: realize on the closed portion.
        let sign = if q > 0 { 1 } else { -1 };
        let delta = fixed::notional(
            t.abs() * sign,
            p - position.average_entry_price,
            scale,
        );
        position.quantity = q + t;
        delta
    } else {
        // Flip: close the whole position, open the remainder at p.
        let sign = if q > 0 { 1 } else { -1 };
        let delta = fixed::notional(q.abs() * sign, p - position.average_entry_price, scale);
        position.quantity = q + t;
        position.average_entry_price = p;
        position.opened_at = trade.executed_at;
        debug!(
            symbol = %position.symbol,
            new_quantity = position.quantity,
            "position flipped"
        );
        delta
    };

    position.realized_pnl += realized_delta;
    if position.quantity == 0 {
        position.average_entry_price = 0;
        position.total_cost = 0;
    } else {
        position.total_cost = fixed::notional(
            position.quantity.abs(),
            position.average_entry_price,
            scale,
        );
    }
    position.remark(p);
    realized_delta
}
