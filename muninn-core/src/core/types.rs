//! Core domain types for the trading engine
//!
//! All monetary amounts are signed 64-bit integers in minor units, paired
//! with a per-symbol `price_scale` (minor units per 1.0 of price). Equities
//! use scale 100 (cents), crypto pairs use scale 100_000_000 (eight
//! decimals). Arithmetic that multiplies price by quantity widens through
//! i128 and scales back down, truncating toward zero.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Venue a symbol trades on.
///
/// Single byte enum; the discriminant is the on-disk encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Exchange {
    Alpaca = 0,
    Binance = 1,
    Sim = 2,
}

impl Exchange {
    /// Minor units per 1.0 of price on this venue.
    #[inline]
    pub const fn default_price_scale(&self) -> i64 {
        match self {
            Exchange::Alpaca => fixed::CENTS_SCALE,
            Exchange::Binance => fixed::CRYPTO_SCALE,
            Exchange::Sim => fixed::CENTS_SCALE,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Exchange::Alpaca),
            1 => Some(Exchange::Binance),
            2 => Some(Exchange::Sim),
            _ => None,
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exchange::Alpaca => write!(f, "ALPACA"),
            Exchange::Binance => write!(f, "BINANCE"),
            Exchange::Sim => write!(f, "SIM"),
        }
    }
}

/// A tradeable instrument: ticker plus venue.
///
/// Equality and hashing are by the pair. Carries no mutable state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub ticker: String,
    pub exchange: Exchange,
}

impl Symbol {
    pub fn new(ticker: impl Into<String>, exchange: Exchange) -> Self {
        Self {
            ticker: ticker.into(),
            exchange,
        }
    }

    /// Equity on Alpaca (scale 100).
    pub fn equity(ticker: impl Into<String>) -> Self {
        Self::new(ticker, Exchange::Alpaca)
    }

    /// Crypto pair on Binance (scale 100_000_000).
    pub fn crypto(ticker: impl Into<String>) -> Self {
        Self::new(ticker, Exchange::Binance)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.ticker, self.exchange)
    }
}

/// Order side (Buy or Sell)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    Buy = 0,
    Sell = 1,
}

impl Side {
    /// Signed quantity for this side: positive for Buy, negative for Sell.
    #[inline(always)]
    pub const fn signed(&self, quantity: i64) -> i64 {
        match self {
            Side::Buy => quantity,
            Side::Sell => -quantity,
        }
    }

    #[inline]
    pub const fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Side::Buy),
            1 => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderType {
    Market = 0,
    Limit = 1,
    Stop = 2,
    StopLimit = 3,
}

impl OrderType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(OrderType::Market),
            1 => Some(OrderType::Limit),
            2 => Some(OrderType::Stop),
            3 => Some(OrderType::StopLimit),
            _ => None,
        }
    }
}

/// Time-in-force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum TimeInForce {
    Day = 0,
    Gtc = 1,
    Ioc = 2,
    Fok = 3,
}

impl TimeInForce {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(TimeInForce::Day),
            1 => Some(TimeInForce::Gtc),
            2 => Some(TimeInForce::Ioc),
            3 => Some(TimeInForce::Fok),
            _ => None,
        }
    }
}

/// Order status
///
/// This is the canonical status definition used throughout the codebase.
/// Terminal states are never left once entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OrderStatus {
    Pending = 0,
    Submitted = 1,
    Accepted = 2,
    PartiallyFilled = 3,
    Filled = 4,
    Cancelled = 5,
    Rejected = 6,
    Expired = 7,
}

impl OrderStatus {
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Cancelled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(OrderStatus::Pending),
            1 => Some(OrderStatus::Submitted),
            2 => Some(OrderStatus::Accepted),
            3 => Some(OrderStatus::PartiallyFilled),
            4 => Some(OrderStatus::Filled),
            5 => Some(OrderStatus::Cancelled),
            6 => Some(OrderStatus::Rejected),
            7 => Some(OrderStatus::Expired),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Submitted => "SUBMITTED",
            OrderStatus::Accepted => "ACCEPTED",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
        };
        write!(f, "{s}")
    }
}

/// A live order tracked by the engine.
///
/// Invariants:
/// - `0 <= filled_quantity <= quantity`
/// - `average_filled_price == 0` while `filled_quantity == 0`
/// - once `status == Filled`, `filled_quantity == quantity` and the order
///   is immutable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Monotonic within the process; assigned at publish time.
    pub client_order_id: i64,
    /// Set when the exchange accepts the order.
    pub exchange_order_id: Option<String>,
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    /// Quantity in instrument units.
    pub quantity: i64,
    /// Limit price in minor units (0 for market orders).
    pub price: i64,
    /// Stop trigger price in minor units (0 unless Stop/StopLimit).
    pub stop_price: i64,
    /// Minor units per 1.0 of price.
    pub price_scale: i64,
    pub filled_quantity: i64,
    /// Running average fill price in minor units; 0 while unfilled.
    pub average_filled_price: i64,
    pub status: OrderStatus,
    pub reject_reason: Option<String>,
    /// Originating strategy, if any; fills route back to it.
    pub strategy_id: Option<String>,
    /// Epoch nanoseconds.
    pub created_at: i64,
    /// Epoch nanoseconds; 0 until submitted.
    pub submitted_at: i64,
    pub last_updated_at: i64,
    /// created -> submitted transition latency.
    pub submit_latency_ns: i64,
    /// submitted -> accepted transition latency.
    pub ack_latency_ns: i64,
}

impl Order {
    #[inline]
    pub fn remaining_quantity(&self) -> i64 {
        self.quantity.saturating_sub(self.filled_quantity)
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Order notional in minor units at the limit price.
    #[inline]
    pub fn notional(&self) -> i64 {
        fixed::notional(self.quantity, self.price, self.price_scale)
    }
}

/// A request to create an order, before an id has been assigned.
///
/// This is what strategies and API callers hand to the engine; the engine
/// allocates the `client_order_id` and stamps the timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    pub quantity: i64,
    pub price: i64,
    pub stop_price: i64,
    pub price_scale: i64,
    pub strategy_id: Option<String>,
}

impl OrderRequest {
    /// A limit order with the symbol's default price scale.
    pub fn limit(symbol: Symbol, side: Side, quantity: i64, price: i64) -> Self {
        let price_scale = symbol.exchange.default_price_scale();
        Self {
            symbol,
            side,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Day,
            quantity,
            price,
            stop_price: 0,
            price_scale,
            strategy_id: None,
        }
    }

    /// A market order with the symbol's default price scale.
    pub fn market(symbol: Symbol, side: Side, quantity: i64) -> Self {
        let price_scale = symbol.exchange.default_price_scale();
        Self {
            symbol,
            side,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Day,
            quantity,
            price: 0,
            stop_price: 0,
            price_scale,
            strategy_id: None,
        }
    }

    pub fn with_strategy(mut self, strategy_id: impl Into<String>) -> Self {
        self.strategy_id = Some(strategy_id.into());
        self
    }

    /// Materialize the request into a tracked `Order`.
    pub fn into_order(self, client_order_id: i64, now_nanos: i64) -> Order {
        Order {
            client_order_id,
            exchange_order_id: None,
            symbol: self.symbol,
            side: self.side,
            order_type: self.order_type,
            time_in_force: self.time_in_force,
            quantity: self.quantity,
            price: self.price,
            stop_price: self.stop_price,
            price_scale: self.price_scale,
            filled_quantity: 0,
            average_filled_price: 0,
            status: OrderStatus::Pending,
            reject_reason: None,
            strategy_id: self.strategy_id,
            created_at: now_nanos,
            submitted_at: 0,
            last_updated_at: now_nanos,
            submit_latency_ns: 0,
            ack_latency_ns: 0,
        }
    }
}

/// Immutable execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: i64,
    /// Execution price in minor units.
    pub price: i64,
    pub client_order_id: i64,
    pub exchange_trade_id: String,
    /// Epoch nanoseconds.
    pub executed_at: i64,
    pub price_scale: i64,
}

impl Trade {
    /// Signed quantity: positive for Buy, negative for Sell.
    #[inline]
    pub fn signed_quantity(&self) -> i64 {
        self.side.signed(self.quantity)
    }

    /// Trade notional in minor units.
    #[inline]
    pub fn notional(&self) -> i64 {
        fixed::notional(self.quantity, self.price, self.price_scale)
    }
}

/// Top-of-book quote.
///
/// `bid_price <= ask_price` is guaranteed by the market-data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: Symbol,
    pub bid_price: i64,
    pub ask_price: i64,
    pub bid_size: i64,
    pub ask_size: i64,
    pub timestamp_nanos: i64,
    pub price_scale: i64,
}

impl Quote {
    /// Mid price in minor units, truncating toward zero.
    #[inline]
    pub fn mid_price(&self) -> i64 {
        (self.bid_price + self.ask_price) / 2
    }

    /// Best price on the aggressive side for the given order side.
    #[inline]
    pub fn aggressive_price(&self, side: Side) -> i64 {
        match side {
            Side::Buy => self.ask_price,
            Side::Sell => self.bid_price,
        }
    }
}

/// Fixed-point helpers for per-symbol scaled integer arithmetic.
///
/// All intermediate products widen to i128; division truncates toward
/// zero, matching Rust's `/` on signed integers.
pub mod fixed {
    /// Scale for two-decimal venues (cents).
    pub const CENTS_SCALE: i64 = 100;

    /// Scale for eight-decimal crypto venues.
    pub const CRYPTO_SCALE: i64 = 100_000_000;

    /// `quantity * price / scale`, in minor units.
    #[inline(always)]
    pub fn notional(quantity: i64, price: i64, scale: i64) -> i64 {
        if scale == 0 {
            return 0;
        }
        ((quantity as i128 * price as i128) / scale as i128) as i64
    }

    /// Normalise a minor-unit value at `scale` to cents (scale 100).
    ///
    /// This is the cross-venue comparison scale: every position's P&L is
    /// brought to cents before summation or limit checks.
    #[inline(always)]
    pub fn to_cents(value: i64, scale: i64) -> i64 {
        if scale == 0 {
            return 0;
        }
        ((value as i128 * CENTS_SCALE as i128) / scale as i128) as i64
    }

    /// Running weighted average: `(avg*filled + px*qty) / (filled+qty)`.
    ///
    /// Returns the previous average unchanged if the combined quantity is
    /// zero.
    #[inline(always)]
    pub fn weighted_average(avg: i64, filled: i64, price: i64, quantity: i64) -> i64 {
        let total = filled as i128 + quantity as i128;
        if total == 0 {
            return avg;
        }
        ((avg as i128 * filled as i128 + price as i128 * quantity as i128) / total) as i64
    }
}
