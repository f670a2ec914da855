//! Core domain model
//!
//! Value types shared by every subsystem: symbols, orders, trades, quotes,
//! and the fixed-point helpers for per-symbol scaled integer arithmetic.

pub mod audit;
pub mod errors;
pub mod types;

pub use audit::{AuditEvent, AuditKind, AuditSink};
pub use errors::{EngineError, ValidationError};
pub use types::{
    fixed, Exchange, Order, OrderRequest, OrderStatus, OrderType, Quote, Side, Symbol,
    TimeInForce, Trade,
};
