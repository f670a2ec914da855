//! Audit trail events
//!
//! Every state-changing failure and lifecycle transition produces one of
//! these before the operation returns. They are persisted by the audit
//! journal and kept in a bounded in-memory deque for inspection.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Audit event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AuditKind {
    EngineStarted = 0,
    EngineStopped = 1,
    StrategyStarted = 2,
    StrategyStopped = 3,
    OrderSubmitted = 4,
    OrderRejected = 5,
    OrderFilled = 6,
    RiskCheckFailed = 7,
    CircuitBreakerTripped = 8,
    TradingDisabled = 9,
    PositionUpdated = 10,
    Error = 11,
}

impl AuditKind {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(AuditKind::EngineStarted),
            1 => Some(AuditKind::EngineStopped),
            2 => Some(AuditKind::StrategyStarted),
            3 => Some(AuditKind::StrategyStopped),
            4 => Some(AuditKind::OrderSubmitted),
            5 => Some(AuditKind::OrderRejected),
            6 => Some(AuditKind::OrderFilled),
            7 => Some(AuditKind::RiskCheckFailed),
            8 => Some(AuditKind::CircuitBreakerTripped),
            9 => Some(AuditKind::TradingDisabled),
            10 => Some(AuditKind::PositionUpdated),
            11 => Some(AuditKind::Error),
            _ => None,
        }
    }
}

impl fmt::Display for AuditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditKind::EngineStarted => "ENGINE_STARTED",
            AuditKind::EngineStopped => "ENGINE_STOPPED",
            AuditKind::StrategyStarted => "STRATEGY_STARTED",
            AuditKind::StrategyStopped => "STRATEGY_STOPPED",
            AuditKind::OrderSubmitted => "ORDER_SUBMITTED",
            AuditKind::OrderRejected => "ORDER_REJECTED",
            AuditKind::OrderFilled => "ORDER_FILLED",
            AuditKind::RiskCheckFailed => "RISK_CHECK_FAILED",
            AuditKind::CircuitBreakerTripped => "CIRCUIT_BREAKER_TRIPPED",
            AuditKind::TradingDisabled => "TRADING_DISABLED",
            AuditKind::PositionUpdated => "POSITION_UPDATED",
            AuditKind::Error => "ERROR",
        };
        write!(f, "{s}")
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp_nanos: i64,
    pub kind: AuditKind,
    pub message: String,
    /// Free-form structured context.
    pub details: serde_json::Value,
}

impl AuditEvent {
    pub fn new(kind: AuditKind, message: impl Into<String>) -> Self {
        Self {
            timestamp_nanos: crate::utils::clock::epoch_nanos(),
            kind,
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Shared sink the engine hands to subsystems that emit audit events.
#[derive(Clone)]
pub struct AuditSink(Arc<dyn Fn(AuditEvent) + Send + Sync>);

impl AuditSink {
    pub fn new(f: impl Fn(AuditEvent) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn emit(&self, event: AuditEvent) {
        (self.0.as_ref())(event);
    }
}

/// A sink that drops everything, for components wired up in isolation.
pub fn null_audit_sink() -> AuditSink {
    AuditSink::new(|_| {})
}
