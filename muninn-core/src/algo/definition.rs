//! Persisted strategy definitions and the algorithm lifecycle states

use crate::core::types::{Exchange, Symbol};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Algorithm lifecycle.
///
/// ```text
/// NEW -> INITIALIZED -> RUNNING <-> PAUSED -> (CANCELLED | COMPLETED | FAILED)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AlgoState {
    New = 0,
    Initialized = 1,
    Running = 2,
    Paused = 3,
    Cancelled = 4,
    Completed = 5,
    Failed = 6,
}

impl AlgoState {
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            AlgoState::Cancelled | AlgoState::Completed | AlgoState::Failed
        )
    }

    /// Whether the lifecycle permits moving to `to` from here.
    pub fn can_transition_to(&self, to: AlgoState) -> bool {
        use AlgoState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, to) {
            (New, Initialized) => true,
            (Initialized, Running) => true,
            (Running, Paused) | (Paused, Running) => true,
            (Running | Paused | Initialized, Cancelled | Completed | Failed) => true,
            _ => false,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(AlgoState::New),
            1 => Some(AlgoState::Initialized),
            2 => Some(AlgoState::Running),
            3 => Some(AlgoState::Paused),
            4 => Some(AlgoState::Cancelled),
            5 => Some(AlgoState::Completed),
            6 => Some(AlgoState::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for AlgoState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlgoState::New => "NEW",
            AlgoState::Initialized => "INITIALIZED",
            AlgoState::Running => "RUNNING",
            AlgoState::Paused => "PAUSED",
            AlgoState::Cancelled => "CANCELLED",
            AlgoState::Completed => "COMPLETED",
            AlgoState::Failed => "FAILED",
        };
        write!(f, "{s}")
    }
}

/// What the strategy journal persists for each registered algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDefinition {
    pub id: String,
    pub display_name: String,
    /// Variant tag, e.g. "momentum", "twap".
    pub algo_type: String,
    pub symbols: Vec<Symbol>,
    pub exchange: Exchange,
    /// Variant-specific parameters.
    pub parameters: serde_json::Value,
    pub state: AlgoState,
}

impl StrategyDefinition {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        algo_type: impl Into<String>,
        symbols: Vec<Symbol>,
        exchange: Exchange,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            algo_type: algo_type.into(),
            symbols,
            exchange,
            parameters,
            state: AlgoState::New,
        }
    }
}
