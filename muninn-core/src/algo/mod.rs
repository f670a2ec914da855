//! Algorithm framework
//!
//! Algorithms are polymorphic components behind one trait, not a class
//! tree: the engine owns a registry of `Box<dyn Algorithm>` keyed by
//! strategy id and drives them through the dispatcher. Variant-specific
//! state (EMA values, rolling windows, slice counters) lives inside the
//! variant.
//!
//! Callback discipline: quotes, fills, and timer ticks are all delivered
//! on the dispatcher thread, so an algorithm sees interleaved callbacks
//! but never concurrent ones.

pub mod context;
pub mod definition;
pub mod dispatch;

pub use context::{AlgoContext, OrderGateway, UniformVolumeProfile, VolumeProfileSource};
pub use definition::{AlgoState, StrategyDefinition};
pub use dispatch::{DispatchMessage, Dispatcher};

use crate::core::types::{Quote, Trade};
use anyhow::Result;

/// One trading algorithm (alpha or execution).
pub trait Algorithm: Send {
    /// The persisted definition: id, display name, variant tag, symbols,
    /// parameters, and current lifecycle state.
    fn definition(&self) -> StrategyDefinition;

    fn state(&self) -> AlgoState;

    /// Bind the context. NEW -> INITIALIZED.
    fn initialize(&mut self, ctx: AlgoContext) -> Result<()>;

    /// INITIALIZED -> RUNNING.
    fn start(&mut self) -> Result<()>;

    /// RUNNING -> PAUSED.
    fn pause(&mut self) -> Result<()>;

    /// PAUSED -> RUNNING.
    fn resume(&mut self) -> Result<()>;

    /// Any non-terminal state -> CANCELLED.
    fn cancel(&mut self) -> Result<()>;

    /// A quote for a subscribed symbol. Only called while RUNNING.
    fn on_quote(&mut self, quote: &Quote);

    /// A fill for an order this strategy submitted.
    fn on_fill(&mut self, trade: &Trade);

    /// Cooperative timer tick, monotonic nanoseconds since engine start.
    fn on_timer(&mut self, now_nanos: i64);

    /// Completion fraction in [0, 1]; alpha strategies stay at 0.
    fn progress(&self) -> f64 {
        0.0
    }
}
