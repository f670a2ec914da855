//! TWAP execution - equal time slices with cumulative catch-up
//!
//! Works a parent quantity across `[start, end)` in fixed intervals:
//!
//! ```text
//! total_slices   = floor((end - start) / slice_interval)
//! qty_per_slice  = ceil(total_qty / total_slices)
//! k              = floor((now - start) / slice_interval)
//! expected(k)    = min(total_qty, (k + 1) * qty_per_slice)
//! ```
//!
//! On each timer tick the strategy submits the gap between `expected(k)`
//! and what it has already sent, as a limit order at the mid. Missed
//! ticks are therefore caught up cumulatively; a catch-up larger than
//! one nominal slice is logged and left to the risk gate to bound.
//!
//! All times are monotonic nanoseconds on the engine's clock.

use crate::transition;
use anyhow::{bail, Result};
use muninn_core::algo::{AlgoContext, AlgoState, Algorithm, StrategyDefinition};
use muninn_core::core::types::{OrderRequest, OrderType, Quote, Side, Symbol, TimeInForce, Trade};
use serde_json::json;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct TwapParams {
    pub symbol: Symbol,
    pub side: Side,
    pub total_quantity: i64,
    /// Monotonic nanoseconds (engine clock).
    pub start_nanos: i64,
    pub end_nanos: i64,
    pub slice_interval_nanos: i64,
}

pub struct Twap {
    id: String,
    params: TwapParams,
    state: AlgoState,
    ctx: Option<AlgoContext>,
    total_slices: i64,
    qty_per_slice: i64,
    submitted: i64,
    filled: i64,
    last_sent_slice: i64,
}

impl Twap {
    pub fn new(id: impl Into<String>, params: TwapParams) -> Result<Self> {
        if params.total_quantity <= 0 {
            bail!("twap total quantity must be positive");
        }
        if params.slice_interval_nanos <= 0 || params.end_nanos <= params.start_nanos {
            bail!("twap interval is empty");
        }
        let total_slices =
            ((params.end_nanos - params.start_nanos) / params.slice_interval_nanos).max(1);
        let qty_per_slice = (params.total_quantity + total_slices - 1) / total_slices;

        Ok(Self {
            id: id.into(),
            params,
            state: AlgoState::New,
            ctx: None,
            total_slices,
            qty_per_slice,
            submitted: 0,
            filled: 0,
            last_sent_slice: -1,
        })
    }

    pub fn filled_quantity(&self) -> i64 {
        self.filled
    }

    fn complete(&mut self) {
        if self.state.can_transition_to(AlgoState::Completed) {
            self.state = AlgoState::Completed;
            if let Some(ctx) = self.ctx.as_ref() {
                ctx.log("twap complete");
            }
        }
    }

    fn send_slice(&mut self, quantity: i64, price: i64, price_scale: i64) {
        let Some(ctx) = self.ctx.as_ref() else {
            return;
        };
        let request = OrderRequest {
            symbol: self.params.symbol.clone(),
            side: self.params.side,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Day,
            quantity,
            price,
            stop_price: 0,
            price_scale,
            strategy_id: None,
        };
        match ctx.submit_order(request) {
            Ok(id) => {
                self.submitted += quantity;
                debug!(strategy = %self.id, order = id, quantity, "twap slice");
            }
            Err(reason) => ctx.log(&format!("twap slice rejected: {reason}")),
        }
    }
}

impl Algorithm for Twap {
    fn definition(&self) -> StrategyDefinition {
        let mut definition = StrategyDefinition::new(
            self.id.clone(),
            format!("TWAP {} {}", self.params.side, self.params.symbol.ticker),
            "twap",
            vec![self.params.symbol.clone()],
            self.params.symbol.exchange,
            json!({
                "side": self.params.side.to_string(),
                "total_quantity": self.params.total_quantity,
                "start_nanos": self.params.start_nanos,
                "end_nanos": self.params.end_nanos,
                "slice_interval_nanos": self.params.slice_interval_nanos,
            }),
        );
        definition.state = self.state;
        definition
    }

    fn state(&self) -> AlgoState {
        self.state
    }

    fn initialize(&mut self, ctx: AlgoContext) -> Result<()> {
        transition(&mut self.state, AlgoState::Initialized)?;
        self.ctx = Some(ctx);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        transition(&mut self.state, AlgoState::Running)
    }

    fn pause(&mut self) -> Result<()> {
        transition(&mut self.state, AlgoState::Paused)
    }

    fn resume(&mut self) -> Result<()> {
        transition(&mut self.state, AlgoState::Running)
    }

    fn cancel(&mut self) -> Result<()> {
        transition(&mut self.state, AlgoState::Cancelled)
    }

    fn on_quote(&mut self, _quote: &Quote) {
        // Slicing is timer-driven; quotes only refresh the cache the
        // ticks price from.
    }

    fn on_fill(&mut self, trade: &Trade) {
        self.filled += trade.quantity;
        if self.filled >= self.params.total_quantity {
            self.complete();
        }
    }

    fn on_timer(&mut self, now_nanos: i64) {
        if self.state != AlgoState::Running {
            return;
        }
        if self.filled >= self.params.total_quantity {
            self.complete();
            return;
        }
        if now_nanos >= self.params.end_nanos {
            // Interval over; whatever is unfilled stays with the child
            // orders already working.
            self.complete();
            return;
        }
        if now_nanos < self.params.start_nanos {
            return;
        }

        let k = ((now_nanos - self.params.start_nanos) / self.params.slice_interval_nanos)
            .min(self.total_slices - 1);
        if k <= self.last_sent_slice {
            return;
        }

        let expected = ((k + 1) * self.qty_per_slice).min(self.params.total_quantity);
        let missing = expected - self.submitted;
        self.last_sent_slice = k;
        if missing <= 0 {
            return;
        }
        if missing > self.qty_per_slice {
            // Catch-up after missed ticks; the risk gate is the bound.
            warn!(
                strategy = %self.id,
                missing,
                qty_per_slice = self.qty_per_slice,
                "twap catch-up slice exceeds nominal size"
            );
        }

        let Some(quote) = self
            .ctx
            .as_ref()
            .and_then(|ctx| ctx.latest_quote(&self.params.symbol))
        else {
            // No market yet; retry on the next tick.
            self.last_sent_slice = k - 1;
            return;
        };
        self.send_slice(missing, quote.mid_price(), quote.price_scale);
    }

    fn progress(&self) -> f64 {
        if self.params.total_quantity == 0 {
            return 1.0;
        }
        (self.filled as f64 / self.params.total_quantity as f64).clamp(0.0, 1.0)
    }
}
