//! VWAP execution - volume-profile pacing with a participation cap
//!
//! Distributes a parent quantity across `B` time buckets in proportion to
//! a historical volume profile `v[0..B-1]` (fractions summing to 1):
//!
//! ```text
//! target_cum(k) = total_qty * (v[0] + ... + v[k])
//! required      = target_cum(k) - submitted
//! cap           = max_participation_rate * estimated_bucket_volume
//! child         = min(required, cap)
//! ```
//!
//! Children are limit orders at the best quote on the aggressive side
//! (the ask for buys, the bid for sells). The displayed top-of-book size
//! on that side is the bucket volume estimate the participation cap
//! applies to.

use crate::transition;
use anyhow::{bail, Result};
use muninn_core::algo::{AlgoContext, AlgoState, Algorithm, StrategyDefinition};
use muninn_core::core::types::{OrderRequest, OrderType, Quote, Side, Symbol, TimeInForce, Trade};
use serde_json::json;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct VwapParams {
    pub symbol: Symbol,
    pub side: Side,
    pub total_quantity: i64,
    /// Monotonic nanoseconds (engine clock).
    pub start_nanos: i64,
    pub end_nanos: i64,
    /// Number of time buckets across the interval.
    pub buckets: usize,
    /// Ceiling on submitted / estimated bucket volume, in (0, 1].
    pub max_participation_rate: f64,
}

pub struct Vwap {
    id: String,
    params: VwapParams,
    state: AlgoState,
    ctx: Option<AlgoContext>,
    /// Cumulative target fraction per bucket, from the volume profile.
    cumulative_profile: Vec<f64>,
    submitted: i64,
    filled: i64,
}

impl Vwap {
    pub fn new(id: impl Into<String>, params: VwapParams) -> Result<Self> {
        if params.total_quantity <= 0 {
            bail!("vwap total quantity must be positive");
        }
        if params.buckets == 0 || params.end_nanos <= params.start_nanos {
            bail!("vwap interval is empty");
        }
        if !(0.0..=1.0).contains(&params.max_participation_rate)
            || params.max_participation_rate == 0.0
        {
            bail!("vwap participation rate must be in (0, 1]");
        }
        Ok(Self {
            id: id.into(),
            params,
            state: AlgoState::New,
            ctx: None,
            cumulative_profile: Vec::new(),
            submitted: 0,
            filled: 0,
        })
    }

    pub fn filled_quantity(&self) -> i64 {
        self.filled
    }

    fn bucket_at(&self, now_nanos: i64) -> Option<usize> {
        if now_nanos < self.params.start_nanos || now_nanos >= self.params.end_nanos {
            return None;
        }
        let span = self.params.end_nanos - self.params.start_nanos;
        let bucket_len = span / self.params.buckets as i64;
        if bucket_len == 0 {
            return None;
        }
        let k = ((now_nanos - self.params.start_nanos) / bucket_len) as usize;
        Some(k.min(self.params.buckets - 1))
    }

    fn target_cumulative(&self, bucket: usize) -> i64 {
        let fraction = self
            .cumulative_profile
            .get(bucket)
            .copied()
            .unwrap_or(1.0);
        ((self.params.total_quantity as f64) * fraction).floor() as i64
    }

    fn complete(&mut self) {
        if self.state.can_transition_to(AlgoState::Completed) {
            self.state = AlgoState::Completed;
            if let Some(ctx) = self.ctx.as_ref() {
                ctx.log("vwap complete");
            }
        }
    }

    fn work(&mut self, quote: &Quote, now_nanos: i64) {
        let Some(bucket) = self.bucket_at(now_nanos) else {
            return;
        };
        let required = self.target_cumulative(bucket) - self.submitted;
        if required <= 0 {
            return;
        }

        // Participation cap against the displayed size on the side we
        // would take.
        let displayed = match self.params.side {
            Side::Buy => quote.ask_size,
            Side::Sell => quote.bid_size,
        };
        let cap = ((displayed as f64) * self.params.max_participation_rate).floor() as i64;
        let child = required.min(cap);
        if child <= 0 {
            return;
        }

        let Some(ctx) = self.ctx.as_ref() else {
            return;
        };
        let request = OrderRequest {
            symbol: self.params.symbol.clone(),
            side: self.params.side,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Day,
            quantity: child,
            price: quote.aggressive_price(self.params.side),
            stop_price: 0,
            price_scale: quote.price_scale,
            strategy_id: None,
        };
        match ctx.submit_order(request) {
            Ok(id) => {
                self.submitted += child;
                debug!(strategy = %self.id, order = id, bucket, child, "vwap child");
            }
            Err(reason) => ctx.log(&format!("vwap child rejected: {reason}")),
        }
    }
}

impl Algorithm for Vwap {
    fn definition(&self) -> StrategyDefinition {
        let mut definition = StrategyDefinition::new(
            self.id.clone(),
            format!("VWAP {} {}", self.params.side, self.params.symbol.ticker),
            "vwap",
            vec![self.params.symbol.clone()],
            self.params.symbol.exchange,
            json!({
                "side": self.params.side.to_string(),
                "total_quantity": self.params.total_quantity,
                "start_nanos": self.params.start_nanos,
                "end_nanos": self.params.end_nanos,
                "buckets": self.params.buckets,
                "max_participation_rate": self.params.max_participation_rate,
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

        // Bake the profile into cumulative fractions once.
        let profile = ctx.volume_profile(&self.params.symbol, self.params.buckets);
        let mut cumulative = 0.0;
        self.cumulative_profile = profile
            .iter()
            .map(|v| {
                cumulative += v;
                cumulative
            })
            .collect();
        if self.cumulative_profile.len() != self.params.buckets {
            bail!(
                "volume profile returned {} buckets, expected {}",
                self.cumulative_profile.len(),
                self.params.buckets
            );
        }

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

    /// Pacing is quote-driven: each quote is a chance to take liquidity
    /// up to the bucket target.
    fn on_quote(&mut self, quote: &Quote) {
        if self.state != AlgoState::Running || quote.symbol != self.params.symbol {
            return;
        }
        if self.filled >= self.params.total_quantity {
            self.complete();
            return;
        }
        let now_nanos = match self.ctx.as_ref() {
            Some(ctx) => ctx.monotonic_nanos(),
            None => return,
        };
        self.work(quote, now_nanos);
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
        if now_nanos >= self.params.end_nanos || self.filled >= self.params.total_quantity {
            self.complete();
        }
    }

    fn progress(&self) -> f64 {
        if self.params.total_quantity == 0 {
            return 1.0;
        }
        (self.filled as f64 / self.params.total_quantity as f64).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use muninn_core::core::types::Exchange;
    use muninn_core::testing::{fill, test_context, RecordingGateway};
    use std::sync::Arc;

    const SEC: i64 = 1_000_000_000;

    fn params() -> VwapParams {
        VwapParams {
            symbol: Symbol::equity("AAPL"),
            side: Side::Buy,
            total_quantity: 1_000,
            start_nanos: 0,
            end_nanos: 10 * SEC,
            buckets: 10,
            max_participation_rate: 0.1,
        }
    }

    fn quote_with_sizes(ask_size: i64) -> Quote {
        Quote {
            symbol: Symbol::equity("AAPL"),
            bid_price: 14_995,
            ask_price: 15_005,
            bid_size: 5_000,
            ask_size,
            timestamp_nanos: 0,
            price_scale: 100,
        }
    }

    fn started(params: VwapParams) -> (Vwap, Arc<RecordingGateway>) {
        let mut algo = Vwap::new("vwap-test", params).unwrap();
        let (ctx, gateway, _) = test_context("vwap-test");
        algo.initialize(ctx).unwrap();
        algo.start().unwrap();
        (algo, gateway)
    }

    #[test]
    fn test_participation_cap_limits_child_size() {
        let (mut algo, gateway) = started(params());

        // First bucket target with a uniform profile: 100 shares.
        // Displayed ask size 500 at 10% participation caps at 50.
        algo.work(&quote_with_sizes(500), 1);
        assert_eq!(gateway.total_submitted_quantity(), 50);

        // Deep book: the remaining 50 of the bucket target goes out.
        algo.work(&quote_with_sizes(100_000), 2);
        assert_eq!(gateway.total_submitted_quantity(), 100);

        // Bucket target met: further quotes in bucket 0 are quiet.
        algo.work(&quote_with_sizes(100_000), 3);
        assert_eq!(gateway.total_submitted_quantity(), 100);
    }

    #[test]
    fn test_cumulative_target_follows_profile() {
        let (mut algo, gateway) = started(params());

        // Mid-interval (bucket 5): cumulative target 600.
        algo.work(&quote_with_sizes(1_000_000), 5 * SEC + 1);
        assert_eq!(gateway.total_submitted_quantity(), 600);
    }

    #[test]
    fn test_buy_takes_the_ask() {
        let (mut algo, gateway) = started(params());
        algo.work(&quote_with_sizes(100_000), 1);
        let request = gateway.last_submitted().unwrap();
        assert_eq!(request.side, Side::Buy);
        assert_eq!(request.price, 15_005);
    }

    #[test]
    fn test_sell_takes_the_bid() {
        let (mut algo, gateway) = started(VwapParams {
            side: Side::Sell,
            ..params()
        });
        algo.work(&quote_with_sizes(10), 1);
        let request = gateway.last_submitted().unwrap();
        assert_eq!(request.side, Side::Sell);
        assert_eq!(request.price, 14_995);
        // Cap uses the bid size for sells: 5000 * 0.1 = 500.
        assert_eq!(request.quantity, 100.min(500));
    }

    #[test]
    fn test_outside_interval_is_quiet() {
        let (mut algo, gateway) = started(VwapParams {
            start_nanos: 5 * SEC,
            end_nanos: 15 * SEC,
            ..params()
        });
        algo.work(&quote_with_sizes(100_000), 1);
        assert_eq!(gateway.submitted_count(), 0);
        algo.work(&quote_with_sizes(100_000), 16 * SEC);
        assert_eq!(gateway.submitted_count(), 0);
    }

    #[test]
    fn test_fill_completion_and_progress() {
        let (mut algo, _gateway) = started(params());
        assert_eq!(algo.progress(), 0.0);

        algo.on_fill(&fill(Symbol::equity("AAPL"), Side::Buy, 400, 15_005, 1));
        assert!((algo.progress() - 0.4).abs() < 1e-9);
        assert_eq!(algo.state(), AlgoState::Running);

        algo.on_fill(&fill(Symbol::equity("AAPL"), Side::Buy, 600, 15_005, 2));
        assert_eq!(algo.state(), AlgoState::Completed);
    }

    #[test]
    fn test_timer_completes_at_end() {
        let (mut algo, _gateway) = started(params());
        algo.on_timer(10 * SEC);
        assert_eq!(algo.state(), AlgoState::Completed);
    }

    #[test]
    fn test_parameter_validation() {
        assert!(Vwap::new("v", VwapParams { buckets: 0, ..params() }).is_err());
        assert!(Vwap::new(
            "v",
            VwapParams {
                max_participation_rate: 0.0,
                ..params()
            }
        )
        .is_err());
        assert!(Vwap::new(
            "v",
            VwapParams {
                max_participation_rate: 1.5,
                ..params()
            }
        )
        .is_err());
        assert!(Vwap::new(
            "v",
            VwapParams {
                total_quantity: -5,
                ..params()
            }
        )
        .is_err());
    }

    #[test]
    fn test_definition_carries_exchange() {
        let algo = Vwap::new(
            "v",
            VwapParams {
                symbol: Symbol::crypto("BTCUSDT"),
                ..params()
            },
        )
        .unwrap();
        let definition = algo.definition();
        assert_eq!(definition.exchange, Exchange::Binance);
        assert_eq!(definition.algo_type, "vwap");
    }
}
