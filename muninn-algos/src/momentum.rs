//! Momentum alpha - dual EMA crossover
//!
//! Maintains a short and a long EMA of the mid price. The signal is the
//! relative spread between them:
//!
//! ```text
//! s = (ema_short - ema_long) / ema_long
//!
//! target = +max_position   if s >  threshold
//!          -max_position   if s < -threshold
//!           0              otherwise
//! ```
//!
//! On each quote the strategy trades the delta between the target and its
//! current exposure (position plus in-flight child orders), as a limit
//! order on the aggressive side of the book.

use crate::transition;
use anyhow::Result;
use muninn_core::algo::{AlgoContext, AlgoState, Algorithm, StrategyDefinition};
use muninn_core::core::types::{OrderRequest, OrderType, Quote, Side, Symbol, TimeInForce, Trade};
use serde_json::json;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct MomentumParams {
    pub symbol: Symbol,
    /// Short EMA period, in quotes.
    pub short_period: u32,
    /// Long EMA period, in quotes.
    pub long_period: u32,
    /// Signal threshold as a fraction, e.g. 0.001 = 10 bps.
    pub threshold: f64,
    /// Absolute position target when the signal fires.
    pub max_position_size: i64,
}

pub struct Momentum {
    id: String,
    params: MomentumParams,
    state: AlgoState,
    ctx: Option<AlgoContext>,
    ema_short: Option<f64>,
    ema_long: Option<f64>,
    /// Net filled position from this strategy's orders.
    position: i64,
    /// Submitted but not yet filled, signed.
    in_flight: i64,
}

impl Momentum {
    pub fn new(id: impl Into<String>, params: MomentumParams) -> Self {
        Self {
            id: id.into(),
            params,
            state: AlgoState::New,
            ctx: None,
            ema_short: None,
            ema_long: None,
            position: 0,
            in_flight: 0,
        }
    }

    fn update_ema(ema: &mut Option<f64>, period: u32, mid: f64) -> f64 {
        let alpha = 2.0 / (period as f64 + 1.0);
        let next = match *ema {
            Some(previous) => alpha * mid + (1.0 - alpha) * previous,
            None => mid,
        };
        *ema = Some(next);
        next
    }

    fn signal(&mut self, mid: f64) -> f64 {
        let short = Self::update_ema(&mut self.ema_short, self.params.short_period, mid);
        let long = Self::update_ema(&mut self.ema_long, self.params.long_period, mid);
        if long == 0.0 {
            return 0.0;
        }
        (short - long) / long
    }

    fn target_for(&self, signal: f64) -> i64 {
        if signal > self.params.threshold {
            self.params.max_position_size
        } else if signal < -self.params.threshold {
            -self.params.max_position_size
        } else {
            0
        }
    }

    fn rebalance(&mut self, quote: &Quote, target: i64) {
        let exposure = self.position + self.in_flight;
        let delta = target - exposure;
        if delta == 0 {
            return;
        }
        let Some(ctx) = self.ctx.as_ref() else {
            return;
        };

        let (side, quantity) = if delta > 0 {
            (Side::Buy, delta)
        } else {
            (Side::Sell, -delta)
        };
        let request = OrderRequest {
            symbol: self.params.symbol.clone(),
            side,
            order_type: OrderType::Limit,
            time_in_force: TimeInForce::Day,
            quantity,
            price: quote.aggressive_price(side),
            stop_price: 0,
            price_scale: quote.price_scale,
            strategy_id: None, // stamped by the context
        };
        match ctx.submit_order(request) {
            Ok(id) => {
                self.in_flight += side.signed(quantity);
                debug!(strategy = %self.id, order = id, %side, quantity, "momentum rebalance");
            }
            Err(reason) => ctx.log(&format!("momentum order rejected: {reason}")),
        }
    }
}

impl Algorithm for Momentum {
    fn definition(&self) -> StrategyDefinition {
        let mut definition = StrategyDefinition::new(
            self.id.clone(),
            format!("Momentum {}", self.params.symbol.ticker),
            "momentum",
            vec![self.params.symbol.clone()],
            self.params.symbol.exchange,
            json!({
                "short_period": self.params.short_period,
                "long_period": self.params.long_period,
                "threshold": self.params.threshold,
                "max_position_size": self.params.max_position_size,
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

    fn on_quote(&mut self, quote: &Quote) {
        if self.state != AlgoState::Running || quote.symbol != self.params.symbol {
            return;
        }
        let mid = quote.mid_price() as f64;
        let signal = self.signal(mid);
        let target = self.target_for(signal);
        self.rebalance(quote, target);
    }

    fn on_fill(&mut self, trade: &Trade) {
        let signed = trade.signed_quantity();
        self.position += signed;
        self.in_flight -= signed;
    }

    fn on_timer(&mut self, _now_nanos: i64) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{feed_mids, fill_last, spin_up};
    use muninn_core::testing::quote_at;

    fn algo() -> Momentum {
        Momentum::new(
            "momo-test",
            MomentumParams {
                symbol: Symbol::equity("AAPL"),
                short_period: 3,
                long_period: 10,
                threshold: 0.001,
                max_position_size: 100,
            },
        )
    }

    #[test]
    fn test_lifecycle() {
        let mut algo = algo();
        assert_eq!(algo.state(), AlgoState::New);
        let (_, _gateway) = spin_up(&mut algo, "momo-test");
        assert_eq!(algo.state(), AlgoState::Running);
        algo.pause().unwrap();
        algo.resume().unwrap();
        algo.cancel().unwrap();
        assert!(algo.start().is_err());
    }

    #[test]
    fn test_flat_signal_no_orders() {
        let mut algo = algo();
        let (_, gateway) = spin_up(&mut algo, "momo-test");

        // Constant mids: short and long EMAs agree, signal ~ 0.
        feed_mids(&mut algo, &Symbol::equity("AAPL"), &[15_000; 20]);
        assert_eq!(gateway.submitted_count(), 0);
    }

    #[test]
    fn test_uptrend_goes_long() {
        eprintln!("A");
        let mut algo = algo();
        eprintln!("B");
        let (_, gateway) = spin_up(&mut algo, "momo-test");
        eprintln!("C");

        // A strong ramp pulls the short EMA above the long.
        let mids: Vec<i64> = (0..20).map(|i| 15_000 + i * 100).collect();
        eprintln!("D");
        feed_mids(&mut algo, &Symbol::equity("AAPL"), &mids);
        eprintln!("E");
        assert!(gateway.submitted_count() > 0);
        eprintln!("F");
        let first = &gateway.submitted.lock()[0];
        assert_eq!(first.side, Side::Buy);
        // Total buys target the max position.
        assert_eq!(gateway.total_submitted_quantity(), 100);
        let last = gateway.last_submitted().unwrap();
        assert_eq!(last.strategy_id.as_deref(), Some("momo-test"));
    }

    #[test]
    fn test_downtrend_goes_short_after_fill() {
        let mut algo = algo();
        let (_, gateway) = spin_up(&mut algo, "momo-test");

        // Ramp up, fill the long, then collapse.
        let up: Vec<i64> = (0..20).map(|i| 15_000 + i * 100).collect();
        feed_mids(&mut algo, &Symbol::equity("AAPL"), &up);
        fill_last(&mut algo, &gateway);
        assert_eq!(algo.position, 100);

        let down: Vec<i64> = (0..40).map(|i| 17_000 - i * 200).collect();
        feed_mids(&mut algo, &Symbol::equity("AAPL"), &down);

        // It must have sold through flat down to -100 net of in-flight.
        assert_eq!(algo.position + algo.in_flight, -100);
        let last = gateway.last_submitted().unwrap();
        assert_eq!(last.side, Side::Sell);
    }

    #[test]
    fn test_ignores_other_symbols_and_paused_state() {
        let mut algo = algo();
        let (_, gateway) = spin_up(&mut algo, "momo-test");

        let mids: Vec<i64> = (0..20).map(|i| 15_000 + i * 100).collect();
        feed_mids(&mut algo, &Symbol::equity("MSFT"), &mids);
        assert_eq!(gateway.submitted_count(), 0);

        algo.pause().unwrap();
        feed_mids(&mut algo, &Symbol::equity("AAPL"), &mids);
        assert_eq!(gateway.submitted_count(), 0);
    }

    #[test]
    fn test_orders_price_on_aggressive_side() {
        let mut algo = algo();
        let (_, gateway) = spin_up(&mut algo, "momo-test");

        let mids: Vec<i64> = (0..20).map(|i| 15_000 + i * 100).collect();
        for (i, &mid) in mids.iter().enumerate() {
            algo.on_quote(&quote_at(Symbol::equity("AAPL"), mid, 5, i as i64));
        }
        let first = &gateway.submitted.lock()[0];
        // Buy orders lift the ask: mids are multiples of 100, half
        // spread 5, so the limit price ends in 5.
        assert_eq!(first.side, Side::Buy);
        assert_eq!(first.price % 100, 5);
        assert!(first.price > 15_000);
    }

    #[test]
    fn test_definition_round_trip() {
        let algo = algo();
        let definition = algo.definition();
        assert_eq!(definition.algo_type, "momentum");
        assert_eq!(definition.parameters["short_period"], 3);
        assert_eq!(definition.symbols, vec![Symbol::equity("AAPL")]);
    }
}
