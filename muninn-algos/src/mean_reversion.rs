//! Mean-reversion alpha - rolling z-score
//!
//! Keeps the last `lookback_period` mid prices and measures how far the
//! current mid has dislocated from the rolling mean:
//!
//! ```text
//! z = (p - mean) / stddev
//!
//! target = +max_position   if z < -entry_z   (price depressed, buy)
//!          -max_position   if z > +entry_z   (price stretched, sell)
//!           0              if |z| < exit_z
//!          hold            otherwise
//! ```
//!
//! Degenerate cases produce no signal: a window that is not yet full, or
//! a zero standard deviation.

use crate::transition;
use anyhow::Result;
use muninn_core::algo::{AlgoContext, AlgoState, Algorithm, StrategyDefinition};
use muninn_core::core::types::{OrderRequest, OrderType, Quote, Side, Symbol, TimeInForce, Trade};
use serde_json::json;
use std::collections::VecDeque;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct MeanReversionParams {
    pub symbol: Symbol,
    /// Rolling window length, in quotes.
    pub lookback_period: usize,
    /// Entry threshold in standard deviations.
    pub entry_z: f64,
    /// Exit threshold in standard deviations; below it the book flattens.
    pub exit_z: f64,
    pub max_position_size: i64,
}

pub struct MeanReversion {
    id: String,
    params: MeanReversionParams,
    state: AlgoState,
    ctx: Option<AlgoContext>,
    window: VecDeque<f64>,
    position: i64,
    in_flight: i64,
}

enum Target {
    Level(i64),
    Hold,
}

impl MeanReversion {
    pub fn new(id: impl Into<String>, params: MeanReversionParams) -> Self {
        Self {
            id: id.into(),
            params,
            state: AlgoState::New,
            ctx: None,
            window: VecDeque::new(),
            position: 0,
            in_flight: 0,
        }
    }

    fn push_mid(&mut self, mid: f64) {
        self.window.push_back(mid);
        while self.window.len() > self.params.lookback_period {
            self.window.pop_front();
        }
    }

    /// z-score of `mid` against the window, or None while degenerate.
    fn z_score(&self, mid: f64) -> Option<f64> {
        if self.window.len() < self.params.lookback_period || self.params.lookback_period < 2 {
            return None;
        }
        let n = self.window.len() as f64;
        let mean = self.window.iter().sum::<f64>() / n;
        let variance = self
            .window
            .iter()
            .map(|x| (x - mean) * (x - mean))
            .sum::<f64>()
            / (n - 1.0);
        let stddev = variance.sqrt();
        if stddev == 0.0 {
            return None;
        }
        Some((mid - mean) / stddev)
    }

    fn target_for(&self, z: f64) -> Target {
        if z < -self.params.entry_z {
            Target::Level(self.params.max_position_size)
        } else if z > self.params.entry_z {
            Target::Level(-self.params.max_position_size)
        } else if z.abs() < self.params.exit_z {
            Target::Level(0)
        } else {
            Target::Hold
        }
    }

    fn rebalance(&mut self, quote: &Quote, target: i64) {
        let delta = target - (self.position + self.in_flight);
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
            strategy_id: None,
        };
        match ctx.submit_order(request) {
            Ok(id) => {
                self.in_flight += side.signed(quantity);
                debug!(strategy = %self.id, order = id, %side, quantity, "reversion rebalance");
            }
            Err(reason) => ctx.log(&format!("mean-reversion order rejected: {reason}")),
        }
    }
}

impl Algorithm for MeanReversion {
    fn definition(&self) -> StrategyDefinition {
        let mut definition = StrategyDefinition::new(
            self.id.clone(),
            format!("MeanReversion {}", self.params.symbol.ticker),
            "mean-reversion",
            vec![self.params.symbol.clone()],
            self.params.symbol.exchange,
            json!({
                "lookback_period": self.params.lookback_period,
                "entry_z": self.params.entry_z,
                "exit_z": self.params.exit_z,
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
        // Score against the trailing window, then include the new mid.
        let z = self.z_score(mid);
        self.push_mid(mid);
        let Some(z) = z else {
            return;
        };
        if let Target::Level(target) = self.target_for(z) {
            self.rebalance(quote, target);
        }
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

    fn algo() -> MeanReversion {
        MeanReversion::new(
            "mr-test",
            MeanReversionParams {
                symbol: Symbol::equity("AAPL"),
                lookback_period: 10,
                entry_z: 2.0,
                exit_z: 0.5,
                max_position_size: 50,
            },
        )
    }

    /// Mild oscillation: fills the window with nonzero variance without
    /// tripping the entry threshold.
    fn warmup_mids() -> Vec<i64> {
        (0..10)
            .map(|i| if i % 2 == 0 { 15_010 } else { 14_990 })
            .collect()
    }

    #[test]
    fn test_no_signal_until_window_full() {
        let mut algo = algo();
        let (_, gateway) = spin_up(&mut algo, "mr-test");

        feed_mids(&mut algo, &Symbol::equity("AAPL"), &warmup_mids()[..9]);
        // Big dislocation, but the window is one sample short.
        feed_mids(&mut algo, &Symbol::equity("AAPL"), &[20_000]);
        assert_eq!(gateway.submitted_count(), 0);
    }

    #[test]
    fn test_zero_stddev_no_signal() {
        let mut algo = algo();
        let (_, gateway) = spin_up(&mut algo, "mr-test");

        feed_mids(&mut algo, &Symbol::equity("AAPL"), &[15_000; 12]);
        // All mids identical: stddev 0, z undefined, no orders.
        assert_eq!(gateway.submitted_count(), 0);
    }

    #[test]
    fn test_depressed_price_buys() {
        let mut algo = algo();
        let (_, gateway) = spin_up(&mut algo, "mr-test");

        feed_mids(&mut algo, &Symbol::equity("AAPL"), &warmup_mids());
        // Collapse far below the mean.
        feed_mids(&mut algo, &Symbol::equity("AAPL"), &[14_000]);

        assert_eq!(gateway.submitted_count(), 1);
        let request = gateway.last_submitted().unwrap();
        assert_eq!(request.side, Side::Buy);
        assert_eq!(request.quantity, 50);
    }

    #[test]
    fn test_stretched_price_sells() {
        let mut algo = algo();
        let (_, gateway) = spin_up(&mut algo, "mr-test");

        feed_mids(&mut algo, &Symbol::equity("AAPL"), &warmup_mids());
        feed_mids(&mut algo, &Symbol::equity("AAPL"), &[16_000]);

        let request = gateway.last_submitted().unwrap();
        assert_eq!(request.side, Side::Sell);
        assert_eq!(request.quantity, 50);
    }

    #[test]
    fn test_exit_band_flattens() {
        let mut algo = algo();
        let (_, gateway) = spin_up(&mut algo, "mr-test");

        feed_mids(&mut algo, &Symbol::equity("AAPL"), &warmup_mids());
        feed_mids(&mut algo, &Symbol::equity("AAPL"), &[14_000]);
        fill_last(&mut algo, &gateway);
        assert_eq!(algo.position, 50);

        // The dislocation decays back into the exit band; the reverted
        // window needs a few quotes to absorb the 14k print.
        feed_mids(&mut algo, &Symbol::equity("AAPL"), &warmup_mids());
        feed_mids(&mut algo, &Symbol::equity("AAPL"), &[15_000]);

        assert_eq!(algo.position + algo.in_flight, 0);
        assert_eq!(gateway.last_submitted().unwrap().side, Side::Sell);
    }

    #[test]
    fn test_definition() {
        let algo = algo();
        let definition = algo.definition();
        assert_eq!(definition.algo_type, "mean-reversion");
        assert_eq!(definition.parameters["entry_z"], 2.0);
    }
}
