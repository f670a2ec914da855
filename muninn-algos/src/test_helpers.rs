//! Shared fixtures for the algorithm test suites

use muninn_core::algo::{AlgoContext, Algorithm};
use muninn_core::core::types::{Symbol, Trade};
use muninn_core::testing::{quote_at, test_context, RecordingGateway};
use std::sync::Arc;

/// Initialize and start an algorithm against a recording gateway.
pub fn spin_up(
    algo: &mut dyn Algorithm,
    strategy_id: &str,
) -> (AlgoContext, Arc<RecordingGateway>) {
    let (ctx, gateway, _) = test_context(strategy_id);
    algo.initialize(ctx.clone()).unwrap();
    algo.start().unwrap();
    (ctx, gateway)
}

/// Drive a sequence of mid prices through `on_quote`.
pub fn feed_mids(algo: &mut dyn Algorithm, symbol: &Symbol, mids: &[i64]) {
    for (i, &mid) in mids.iter().enumerate() {
        algo.on_quote(&quote_at(symbol.clone(), mid, 5, i as i64));
    }
}

/// Echo the gateway's most recent submission back as a full fill.
pub fn fill_last(algo: &mut dyn Algorithm, gateway: &RecordingGateway) -> Option<Trade> {
    let request = gateway.last_submitted()?;
    let id = gateway.submitted_count() as i64;
    let trade = Trade {
        symbol: request.symbol.clone(),
        side: request.side,
        quantity: request.quantity,
        price: request.price,
        client_order_id: id,
        exchange_trade_id: format!("trd-{id}"),
        executed_at: 0,
        price_scale: request.price_scale,
    };
    algo.on_fill(&trade);
    Some(trade)
}
