//! Test support
//!
//! Deterministic stand-ins for the engine seams, used by this crate's
//! unit tests and by the algorithm crates' suites.

use crate::algo::context::{AlgoContext, OrderGateway, UniformVolumeProfile};
use crate::core::types::{OrderRequest, Quote, Side, Symbol, Trade};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// Gateway that records requests and allocates sequential ids.
pub struct RecordingGateway {
    pub submitted: Mutex<Vec<OrderRequest>>,
    pub cancelled: Mutex<Vec<i64>>,
    pub reject_with: Mutex<Option<String>>,
}

impl RecordingGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            submitted: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
            reject_with: Mutex::new(None),
        })
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.lock().len()
    }

    pub fn last_submitted(&self) -> Option<OrderRequest> {
        self.submitted.lock().last().cloned()
    }

    pub fn total_submitted_quantity(&self) -> i64 {
        self.submitted.lock().iter().map(|r| r.quantity).sum()
    }
}

impl OrderGateway for RecordingGateway {
    fn submit(&self, request: OrderRequest) -> Result<i64, String> {
        if let Some(reason) = self.reject_with.lock().clone() {
            return Err(reason);
        }
        let mut submitted = self.submitted.lock();
        submitted.push(request);
        Ok(submitted.len() as i64)
    }

    fn cancel(&self, client_order_id: i64) -> Result<(), String> {
        self.cancelled.lock().push(client_order_id);
        Ok(())
    }
}

/// A context over a fresh quote cache and a [`RecordingGateway`].
pub fn test_context(
    strategy_id: &str,
) -> (AlgoContext, Arc<RecordingGateway>, Arc<DashMap<Symbol, Quote>>) {
    let quotes = Arc::new(DashMap::new());
    let gateway = RecordingGateway::new();
    let ctx = AlgoContext::new(
        strategy_id,
        quotes.clone(),
        gateway.clone(),
        Arc::new(UniformVolumeProfile),
        Instant::now(),
    );
    (ctx, gateway, quotes)
}

/// A symmetric quote around `mid` with the symbol's default scale.
pub fn quote_at(symbol: Symbol, mid: i64, half_spread: i64, ts: i64) -> Quote {
    let price_scale = symbol.exchange.default_price_scale();
    Quote {
        symbol,
        bid_price: mid - half_spread,
        ask_price: mid + half_spread,
        bid_size: 1_000,
        ask_size: 1_000,
        timestamp_nanos: ts,
        price_scale,
    }
}

/// A fill against the given order id.
pub fn fill(symbol: Symbol, side: Side, quantity: i64, price: i64, client_order_id: i64) -> Trade {
    let price_scale = symbol.exchange.default_price_scale();
    Trade {
        symbol,
        side,
        quantity,
        price,
        client_order_id,
        exchange_trade_id: format!("trd-test-{client_order_id}"),
        executed_at: 0,
        price_scale,
    }
}
