//! End-to-end engine flows against the in-process stub port
//!
//! Submission through acceptance and fills, listener fan-out, quote
//! mark-to-market, cancellation idempotence, snapshots, and a full
//! execution-algorithm round trip driven by the real dispatcher and
//! scheduler.

use muninn_core::config::EngineConfig;
use muninn_core::core::types::{OrderRequest, OrderStatus, Quote, Side, Symbol};
use muninn_core::engine::TradingEngine;
use muninn_core::ports::{StubFillMode, StubOrderPort};
use muninn_core::risk::RiskLimits;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(timeout_ms: u64, f: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    f()
}

fn engine(mode: StubFillMode) -> Arc<TradingEngine> {
    let engine = TradingEngine::new(
        EngineConfig::in_memory(),
        Arc::new(StubOrderPort::new(mode)),
    )
    .unwrap();
    engine.start().unwrap();
    engine
}

fn quote(symbol: Symbol, mid: i64) -> Quote {
    let price_scale = symbol.exchange.default_price_scale();
    Quote {
        symbol,
        bid_price: mid - 5,
        ask_price: mid + 5,
        bid_size: 10_000,
        ask_size: 10_000,
        timestamp_nanos: 0,
        price_scale,
    }
}

#[test]
fn submit_accept_fill_updates_order_and_position() {
    let engine = engine(StubFillMode::AcceptAndFill);
    let symbol = Symbol::equity("AAPL");

    let id = engine
        .submit_order(OrderRequest::limit(symbol.clone(), Side::Buy, 100, 15_000))
        .unwrap();

    assert!(wait_until(2_000, || {
        engine
            .orders()
            .get(id)
            .map(|o| o.status == OrderStatus::Filled)
            .unwrap_or(false)
    }));

    let order = engine.orders().get(id).unwrap();
    assert_eq!(order.filled_quantity, 100);
    assert_eq!(order.average_filled_price, 15_000);
    assert!(order.exchange_order_id.is_some());

    assert!(wait_until(2_000, || {
        engine
            .positions()
            .get(&symbol)
            .map(|p| p.quantity == 100)
            .unwrap_or(false)
    }));
    let position = engine.positions().get(&symbol).unwrap();
    assert_eq!(position.average_entry_price, 15_000);
    assert_eq!(position.realized_pnl, 0);

    engine.stop().unwrap();
}

#[test]
fn partial_fills_accumulate_average() {
    let engine = engine(StubFillMode::AcceptAndFillInTwo);
    let symbol = Symbol::equity("AAPL");

    let id = engine
        .submit_order(OrderRequest::limit(symbol.clone(), Side::Buy, 100, 15_000))
        .unwrap();

    assert!(wait_until(2_000, || {
        engine
            .orders()
            .get(id)
            .map(|o| o.status == OrderStatus::Filled)
            .unwrap_or(false)
    }));
    let order = engine.orders().get(id).unwrap();
    assert_eq!(order.filled_quantity, 100);
    // Both parts fill at the limit, so the average equals it.
    assert_eq!(order.average_filled_price, 15_000);

    engine.stop().unwrap();
}

#[test]
fn venue_rejection_moves_order_to_rejected_and_feeds_breaker() {
    let engine = engine(StubFillMode::RejectAll);
    let symbol = Symbol::equity("AAPL");

    let id = engine
        .submit_order(OrderRequest::limit(symbol, Side::Buy, 10, 15_000))
        .unwrap();

    assert!(wait_until(2_000, || {
        engine
            .orders()
            .get(id)
            .map(|o| o.status == OrderStatus::Rejected)
            .unwrap_or(false)
    }));
    let order = engine.orders().get(id).unwrap();
    assert!(order.reject_reason.unwrap().contains("venue"));

    engine.stop().unwrap();
}

#[test]
fn order_listeners_see_every_transition_in_order() {
    let engine = engine(StubFillMode::AcceptAndFill);
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = statuses.clone();
    engine.add_order_listener(Box::new(move |order| {
        sink.lock().unwrap().push(order.status);
    }));

    let id = engine
        .submit_order(OrderRequest::limit(
            Symbol::equity("AAPL"),
            Side::Buy,
            10,
            15_000,
        ))
        .unwrap();
    assert!(wait_until(2_000, || {
        engine
            .orders()
            .get(id)
            .map(|o| o.status == OrderStatus::Filled)
            .unwrap_or(false)
    }));

    let seen = statuses.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            OrderStatus::Pending,
            OrderStatus::Submitted,
            OrderStatus::Accepted,
            OrderStatus::Filled,
        ]
    );

    engine.stop().unwrap();
}

#[test]
fn quotes_mark_positions_and_reach_listeners() {
    let engine = engine(StubFillMode::AcceptAndFill);
    let symbol = Symbol::equity("AAPL");

    let id = engine
        .submit_order(OrderRequest::limit(symbol.clone(), Side::Buy, 100, 15_000))
        .unwrap();
    assert!(wait_until(2_000, || {
        engine
            .orders()
            .get(id)
            .map(|o| o.status == OrderStatus::Filled)
            .unwrap_or(false)
    }));

    let updates = Arc::new(AtomicUsize::new(0));
    let counter = updates.clone();
    engine.add_position_listener(Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    engine.on_quote(quote(symbol.clone(), 15_500));
    assert!(wait_until(2_000, || {
        engine
            .positions()
            .get(&symbol)
            .map(|p| p.unrealized_pnl == 500)
            .unwrap_or(false)
    }));
    assert!(updates.load(Ordering::SeqCst) >= 1);

    engine.stop().unwrap();
}

#[test]
fn quote_stream_is_observed_in_publication_order() {
    let engine = engine(StubFillMode::AcceptAndFill);
    let symbol = Symbol::equity("AAPL");

    // Open a position so every quote re-marks it.
    let id = engine
        .submit_order(OrderRequest::limit(symbol.clone(), Side::Buy, 10, 15_000))
        .unwrap();
    assert!(wait_until(2_000, || {
        engine
            .orders()
            .get(id)
            .map(|o| o.status == OrderStatus::Filled)
            .unwrap_or(false)
    }));

    let marks = Arc::new(Mutex::new(Vec::new()));
    let sink = marks.clone();
    engine.add_position_listener(Box::new(move |position| {
        sink.lock().unwrap().push(position.current_price);
    }));

    let mids: Vec<i64> = (0..200).map(|i| 15_000 + i).collect();
    for &mid in &mids {
        engine.on_quote(quote(symbol.clone(), mid));
    }
    assert!(wait_until(2_000, || {
        marks.lock().unwrap().len() >= mids.len()
    }));

    // Every handler observes quotes in the order they were published.
    let seen = marks.lock().unwrap().clone();
    assert_eq!(seen, mids);

    engine.stop().unwrap();
}

#[test]
fn cancel_is_idempotent() {
    let engine = engine(StubFillMode::AcceptOnly);
    let symbol = Symbol::equity("AAPL");

    let id = engine
        .submit_order(OrderRequest::limit(symbol, Side::Buy, 10, 15_000))
        .unwrap();
    assert!(wait_until(2_000, || {
        engine
            .orders()
            .get(id)
            .map(|o| o.status == OrderStatus::Accepted)
            .unwrap_or(false)
    }));

    engine.cancel_order(id).unwrap();
    assert!(wait_until(2_000, || {
        engine
            .orders()
            .get(id)
            .map(|o| o.status == OrderStatus::Cancelled)
            .unwrap_or(false)
    }));

    // Cancelling again (terminal) and cancelling nonsense are no-ops.
    engine.cancel_order(id).unwrap();
    engine.cancel_order(999_999).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert_eq!(
        engine.orders().get(id).unwrap().status,
        OrderStatus::Cancelled
    );

    engine.stop().unwrap();
}

#[test]
fn modify_amends_active_order() {
    let engine = engine(StubFillMode::AcceptOnly);
    let id = engine
        .submit_order(OrderRequest::limit(
            Symbol::equity("AAPL"),
            Side::Buy,
            10,
            15_000,
        ))
        .unwrap();
    assert!(wait_until(2_000, || {
        engine
            .orders()
            .get(id)
            .map(|o| o.status == OrderStatus::Accepted)
            .unwrap_or(false)
    }));

    engine.modify_order(id, 20, 14_900).unwrap();
    assert!(wait_until(2_000, || {
        engine
            .orders()
            .get(id)
            .map(|o| o.quantity == 20 && o.price == 14_900)
            .unwrap_or(false)
    }));

    engine.stop().unwrap();
}

#[test]
fn snapshot_reflects_engine_state() {
    let engine = engine(StubFillMode::AcceptAndFill);
    let symbol = Symbol::equity("AAPL");

    let snapshot = engine.snapshot();
    assert!(snapshot.running);
    assert_eq!(snapshot.ring_capacity, 65_536);
    assert_eq!(snapshot.orders_processed, 0);
    assert_eq!(snapshot.open_positions, 0);

    let id = engine
        .submit_order(OrderRequest::limit(symbol, Side::Buy, 100, 15_000))
        .unwrap();
    assert!(wait_until(2_000, || {
        engine
            .orders()
            .get(id)
            .map(|o| o.status == OrderStatus::Filled)
            .unwrap_or(false)
    }));
    assert!(wait_until(2_000, || engine.snapshot().trades_executed >= 1));

    let snapshot = engine.snapshot();
    assert_eq!(snapshot.orders_processed, 1);
    assert_eq!(snapshot.open_positions, 1);
    assert_eq!(snapshot.pending_orders, 0);

    engine.stop().unwrap();
    let snapshot = engine.snapshot();
    assert!(!snapshot.running);
    assert_eq!(snapshot.uptime_millis, 0);
}

#[test]
fn engine_start_stop_idempotent() {
    let engine = engine(StubFillMode::AcceptOnly);
    engine.start().unwrap();
    engine.stop().unwrap();
    engine.stop().unwrap();
    assert!(engine
        .submit_order(OrderRequest::limit(
            Symbol::equity("AAPL"),
            Side::Buy,
            1,
            100
        ))
        .is_err());
}

#[test]
fn twap_round_trip_through_engine() {
    use muninn_algos_smoke::build_twap;

    let engine = engine(StubFillMode::AcceptAndFill);
    let symbol = Symbol::equity("AAPL");

    // The dispatcher prices slices from the quote cache.
    engine.on_quote(quote(symbol.clone(), 15_000));

    let id = engine.register_algorithm(build_twap(symbol.clone())).unwrap();
    engine.start_strategy(&id).unwrap();

    // Slices fire on scheduler ticks; fills route back by strategy id
    // until the parent completes.
    assert!(
        wait_until(5_000, || engine
            .strategy_progress(&id)
            .map(|p| (p - 1.0).abs() < f64::EPSILON)
            .unwrap_or(false)),
        "twap did not complete, progress = {:?}",
        engine.strategy_progress(&id)
    );

    assert!(wait_until(2_000, || {
        engine
            .positions()
            .get(&symbol)
            .map(|p| p.quantity == 60)
            .unwrap_or(false)
    }));

    engine.stop().unwrap();
}

/// A minimal inline TWAP used to exercise the framework without a
/// dependency on the algorithm crate (which depends on this one).
mod muninn_algos_smoke {
    use anyhow::Result;
    use muninn_core::algo::{AlgoContext, AlgoState, Algorithm, StrategyDefinition};
    use muninn_core::core::types::{
        OrderRequest, OrderType, Quote, Side, Symbol, TimeInForce, Trade,
    };

    pub struct SliceBuyer {
        symbol: Symbol,
        state: AlgoState,
        ctx: Option<AlgoContext>,
        total: i64,
        per_slice: i64,
        interval_nanos: i64,
        submitted: i64,
        filled: i64,
        last_slice: i64,
    }

    pub fn build_twap(symbol: Symbol) -> Box<dyn Algorithm> {
        Box::new(SliceBuyer {
            symbol,
            state: AlgoState::New,
            ctx: None,
            total: 60,
            per_slice: 20,
            interval_nanos: 30_000_000, // 30ms, close to the tick cadence
            submitted: 0,
            filled: 0,
            last_slice: -1,
        })
    }

    impl Algorithm for SliceBuyer {
        fn definition(&self) -> StrategyDefinition {
            let mut definition = StrategyDefinition::new(
                "slice-buyer",
                "Slice Buyer",
                "twap",
                vec![self.symbol.clone()],
                self.symbol.exchange,
                serde_json::json!({"total": self.total}),
            );
            definition.state = self.state;
            definition
        }

        fn state(&self) -> AlgoState {
            self.state
        }

        fn initialize(&mut self, ctx: AlgoContext) -> Result<()> {
            self.ctx = Some(ctx);
            self.state = AlgoState::Initialized;
            Ok(())
        }

        fn start(&mut self) -> Result<()> {
            self.state = AlgoState::Running;
            Ok(())
        }

        fn pause(&mut self) -> Result<()> {
            self.state = AlgoState::Paused;
            Ok(())
        }

        fn resume(&mut self) -> Result<()> {
            self.state = AlgoState::Running;
            Ok(())
        }

        fn cancel(&mut self) -> Result<()> {
            self.state = AlgoState::Cancelled;
            Ok(())
        }

        fn on_quote(&mut self, _quote: &Quote) {}

        fn on_fill(&mut self, trade: &Trade) {
            self.filled += trade.quantity;
            if self.filled >= self.total {
                self.state = AlgoState::Completed;
            }
        }

        fn on_timer(&mut self, now_nanos: i64) {
            if self.state != AlgoState::Running || self.submitted >= self.total {
                return;
            }
            let slice = now_nanos / self.interval_nanos;
            if slice <= self.last_slice {
                return;
            }
            self.last_slice = slice;

            let Some(ctx) = self.ctx.as_ref() else { return };
            let Some(quote) = ctx.latest_quote(&self.symbol) else {
                return;
            };
            let quantity = self.per_slice.min(self.total - self.submitted);
            let request = OrderRequest {
                symbol: self.symbol.clone(),
                side: Side::Buy,
                order_type: OrderType::Limit,
                time_in_force: TimeInForce::Day,
                quantity,
                price: quote.mid_price(),
                stop_price: 0,
                price_scale: quote.price_scale,
                strategy_id: None,
            };
            if ctx.submit_order(request).is_ok() {
                self.submitted += quantity;
            }
        }

        fn progress(&self) -> f64 {
            self.filled as f64 / self.total as f64
        }
    }
}
