//! External ports
//!
//! The seams the core consumes: a market-data source and an order port.
//! Real exchange adapters (REST/WebSocket clients) implement these traits
//! out of tree; the in-process [`StubOrderPort`] here backs tests and
//! simulations.
//!
//! Submission is fire-and-forget: `submit` returns once the order is
//! handed to the venue, and the outcome (accept, fill, reject, cancel)
//! arrives asynchronously through the registered update callback. The
//! order handler never blocks on an exchange round trip.

use crate::core::types::{Order, Quote, Symbol};
use anyhow::Result;
use crossbeam::channel::{unbounded, Sender};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

pub type QuoteCallback = Arc<dyn Fn(Quote) + Send + Sync>;
pub type OrderUpdateCallback = Arc<dyn Fn(OrderUpdate) + Send + Sync>;

/// Inbound quote stream.
pub trait MarketDataSource: Send {
    fn subscribe(&mut self, symbols: &[Symbol]) -> Result<()>;

    /// Register the quote callback. Implementations must deliver quotes
    /// with `bid_price <= ask_price`, in feed order.
    fn on_quote(&mut self, callback: QuoteCallback);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderUpdateKind {
    Accepted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

/// Asynchronous order outcome from the venue.
#[derive(Debug, Clone)]
pub struct OrderUpdate {
    pub client_order_id: i64,
    pub kind: OrderUpdateKind,
    pub exchange_order_id: Option<String>,
    /// Set for fills.
    pub fill_quantity: i64,
    pub fill_price: i64,
    pub exchange_trade_id: Option<String>,
    /// Set for rejections.
    pub reason: Option<String>,
}

/// Outbound order flow to a venue.
pub trait OrderPort: Send + Sync {
    fn submit(&self, order: &Order) -> Result<()>;

    fn cancel(&self, order: &Order) -> Result<()>;

    /// Register the update callback. Called once at engine start, before
    /// any submission.
    fn on_update(&self, callback: OrderUpdateCallback);
}

/// What the stub does with each submitted order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubFillMode {
    /// Accept, then fill the full quantity at the limit price.
    AcceptAndFill,
    /// Accept and leave the order resting.
    AcceptOnly,
    /// Reject everything.
    RejectAll,
    /// Accept, then fill in two partial executions.
    AcceptAndFillInTwo,
}

enum StubCommand {
    Submit(Order),
    Cancel(Order),
    Shutdown,
}

/// In-process exchange stub.
///
/// Acks and fills are produced on a dedicated worker thread, so the
/// callback path into the engine never runs on the submitter's stack,
/// matching how a real adapter delivers venue callbacks.
pub struct StubOrderPort {
    sender: Sender<StubCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
    callback: Arc<RwLock<Option<OrderUpdateCallback>>>,
}

impl StubOrderPort {
    pub fn new(mode: StubFillMode) -> Self {
        let (sender, receiver) = unbounded::<StubCommand>();
        let callback: Arc<RwLock<Option<OrderUpdateCallback>>> = Arc::new(RwLock::new(None));
        let callback_for_worker = callback.clone();

        let worker = thread::Builder::new()
            .name("stub-order-port".to_string())
            .spawn(move || {
                let mut rng = rand::thread_rng();
                for command in receiver {
                    let Some(callback) = callback_for_worker.read().clone() else {
                        continue;
                    };
                    match command {
                        StubCommand::Submit(order) => {
                            run_fill_model(&order, mode, &mut rng, &callback)
                        }
                        StubCommand::Cancel(order) => callback(OrderUpdate {
                            client_order_id: order.client_order_id,
                            kind: OrderUpdateKind::Cancelled,
                            exchange_order_id: order.exchange_order_id.clone(),
                            fill_quantity: 0,
                            fill_price: 0,
                            exchange_trade_id: None,
                            reason: None,
                        }),
                        StubCommand::Shutdown => break,
                    }
                }
                debug!("stub order port worker stopped");
            })
            .expect("spawn stub order port worker");

        Self {
            sender,
            worker: Mutex::new(Some(worker)),
            callback,
        }
    }

    /// Block until all queued commands have been processed.
    pub fn quiesce(&self) {
        while !self.sender.is_empty() {
            thread::yield_now();
        }
        // One more yield so the in-flight command finishes its callbacks.
        thread::sleep(std::time::Duration::from_millis(5));
    }
}

fn run_fill_model(
    order: &Order,
    mode: StubFillMode,
    rng: &mut impl Rng,
    callback: &OrderUpdateCallback,
) {
    let exchange_order_id = format!("sim-{:016x}", rng.gen::<u64>());

    if mode == StubFillMode::RejectAll {
        callback(OrderUpdate {
            client_order_id: order.client_order_id,
            kind: OrderUpdateKind::Rejected,
            exchange_order_id: None,
            fill_quantity: 0,
            fill_price: 0,
            exchange_trade_id: None,
            reason: Some("venue rejected".to_string()),
        });
        return;
    }

    callback(OrderUpdate {
        client_order_id: order.client_order_id,
        kind: OrderUpdateKind::Accepted,
        exchange_order_id: Some(exchange_order_id.clone()),
        fill_quantity: 0,
        fill_price: 0,
        exchange_trade_id: None,
        reason: None,
    });

    // Market orders in the stub fill at their (zero) price only if a
    // limit price was carried; use the stop price as a fallback.
    let fill_price = if order.price > 0 {
        order.price
    } else {
        order.stop_price.max(1)
    };

    match mode {
        StubFillMode::AcceptAndFill => callback(OrderUpdate {
            client_order_id: order.client_order_id,
            kind: OrderUpdateKind::Filled,
            exchange_order_id: Some(exchange_order_id.clone()),
            fill_quantity: order.quantity,
            fill_price,
            exchange_trade_id: Some(format!("trd-{:012x}", rng.gen::<u64>())),
            reason: None,
        }),
        StubFillMode::AcceptAndFillInTwo => {
            let first = order.quantity / 2;
            let second = order.quantity - first;
            if first > 0 {
                callback(OrderUpdate {
                    client_order_id: order.client_order_id,
                    kind: OrderUpdateKind::PartiallyFilled,
                    exchange_order_id: Some(exchange_order_id.clone()),
                    fill_quantity: first,
                    fill_price,
                    exchange_trade_id: Some(format!("trd-{:012x}", rng.gen::<u64>())),
                    reason: None,
                });
            }
            callback(OrderUpdate {
                client_order_id: order.client_order_id,
                kind: OrderUpdateKind::Filled,
                exchange_order_id: Some(exchange_order_id),
                fill_quantity: second,
                fill_price,
                exchange_trade_id: Some(format!("trd-{:012x}", rng.gen::<u64>())),
                reason: None,
            });
        }
        StubFillMode::AcceptOnly | StubFillMode::RejectAll => {}
    }
}

impl OrderPort for StubOrderPort {
    fn submit(&self, order: &Order) -> Result<()> {
        self.sender
            .send(StubCommand::Submit(order.clone()))
            .map_err(|_| anyhow::anyhow!("stub order port worker is gone"))
    }

    fn cancel(&self, order: &Order) -> Result<()> {
        self.sender
            .send(StubCommand::Cancel(order.clone()))
            .map_err(|_| anyhow::anyhow!("stub order port worker is gone"))
    }

    fn on_update(&self, callback: OrderUpdateCallback) {
        *self.callback.write() = Some(callback);
    }
}

impl Drop for StubOrderPort {
    fn drop(&mut self) {
        let _ = self.sender.send(StubCommand::Shutdown);
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                error!("stub order port worker panicked");
            }
        }
    }
}

/// Scripted quote source for tests and simulations.
pub struct ScriptedMarketData {
    subscribed: Vec<Symbol>,
    callback: Option<QuoteCallback>,
}

impl ScriptedMarketData {
    pub fn new() -> Self {
        Self {
            subscribed: Vec::new(),
            callback: None,
        }
    }

    /// Push one quote through the registered callback.
    pub fn push(&self, quote: Quote) {
        if let Some(callback) = &self.callback {
            callback(quote);
        }
    }

    /// Push a symmetric quote around a mid price.
    pub fn push_mid(&self, symbol: Symbol, mid: i64, half_spread: i64, ts: i64) {
        let price_scale = symbol.exchange.default_price_scale();
        self.push(Quote {
            symbol,
            bid_price: mid - half_spread,
            ask_price: mid + half_spread,
            bid_size: 1_000,
            ask_size: 1_000,
            timestamp_nanos: ts,
            price_scale,
        });
    }

    pub fn subscribed(&self) -> &[Symbol] {
        &self.subscribed
    }
}

impl Default for ScriptedMarketData {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketDataSource for ScriptedMarketData {
    fn subscribe(&mut self, symbols: &[Symbol]) -> Result<()> {
        self.subscribed.extend_from_slice(symbols);
        Ok(())
    }

    fn on_quote(&mut self, callback: QuoteCallback) {
        self.callback = Some(callback);
    }
}

/// Convenience for building stub fills in tests.
pub fn fill_update(order: &Order, quantity: i64, price: i64, kind: OrderUpdateKind) -> OrderUpdate {
    OrderUpdate {
        client_order_id: order.client_order_id,
        kind,
        exchange_order_id: order.exchange_order_id.clone(),
        fill_quantity: quantity,
        fill_price: price,
        exchange_trade_id: Some(format!("trd-test-{}", order.client_order_id)),
        reason: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{OrderRequest, Side};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    fn order(id: i64) -> Order {
        OrderRequest::limit(Symbol::equity("AAPL"), Side::Buy, 100, 15_000)
            .into_order(id, 0)
    }

    fn collect_updates(port: &StubOrderPort) -> Arc<StdMutex<Vec<OrderUpdate>>> {
        let updates = Arc::new(StdMutex::new(Vec::new()));
        let sink = updates.clone();
        port.on_update(Arc::new(move |update| {
            sink.lock().unwrap().push(update);
        }));
        updates
    }

    #[test]
    fn test_stub_accept_and_fill() {
        let port = StubOrderPort::new(StubFillMode::AcceptAndFill);
        let updates = collect_updates(&port);

        port.submit(&order(1)).unwrap();
        port.quiesce();

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].kind, OrderUpdateKind::Accepted);
        assert!(updates[0].exchange_order_id.is_some());
        assert_eq!(updates[1].kind, OrderUpdateKind::Filled);
        assert_eq!(updates[1].fill_quantity, 100);
        assert_eq!(updates[1].fill_price, 15_000);
    }

    #[test]
    fn test_stub_two_part_fill() {
        let port = StubOrderPort::new(StubFillMode::AcceptAndFillInTwo);
        let updates = collect_updates(&port);

        port.submit(&order(2)).unwrap();
        port.quiesce();

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 3);
        assert_eq!(updates[1].kind, OrderUpdateKind::PartiallyFilled);
        assert_eq!(updates[1].fill_quantity + updates[2].fill_quantity, 100);
    }

    #[test]
    fn test_stub_reject_all() {
        let port = StubOrderPort::new(StubFillMode::RejectAll);
        let updates = collect_updates(&port);

        port.submit(&order(3)).unwrap();
        port.quiesce();

        let updates = updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].kind, OrderUpdateKind::Rejected);
        assert!(updates[0].reason.is_some());
    }

    #[test]
    fn test_stub_cancel_callback() {
        let port = StubOrderPort::new(StubFillMode::AcceptOnly);
        let updates = collect_updates(&port);

        let mut resting = order(4);
        port.submit(&resting).unwrap();
        port.quiesce();
        resting.exchange_order_id = updates.lock().unwrap()[0].exchange_order_id.clone();

        port.cancel(&resting).unwrap();
        port.quiesce();

        let updates = updates.lock().unwrap();
        assert_eq!(updates.last().unwrap().kind, OrderUpdateKind::Cancelled);
    }

    #[test]
    fn test_scripted_market_data() {
        let mut source = ScriptedMarketData::new();
        source.subscribe(&[Symbol::equity("AAPL")]).unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        source.on_quote(Arc::new(move |quote| {
            assert!(quote.bid_price <= quote.ask_price);
            count2.fetch_add(1, Ordering::SeqCst);
        }));

        source.push_mid(Symbol::equity("AAPL"), 15_000, 10, 1);
        source.push_mid(Symbol::equity("AAPL"), 15_020, 10, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(source.subscribed().len(), 1);
    }
}
