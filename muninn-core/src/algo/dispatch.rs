//! Strategy dispatcher
//!
//! A single thread owns every registered algorithm and delivers quotes,
//! fills, and timer ticks to them in arrival order. Quotes fan out to
//! every RUNNING algorithm subscribed to the symbol; fills go only to the
//! strategy that originated the order; ticks go to every RUNNING
//! algorithm. One thread means callbacks for one algorithm interleave
//! but never overlap.

use super::{AlgoState, Algorithm};
use crate::core::types::{Quote, Symbol, Trade};
use crossbeam::channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

#[derive(Debug)]
pub enum DispatchMessage {
    Quote(Quote),
    /// A fill routed to the named strategy.
    Fill {
        strategy_id: String,
        trade: Trade,
    },
    Timer(i64),
    Shutdown,
}

type Registry = Arc<Mutex<HashMap<String, Box<dyn Algorithm>>>>;

/// The dispatcher thread plus its registry handle.
pub struct Dispatcher {
    sender: Sender<DispatchMessage>,
    registry: Registry,
    thread: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn start() -> Self {
        let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
        let (sender, receiver) = unbounded::<DispatchMessage>();
        let registry_for_thread = registry.clone();

        let thread = thread::Builder::new()
            .name("algo-dispatch".to_string())
            .spawn(move || {
                for message in receiver {
                    match message {
                        DispatchMessage::Quote(quote) => {
                            let mut registry = registry_for_thread.lock();
                            for algo in registry.values_mut() {
                                if algo.state() == AlgoState::Running
                                    && subscribes(algo.as_ref(), &quote.symbol)
                                {
                                    algo.on_quote(&quote);
                                }
                            }
                        }
                        DispatchMessage::Fill { strategy_id, trade } => {
                            let mut registry = registry_for_thread.lock();
                            match registry.get_mut(&strategy_id) {
                                Some(algo) => algo.on_fill(&trade),
                                None => warn!(
                                    strategy_id,
                                    "fill for unknown strategy dropped"
                                ),
                            }
                        }
                        DispatchMessage::Timer(now_nanos) => {
                            let mut registry = registry_for_thread.lock();
                            for algo in registry.values_mut() {
                                if algo.state() == AlgoState::Running {
                                    algo.on_timer(now_nanos);
                                }
                            }
                        }
                        DispatchMessage::Shutdown => break,
                    }
                }
                debug!("dispatcher stopped");
            })
            .expect("spawn dispatcher thread");

        Self {
            sender,
            registry,
            thread: Some(thread),
        }
    }

    pub fn sender(&self) -> Sender<DispatchMessage> {
        self.sender.clone()
    }

    /// Register an algorithm under its definition id.
    pub fn register(&self, algo: Box<dyn Algorithm>) -> String {
        let id = algo.definition().id;
        self.registry.lock().insert(id.clone(), algo);
        id
    }

    /// Run a closure against one algorithm (state changes, progress).
    pub fn with_algo<R>(
        &self,
        id: &str,
        f: impl FnOnce(&mut Box<dyn Algorithm>) -> R,
    ) -> Option<R> {
        self.registry.lock().get_mut(id).map(f)
    }

    pub fn remove(&self, id: &str) -> Option<Box<dyn Algorithm>> {
        self.registry.lock().remove(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.registry.lock().keys().cloned().collect()
    }

    pub fn running_count(&self) -> usize {
        self.registry
            .lock()
            .values()
            .filter(|a| a.state() == AlgoState::Running)
            .count()
    }

    /// Block until the queue is empty and the in-flight message is done.
    pub fn quiesce(&self) {
        while !self.sender.is_empty() {
            thread::yield_now();
        }
        // Taking the registry lock serializes with a message in flight.
        drop(self.registry.lock());
    }

    pub fn shutdown(mut self) {
        let _ = self.sender.send(DispatchMessage::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("dispatcher thread panicked");
            }
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        let _ = self.sender.send(DispatchMessage::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn subscribes(algo: &dyn Algorithm, symbol: &Symbol) -> bool {
    algo.definition().symbols.iter().any(|s| s == symbol)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::{AlgoContext, StrategyDefinition};
    use crate::core::types::{Exchange, Side};
    use anyhow::Result;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    struct Probe {
        definition: StrategyDefinition,
        state: AlgoState,
        quotes: Arc<AtomicUsize>,
        fills: Arc<AtomicUsize>,
        ticks: Arc<AtomicI64>,
    }

    impl Probe {
        fn boxed(id: &str, symbol: Symbol) -> (Box<dyn Algorithm>, Arc<AtomicUsize>, Arc<AtomicUsize>, Arc<AtomicI64>) {
            let quotes = Arc::new(AtomicUsize::new(0));
            let fills = Arc::new(AtomicUsize::new(0));
            let ticks = Arc::new(AtomicI64::new(0));
            let mut definition = StrategyDefinition::new(
                id,
                id,
                "probe",
                vec![symbol],
                Exchange::Alpaca,
                serde_json::Value::Null,
            );
            definition.state = AlgoState::Running;
            (
                Box::new(Probe {
                    definition,
                    state: AlgoState::Running,
                    quotes: quotes.clone(),
                    fills: fills.clone(),
                    ticks: ticks.clone(),
                }),
                quotes,
                fills,
                ticks,
            )
        }
    }

    impl Algorithm for Probe {
        fn definition(&self) -> StrategyDefinition {
            self.definition.clone()
        }

        fn state(&self) -> AlgoState {
            self.state
        }

        fn initialize(&mut self, _ctx: AlgoContext) -> Result<()> {
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

        fn on_quote(&mut self, _quote: &Quote) {
            self.quotes.fetch_add(1, Ordering::SeqCst);
        }

        fn on_fill(&mut self, _trade: &Trade) {
            self.fills.fetch_add(1, Ordering::SeqCst);
        }

        fn on_timer(&mut self, now_nanos: i64) {
            self.ticks.store(now_nanos, Ordering::SeqCst);
        }
    }

    fn quote(symbol: Symbol) -> Quote {
        Quote {
            symbol,
            bid_price: 14_990,
            ask_price: 15_010,
            bid_size: 10,
            ask_size: 10,
            timestamp_nanos: 0,
            price_scale: 100,
        }
    }

    fn trade(symbol: Symbol) -> Trade {
        Trade {
            symbol,
            side: Side::Buy,
            quantity: 10,
            price: 15_000,
            client_order_id: 1,
            exchange_trade_id: "t".to_string(),
            executed_at: 0,
            price_scale: 100,
        }
    }

    #[test]
    fn test_quotes_fan_out_to_subscribers_only() {
        let dispatcher = Dispatcher::start();
        let (aapl_algo, aapl_quotes, _, _) = Probe::boxed("a", Symbol::equity("AAPL"));
        let (msft_algo, msft_quotes, _, _) = Probe::boxed("m", Symbol::equity("MSFT"));
        dispatcher.register(aapl_algo);
        dispatcher.register(msft_algo);

        dispatcher
            .sender()
            .send(DispatchMessage::Quote(quote(Symbol::equity("AAPL"))))
            .unwrap();
        dispatcher.quiesce();

        assert_eq!(aapl_quotes.load(Ordering::SeqCst), 1);
        assert_eq!(msft_quotes.load(Ordering::SeqCst), 0);
        dispatcher.shutdown();
    }

    #[test]
    fn test_paused_algorithms_skip_quotes() {
        let dispatcher = Dispatcher::start();
        let (algo, quotes, _, _) = Probe::boxed("p", Symbol::equity("AAPL"));
        let id = dispatcher.register(algo);
        dispatcher.with_algo(&id, |a| a.pause().unwrap());

        dispatcher
            .sender()
            .send(DispatchMessage::Quote(quote(Symbol::equity("AAPL"))))
            .unwrap();
        dispatcher.quiesce();
        assert_eq!(quotes.load(Ordering::SeqCst), 0);

        dispatcher.with_algo(&id, |a| a.resume().unwrap());
        dispatcher
            .sender()
            .send(DispatchMessage::Quote(quote(Symbol::equity("AAPL"))))
            .unwrap();
        dispatcher.quiesce();
        assert_eq!(quotes.load(Ordering::SeqCst), 1);
        dispatcher.shutdown();
    }

    #[test]
    fn test_fills_route_by_strategy_id() {
        let dispatcher = Dispatcher::start();
        let (a, _, a_fills, _) = Probe::boxed("alpha", Symbol::equity("AAPL"));
        let (b, _, b_fills, _) = Probe::boxed("beta", Symbol::equity("AAPL"));
        dispatcher.register(a);
        dispatcher.register(b);

        dispatcher
            .sender()
            .send(DispatchMessage::Fill {
                strategy_id: "beta".to_string(),
                trade: trade(Symbol::equity("AAPL")),
            })
            .unwrap();
        dispatcher.quiesce();

        assert_eq!(a_fills.load(Ordering::SeqCst), 0);
        assert_eq!(b_fills.load(Ordering::SeqCst), 1);
        dispatcher.shutdown();
    }

    #[test]
    fn test_timer_reaches_running_algos() {
        let dispatcher = Dispatcher::start();
        let (algo, _, _, ticks) = Probe::boxed("t", Symbol::equity("AAPL"));
        dispatcher.register(algo);

        dispatcher.sender().send(DispatchMessage::Timer(42)).unwrap();
        dispatcher.quiesce();
        assert_eq!(ticks.load(Ordering::SeqCst), 42);
        assert_eq!(dispatcher.running_count(), 1);
        dispatcher.shutdown();
    }

    #[test]
    fn test_remove_stops_delivery() {
        let dispatcher = Dispatcher::start();
        let (algo, quotes, _, _) = Probe::boxed("r", Symbol::equity("AAPL"));
        let id = dispatcher.register(algo);
        assert!(dispatcher.remove(&id).is_some());

        dispatcher
            .sender()
            .send(DispatchMessage::Quote(quote(Symbol::equity("AAPL"))))
            .unwrap();
        dispatcher.quiesce();
        assert_eq!(quotes.load(Ordering::SeqCst), 0);
        assert!(dispatcher.ids().is_empty());
        dispatcher.shutdown();
    }
}
