//! Trading engine façade
//!
//! Wires the ring, the handler pipeline, the risk gate, the journals,
//! the strategy dispatcher, and the scheduler into one lifecycle:
//!
//! ```text
//! quote ──► engine ──► ring ──► [orders | positions | metrics]
//!    └──────────────► dispatcher ──► running algorithms
//! submit ──► validate ──► risk gate ──► order journal ──► NEW_ORDER
//! venue callback ──► engine ──► ORDER_ACCEPTED / FILLED / REJECTED / CANCELLED
//! ```
//!
//! The engine is the sole ring publisher; every publish goes through the
//! producer lock, so callbacks and strategy submissions from any thread
//! serialize into one event order.

pub mod handlers;

use crate::algo::context::OrderGateway;
use crate::algo::dispatch::{DispatchMessage, Dispatcher};
use crate::algo::{AlgoContext, AlgoState, Algorithm, StrategyDefinition, UniformVolumeProfile,
    VolumeProfileSource};
use crate::config::EngineConfig;
use crate::core::audit::{AuditEvent, AuditKind, AuditSink};
use crate::core::errors::ValidationError;
use crate::core::types::{OrderRequest, OrderType, Quote, Symbol, Trade};
use crate::events::{EventKind, EventRing, Pipeline};
use crate::journal::JournalSet;
use crate::metrics::{EngineMetrics, LatencyMetrics, MetricsSnapshot};
use crate::orders::{OrderListener, OrderManager};
use crate::positions::{PositionBook, PositionListener};
use crate::ports::{MarketDataSource, OrderPort, OrderUpdate, OrderUpdateKind};
use crate::risk::{RiskEngine, RiskLimits, RiskVerdict};
use crate::utils::clock::{epoch_nanos, utc_yyyymmdd};
use anyhow::{bail, Context as _, Result};
use crossbeam::channel::Sender;
use dashmap::DashMap;
use handlers::{MetricsHandler, OrderHandler, PositionHandler};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Scheduler cadence. Timer ticks fan out to algorithms every tick;
/// journals flush once per `FLUSH_EVERY` ticks.
const TICK_INTERVAL: Duration = Duration::from_millis(25);
const FLUSH_EVERY: u32 = 40;

/// Consistent point-in-time view of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSnapshot {
    pub running: bool,
    pub ring_capacity: usize,
    pub orders_processed: u64,
    pub trades_executed: u64,
    pub active_strategies: usize,
    pub open_positions: usize,
    pub pending_orders: usize,
    pub uptime_millis: u64,
}

struct Running {
    ring: Arc<EventRing>,
    pipeline: Option<Pipeline>,
    dispatcher: Option<Dispatcher>,
    dispatch_sender: Sender<DispatchMessage>,
    scheduler_stop: Arc<AtomicBool>,
    scheduler: Option<JoinHandle<()>>,
    started: Instant,
}

pub struct TradingEngine {
    config: EngineConfig,
    journals: Arc<JournalSet>,
    orders: Arc<OrderManager>,
    positions: Arc<PositionBook>,
    risk: Arc<RiskEngine>,
    metrics: Arc<EngineMetrics>,
    latency: Arc<LatencyMetrics>,
    quotes: Arc<DashMap<Symbol, Quote>>,
    volume: Arc<dyn VolumeProfileSource>,
    port: Arc<dyn OrderPort>,
    audit: AuditSink,
    /// Serializes ring publishes: the single-producer role.
    producer: Mutex<()>,
    running: RwLock<Option<Running>>,
    self_ref: RwLock<Weak<TradingEngine>>,
}

impl TradingEngine {
    /// Open journals, replay persisted state, and assemble the engine.
    /// Call [`TradingEngine::start`] to begin processing.
    pub fn new(config: EngineConfig, port: Arc<dyn OrderPort>) -> Result<Arc<Self>> {
        config.validate()?;

        let journals = Arc::new(
            JournalSet::open(&config.persistence).context("opening journals")?,
        );
        let audit = {
            let journals = journals.clone();
            AuditSink::new(move |event: AuditEvent| {
                if let Err(e) = journals.audit.append(&event) {
                    error!(error = %e, "audit append failed");
                }
            })
        };

        let orders = Arc::new(OrderManager::new());
        let positions = Arc::new(PositionBook::new());
        journals.restore_into(&orders, &positions);

        let dropped = journals.open_stats().total_dropped();
        if dropped > 0 {
            audit.emit(AuditEvent::new(
                AuditKind::Error,
                format!("journal replay discarded {dropped} damaged tail record(s)"),
            ));
        }

        let risk = Arc::new(RiskEngine::new(
            config.risk.clone(),
            positions.clone(),
            audit.clone(),
        ));

        let engine = Arc::new(Self {
            config,
            journals,
            orders,
            positions,
            risk,
            metrics: Arc::new(EngineMetrics::new()),
            latency: Arc::new(LatencyMetrics::default()),
            quotes: Arc::new(DashMap::new()),
            volume: Arc::new(UniformVolumeProfile),
            port,
            audit,
            producer: Mutex::new(()),
            running: RwLock::new(None),
            self_ref: RwLock::new(Weak::new()),
        });
        *engine.self_ref.write() = Arc::downgrade(&engine);

        // Venue callbacks feed straight back into the event stream.
        let weak = Arc::downgrade(&engine);
        engine.port.on_update(Arc::new(move |update| {
            if let Some(engine) = weak.upgrade() {
                engine.on_order_update(update);
            }
        }));

        Ok(engine)
    }

    /// Spin up the ring, the pipeline, the dispatcher, and the scheduler.
    /// Idempotent.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.write();
        if running.is_some() {
            return Ok(());
        }

        let cursors = Pipeline::cursors(3);
        let ring = Arc::new(EventRing::new(
            self.config.ring.capacity,
            cursors[2].clone(),
        ));

        let dispatcher = Dispatcher::start();
        let dispatch_sender = dispatcher.sender();

        let handlers: Vec<Box<dyn crate::events::EventHandler>> = vec![
            Box::new(OrderHandler {
                orders: self.orders.clone(),
                risk: self.risk.clone(),
                journals: self.journals.clone(),
                port: self.port.clone(),
                dispatch: dispatch_sender.clone(),
                audit: self.audit.clone(),
                latency: self.latency.clone(),
            }),
            Box::new(PositionHandler {
                positions: self.positions.clone(),
                risk: self.risk.clone(),
                journals: self.journals.clone(),
                audit: self.audit.clone(),
            }),
            Box::new(MetricsHandler {
                metrics: self.metrics.clone(),
                latency: self.latency.clone(),
            }),
        ];
        let pipeline = Pipeline::start(ring.clone(), handlers, cursors);

        let started = Instant::now();
        let scheduler_stop = Arc::new(AtomicBool::new(false));
        let scheduler = self.spawn_scheduler(started, scheduler_stop.clone(), dispatch_sender.clone())?;

        self.audit.emit(AuditEvent::new(AuditKind::EngineStarted, "engine started"));
        info!(ring_capacity = self.config.ring.capacity, "engine started");

        *running = Some(Running {
            ring,
            pipeline: Some(pipeline),
            dispatcher: Some(dispatcher),
            dispatch_sender,
            scheduler_stop,
            scheduler: Some(scheduler),
            started,
        });
        Ok(())
    }

    /// Drain in-flight events, persist final state, flush and close the
    /// journals. Idempotent.
    pub fn stop(&self) -> Result<()> {
        let Some(mut running) = self.running.write().take() else {
            return Ok(());
        };

        // Hold the producer lock for the whole shutdown so no publish
        // lands between the drain and the journal close.
        let _producer_fence = self.producer.lock();

        running.scheduler_stop.store(true, Ordering::Release);
        if let Some(scheduler) = running.scheduler.take() {
            if scheduler.join().is_err() {
                error!("scheduler thread panicked");
            }
        }

        if let Some(pipeline) = running.pipeline.take() {
            pipeline.drain_and_stop(&running.ring);
        }

        // Persist each algorithm's final definition state, then stop
        // dispatching.
        if let Some(dispatcher) = running.dispatcher.take() {
            dispatcher.quiesce();
            for id in dispatcher.ids() {
                if let Some(definition) = dispatcher.with_algo(&id, |a| a.definition()) {
                    if let Err(e) = self.journals.strategies.upsert(&definition) {
                        error!(error = %e, "failed to persist strategy state on stop");
                    }
                }
            }
            dispatcher.shutdown();
        }

        // Final position snapshots make cold start independent of trades.
        for position in self.positions.all() {
            if let Err(e) = self.journals.positions.append(&position) {
                error!(error = %e, "failed to snapshot position on stop");
            }
        }

        self.audit.emit(AuditEvent::new(AuditKind::EngineStopped, "engine stopped"));
        self.journals.flush_all().context("flushing journals")?;
        self.journals.close_all().context("closing journals")?;
        info!("engine stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.read().is_some()
    }

    // ─── order flow ─────────────────────────────────────────────────────

    /// Validate, gate, journal, and enqueue one order.
    ///
    /// Returns the allocated client order id, or the rejection or
    /// validation reason synchronously.
    pub fn submit_order(&self, request: OrderRequest) -> Result<i64, String> {
        validate_request(&request).map_err(|e| e.to_string())?;
        if !self.is_running() {
            return Err("engine is not running".to_string());
        }

        let client_order_id = self.orders.allocate_id();
        let order = request.into_order(client_order_id, epoch_nanos());

        let gate_started = Instant::now();
        let verdict = self.risk.pre_trade_check(&order);
        self.latency
            .risk_gate
            .record_ns(gate_started.elapsed().as_nanos().min(u64::MAX as u128) as u64);

        if let RiskVerdict::Rejected(reason) = verdict {
            self.metrics.inc_rejected();
            // Keep the PENDING -> REJECTED transition on the books.
            let _ = self.orders.track(order.clone());
            let _ = self.orders.mark_rejected(client_order_id, &reason);
            if let Some(rejected) = self.orders.get(client_order_id) {
                let _ = self.journals.orders.append(&rejected);
            }
            return Err(reason);
        }

        // Synchronous journal write: a persistence failure must reach the
        // submitter, not the event stream.
        if let Err(e) = self.journals.orders.append(&order) {
            self.audit.emit(AuditEvent::new(
                AuditKind::Error,
                format!("persistence failure writing order: {e}"),
            ));
            self.risk.disable_trading("persistence failure");
            return Err(format!("persistence failure: {e}"));
        }

        self.metrics.inc_submitted();
        self.publish(EventKind::NewOrder, |event| {
            event.order = Some(order);
        })
        .map_err(|e| e.to_string())?;
        Ok(client_order_id)
    }

    /// Request cancellation. Idempotent: unknown and terminal orders are
    /// a no-op.
    pub fn cancel_order(&self, client_order_id: i64) -> Result<(), String> {
        if !self.is_running() {
            return Err("engine is not running".to_string());
        }
        self.publish(EventKind::CancelOrder, |event| {
            event.client_order_id = client_order_id;
        })
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Amend quantity and price on an active order.
    pub fn modify_order(
        &self,
        client_order_id: i64,
        new_quantity: i64,
        new_price: i64,
    ) -> Result<(), String> {
        if !self.is_running() {
            return Err("engine is not running".to_string());
        }
        self.publish(EventKind::ModifyOrder, |event| {
            event.client_order_id = client_order_id;
            event.fill_quantity = new_quantity;
            event.fill_price = new_price;
        })
        .map_err(|e| e.to_string())?;
        Ok(())
    }

    /// Venue callback entry points; each publishes the matching event.
    pub fn on_order_accepted(&self, client_order_id: i64, exchange_order_id: &str) {
        let result = self.publish(EventKind::OrderAccepted, |event| {
            event.client_order_id = client_order_id;
            event.exchange_order_id = Some(exchange_order_id.to_string());
        });
        if result.is_err() {
            warn!(client_order_id, "accept callback dropped, engine stopped");
        }
    }

    pub fn on_order_rejected(&self, client_order_id: i64, reason: &str) {
        let result = self.publish(EventKind::OrderRejected, |event| {
            event.client_order_id = client_order_id;
            event.reject_reason = Some(reason.to_string());
        });
        if result.is_err() {
            warn!(client_order_id, "reject callback dropped, engine stopped");
        }
    }

    pub fn on_order_filled(&self, client_order_id: i64, quantity: i64, price: i64, trade_id: &str) {
        let Some(order) = self.orders.get(client_order_id) else {
            warn!(client_order_id, "fill for unknown order dropped");
            return;
        };
        let trade = Trade {
            symbol: order.symbol.clone(),
            side: order.side,
            quantity,
            price,
            client_order_id,
            exchange_trade_id: trade_id.to_string(),
            executed_at: epoch_nanos(),
            price_scale: order.price_scale,
        };
        let result = self.publish(EventKind::OrderFilled, |event| {
            event.client_order_id = client_order_id;
            event.fill_quantity = quantity;
            event.fill_price = price;
            event.trade = Some(trade);
        });
        if result.is_err() {
            warn!(client_order_id, "fill callback dropped, engine stopped");
        }
    }

    pub fn on_order_cancelled(&self, client_order_id: i64) {
        let result = self.publish(EventKind::OrderCancelled, |event| {
            event.client_order_id = client_order_id;
        });
        if result.is_err() {
            warn!(client_order_id, "cancel callback dropped, engine stopped");
        }
    }

    fn on_order_update(&self, update: OrderUpdate) {
        match update.kind {
            OrderUpdateKind::Accepted => self.on_order_accepted(
                update.client_order_id,
                update.exchange_order_id.as_deref().unwrap_or_default(),
            ),
            OrderUpdateKind::PartiallyFilled | OrderUpdateKind::Filled => self.on_order_filled(
                update.client_order_id,
                update.fill_quantity,
                update.fill_price,
                update.exchange_trade_id.as_deref().unwrap_or_default(),
            ),
            OrderUpdateKind::Cancelled => self.on_order_cancelled(update.client_order_id),
            OrderUpdateKind::Rejected => self.on_order_rejected(
                update.client_order_id,
                update.reason.as_deref().unwrap_or("venue rejection"),
            ),
        }
    }

    // ─── market data ────────────────────────────────────────────────────

    /// Wire a market-data source into the engine.
    pub fn attach_market_data(
        self: &Arc<Self>,
        source: &mut dyn MarketDataSource,
        symbols: &[Symbol],
    ) -> Result<()> {
        source.subscribe(symbols)?;
        let engine = self.clone();
        source.on_quote(Arc::new(move |quote| engine.on_quote(quote)));
        Ok(())
    }

    /// Ingest one quote: cache it, publish `QUOTE_UPDATE`, and dispatch
    /// to subscribed strategies, in that order.
    pub fn on_quote(&self, quote: Quote) {
        self.quotes.insert(quote.symbol.clone(), quote.clone());

        let dispatched = {
            let running = self.running.read();
            running.as_ref().map(|r| r.dispatch_sender.clone())
        };
        let Some(sender) = dispatched else {
            debug!("quote dropped, engine not running");
            return;
        };

        let published = self.publish(EventKind::QuoteUpdate, |event| {
            event.quote = Some(quote.clone());
        });
        if published.is_ok() {
            let _ = sender.send(DispatchMessage::Quote(quote));
        }
    }

    /// Ingest a market trade print (volume, no order attached).
    pub fn on_market_trade(&self, trade: Trade) {
        let result = self.publish(EventKind::TradeUpdate, |event| {
            event.trade = Some(trade);
        });
        if result.is_err() {
            debug!("trade print dropped, engine not running");
        }
    }

    // ─── strategies ─────────────────────────────────────────────────────

    /// Initialize and register an algorithm. The engine must be running.
    /// The definition is persisted; call
    /// [`TradingEngine::start_strategy`] to begin quote delivery.
    pub fn register_algorithm(&self, mut algo: Box<dyn Algorithm>) -> Result<String> {
        let running = self.running.read();
        let Some(running) = running.as_ref() else {
            bail!("engine is not running");
        };
        let definition = algo.definition();

        let gateway: Arc<dyn OrderGateway> = Arc::new(EngineGateway {
            engine: self.self_ref.read().clone(),
        });
        let ctx = AlgoContext::new(
            definition.id.clone(),
            self.quotes.clone(),
            gateway,
            self.volume.clone(),
            running.started,
        );
        algo.initialize(ctx)
            .with_context(|| format!("initializing strategy {}", definition.id))?;

        self.journals.strategies.upsert(&algo.definition())?;
        let Some(dispatcher) = running.dispatcher.as_ref() else {
            bail!("dispatcher unavailable");
        };
        Ok(dispatcher.register(algo))
    }

    pub fn start_strategy(&self, id: &str) -> Result<()> {
        self.strategy_transition(id, "start", |algo| algo.start())?;
        self.audit.emit(AuditEvent::new(AuditKind::StrategyStarted, id));
        Ok(())
    }

    pub fn pause_strategy(&self, id: &str) -> Result<()> {
        self.strategy_transition(id, "pause", |algo| algo.pause())
    }

    pub fn resume_strategy(&self, id: &str) -> Result<()> {
        self.strategy_transition(id, "resume", |algo| algo.resume())
    }

    pub fn cancel_strategy(&self, id: &str) -> Result<()> {
        self.strategy_transition(id, "cancel", |algo| algo.cancel())?;
        self.audit.emit(AuditEvent::new(AuditKind::StrategyStopped, id));
        Ok(())
    }

    /// Remove an algorithm and tombstone its persisted definition.
    pub fn remove_strategy(&self, id: &str) -> Result<()> {
        {
            let running = self.running.read();
            if let Some(running) = running.as_ref() {
                if let Some(dispatcher) = running.dispatcher.as_ref() {
                    dispatcher.remove(id);
                }
            }
        }
        self.journals.strategies.tombstone(id)?;
        Ok(())
    }

    pub fn strategy_state(&self, id: &str) -> Option<AlgoState> {
        let running = self.running.read();
        let dispatcher = running.as_ref()?.dispatcher.as_ref()?;
        dispatcher.with_algo(id, |algo| algo.state())
    }

    pub fn strategy_progress(&self, id: &str) -> Option<f64> {
        let running = self.running.read();
        let dispatcher = running.as_ref()?.dispatcher.as_ref()?;
        dispatcher.with_algo(id, |algo| algo.progress())
    }

    /// Persisted, non-tombstoned definitions.
    pub fn strategy_definitions(&self) -> Vec<StrategyDefinition> {
        self.journals.strategies.all()
    }

    fn strategy_transition(
        &self,
        id: &str,
        what: &str,
        f: impl FnOnce(&mut Box<dyn Algorithm>) -> Result<()>,
    ) -> Result<()> {
        let definition = {
            let running = self.running.read();
            let Some(running) = running.as_ref() else {
                bail!("engine is not running");
            };
            let Some(dispatcher) = running.dispatcher.as_ref() else {
                bail!("dispatcher unavailable");
            };
            let Some(result) = dispatcher.with_algo(id, |algo| {
                f(algo).map(|()| algo.definition())
            }) else {
                bail!("unknown strategy {id}");
            };
            result.with_context(|| format!("{what} strategy {id}"))?
        };
        self.journals.strategies.upsert(&definition)?;
        Ok(())
    }

    // ─── observation ────────────────────────────────────────────────────

    pub fn snapshot(&self) -> EngineSnapshot {
        let running = self.running.read();
        EngineSnapshot {
            running: running.is_some(),
            ring_capacity: self.config.ring.capacity,
            orders_processed: self.orders.total_count() as u64,
            trades_executed: self.metrics.snapshot().trades_executed,
            active_strategies: running
                .as_ref()
                .and_then(|r| r.dispatcher.as_ref())
                .map(|d| d.running_count())
                .unwrap_or(0),
            open_positions: self.positions.open_count(),
            pending_orders: self.orders.active_count(),
            uptime_millis: running
                .as_ref()
                .map(|r| r.started.elapsed().as_millis() as u64)
                .unwrap_or(0),
        }
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn latency(&self) -> &LatencyMetrics {
        &self.latency
    }

    pub fn add_order_listener(&self, listener: OrderListener) {
        self.orders.add_listener(listener);
    }

    pub fn add_position_listener(&self, listener: PositionListener) {
        self.positions.add_listener(listener);
    }

    pub fn orders(&self) -> &OrderManager {
        &self.orders
    }

    pub fn positions(&self) -> &PositionBook {
        &self.positions
    }

    pub fn journals(&self) -> &JournalSet {
        &self.journals
    }

    // ─── risk administration ────────────────────────────────────────────

    pub fn get_limits(&self) -> RiskLimits {
        self.risk.get_limits()
    }

    pub fn set_limits(&self, limits: RiskLimits) {
        self.risk.set_limits(limits);
    }

    pub fn enable_trading(&self) {
        self.risk.enable_trading();
    }

    pub fn disable_trading(&self, reason: &str) {
        self.risk.disable_trading(reason);
    }

    pub fn reset_daily_counters(&self) {
        self.risk.reset_daily_counters();
    }

    pub fn risk(&self) -> &RiskEngine {
        &self.risk
    }

    // ─── internals ──────────────────────────────────────────────────────

    fn publish(
        &self,
        kind: EventKind,
        fill: impl FnOnce(&mut crate::events::Event),
    ) -> std::result::Result<u64, crate::core::errors::EngineError> {
        let ring = {
            let running = self.running.read();
            match running.as_ref() {
                Some(r) => r.ring.clone(),
                None => return Err(crate::core::errors::EngineError::NotRunning),
            }
        };
        let _producer = self.producer.lock();
        let seq = ring.publish(kind, epoch_nanos(), fill);
        self.metrics.inc_published();
        Ok(seq)
    }

    fn spawn_scheduler(
        &self,
        started: Instant,
        stop: Arc<AtomicBool>,
        dispatch: Sender<DispatchMessage>,
    ) -> Result<JoinHandle<()>> {
        let journals = self.journals.clone();
        let risk = self.risk.clone();
        let handle = thread::Builder::new()
            .name("engine-scheduler".to_string())
            .spawn(move || {
                let mut tick = 0u32;
                let mut current_day = utc_yyyymmdd(epoch_nanos());
                while !stop.load(Ordering::Acquire) {
                    thread::sleep(TICK_INTERVAL);
                    tick = tick.wrapping_add(1);

                    let now_nanos =
                        started.elapsed().as_nanos().min(i64::MAX as u128) as i64;
                    let _ = dispatch.send(DispatchMessage::Timer(now_nanos));

                    if tick % FLUSH_EVERY == 0 {
                        if let Err(e) = journals.flush_all() {
                            error!(error = %e, "scheduled journal flush failed");
                        }
                    }

                    let day = utc_yyyymmdd(epoch_nanos());
                    if day != current_day {
                        info!(day, "UTC day rolled, resetting daily risk counters");
                        risk.reset_daily_counters();
                        current_day = day;
                    }
                }
            })
            .context("spawning scheduler thread")?;
        Ok(handle)
    }
}

impl Drop for TradingEngine {
    fn drop(&mut self) {
        if self.running.get_mut().is_some() {
            // Journals are scoped acquisitions: closed on every path.
            if let Err(e) = self.stop() {
                error!(error = %e, "engine stop during drop failed");
            }
        }
    }
}

struct EngineGateway {
    engine: Weak<TradingEngine>,
}

impl OrderGateway for EngineGateway {
    fn submit(&self, request: OrderRequest) -> std::result::Result<i64, String> {
        let engine = self
            .engine
            .upgrade()
            .ok_or_else(|| "engine is gone".to_string())?;
        engine.submit_order(request)
    }

    fn cancel(&self, client_order_id: i64) -> std::result::Result<(), String> {
        let engine = self
            .engine
            .upgrade()
            .ok_or_else(|| "engine is gone".to_string())?;
        engine.cancel_order(client_order_id)
    }
}

fn validate_request(request: &OrderRequest) -> std::result::Result<(), ValidationError> {
    if request.symbol.ticker.is_empty() {
        return Err(ValidationError::EmptyTicker);
    }
    if request.quantity <= 0 {
        return Err(ValidationError::NonPositiveQuantity {
            quantity: request.quantity,
        });
    }
    if request.price_scale <= 0 {
        return Err(ValidationError::BadPriceScale {
            price_scale: request.price_scale,
        });
    }
    match request.order_type {
        OrderType::Limit | OrderType::StopLimit if request.price <= 0 => {
            return Err(ValidationError::MissingLimitPrice);
        }
        _ => {}
    }
    match request.order_type {
        OrderType::Stop | OrderType::StopLimit if request.stop_price <= 0 => {
            return Err(ValidationError::MissingStopPrice);
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Side;

    #[test]
    fn test_validate_request() {
        let ok = OrderRequest::limit(Symbol::equity("AAPL"), Side::Buy, 10, 15_000);
        assert!(validate_request(&ok).is_ok());

        let mut bad = ok.clone();
        bad.quantity = 0;
        assert!(matches!(
            validate_request(&bad),
            Err(ValidationError::NonPositiveQuantity { .. })
        ));

        let mut bad = ok.clone();
        bad.price = 0;
        assert!(matches!(
            validate_request(&bad),
            Err(ValidationError::MissingLimitPrice)
        ));

        let mut bad = ok.clone();
        bad.symbol.ticker = String::new();
        assert!(matches!(
            validate_request(&bad),
            Err(ValidationError::EmptyTicker)
        ));

        let mut stop = ok.clone();
        stop.order_type = OrderType::Stop;
        stop.stop_price = 0;
        assert!(matches!(
            validate_request(&stop),
            Err(ValidationError::MissingStopPrice)
        ));

        let market = OrderRequest::market(Symbol::equity("AAPL"), Side::Sell, 5);
        assert!(validate_request(&market).is_ok());
    }
}
