//! Pipeline stage handlers
//!
//! The fixed chain every ring event passes through, in order:
//! OrderHandler (lifecycle, order journal, outbound port, fill routing),
//! PositionHandler (trade application, trade and position journals, risk
//! fill accounting), MetricsHandler (counters and latency histograms).
//!
//! Handlers never publish to the ring. Venue submission and journal
//! appends happen here, but their asynchronous completion is not awaited;
//! a journal write failure escalates to an audit ERROR and disables
//! trading.

use crate::algo::dispatch::DispatchMessage;
use crate::core::audit::{AuditEvent, AuditKind, AuditSink};
use crate::core::types::Trade;
use crate::events::{Event, EventHandler, EventKind};
use crate::journal::JournalSet;
use crate::metrics::{EngineMetrics, LatencyMetrics};
use crate::orders::OrderManager;
use crate::positions::PositionBook;
use crate::ports::OrderPort;
use crate::risk::RiskEngine;
use crate::utils::clock::epoch_nanos;
use crossbeam::channel::Sender;
use std::sync::Arc;
use tracing::{error, warn};

/// Escalation shared by the journaling stages: a failed append is fatal
/// for trading but not for the pipeline.
fn escalate_persistence_failure(
    risk: &RiskEngine,
    audit: &AuditSink,
    what: &str,
    err: &dyn std::fmt::Display,
) {
    error!(what, error = %err, "journal write failed");
    audit.emit(AuditEvent::new(
        AuditKind::Error,
        format!("persistence failure writing {what}: {err}"),
    ));
    risk.disable_trading("persistence failure");
}

pub struct OrderHandler {
    pub orders: Arc<OrderManager>,
    pub risk: Arc<RiskEngine>,
    pub journals: Arc<JournalSet>,
    pub port: Arc<dyn OrderPort>,
    pub dispatch: Sender<DispatchMessage>,
    pub audit: AuditSink,
    pub latency: Arc<LatencyMetrics>,
}

impl OrderHandler {
    fn journal_current(&self, client_order_id: i64) {
        if let Some(order) = self.orders.get(client_order_id) {
            if let Err(e) = self.journals.orders.append(&order) {
                escalate_persistence_failure(&self.risk, &self.audit, "order", &e);
            }
        }
    }

    fn handle_new_order(&mut self, event: &Event) {
        let Some(order) = event.order.as_ref() else {
            warn!(sequence = event.sequence, "NEW_ORDER event without order payload");
            return;
        };

        if let Err(e) = self.orders.track(order.clone()) {
            error!(error = %e, "failed to track new order");
            self.audit.emit(AuditEvent::new(AuditKind::Error, e.to_string()));
            return;
        }
        if let Err(e) = self.orders.mark_submitted(order.client_order_id) {
            error!(error = %e, "failed to mark order submitted");
        }
        if let Some(tracked) = self.orders.get(order.client_order_id) {
            self.latency
                .order_submit
                .record_ns(tracked.submit_latency_ns.max(0) as u64);
        }
        self.journal_current(order.client_order_id);

        self.audit.emit(
            AuditEvent::new(
                AuditKind::OrderSubmitted,
                format!(
                    "{} {} {} @ {}",
                    order.side, order.quantity, order.symbol, order.price
                ),
            )
            .with_details(serde_json::json!({
                "client_order_id": order.client_order_id,
                "strategy_id": order.strategy_id,
            })),
        );

        if let Err(e) = self.port.submit(order) {
            // The venue never saw it; reject locally and feed the breaker.
            error!(client_order_id = order.client_order_id, error = %e, "port submit failed");
            let reason = format!("port submit failed: {e}");
            let _ = self.orders.mark_rejected(order.client_order_id, &reason);
            self.risk.record_exchange_failure(&reason);
            self.journal_current(order.client_order_id);
        }
    }

    fn handle_cancel(&mut self, event: &Event) {
        let Some(order) = self.orders.get(event.client_order_id) else {
            return; // Unknown id: cancel is idempotent.
        };
        if order.is_terminal() {
            return;
        }
        if let Err(e) = self.port.cancel(&order) {
            warn!(client_order_id = order.client_order_id, error = %e, "port cancel failed");
        }
    }

    fn handle_modify(&mut self, event: &Event) {
        // Slot reuse: fill_quantity and fill_price carry the new values.
        let id = event.client_order_id;
        match self.orders.modify(id, event.fill_quantity, event.fill_price) {
            Ok(true) => self.journal_current(id),
            Ok(false) => {}
            Err(e) => {
                warn!(client_order_id = id, error = %e, "modify rejected");
                self.audit.emit(AuditEvent::new(AuditKind::Error, e.to_string()));
            }
        }
    }

    fn handle_accepted(&mut self, event: &Event) {
        let xid = event.exchange_order_id.as_deref().unwrap_or_default();
        match self.orders.mark_accepted(event.client_order_id, xid) {
            Ok(true) => {
                if let Some(order) = self.orders.get(event.client_order_id) {
                    self.latency
                        .order_ack
                        .record_ns(order.ack_latency_ns.max(0) as u64);
                }
                self.journal_current(event.client_order_id);
            }
            Ok(false) => {}
            Err(e) => {
                error!(error = %e, "accept transition failed");
                self.audit.emit(AuditEvent::new(AuditKind::Error, e.to_string()));
            }
        }
    }

    fn handle_rejected(&mut self, event: &Event) {
        let reason = event
            .reject_reason
            .as_deref()
            .unwrap_or("venue rejection with no reason");
        match self.orders.mark_rejected(event.client_order_id, reason) {
            Ok(true) => {
                self.journal_current(event.client_order_id);
                self.risk.record_exchange_failure(reason);
                self.audit.emit(
                    AuditEvent::new(AuditKind::OrderRejected, reason).with_details(
                        serde_json::json!({"client_order_id": event.client_order_id}),
                    ),
                );
            }
            Ok(false) => {}
            Err(e) => {
                error!(error = %e, "reject transition failed");
                self.audit.emit(AuditEvent::new(AuditKind::Error, e.to_string()));
            }
        }
    }

    fn handle_filled(&mut self, event: &Event) {
        let applied = self.orders.mark_partially_filled(
            event.client_order_id,
            event.fill_quantity,
            event.fill_price,
        );
        match applied {
            Ok(true) => {
                self.journal_current(event.client_order_id);
                self.audit.emit(
                    AuditEvent::new(
                        AuditKind::OrderFilled,
                        format!(
                            "order {} filled {} @ {}",
                            event.client_order_id, event.fill_quantity, event.fill_price
                        ),
                    ),
                );
                // Route the fill to the originating strategy only.
                if let Some(order) = self.orders.get(event.client_order_id) {
                    if let (Some(strategy_id), Some(trade)) =
                        (order.strategy_id, event.trade.as_ref())
                    {
                        let _ = self.dispatch.send(DispatchMessage::Fill {
                            strategy_id,
                            trade: trade.clone(),
                        });
                    }
                }
            }
            Ok(false) => {}
            Err(e) => {
                error!(error = %e, "fill transition failed");
                self.audit.emit(AuditEvent::new(AuditKind::Error, e.to_string()));
            }
        }
    }

    fn handle_cancelled(&mut self, event: &Event) {
        match self.orders.mark_cancelled(event.client_order_id) {
            Ok(true) => self.journal_current(event.client_order_id),
            Ok(false) => {}
            Err(e) => {
                error!(error = %e, "cancel transition failed");
                self.audit.emit(AuditEvent::new(AuditKind::Error, e.to_string()));
            }
        }
    }
}

impl EventHandler for OrderHandler {
    fn name(&self) -> &'static str {
        "orders"
    }

    fn on_event(&mut self, _sequence: u64, event: &Event) {
        match event.kind {
            EventKind::NewOrder => self.handle_new_order(event),
            EventKind::CancelOrder => self.handle_cancel(event),
            EventKind::ModifyOrder => self.handle_modify(event),
            EventKind::OrderAccepted => self.handle_accepted(event),
            EventKind::OrderRejected => self.handle_rejected(event),
            EventKind::OrderFilled => self.handle_filled(event),
            EventKind::OrderCancelled => self.handle_cancelled(event),
            EventKind::QuoteUpdate | EventKind::TradeUpdate | EventKind::Empty => {}
        }
    }
}

pub struct PositionHandler {
    pub positions: Arc<PositionBook>,
    pub risk: Arc<RiskEngine>,
    pub journals: Arc<JournalSet>,
    pub audit: AuditSink,
}

impl PositionHandler {
    fn handle_fill(&mut self, trade: &Trade) {
        match self.positions.apply_trade(trade) {
            Ok(applied) => {
                self.risk.record_fill(trade, applied.realized_delta);
                if let Err(e) = self.journals.trades.append(trade) {
                    escalate_persistence_failure(&self.risk, &self.audit, "trade", &e);
                }
                if let Err(e) = self.journals.positions.append(&applied.position) {
                    escalate_persistence_failure(&self.risk, &self.audit, "position", &e);
                }
                self.audit.emit(
                    AuditEvent::new(
                        AuditKind::PositionUpdated,
                        format!(
                            "{} qty {} entry {}",
                            applied.position.symbol,
                            applied.position.quantity,
                            applied.position.average_entry_price
                        ),
                    ),
                );
            }
            Err(e) => {
                // Scale mismatch or bookkeeping bug: loud, never coerced.
                error!(error = %e, "trade application failed");
                self.audit.emit(AuditEvent::new(AuditKind::Error, e.to_string()));
            }
        }
    }
}

impl EventHandler for PositionHandler {
    fn name(&self) -> &'static str {
        "positions"
    }

    fn on_event(&mut self, _sequence: u64, event: &Event) {
        match event.kind {
            EventKind::OrderFilled => {
                if let Some(trade) = event.trade.as_ref() {
                    self.handle_fill(trade);
                }
            }
            EventKind::QuoteUpdate => {
                if let Some(quote) = event.quote.as_ref() {
                    self.positions
                        .update_market_value(&quote.symbol, quote.mid_price());
                }
            }
            _ => {}
        }
    }
}

pub struct MetricsHandler {
    pub metrics: Arc<EngineMetrics>,
    pub latency: Arc<LatencyMetrics>,
}

impl EventHandler for MetricsHandler {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn on_event(&mut self, _sequence: u64, event: &Event) {
        self.metrics.inc_processed();
        match event.kind {
            EventKind::QuoteUpdate => self.metrics.inc_quotes(),
            EventKind::OrderFilled | EventKind::TradeUpdate => self.metrics.inc_trades(),
            _ => {}
        }
        let age = epoch_nanos().saturating_sub(event.timestamp_nanos);
        self.latency.pipeline.record_ns(age.max(0) as u64);
    }
}
