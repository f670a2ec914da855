//! Engine events
//!
//! The event type is a tag plus a flat set of payload slots. Only the
//! slots the tag indicates are valid; the rest keep whatever the previous
//! occupant of the ring slot left behind. Consumers must read events only
//! through the pipeline and must not retain references across handler
//! returns.

pub mod pipeline;
pub mod ring;

pub use pipeline::{EventHandler, Pipeline};
pub use ring::EventRing;

use crate::core::types::{Order, Quote, Trade};

/// Event tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    /// Slot has never been published
    Empty = 0,
    NewOrder = 1,
    CancelOrder = 2,
    ModifyOrder = 3,
    OrderAccepted = 4,
    OrderRejected = 5,
    OrderFilled = 6,
    OrderCancelled = 7,
    QuoteUpdate = 8,
    TradeUpdate = 9,
}

/// A pre-allocated ring slot.
///
/// One struct with every payload slot; the tag says which are live. This
/// matches the pre-allocated ring model: slots are reused in place, never
/// freed.
#[derive(Debug)]
pub struct Event {
    pub kind: EventKind,
    /// Ring sequence, assigned at publish
    pub sequence: u64,
    /// Publish time, epoch nanoseconds
    pub timestamp_nanos: i64,

    // Payload slots. Valid combinations per kind:
    //   NewOrder                  -> order
    //   CancelOrder               -> client_order_id
    //   ModifyOrder               -> client_order_id, fill_quantity
    //                                (new quantity), fill_price (new price)
    //   OrderAccepted             -> client_order_id, exchange_order_id
    //   OrderRejected             -> client_order_id, reject_reason
    //   OrderFilled               -> client_order_id, fill_quantity,
    //                                fill_price, trade
    //   OrderCancelled            -> client_order_id
    //   QuoteUpdate               -> quote
    //   TradeUpdate               -> trade
    pub order: Option<Order>,
    pub client_order_id: i64,
    pub exchange_order_id: Option<String>,
    pub reject_reason: Option<String>,
    pub fill_quantity: i64,
    pub fill_price: i64,
    pub trade: Option<Trade>,
    pub quote: Option<Quote>,
}

impl Event {
    pub(crate) fn empty() -> Self {
        Self {
            kind: EventKind::Empty,
            sequence: 0,
            timestamp_nanos: 0,
            order: None,
            client_order_id: 0,
            exchange_order_id: None,
            reject_reason: None,
            fill_quantity: 0,
            fill_price: 0,
            trade: None,
            quote: None,
        }
    }

    /// Reset every payload slot before repopulating for a new publish.
    pub(crate) fn clear(&mut self, kind: EventKind, sequence: u64, timestamp_nanos: i64) {
        self.kind = kind;
        self.sequence = sequence;
        self.timestamp_nanos = timestamp_nanos;
        self.order = None;
        self.client_order_id = 0;
        self.exchange_order_id = None;
        self.reject_reason = None;
        self.fill_quantity = 0;
        self.fill_price = 0;
        self.trade = None;
        self.quote = None;
    }
}
