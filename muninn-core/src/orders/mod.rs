//! Order lifecycle management
//!
//! Tracks every order the engine has seen, enforces the status machine,
//! and fans out state changes to registered listeners.
//!
//! ```text
//! PENDING -> SUBMITTED -> ACCEPTED -> (PARTIALLY_FILLED)* -> FILLED
//!                              \-> CANCELLED
//!                              \-> REJECTED
//!                              \-> EXPIRED
//! PENDING -> REJECTED            (pre-trade risk failure)
//! ```
//!
//! Terminal states are sticky: re-entering a terminal order is a no-op
//! (`Ok(false)`), while an illegal forward transition is a bug and fails
//! with [`EngineError::IllegalTransition`]. Mutation happens only on the
//! order-handler thread; snapshot readers take short read guards and
//! receive clones, never aliased references.

use crate::core::errors::EngineError;
use crate::core::types::{fixed, Order, OrderStatus};
use crate::utils::clock::epoch_nanos;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, warn};

/// Invoked synchronously on every order state change, on the handler
/// thread. Listeners must not publish events and must not block.
pub type OrderListener = Box<dyn Fn(&Order) + Send + Sync>;

#[derive(Default)]
struct OrderIndex {
    /// Insertion order; never shrinks during a session.
    orders: Vec<Order>,
    by_client_id: HashMap<i64, usize>,
    by_exchange_id: HashMap<String, i64>,
}

/// Engine-owned order book-keeping.
pub struct OrderManager {
    index: RwLock<OrderIndex>,
    listeners: RwLock<Vec<OrderListener>>,
    /// Monotonic within the process; seeded past the journal maximum at
    /// cold start.
    next_client_order_id: AtomicI64,
}

impl OrderManager {
    pub fn new() -> Self {
        Self {
            index: RwLock::new(OrderIndex::default()),
            listeners: RwLock::new(Vec::new()),
            next_client_order_id: AtomicI64::new(1),
        }
    }

    /// Allocate the next client order id.
    #[inline]
    pub fn allocate_id(&self) -> i64 {
        self.next_client_order_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Advance the id counter past `max_seen` (cold-start restore).
    pub fn seed_ids(&self, max_seen: i64) {
        self.next_client_order_id
            .fetch_max(max_seen + 1, Ordering::Relaxed);
    }

    pub fn add_listener(&self, listener: OrderListener) {
        self.listeners.write().push(listener);
    }

    /// Register a new order in PENDING. Duplicate ids are rejected.
    pub fn track(&self, order: Order) -> Result<(), EngineError> {
        let mut index = self.index.write();
        if index.by_client_id.contains_key(&order.client_order_id) {
            return Err(EngineError::DuplicateOrder {
                client_order_id: order.client_order_id,
            });
        }
        let slot = index.orders.len();
        index.by_client_id.insert(order.client_order_id, slot);
        index.orders.push(order);
        let snapshot = index.orders[slot].clone();
        drop(index);

        self.notify(&snapshot);
        Ok(())
    }

    /// Re-register an order from the journal without listener fan-out.
    pub fn restore(&self, order: Order) -> Result<(), EngineError> {
        let mut index = self.index.write();
        if index.by_client_id.contains_key(&order.client_order_id) {
            return Err(EngineError::DuplicateOrder {
                client_order_id: order.client_order_id,
            });
        }
        let slot = index.orders.len();
        index.by_client_id.insert(order.client_order_id, slot);
        if let Some(xid) = order.exchange_order_id.clone() {
            index.by_exchange_id.insert(xid, order.client_order_id);
        }
        index.orders.push(order);
        Ok(())
    }

    pub fn mark_submitted(&self, client_order_id: i64) -> Result<bool, EngineError> {
        self.transition(client_order_id, OrderStatus::Submitted, |order, now| {
            order.submitted_at = now;
            order.submit_latency_ns = now.saturating_sub(order.created_at);
        })
    }

    pub fn mark_accepted(
        &self,
        client_order_id: i64,
        exchange_order_id: &str,
    ) -> Result<bool, EngineError> {
        let changed = self.transition(client_order_id, OrderStatus::Accepted, |order, now| {
            order.exchange_order_id = Some(exchange_order_id.to_string());
            if order.submitted_at > 0 {
                order.ack_latency_ns = now.saturating_sub(order.submitted_at);
            }
        })?;
        if changed {
            self.index
                .write()
                .by_exchange_id
                .insert(exchange_order_id.to_string(), client_order_id);
        }
        Ok(changed)
    }

    /// Apply a partial fill. Transitions to FILLED if it completes the
    /// order.
    pub fn mark_partially_filled(
        &self,
        client_order_id: i64,
        fill_quantity: i64,
        fill_price: i64,
    ) -> Result<bool, EngineError> {
        self.apply_fill(client_order_id, fill_quantity, fill_price, false)
    }

    /// Apply the final fill. The order must end exactly full.
    pub fn mark_filled(
        &self,
        client_order_id: i64,
        fill_quantity: i64,
        fill_price: i64,
    ) -> Result<bool, EngineError> {
        self.apply_fill(client_order_id, fill_quantity, fill_price, true)
    }

    pub fn mark_cancelled(&self, client_order_id: i64) -> Result<bool, EngineError> {
        self.transition(client_order_id, OrderStatus::Cancelled, |_, _| {})
    }

    pub fn mark_rejected(
        &self,
        client_order_id: i64,
        reason: &str,
    ) -> Result<bool, EngineError> {
        self.transition(client_order_id, OrderStatus::Rejected, |order, _| {
            order.reject_reason = Some(reason.to_string());
        })
    }

    pub fn mark_expired(&self, client_order_id: i64) -> Result<bool, EngineError> {
        self.transition(client_order_id, OrderStatus::Expired, |_, _| {})
    }

    /// Amend quantity and limit price on an active order. The new
    /// quantity must cover what has already filled.
    pub fn modify(
        &self,
        client_order_id: i64,
        new_quantity: i64,
        new_price: i64,
    ) -> Result<bool, EngineError> {
        let now = epoch_nanos();
        let snapshot = {
            let mut index = self.index.write();
            let slot = *index
                .by_client_id
                .get(&client_order_id)
                .ok_or(EngineError::UnknownOrder { client_order_id })?;
            let order = &mut index.orders[slot];

            if order.status.is_terminal() {
                return Ok(false);
            }
            if new_quantity <= 0 || new_price <= 0 || new_quantity < order.filled_quantity {
                return Err(EngineError::BadFill {
                    client_order_id,
                    quantity: new_quantity,
                    price: new_price,
                });
            }

            order.quantity = new_quantity;
            order.price = new_price;
            order.last_updated_at = now;
            order.clone()
        };
        self.notify(&snapshot);
        Ok(true)
    }

    /// Immutable snapshot of one order.
    pub fn get(&self, client_order_id: i64) -> Option<Order> {
        let index = self.index.read();
        index
            .by_client_id
            .get(&client_order_id)
            .map(|&slot| index.orders[slot].clone())
    }

    pub fn get_by_exchange_id(&self, exchange_order_id: &str) -> Option<Order> {
        let index = self.index.read();
        let id = *index.by_exchange_id.get(exchange_order_id)?;
        index
            .by_client_id
            .get(&id)
            .map(|&slot| index.orders[slot].clone())
    }

    /// Non-terminal orders, in insertion order.
    pub fn get_active(&self) -> Vec<Order> {
        self.index
            .read()
            .orders
            .iter()
            .filter(|o| o.is_active())
            .cloned()
            .collect()
    }

    /// Every tracked order, in insertion order.
    pub fn all(&self) -> Vec<Order> {
        self.index.read().orders.clone()
    }

    pub fn active_count(&self) -> usize {
        self.index.read().orders.iter().filter(|o| o.is_active()).count()
    }

    pub fn total_count(&self) -> usize {
        self.index.read().orders.len()
    }

    fn notify(&self, order: &Order) {
        for listener in self.listeners.read().iter() {
            listener(order);
        }
    }

    /// Shared transition guts: terminal no-op, legality check, mutation,
    /// listener fan-out.
    fn transition<F>(
        &self,
        client_order_id: i64,
        to: OrderStatus,
        mutate: F,
    ) -> Result<bool, EngineError>
    where
        F: FnOnce(&mut Order, i64),
    {
        let now = epoch_nanos();
        let snapshot = {
            let mut index = self.index.write();
            let slot = *index
                .by_client_id
                .get(&client_order_id)
                .ok_or(EngineError::UnknownOrder { client_order_id })?;
            let order = &mut index.orders[slot];

            if order.status.is_terminal() {
                debug!(
                    client_order_id,
                    status = %order.status,
                    attempted = %to,
                    "transition on terminal order ignored"
                );
                return Ok(false);
            }
            if !legal(order.status, to) {
                return Err(EngineError::IllegalTransition {
                    client_order_id,
                    from: order.status,
                    to,
                });
            }

            mutate(order, now);
            order.status = to;
            order.last_updated_at = now;
            order.clone()
        };

        self.notify(&snapshot);
        Ok(true)
    }

    fn apply_fill(
        &self,
        client_order_id: i64,
        fill_quantity: i64,
        fill_price: i64,
        terminal: bool,
    ) -> Result<bool, EngineError> {
        let now = epoch_nanos();
        let snapshot = {
            let mut index = self.index.write();
            let slot = *index
                .by_client_id
                .get(&client_order_id)
                .ok_or(EngineError::UnknownOrder { client_order_id })?;
            let order = &mut index.orders[slot];

            if order.status.is_terminal() {
                debug!(client_order_id, "fill on terminal order ignored");
                return Ok(false);
            }
            let to = if terminal {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            if !legal(order.status, to) {
                return Err(EngineError::IllegalTransition {
                    client_order_id,
                    from: order.status,
                    to,
                });
            }
            if fill_quantity <= 0 || fill_price <= 0 {
                return Err(EngineError::BadFill {
                    client_order_id,
                    quantity: fill_quantity,
                    price: fill_price,
                });
            }
            let remaining = order.remaining_quantity();
            if fill_quantity > remaining {
                return Err(EngineError::Overfill {
                    client_order_id,
                    fill_quantity,
                    remaining,
                });
            }

            order.average_filled_price = fixed::weighted_average(
                order.average_filled_price,
                order.filled_quantity,
                fill_price,
                fill_quantity,
            );
            order.filled_quantity += fill_quantity;
            order.status = if order.filled_quantity == order.quantity {
                OrderStatus::Filled
            } else {
                if terminal {
                    warn!(
                        client_order_id,
                        filled = order.filled_quantity,
                        quantity = order.quantity,
                        "final fill left order short, keeping it open"
                    );
                }
                OrderStatus::PartiallyFilled
            };
            order.last_updated_at = now;
            order.clone()
        };

        self.notify(&snapshot);
        Ok(true)
    }
}

impl Default for OrderManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Forward-transition legality, terminal cases handled by callers.
fn legal(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    match to {
        Submitted => from == Pending,
        Accepted => from == Submitted,
        PartiallyFilled | Filled => matches!(from, Accepted | PartiallyFilled),
        Cancelled | Expired => matches!(from, Submitted | Accepted | PartiallyFilled),
        Rejected => matches!(from, Pending | Submitted | Accepted),
        Pending => false,
    }
}
