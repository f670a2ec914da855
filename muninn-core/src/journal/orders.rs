//! Order journal
//!
//! Every order state change appends a full order record; replay keeps the
//! last record per client id, so the index converges on each order's
//! final journaled state regardless of how many transitions were logged.

use super::log::{AppendLog, ReplayStats, Rolling};
use super::{records, JournalError};
use crate::config::PersistenceMode;
use crate::core::types::Order;
use crate::utils::clock::epoch_nanos;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::path::Path;

const RECENT_LIMIT: usize = 256;

#[derive(Default)]
struct Index {
    by_client_id: HashMap<i64, Order>,
    by_exchange_id: HashMap<String, i64>,
    /// Insertion order of first appearance.
    insertion: Vec<i64>,
    recent: VecDeque<i64>,
}

impl Index {
    fn absorb(&mut self, order: Order) {
        if let Some(xid) = order.exchange_order_id.clone() {
            self.by_exchange_id.insert(xid, order.client_order_id);
        }
        if !self.by_client_id.contains_key(&order.client_order_id) {
            self.insertion.push(order.client_order_id);
        }
        self.recent.retain(|&id| id != order.client_order_id);
        self.recent.push_back(order.client_order_id);
        while self.recent.len() > RECENT_LIMIT {
            self.recent.pop_front();
        }
        self.by_client_id.insert(order.client_order_id, order);
    }
}

pub struct OrderJournal {
    log: Mutex<AppendLog>,
    index: RwLock<Index>,
}

impl OrderJournal {
    /// Open the stream and rebuild the index from the log.
    pub fn open(root: &Path, mode: PersistenceMode) -> Result<(Self, ReplayStats), JournalError> {
        let log = AppendLog::open(root.join("orders"), mode, Rolling::Daily)?;
        let mut index = Index::default();
        let stats = log.replay(|payload| {
            let (_, order) = records::decode_order(payload)?;
            index.absorb(order);
            Ok(())
        })?;
        Ok((
            Self {
                log: Mutex::new(log),
                index: RwLock::new(index),
            },
            stats,
        ))
    }

    /// Append the order's current state and update the index.
    pub fn append(&self, order: &Order) -> Result<(), JournalError> {
        let payload = records::encode_order(order, epoch_nanos());
        self.log.lock().append(&payload)?;
        self.index.write().absorb(order.clone());
        Ok(())
    }

    pub fn get(&self, client_order_id: i64) -> Option<Order> {
        self.index.read().by_client_id.get(&client_order_id).cloned()
    }

    pub fn get_by_exchange_id(&self, exchange_order_id: &str) -> Option<Order> {
        let index = self.index.read();
        let id = index.by_exchange_id.get(exchange_order_id)?;
        index.by_client_id.get(id).cloned()
    }

    /// Final journaled state of every order, in first-appearance order.
    pub fn all(&self) -> Vec<Order> {
        let index = self.index.read();
        index
            .insertion
            .iter()
            .filter_map(|id| index.by_client_id.get(id).cloned())
            .collect()
    }

    /// Most recently touched orders, oldest first, bounded.
    pub fn recent(&self) -> Vec<Order> {
        let index = self.index.read();
        index
            .recent
            .iter()
            .filter_map(|id| index.by_client_id.get(id).cloned())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.index.read().by_client_id.len()
    }

    /// Highest client order id seen; used to reseed the allocator.
    pub fn max_client_id(&self) -> i64 {
        self.index
            .read()
            .by_client_id
            .keys()
            .copied()
            .max()
            .unwrap_or(0)
    }

    pub fn flush(&self) -> Result<(), JournalError> {
        self.log.lock().flush()
    }

    pub fn close(&self) -> Result<(), JournalError> {
        self.log.lock().close()
    }
}
