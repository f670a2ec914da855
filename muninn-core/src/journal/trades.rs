//! Trade journal
//!
//! Trades are immutable, so replay is a plain accumulation. Queries bin
//! by the execution timestamp's UTC calendar day, not the write time.

use super::log::{AppendLog, ReplayStats, Rolling};
use super::{records, JournalError};
use crate::config::PersistenceMode;
use crate::core::types::Trade;
use crate::utils::clock::{epoch_nanos, utc_yyyymmdd};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::path::Path;

const RECENT_LIMIT: usize = 256;

#[derive(Default)]
struct Index {
    count: usize,
    recent: VecDeque<Trade>,
    by_date: HashMap<u32, Vec<Trade>>,
}

impl Index {
    fn absorb(&mut self, trade: Trade) {
        self.count += 1;
        self.by_date
            .entry(utc_yyyymmdd(trade.executed_at))
            .or_default()
            .push(trade.clone());
        self.recent.push_back(trade);
        while self.recent.len() > RECENT_LIMIT {
            self.recent.pop_front();
        }
    }
}

pub struct TradeJournal {
    log: Mutex<AppendLog>,
    index: RwLock<Index>,
}

impl TradeJournal {
    pub fn open(root: &Path, mode: PersistenceMode) -> Result<(Self, ReplayStats), JournalError> {
        let log = AppendLog::open(root.join("trades"), mode, Rolling::Daily)?;
        let mut index = Index::default();
        let stats = log.replay(|payload| {
            let (_, trade) = records::decode_trade(payload)?;
            index.absorb(trade);
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

    pub fn append(&self, trade: &Trade) -> Result<(), JournalError> {
        let payload = records::encode_trade(trade, epoch_nanos());
        self.log.lock().append(&payload)?;
        self.index.write().absorb(trade.clone());
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.index.read().count
    }

    /// Most recent trades, oldest first, bounded.
    pub fn recent(&self) -> Vec<Trade> {
        self.index.read().recent.iter().cloned().collect()
    }

    /// Trades whose `executed_at` falls on the given UTC day (YYYYMMDD).
    pub fn get_trades_for_date(&self, yyyymmdd: u32) -> Vec<Trade> {
        self.index
            .read()
            .by_date
            .get(&yyyymmdd)
            .cloned()
            .unwrap_or_default()
    }

    pub fn flush(&self) -> Result<(), JournalError> {
        self.log.lock().flush()
    }

    pub fn close(&self) -> Result<(), JournalError> {
        self.log.lock().close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Side, Symbol};
    use tempfile::tempdir;

    fn trade(id: i64, executed_at: i64) -> Trade {
        Trade {
            symbol: Symbol::equity("AAPL"),
            side: Side::Buy,
            quantity: 10,
            price: 15_000,
            client_order_id: id,
            exchange_trade_id: format!("t-{id}"),
            executed_at,
            price_scale: 100,
        }
    }

    const DAY_NS: i64 = 86_400 * 1_000_000_000;

    #[test]
    fn test_count_and_recent() {
        let dir = tempdir().unwrap();
        let (journal, _) = TradeJournal::open(dir.path(), PersistenceMode::FileBased).unwrap();
        for id in 0..10 {
            journal.append(&trade(id, id * 1_000)).unwrap();
        }
        assert_eq!(journal.count(), 10);
        assert_eq!(journal.recent().len(), 10);
        assert_eq!(journal.recent().last().unwrap().client_order_id, 9);
    }

    #[test]
    fn test_date_binning_uses_executed_at() {
        let dir = tempdir().unwrap();
        let (journal, _) = TradeJournal::open(dir.path(), PersistenceMode::InMemory).unwrap();

        // Two trades on 1970-01-01, one on 1970-01-02.
        journal.append(&trade(1, 1_000)).unwrap();
        journal.append(&trade(2, DAY_NS - 1)).unwrap();
        journal.append(&trade(3, DAY_NS + 1)).unwrap();

        assert_eq!(journal.get_trades_for_date(19_700_101).len(), 2);
        assert_eq!(journal.get_trades_for_date(19_700_102).len(), 1);
        assert!(journal.get_trades_for_date(19_700_103).is_empty());
    }

    #[test]
    fn test_replay_rebuilds_index() {
        let dir = tempdir().unwrap();
        {
            let (journal, _) =
                TradeJournal::open(dir.path(), PersistenceMode::FileBased).unwrap();
            journal.append(&trade(1, 500)).unwrap();
            journal.append(&trade(2, DAY_NS + 5)).unwrap();
            journal.close().unwrap();
        }

        let (journal, stats) =
            TradeJournal::open(dir.path(), PersistenceMode::FileBased).unwrap();
        assert_eq!(stats.records, 2);
        assert_eq!(journal.count(), 2);
        assert_eq!(journal.get_trades_for_date(19_700_102).len(), 1);
    }
}
