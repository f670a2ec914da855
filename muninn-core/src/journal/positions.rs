//! Position snapshot journal
//!
//! Snapshots are authoritative for cold-start restoration: positions are
//! rebuilt from the latest snapshot per symbol, never by replaying
//! trades. The historical series and the per-date end-of-day view serve
//! queries only.

use super::log::{AppendLog, ReplayStats, Rolling};
use super::{records, JournalError};
use crate::config::PersistenceMode;
use crate::core::types::Symbol;
use crate::positions::Position;
use crate::utils::clock::{epoch_nanos, utc_yyyymmdd};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;

#[derive(Default)]
struct Index {
    latest_by_symbol: HashMap<Symbol, Position>,
    /// Snapshot series per symbol, (journal timestamp, snapshot), in
    /// append order.
    history: HashMap<Symbol, Vec<(i64, Position)>>,
    /// Last snapshot of each symbol per UTC day.
    end_of_day: HashMap<u32, HashMap<Symbol, Position>>,
}

impl Index {
    fn absorb(&mut self, ts: i64, position: Position) {
        self.latest_by_symbol
            .insert(position.symbol.clone(), position.clone());
        self.end_of_day
            .entry(utc_yyyymmdd(ts))
            .or_default()
            .insert(position.symbol.clone(), position.clone());
        self.history
            .entry(position.symbol.clone())
            .or_default()
            .push((ts, position));
    }
}

pub struct PositionJournal {
    log: Mutex<AppendLog>,
    index: RwLock<Index>,
}

impl PositionJournal {
    pub fn open(root: &Path, mode: PersistenceMode) -> Result<(Self, ReplayStats), JournalError> {
        let log = AppendLog::open(root.join("positions"), mode, Rolling::Daily)?;
        let mut index = Index::default();
        let stats = log.replay(|payload| {
            let (ts, position) = records::decode_position(payload)?;
            index.absorb(ts, position);
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

    pub fn append(&self, position: &Position) -> Result<(), JournalError> {
        let ts = epoch_nanos();
        let payload = records::encode_position(position, ts);
        self.log.lock().append(&payload)?;
        self.index.write().absorb(ts, position.clone());
        Ok(())
    }

    pub fn latest(&self, symbol: &Symbol) -> Option<Position> {
        self.index.read().latest_by_symbol.get(symbol).cloned()
    }

    /// Latest snapshot of every symbol ever journaled.
    pub fn all_latest(&self) -> Vec<Position> {
        self.index.read().latest_by_symbol.values().cloned().collect()
    }

    /// Snapshots with `from_ns <= ts <= to_ns`, in append order.
    pub fn get_snapshots(&self, symbol: &Symbol, from_ns: i64, to_ns: i64) -> Vec<Position> {
        self.index
            .read()
            .history
            .get(symbol)
            .map(|series| {
                series
                    .iter()
                    .filter(|(ts, _)| (from_ns..=to_ns).contains(ts))
                    .map(|(_, p)| p.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The end-of-day snapshot for a symbol on a UTC date.
    pub fn end_of_day(&self, yyyymmdd: u32, symbol: &Symbol) -> Option<Position> {
        self.index
            .read()
            .end_of_day
            .get(&yyyymmdd)
            .and_then(|day| day.get(symbol).cloned())
    }

    pub fn flush(&self) -> Result<(), JournalError> {
        self.log.lock().flush()
    }

    pub fn close(&self) -> Result<(), JournalError> {
        self.log.lock().close()
    }
}
