//! Strategy definition journal
//!
//! A single cross-day log. Deletion is logical: a tombstone record hides
//! the id, and replay applies upserts and tombstones in order so a
//! re-registered id comes back.

use super::log::{AppendLog, ReplayStats, Rolling};
use super::records::{self, StrategyRecord};
use super::JournalError;
use crate::algo::definition::StrategyDefinition;
use crate::config::PersistenceMode;
use crate::utils::clock::epoch_nanos;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::Path;

pub struct StrategyJournal {
    log: Mutex<AppendLog>,
    by_id: RwLock<HashMap<String, StrategyDefinition>>,
}

impl StrategyJournal {
    pub fn open(root: &Path, mode: PersistenceMode) -> Result<(Self, ReplayStats), JournalError> {
        let log = AppendLog::open(
            root.join("strategies"),
            mode,
            Rolling::Single("strategies.log"),
        )?;
        let mut by_id = HashMap::new();
        let stats = log.replay(|payload| {
            match records::decode_strategy(payload)?.1 {
                StrategyRecord::Upsert(def) => {
                    by_id.insert(def.id.clone(), def);
                }
                StrategyRecord::Tombstone { id } => {
                    by_id.remove(&id);
                }
            }
            Ok(())
        })?;
        Ok((
            Self {
                log: Mutex::new(log),
                by_id: RwLock::new(by_id),
            },
            stats,
        ))
    }

    pub fn upsert(&self, definition: &StrategyDefinition) -> Result<(), JournalError> {
        let payload = records::encode_strategy(
            &StrategyRecord::Upsert(definition.clone()),
            epoch_nanos(),
        );
        self.log.lock().append(&payload)?;
        self.by_id
            .write()
            .insert(definition.id.clone(), definition.clone());
        Ok(())
    }

    /// Logical delete. Idempotent.
    pub fn tombstone(&self, id: &str) -> Result<(), JournalError> {
        let payload = records::encode_strategy(
            &StrategyRecord::Tombstone { id: id.to_string() },
            epoch_nanos(),
        );
        self.log.lock().append(&payload)?;
        self.by_id.write().remove(id);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<StrategyDefinition> {
        self.by_id.read().get(id).cloned()
    }

    /// Every live (non-tombstoned) definition.
    pub fn all(&self) -> Vec<StrategyDefinition> {
        self.by_id.read().values().cloned().collect()
    }

    pub fn flush(&self) -> Result<(), JournalError> {
        self.log.lock().flush()
    }

    pub fn close(&self) -> Result<(), JournalError> {
        self.log.lock().close()
    }
}
