//! Audit journal
//!
//! Append-only trail of engine lifecycle, rejections, breaker trips, and
//! errors, with a bounded in-memory deque of recent events.

use super::log::{AppendLog, ReplayStats, Rolling};
use super::{records, JournalError};
use crate::config::PersistenceMode;
use crate::core::audit::{AuditEvent, AuditKind};
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::path::Path;

const RECENT_LIMIT: usize = 512;

pub struct AuditJournal {
    log: Mutex<AppendLog>,
    recent: RwLock<VecDeque<AuditEvent>>,
}

impl AuditJournal {
    pub fn open(root: &Path, mode: PersistenceMode) -> Result<(Self, ReplayStats), JournalError> {
        let log = AppendLog::open(root.join("audit"), mode, Rolling::Daily)?;
        let mut recent = VecDeque::new();
        let stats = log.replay(|payload| {
            let event = records::decode_audit(payload)?;
            recent.push_back(event);
            while recent.len() > RECENT_LIMIT {
                recent.pop_front();
            }
            Ok(())
        })?;
        Ok((
            Self {
                log: Mutex::new(log),
                recent: RwLock::new(recent),
            },
            stats,
        ))
    }

    pub fn append(&self, event: &AuditEvent) -> Result<(), JournalError> {
        let payload = records::encode_audit(event);
        self.log.lock().append(&payload)?;
        let mut recent = self.recent.write();
        recent.push_back(event.clone());
        while recent.len() > RECENT_LIMIT {
            recent.pop_front();
        }
        Ok(())
    }

    /// Recent events, oldest first, bounded.
    pub fn recent(&self) -> Vec<AuditEvent> {
        self.recent.read().iter().cloned().collect()
    }

    pub fn recent_of_kind(&self, kind: AuditKind) -> Vec<AuditEvent> {
        self.recent
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    pub fn flush(&self) -> Result<(), JournalError> {
        self.log.lock().flush()
    }

    pub fn close(&self) -> Result<(), JournalError> {
        self.log.lock().close()
    }
}
