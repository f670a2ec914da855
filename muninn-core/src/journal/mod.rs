//! Persistence journals
//!
//! Five append-only streams under one root:
//!
//! ```text
//! <root>/orders/YYYYMMDD.log        order state changes
//! <root>/trades/YYYYMMDD.log        immutable executions
//! <root>/positions/YYYYMMDD.log     position snapshots
//! <root>/strategies/strategies.log  definitions + tombstones (cross-day)
//! <root>/audit/YYYYMMDD.log         audit trail
//! ```
//!
//! Each stream rebuilds its in-memory indices by replaying its log on
//! open. Cold-start restoration order is positions (latest snapshot per
//! symbol), then orders, then non-tombstoned strategies; trades are never
//! replayed into positions.

pub mod audit;
pub mod log;
pub mod orders;
pub mod positions;
pub mod records;
pub mod strategies;
pub mod trades;

pub use audit::AuditJournal;
pub use log::{AppendLog, ReplayStats, Rolling};
pub use orders::OrderJournal;
pub use positions::PositionJournal;
pub use records::StrategyRecord;
pub use strategies::StrategyJournal;
pub use trades::TradeJournal;

use crate::config::PersistenceConfig;
use crate::orders::OrderManager;
use crate::positions::PositionBook;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed journal record: {0}")]
    Malformed(String),
    #[error("unsupported journal schema version {0}")]
    UnsupportedVersion(u8),
}

/// Per-stream replay statistics from open.
#[derive(Debug, Clone, Copy, Default)]
pub struct JournalOpenStats {
    pub orders: ReplayStats,
    pub trades: ReplayStats,
    pub positions: ReplayStats,
    pub strategies: ReplayStats,
    pub audit: ReplayStats,
}

impl JournalOpenStats {
    pub fn total_dropped(&self) -> usize {
        self.orders.dropped
            + self.trades.dropped
            + self.positions.dropped
            + self.strategies.dropped
            + self.audit.dropped
    }
}

/// The five streams, opened together and closed together.
pub struct JournalSet {
    pub orders: OrderJournal,
    pub trades: TradeJournal,
    pub positions: PositionJournal,
    pub strategies: StrategyJournal,
    pub audit: AuditJournal,
    stats: JournalOpenStats,
}

impl JournalSet {
    /// Open every stream and rebuild indices. Scoped acquisition: the
    /// engine guarantees a matching [`JournalSet::close`] on stop.
    pub fn open(config: &PersistenceConfig) -> Result<Self, JournalError> {
        let root = config.root.as_path();
        let mode = config.mode;

        let (orders, orders_stats) = OrderJournal::open(root, mode)?;
        let (trades, trades_stats) = TradeJournal::open(root, mode)?;
        let (positions, positions_stats) = PositionJournal::open(root, mode)?;
        let (strategies, strategies_stats) = StrategyJournal::open(root, mode)?;
        let (audit, audit_stats) = AuditJournal::open(root, mode)?;

        let stats = JournalOpenStats {
            orders: orders_stats,
            trades: trades_stats,
            positions: positions_stats,
            strategies: strategies_stats,
            audit: audit_stats,
        };
        if stats.total_dropped() > 0 {
            warn!(dropped = stats.total_dropped(), "journal replay dropped damaged tails");
        }
        info!(
            orders = stats.orders.records,
            trades = stats.trades.records,
            positions = stats.positions.records,
            strategies = stats.strategies.records,
            "journals opened"
        );

        Ok(Self {
            orders,
            trades,
            positions,
            strategies,
            audit,
            stats,
        })
    }

    pub fn open_stats(&self) -> JournalOpenStats {
        self.stats
    }

    /// Cold-start restoration: positions first (latest snapshot per
    /// symbol), then orders, then the id counter. Strategy definitions
    /// are returned by [`StrategyJournal::all`] for the engine to
    /// re-register.
    pub fn restore_into(&self, order_manager: &OrderManager, position_book: &PositionBook) {
        let mut restored_positions = 0usize;
        for position in self.positions.all_latest() {
            position_book.restore_position(position);
            restored_positions += 1;
        }

        let mut restored_orders = 0usize;
        for order in self.orders.all() {
            match order_manager.restore(order) {
                Ok(()) => restored_orders += 1,
                Err(e) => warn!(error = %e, "skipping unrestorable order"),
            }
        }
        order_manager.seed_ids(self.orders.max_client_id());

        info!(restored_positions, restored_orders, "cold-start state restored");
    }

    pub fn flush_all(&self) -> Result<(), JournalError> {
        self.orders.flush()?;
        self.trades.flush()?;
        self.positions.flush()?;
        self.strategies.flush()?;
        self.audit.flush()
    }

    pub fn close_all(&self) -> Result<(), JournalError> {
        self.orders.close()?;
        self.trades.close()?;
        self.positions.close()?;
        self.strategies.close()?;
        self.audit.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PersistenceMode;
    use crate::core::types::{OrderRequest, Side, Symbol, Trade};
    use tempfile::tempdir;

    fn config(root: &std::path::Path) -> PersistenceConfig {
        PersistenceConfig {
            root: root.to_path_buf(),
            mode: PersistenceMode::FileBased,
        }
    }

    #[test]
    fn test_open_creates_stream_dirs() {
        let dir = tempdir().unwrap();
        let set = JournalSet::open(&config(dir.path())).unwrap();
        set.close_all().unwrap();

        for stream in ["orders", "trades", "positions", "strategies", "audit"] {
            assert!(dir.path().join(stream).is_dir(), "{stream} missing");
        }
    }

    #[test]
    fn test_cold_start_restore_order() {
        let dir = tempdir().unwrap();
        {
            let set = JournalSet::open(&config(dir.path())).unwrap();

            // Journal a filled order and the resulting position snapshot.
            let mut order =
                OrderRequest::limit(Symbol::equity("AAPL"), Side::Buy, 200, 15_000)
                    .into_order(41, 0);
            order.filled_quantity = 200;
            set.orders.append(&order).unwrap();

            let book = PositionBook::new();
            let trade = Trade {
                symbol: Symbol::equity("AAPL"),
                side: Side::Buy,
                quantity: 200,
                price: 15_050,
                client_order_id: 41,
                exchange_trade_id: "t".to_string(),
                executed_at: 0,
                price_scale: 100,
            };
            let applied = book.apply_trade(&trade).unwrap();
            set.positions.append(&applied.position).unwrap();
            set.close_all().unwrap();
        }

        let set = JournalSet::open(&config(dir.path())).unwrap();
        let manager = OrderManager::new();
        let book = PositionBook::new();
        set.restore_into(&manager, &book);

        let position = book.get(&Symbol::equity("AAPL")).unwrap();
        assert_eq!(position.quantity, 200);
        assert_eq!(position.average_entry_price, 15_050);
        assert_eq!(manager.get(41).unwrap().quantity, 200);
        assert!(manager.allocate_id() > 41);
    }

    #[test]
    fn test_in_memory_set() {
        let set = JournalSet::open(&PersistenceConfig {
            root: PathBuf::new(),
            mode: PersistenceMode::InMemory,
        })
        .unwrap();
        let order = OrderRequest::limit(Symbol::equity("AAPL"), Side::Buy, 1, 100)
            .into_order(1, 0);
        set.orders.append(&order).unwrap();
        assert_eq!(set.orders.count(), 1);
        set.flush_all().unwrap();
        set.close_all().unwrap();
    }
}
