//! SQLite trade journal: every order the engine submits and every
//! execution it detects.

use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{TradingError, TradingResult};

pub mod execution;
pub mod order;

pub use execution::{ExecutionOutcome, ExecutionRecord};
pub use order::{OrderKind, OrderRecord, PlacementStatus};

mod embedded {
    refinery::embed_migrations!("migrations");
}

#[derive(Clone)]
pub struct Journal {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Journal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Journal").finish_non_exhaustive()
    }
}

impl Journal {
    /// Open (or create) the journal file and bring its schema up to date
    pub fn open<P: AsRef<Path>>(path: P) -> TradingResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| TradingError::Journal(format!("cannot create {}: {}", parent.display(), e)))?;
            }
        }

        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory journal (for testing)
    pub fn open_in_memory() -> TradingResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> TradingResult<Self> {
        let journal = Journal {
            conn: Arc::new(Mutex::new(conn)),
        };
        journal.run_migrations()?;
        Ok(journal)
    }

    fn run_migrations(&self) -> TradingResult<()> {
        let mut conn = self.lock()?;
        embedded::migrations::runner().run(&mut *conn)?;
        Ok(())
    }

    fn lock(&self) -> TradingResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| TradingError::Journal("journal connection poisoned".to_string()))
    }

    pub fn record_order(&self, record: &OrderRecord) -> TradingResult<i64> {
        let conn = self.lock()?;
        Ok(record.insert(&conn)?)
    }

    pub fn record_execution(&self, record: &ExecutionRecord) -> TradingResult<i64> {
        let conn = self.lock()?;
        Ok(record.insert(&conn)?)
    }

    /// Most recent orders first
    pub fn recent_orders(&self, limit: usize) -> TradingResult<Vec<OrderRecord>> {
        let conn = self.lock()?;
        Ok(OrderRecord::list_recent(&conn, limit)?)
    }

    pub fn executions(&self) -> TradingResult<Vec<ExecutionRecord>> {
        let conn = self.lock()?;
        Ok(ExecutionRecord::list(&conn)?)
    }

    pub fn fills_count(&self) -> TradingResult<i64> {
        let conn = self.lock()?;
        Ok(ExecutionRecord::count_by_outcome(&conn, ExecutionOutcome::Filled)?)
    }

    /// Check database health
    pub fn health_check(&self) -> TradingResult<bool> {
        let conn = self.lock()?;
        let result: i32 = conn.query_row("SELECT 1", [], |row| row.get(0))?;
        Ok(result == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_journal_creation() {
        let journal = Journal::open_in_memory().unwrap();
        assert!(journal.health_check().unwrap());
    }

    #[test]
    fn test_migrations_create_tables() {
        let journal = Journal::open_in_memory().unwrap();
        let conn = journal.lock().unwrap();
        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN ('placed_orders', 'executions')",
                [],
                |row| row.get(0),
            )
            .unwrap();

        assert_eq!(count, 2);
    }
}
