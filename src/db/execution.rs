//! Execution records: ledger orders that disappeared from the book

use rusqlite::{params, Connection, Result as SqlResult, Row};
use serde::{Deserialize, Serialize};

use super::order::{side_from_string, side_to_string};
use crate::core::types::{Order, Side};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Option<i64>,
    pub symbol: String,
    pub order_id: String,
    pub hash: String,
    pub side: Side,
    pub rate: f64,
    pub amount: f64,
    pub receive: f64,
    pub outcome: ExecutionOutcome,
    pub replacement_hash: Option<String>,
    pub detected_at: Option<String>,
}

/// `Filled` orders get a replacement, `Dropped` ones (cancelled outside the
/// engine) do not
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum ExecutionOutcome {
    Filled,
    Dropped,
}

impl ExecutionOutcome {
    pub(crate) fn to_string(&self) -> &str {
        match self {
            ExecutionOutcome::Filled => "FILLED",
            ExecutionOutcome::Dropped => "DROPPED",
        }
    }

    fn from_string(s: &str) -> Self {
        match s {
            "FILLED" => ExecutionOutcome::Filled,
            _ => ExecutionOutcome::Dropped,
        }
    }
}

impl ExecutionRecord {
    pub fn new(symbol: &str, order: &Order, outcome: ExecutionOutcome) -> Self {
        ExecutionRecord {
            id: None,
            symbol: symbol.to_string(),
            order_id: order.id.clone(),
            hash: order.hash.clone(),
            side: order.side,
            rate: order.rate,
            amount: order.amount,
            receive: order.receive,
            outcome,
            replacement_hash: None,
            detected_at: None,
        }
    }

    pub fn with_replacement(mut self, hash: Option<String>) -> Self {
        self.replacement_hash = hash;
        self
    }

    /// Parse a row from the database
    fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(ExecutionRecord {
            id: Some(row.get(0)?),
            symbol: row.get(1)?,
            order_id: row.get(2)?,
            hash: row.get(3)?,
            side: side_from_string(&row.get::<_, String>(4)?),
            rate: row.get(5)?,
            amount: row.get(6)?,
            receive: row.get(7)?,
            outcome: ExecutionOutcome::from_string(&row.get::<_, String>(8)?),
            replacement_hash: row.get(9)?,
            detected_at: Some(row.get(10)?),
        })
    }

    pub fn insert(&self, conn: &Connection) -> SqlResult<i64> {
        conn.execute(
            "INSERT INTO executions (
                symbol, order_id, hash, side, rate, amount, receive,
                outcome, replacement_hash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                self.symbol,
                self.order_id,
                self.hash,
                side_to_string(self.side),
                self.rate,
                self.amount,
                self.receive,
                self.outcome.to_string(),
                self.replacement_hash,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// All executions, oldest first
    pub fn list(conn: &Connection) -> SqlResult<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, symbol, order_id, hash, side, rate, amount, receive,
                    outcome, replacement_hash, detected_at
             FROM executions ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([], |row| Self::from_row(row))?;
        rows.collect()
    }

    pub fn count_by_outcome(conn: &Connection, outcome: ExecutionOutcome) -> SqlResult<i64> {
        conn.query_row(
            "SELECT COUNT(*) FROM executions WHERE outcome = ?1",
            params![outcome.to_string()],
            |row| row.get(0),
        )
    }
}
