//! Placed order records

use rusqlite::{params, Connection, Result as SqlResult, Row};
use serde::{Deserialize, Serialize};

use crate::core::types::{OrderRequest, OrderResult, Side};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: Option<i64>,
    pub symbol: String,
    pub kind: OrderKind,
    pub side: Side,
    pub order_type: String,
    pub price: f64,
    pub amount: f64,
    pub grid_level: Option<i64>,
    pub order_id: Option<String>,
    pub hash: Option<String>,
    pub client_id: Option<String>,
    pub status: PlacementStatus,
    pub error_message: Option<String>,
    pub created_at: Option<String>,
}

/// Why the engine submitted the order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum OrderKind {
    Grid,
    Replenish,
    Emergency,
}

impl OrderKind {
    fn to_string(&self) -> &str {
        match self {
            OrderKind::Grid => "GRID",
            OrderKind::Replenish => "REPLENISH",
            OrderKind::Emergency => "EMERGENCY",
        }
    }

    fn from_string(s: &str) -> Self {
        match s {
            "REPLENISH" => OrderKind::Replenish,
            "EMERGENCY" => OrderKind::Emergency,
            _ => OrderKind::Grid,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum PlacementStatus {
    Placed,
    Failed,
}

impl PlacementStatus {
    fn to_string(&self) -> &str {
        match self {
            PlacementStatus::Placed => "PLACED",
            PlacementStatus::Failed => "FAILED",
        }
    }

    fn from_string(s: &str) -> Self {
        match s {
            "FAILED" => PlacementStatus::Failed,
            _ => PlacementStatus::Placed,
        }
    }
}

pub(crate) fn side_to_string(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

pub(crate) fn side_from_string(s: &str) -> Side {
    match s {
        "SELL" => Side::Sell,
        _ => Side::Buy,
    }
}

impl OrderRecord {
    /// Record of an order the exchange accepted
    pub fn placed(kind: OrderKind, request: &OrderRequest, result: &OrderResult) -> Self {
        let mut record = Self::from_request(kind, request, PlacementStatus::Placed);
        record.order_id = Some(result.id.clone());
        record.hash = Some(result.hash.clone());
        record
    }

    /// Record of an order the exchange (or the network) rejected
    pub fn failed(kind: OrderKind, request: &OrderRequest, error: impl ToString) -> Self {
        let mut record = Self::from_request(kind, request, PlacementStatus::Failed);
        record.error_message = Some(error.to_string());
        record
    }

    pub fn with_grid_level(mut self, level: usize) -> Self {
        self.grid_level = Some(level as i64);
        self
    }

    fn from_request(kind: OrderKind, request: &OrderRequest, status: PlacementStatus) -> Self {
        OrderRecord {
            id: None,
            symbol: request.symbol.clone(),
            kind,
            side: request.side,
            order_type: request.order_type.as_str().to_string(),
            price: request.price,
            amount: request.amount,
            grid_level: None,
            order_id: None,
            hash: None,
            client_id: request.client_id.clone(),
            status,
            error_message: None,
            created_at: None,
        }
    }

    /// Parse a row from the database
    fn from_row(row: &Row) -> SqlResult<Self> {
        Ok(OrderRecord {
            id: Some(row.get(0)?),
            symbol: row.get(1)?,
            kind: OrderKind::from_string(&row.get::<_, String>(2)?),
            side: side_from_string(&row.get::<_, String>(3)?),
            order_type: row.get(4)?,
            price: row.get(5)?,
            amount: row.get(6)?,
            grid_level: row.get(7)?,
            order_id: row.get(8)?,
            hash: row.get(9)?,
            client_id: row.get(10)?,
            status: PlacementStatus::from_string(&row.get::<_, String>(11)?),
            error_message: row.get(12)?,
            created_at: Some(row.get(13)?),
        })
    }

    pub fn insert(&self, conn: &Connection) -> SqlResult<i64> {
        conn.execute(
            "INSERT INTO placed_orders (
                symbol, kind, side, order_type, price, amount, grid_level,
                order_id, hash, client_id, status, error_message
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                self.symbol,
                self.kind.to_string(),
                side_to_string(self.side),
                self.order_type,
                self.price,
                self.amount,
                self.grid_level,
                self.order_id,
                self.hash,
                self.client_id,
                self.status.to_string(),
                self.error_message,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_recent(conn: &Connection, limit: usize) -> SqlResult<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, symbol, kind, side, order_type, price, amount, grid_level,
                    order_id, hash, client_id, status, error_message, created_at
             FROM placed_orders ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| Self::from_row(row))?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Journal;

    #[test]
    fn test_placed_and_failed_records() {
        let journal = Journal::open_in_memory().unwrap();
        let request = OrderRequest::limit("THB_BTC", Side::Buy, 225.0, 995_000.0).with_client_id("abc");
        let result = OrderResult {
            id: "1".to_string(),
            hash: "h1".to_string(),
            amount: 225.0,
            rate: 995_000.0,
            fee: 0.56,
            receive: 0.000226,
        };

        journal
            .record_order(&OrderRecord::placed(OrderKind::Grid, &request, &result).with_grid_level(1))
            .unwrap();
        journal
            .record_order(&OrderRecord::failed(OrderKind::Replenish, &request, "rejected"))
            .unwrap();

        let orders = journal.recent_orders(10).unwrap();
        assert_eq!(orders.len(), 2);

        // newest first
        assert_eq!(orders[0].status, PlacementStatus::Failed);
        assert_eq!(orders[0].kind, OrderKind::Replenish);
        assert_eq!(orders[0].error_message.as_deref(), Some("rejected"));

        assert_eq!(orders[1].status, PlacementStatus::Placed);
        assert_eq!(orders[1].hash.as_deref(), Some("h1"));
        assert_eq!(orders[1].grid_level, Some(1));
        assert_eq!(orders[1].client_id.as_deref(), Some("abc"));
        assert_eq!(orders[1].side, Side::Buy);
    }
}
