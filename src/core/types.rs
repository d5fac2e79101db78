// Domain types shared by the engine and the gateway

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Lower-case form used when creating orders
    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    /// Accepts both the `BUY`/`SELL` form of order listings and the
    /// lower-case form of order creation
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

impl OrderType {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderType::Limit => "limit",
            OrderType::Market => "market",
        }
    }
}

/// Trading pair written quote-first, e.g. `THB_BTC` trades BTC against THB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pair {
    pub quote: String,
    pub base: String,
}

impl Pair {
    pub fn parse(symbol: &str) -> Option<Self> {
        let (quote, base) = symbol.split_once('_')?;
        if quote.is_empty() || base.is_empty() {
            return None;
        }
        Some(Self {
            quote: quote.to_ascii_uppercase(),
            base: base.to_ascii_uppercase(),
        })
    }

    /// Symbol as written in the config (`THB_BTC`)
    pub fn symbol(&self) -> String {
        format!("{}_{}", self.quote, self.base)
    }

    /// Symbol as expected by the v3 market endpoints (`btc_thb`)
    pub fn market_symbol(&self) -> String {
        format!("{}_{}", self.base, self.quote).to_ascii_lowercase()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ticker {
    pub last: f64,
    pub highest_bid: Option<f64>,
    pub lowest_ask: Option<f64>,
}

impl Ticker {
    pub fn from_last(last: f64) -> Self {
        Self {
            last,
            highest_bid: None,
            lowest_ask: None,
        }
    }
}

/// Ledger entry: an order this engine believes is resting on the book.
///
/// For a buy, `amount` is quote currency spent and `receive` is base
/// currency obtained; for a sell it is the other way round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub hash: String,
    pub side: Side,
    pub order_type: OrderType,
    pub rate: f64,
    pub fee: f64,
    pub credit: f64,
    pub amount: f64,
    pub receive: f64,
    pub client_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub amount: f64,
    pub price: f64,
    pub client_id: Option<String>,
}

impl OrderRequest {
    pub fn limit(symbol: &str, side: Side, amount: f64, price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit,
            amount,
            price,
            client_id: None,
        }
    }

    pub fn market(symbol: &str, side: Side, amount: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            amount,
            price: 0.0,
            client_id: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

/// Exchange acknowledgement of a created order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderResult {
    pub id: String,
    pub hash: String,
    pub amount: f64,
    pub rate: f64,
    pub fee: f64,
    pub receive: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatus {
    Filled,
    Unfilled,
    PartiallyFilled,
    Cancelled,
    Other(String),
}

impl OrderStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "filled" => OrderStatus::Filled,
            "unfilled" => OrderStatus::Unfilled,
            "partial_filled" | "partially_filled" => OrderStatus::PartiallyFilled,
            "cancelled" | "canceled" => OrderStatus::Cancelled,
            other => OrderStatus::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderInfo {
    pub id: String,
    pub status: OrderStatus,
    pub amount: f64,
    pub rate: f64,
    pub filled: f64,
}

/// Available balances keyed by upper-case currency code
pub type Balances = HashMap<String, f64>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_parsing() {
        let pair = Pair::parse("THB_BTC").unwrap();
        assert_eq!(pair.quote, "THB");
        assert_eq!(pair.base, "BTC");
        assert_eq!(pair.symbol(), "THB_BTC");
        assert_eq!(pair.market_symbol(), "btc_thb");

        assert!(Pair::parse("THBBTC").is_none());
        assert!(Pair::parse("_BTC").is_none());
    }

    #[test]
    fn test_side_parsing() {
        assert_eq!(Side::parse("SELL"), Some(Side::Sell));
        assert_eq!(Side::parse("buy"), Some(Side::Buy));
        assert_eq!(Side::parse("hold"), None);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }

    #[test]
    fn test_order_status_parsing() {
        assert_eq!(OrderStatus::parse("filled"), OrderStatus::Filled);
        assert_eq!(OrderStatus::parse("cancelled"), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::parse("weird"), OrderStatus::Other("weird".to_string()));
    }
}
