// Exchange gateway: the capability set the engine consumes

pub mod bitkub_api;
pub mod bitkub_ws;

use async_trait::async_trait;

use crate::core::types::{Balances, Order, OrderInfo, OrderRequest, OrderResult, Ticker};

pub use bitkub_api::{format_decimal, BitkubClient};
pub use bitkub_ws::{parse_bitkub_ticker, TickerCache, TickerStream};

/// Everything the engine needs from an exchange. Signing, headers and
/// connection lifecycle stay behind this trait.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    async fn ticker(&self, symbol: &str) -> Result<Ticker, GatewayError>;

    /// May transiently come back empty while orders do exist
    async fn open_orders(&self, symbol: &str) -> Result<Vec<Order>, GatewayError>;

    async fn create_order(&self, request: &OrderRequest) -> Result<OrderResult, GatewayError>;

    async fn cancel_order(&self, hash: &str) -> Result<(), GatewayError>;

    async fn order_info(&self, hash: &str) -> Result<OrderInfo, GatewayError>;

    /// Zero balances are filtered out
    async fn available_balances(&self) -> Result<Balances, GatewayError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {0}")]
    Http(u16),

    #[error("Exchange rejected request with error code {code}")]
    Exchange { code: i64 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        match self {
            GatewayError::Network(_) | GatewayError::Unavailable(_) => true,
            GatewayError::Http(status) => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            GatewayError::Http(status.as_u16())
        } else if err.is_decode() {
            GatewayError::Parse(err.to_string())
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}
