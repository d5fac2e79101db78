// Spot Grid Trading Bot Library
//
// Keeps a ladder of resting buy and sell limit orders around the market
// price of one pair and replaces every filled rung on the opposite side.

pub mod core;
pub mod clients;
pub mod config;
pub mod db;          // SQLite trade journal
pub mod error;       // Unified error handling

// Re-export core trading types
pub use core::{
    calculate_grid, calculate_single_grid, EmergencyReport, EngineHandle, GridEngine, GridLevel,
    Order, OrderRequest, OrderResult, PassReport, Side, SingleGrid,
};

// Re-export error types
pub use error::{TradingError, TradingResult};

// Re-export client types
pub use clients::{BitkubClient, ExchangeGateway, GatewayError, TickerCache, TickerStream};

// Re-export configuration
pub use config::{Config, ConfigError, EngineConfig, ExchangeConfig, GridConfig, JournalConfig, LoggingConfig};

// Re-export journal types
pub use db::{ExecutionOutcome, ExecutionRecord, Journal, OrderKind, OrderRecord};
