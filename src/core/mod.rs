// Core grid trading logic

pub mod engine;
pub mod grid;
pub mod reconcile;
pub mod resilience;
pub mod types;

// Re-export commonly used types
pub use engine::{BalanceCheck, EmergencyReport, EngineHandle, GridEngine};
pub use grid::{calculate_grid, calculate_single_grid, GridLevel, SingleGrid};
pub use reconcile::{replenish_quote_amount, PassReport};
pub use resilience::{RetryPolicy, ShutdownSignal};
pub use types::{Balances, Order, OrderInfo, OrderRequest, OrderResult, OrderStatus, OrderType, Pair, Side, Ticker};
