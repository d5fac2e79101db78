// Common test utilities and helpers

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use spot_grid_bot::core::{Balances, OrderInfo, OrderStatus, OrderType, Ticker};
use spot_grid_bot::{
    EngineConfig, ExchangeGateway, GatewayError, GridConfig, GridEngine, Order, OrderRequest, OrderResult, Side,
};
use tempfile::TempDir;

/// Grid from the worked example: 2 levels, 0.5% apart, 900 THB
pub fn create_test_grid_config() -> GridConfig {
    GridConfig {
        symbol: "THB_BTC".to_string(),
        grid_levels: 2,
        grid_spacing: 0.5,
        trade_balance: 900.0,
        price_threshold: 0.002,
        trading_fee: 0.0025,
    }
}

/// Millisecond delays so retry paths don't slow the suite down
pub fn create_test_engine_config() -> EngineConfig {
    EngineConfig {
        check_interval_secs: 1,
        fetch_retry_attempts: 3,
        fetch_retry_delay_ms: 1,
        cancel_max_attempts: 3,
    }
}

pub fn create_engine(gateway: Arc<MockGateway>) -> GridEngine<MockGateway> {
    GridEngine::new(create_test_grid_config(), create_test_engine_config(), gateway)
}

/// Create a temporary directory for test databases
pub fn create_temp_db_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_path = temp_dir.path().join("journal").join("test.db");
    (temp_dir, db_path)
}

#[derive(Default)]
struct MockState {
    price: f64,
    balances: Balances,
    open: Vec<Order>,
    statuses: HashMap<String, OrderStatus>,
    info_failures: HashSet<String>,
    next_id: u64,

    created: Vec<OrderRequest>,
    cancelled: Vec<String>,
    create_attempts: usize,
    open_order_calls: usize,
    info_calls: usize,

    fail_create_at: Option<usize>,
    fail_creates_after: Option<usize>,
    empty_open_responses: usize,
    open_orders_down: bool,
    sticky_orders: bool,
}

/// Scripted in-memory exchange. Limit orders rest until a test fills or
/// cancels them; every call is counted.
pub struct MockGateway {
    state: Mutex<MockState>,
}

impl MockGateway {
    pub fn new(price: f64) -> Self {
        let state = MockState {
            price,
            next_id: 1,
            ..MockState::default()
        };
        Self { state: Mutex::new(state) }
    }

    /// Enough on both sides for the default test grid
    pub fn funded(price: f64) -> Self {
        let gateway = Self::new(price);
        gateway.set_balance("THB", 10_000.0);
        gateway.set_balance("BTC", 0.01);
        gateway
    }

    pub fn set_balance(&self, currency: &str, amount: f64) {
        self.state.lock().unwrap().balances.insert(currency.to_string(), amount);
    }

    pub fn set_price(&self, price: f64) {
        self.state.lock().unwrap().price = price;
    }

    /// The n-th create call (1-based) fails
    pub fn fail_create_at(&self, n: usize) {
        self.state.lock().unwrap().fail_create_at = Some(n);
    }

    /// Every create call after the first `n` fails
    pub fn fail_creates_after(&self, n: usize) {
        self.state.lock().unwrap().fail_creates_after = Some(n);
    }

    /// The next `n` open-order listings come back empty
    pub fn return_empty_open_responses(&self, n: usize) {
        self.state.lock().unwrap().empty_open_responses = n;
    }

    pub fn set_open_orders_down(&self, down: bool) {
        self.state.lock().unwrap().open_orders_down = down;
    }

    /// Cancels are acknowledged but the orders stay on the book
    pub fn set_sticky_orders(&self, sticky: bool) {
        self.state.lock().unwrap().sticky_orders = sticky;
    }

    pub fn fail_order_info(&self, hash: &str) {
        self.state.lock().unwrap().info_failures.insert(hash.to_string());
    }

    pub fn clear_order_info_failures(&self) {
        self.state.lock().unwrap().info_failures.clear();
    }

    /// Put an order on the book as if placed by an earlier run
    pub fn seed_open_order(&self, side: Side, amount: f64, rate: f64) -> Order {
        let mut state = self.state.lock().unwrap();
        let order = Self::book_order(&mut state, side, OrderType::Limit, amount, rate, None);
        state.open.push(order.clone());
        order
    }

    /// Remove from the book with status `filled`
    pub fn fill(&self, hash: &str) {
        let mut state = self.state.lock().unwrap();
        state.open.retain(|o| o.hash != hash);
        state.statuses.insert(hash.to_string(), OrderStatus::Filled);
    }

    /// Remove from the book as if cancelled from the exchange UI
    pub fn cancel_externally(&self, hash: &str) {
        let mut state = self.state.lock().unwrap();
        state.open.retain(|o| o.hash != hash);
        state.statuses.insert(hash.to_string(), OrderStatus::Cancelled);
    }

    pub fn open_orders_snapshot(&self) -> Vec<Order> {
        self.state.lock().unwrap().open.clone()
    }

    pub fn created(&self) -> Vec<OrderRequest> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn create_attempts(&self) -> usize {
        self.state.lock().unwrap().create_attempts
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().unwrap().cancelled.clone()
    }

    pub fn open_order_calls(&self) -> usize {
        self.state.lock().unwrap().open_order_calls
    }

    pub fn info_calls(&self) -> usize {
        self.state.lock().unwrap().info_calls
    }

    /// Orders quote both sides the way the exchange does: a buy spends
    /// quote and receives base, a sell the other way round.
    fn book_order(
        state: &mut MockState,
        side: Side,
        order_type: OrderType,
        amount: f64,
        rate: f64,
        client_id: Option<String>,
    ) -> Order {
        let id = state.next_id;
        state.next_id += 1;

        let receive = match side {
            Side::Buy => amount / rate,
            Side::Sell => amount * rate,
        };

        Order {
            id: id.to_string(),
            hash: format!("hash-{}", id),
            side,
            order_type,
            rate,
            fee: 0.0,
            credit: 0.0,
            amount,
            receive,
            client_id,
            created_at: None,
        }
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn ticker(&self, _symbol: &str) -> Result<Ticker, GatewayError> {
        let state = self.state.lock().unwrap();
        if state.price <= 0.0 {
            return Err(GatewayError::Unavailable("no price".to_string()));
        }
        Ok(Ticker::from_last(state.price))
    }

    async fn open_orders(&self, _symbol: &str) -> Result<Vec<Order>, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.open_order_calls += 1;

        if state.open_orders_down {
            return Err(GatewayError::Network("connection reset".to_string()));
        }
        if state.empty_open_responses > 0 {
            state.empty_open_responses -= 1;
            return Ok(Vec::new());
        }
        Ok(state.open.clone())
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<OrderResult, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.create_attempts += 1;

        let attempt = state.create_attempts;
        let injected = state.fail_create_at == Some(attempt)
            || state.fail_creates_after.map_or(false, |n| attempt > n);
        if injected {
            return Err(GatewayError::Exchange { code: 18 });
        }

        let rate = match request.order_type {
            OrderType::Limit => request.price,
            OrderType::Market => state.price,
        };
        let order = Self::book_order(
            &mut state,
            request.side,
            request.order_type,
            request.amount,
            rate,
            request.client_id.clone(),
        );

        if request.order_type == OrderType::Limit {
            state.open.push(order.clone());
        }
        state.created.push(request.clone());

        Ok(OrderResult {
            id: order.id,
            hash: order.hash,
            amount: order.amount,
            rate: order.rate,
            fee: order.fee,
            receive: order.receive,
        })
    }

    async fn cancel_order(&self, hash: &str) -> Result<(), GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.cancelled.push(hash.to_string());
        if !state.sticky_orders {
            state.open.retain(|o| o.hash != hash);
            state.statuses.insert(hash.to_string(), OrderStatus::Cancelled);
        }
        Ok(())
    }

    async fn order_info(&self, hash: &str) -> Result<OrderInfo, GatewayError> {
        let mut state = self.state.lock().unwrap();
        state.info_calls += 1;

        if state.info_failures.contains(hash) {
            return Err(GatewayError::Network("timeout".to_string()));
        }

        let status = state.statuses.get(hash).cloned().unwrap_or(OrderStatus::Unfilled);
        Ok(OrderInfo {
            id: hash.trim_start_matches("hash-").to_string(),
            status,
            amount: 0.0,
            rate: 0.0,
            filled: 0.0,
        })
    }

    async fn available_balances(&self) -> Result<Balances, GatewayError> {
        let state = self.state.lock().unwrap();
        Ok(state.balances.iter().filter(|(_, v)| **v > 0.0).map(|(k, v)| (k.clone(), *v)).collect())
    }
}
