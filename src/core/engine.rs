// Grid engine: startup sequence, order placement and cancellation,
// emergency liquidation. The reconciliation loop lives in reconcile.rs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clients::{ExchangeGateway, GatewayError};
use crate::config::{EngineConfig, GridConfig};
use crate::core::grid::{calculate_grid, GridLevel};
use crate::core::resilience::{RetryPolicy, ShutdownSignal};
use crate::core::types::{Order, OrderRequest, OrderResult, OrderType, Pair, Side};
use crate::db::{Journal, OrderKind, OrderRecord};
use crate::error::{TradingError, TradingResult};

/// Cloneable control surface for a running engine
#[derive(Debug, Clone)]
pub struct EngineHandle {
    running: Arc<AtomicBool>,
    shutdown: ShutdownSignal,
}

impl EngineHandle {
    /// Clear the running flag and halt future reconciliation passes.
    /// A pass already in flight completes first.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.trigger();
        info!("🛑 Stop requested");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Result of `emergency_action`
#[derive(Debug)]
pub struct EmergencyReport {
    /// The cancel-all runs detached; await this to learn how it went
    pub cancel_task: JoinHandle<TradingResult<usize>>,
    pub quote_balance: f64,
    pub market_order: Option<OrderResult>,
}

/// Outcome of balance gating, all values in quote currency
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceCheck {
    pub required: f64,
    pub quote_available: f64,
    pub base_value: f64,
}

pub struct GridEngine<G: ExchangeGateway + 'static> {
    pub(super) config: GridConfig,
    pub(super) engine_config: EngineConfig,
    pub(super) gateway: Arc<G>,
    pub(super) journal: Option<Journal>,
    pub(super) orders: Mutex<Vec<Order>>,
    pub(super) fetch_policy: RetryPolicy,
    pub(super) running: Arc<AtomicBool>,
    pub(super) shutdown: ShutdownSignal,
}

impl<G: ExchangeGateway + 'static> GridEngine<G> {
    pub fn new(config: GridConfig, engine_config: EngineConfig, gateway: Arc<G>) -> Self {
        let fetch_policy = RetryPolicy::fixed(
            engine_config.fetch_retry_attempts,
            engine_config.fetch_retry_delay(),
        );

        Self {
            config,
            engine_config,
            gateway,
            journal: None,
            orders: Mutex::new(Vec::new()),
            fetch_policy,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: ShutdownSignal::new(),
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            running: self.running.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    pub fn stop(&self) {
        self.handle().stop();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Snapshot of the orders the engine currently believes are resting
    pub async fn ledger(&self) -> Vec<Order> {
        self.orders.lock().await.clone()
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Cancel stale orders, gate on balance, deploy the grid and then
    /// reconcile until `stop()` is called.
    pub async fn start(&self) -> TradingResult<()> {
        self.config.validate()?;
        self.acquire_running()?;
        info!("🚀 Starting grid bot for {}", self.config.symbol);

        if let Err(e) = self.start_grid().await {
            error!("❌ Startup failed [{}]: {}", e.category(), e);
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        self.watch().await;
        Ok(())
    }

    /// Adopt whatever is open on the exchange as the ledger and reconcile,
    /// without touching the existing grid.
    pub async fn resume(&self) -> TradingResult<()> {
        self.config.validate()?;
        self.acquire_running()?;
        info!("🔄 Resuming grid bot for {}", self.config.symbol);

        if let Err(e) = self.adopt_open_orders().await {
            error!("❌ Could not load open orders: {}", e);
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        self.watch().await;
        Ok(())
    }

    /// Replace the ledger with the exchange's open orders for the pair
    pub async fn adopt_open_orders(&self) -> TradingResult<usize> {
        let orders = self.fetch_open_orders().await?;
        let count = orders.len();
        *self.orders.lock().await = orders;
        info!("📋 Adopted {} open orders", count);
        Ok(count)
    }

    fn acquire_running(&self) -> TradingResult<()> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("⚠️  Grid trading bot is already running");
            return Err(TradingError::AlreadyRunning);
        }
        self.shutdown.reset();
        Ok(())
    }

    /// Steps 1-4 of startup. The ledger is resynchronised from the exchange
    /// once every grid order has been accepted.
    pub(super) async fn start_grid(&self) -> TradingResult<()> {
        self.cancel_all_orders().await?;
        self.check_balance().await?;

        let ticker = self.gateway.ticker(&self.config.symbol).await?;
        let levels = calculate_grid(
            self.config.grid_levels,
            self.config.grid_spacing,
            self.config.trade_balance,
            ticker.last,
        );
        info!(
            "📐 Grid of {} levels around {:.2} ({}% spacing)",
            levels.len(),
            ticker.last,
            self.config.grid_spacing
        );

        let placed = self.place_grid_orders(&levels).await?;
        info!("✅ Placed {} grid orders", placed);

        match self.fetch_open_orders().await {
            Ok(orders) => {
                info!("📋 Ledger holds {} open orders", orders.len());
                *self.orders.lock().await = orders;
                Ok(())
            }
            Err(e) => {
                error!("❌ Could not load open orders after placement, rolling back: {}", e);
                if let Err(cancel_err) = self.cancel_all_orders().await {
                    error!("❌ Rollback failed: {}", cancel_err);
                }
                Err(e.into())
            }
        }
    }

    /// Both the quote balance and the base balance valued at the last price
    /// must be strictly greater than `trade_balance / 2 * (1 + price_threshold)`.
    pub async fn check_balance(&self) -> TradingResult<BalanceCheck> {
        let pair = Pair::parse(&self.config.symbol).ok_or_else(|| {
            TradingError::InvalidParameter(
                "symbol".to_string(),
                format!("'{}' is not a QUOTE_BASE pair", self.config.symbol),
            )
        })?;

        let balances = self.gateway.available_balances().await?;
        let ticker = self.gateway.ticker(&self.config.symbol).await?;

        let quote_available = balances.get(&pair.quote).copied().unwrap_or(0.0);
        let base_value = balances.get(&pair.base).copied().unwrap_or(0.0) * ticker.last;
        let required = self.config.trade_balance / 2.0 * (1.0 + self.config.price_threshold);

        debug!(
            "Balance check: {} {:.2}, {} worth {:.2}, required {:.2}",
            pair.quote, quote_available, pair.base, base_value, required
        );

        if quote_available > required && base_value > required {
            info!("💰 Balance is enough for trading");
            Ok(BalanceCheck { required, quote_available, base_value })
        } else {
            warn!("⚠️  Balance is not enough for trading (need > {:.2} per side)", required);
            Err(TradingError::InsufficientBalance { required, quote_available, base_value })
        }
    }

    /// Place a buy and a sell per level, one after another. The first
    /// failure cancels everything and aborts, so later levels are never tried.
    pub async fn place_grid_orders(&self, levels: &[GridLevel]) -> TradingResult<usize> {
        let mut placed = 0;

        for level in levels {
            let legs = [
                (Side::Buy, level.amount_buy, level.price_buy),
                (Side::Sell, level.amount_sell, level.price_sell),
            ];

            for (side, amount, price) in legs {
                let request = self.tagged(OrderRequest::limit(&self.config.symbol, side, amount, price));

                match self.gateway.create_order(&request).await {
                    Ok(result) => {
                        info!(
                            "📝 Placed {} level {}: {:.8} @ {:.2} (hash: {})",
                            side, level.level, amount, price, result.hash
                        );
                        self.journal_order(
                            OrderRecord::placed(OrderKind::Grid, &request, &result).with_grid_level(level.level),
                        );
                        placed += 1;
                    }
                    Err(e) => {
                        error!("❌ {} level {} failed: {}", side, level.level, e);
                        self.journal_order(
                            OrderRecord::failed(OrderKind::Grid, &request, &e).with_grid_level(level.level),
                        );

                        if let Err(cancel_err) = self.cancel_all_orders().await {
                            error!("❌ Rollback failed: {}", cancel_err);
                        }
                        return Err(TradingError::PlacementFailed(format!(
                            "{} at level {}: {}",
                            side, level.level, e
                        )));
                    }
                }
            }
        }

        Ok(placed)
    }

    /// Cancel every open order on the pair, re-checking until the book is
    /// clear or `cancel_max_attempts` passes have been made.
    pub async fn cancel_all_orders(&self) -> TradingResult<usize> {
        cancel_all(
            self.gateway.clone(),
            self.config.symbol.clone(),
            self.fetch_policy.clone(),
            self.engine_config.cancel_max_attempts,
        )
        .await
    }

    /// Compute the grid that `start()` would deploy right now, without
    /// placing anything
    pub async fn preview_grid(&self) -> TradingResult<Vec<GridLevel>> {
        self.config.validate()?;
        let ticker = self.gateway.ticker(&self.config.symbol).await?;
        Ok(calculate_grid(
            self.config.grid_levels,
            self.config.grid_spacing,
            self.config.trade_balance,
            ticker.last,
        ))
    }

    /// Cancel everything in the background and convert the whole quote
    /// balance into the base asset at market.
    ///
    /// Cancels every order on the pair, not only this engine's, so only one
    /// engine may run per pair.
    pub async fn emergency_action(&self) -> TradingResult<EmergencyReport> {
        warn!("🚨 Emergency action for {}", self.config.symbol);

        let pair = Pair::parse(&self.config.symbol).ok_or_else(|| {
            TradingError::InvalidParameter("symbol".to_string(), self.config.symbol.clone())
        })?;

        let cancel_task = tokio::spawn(cancel_all(
            self.gateway.clone(),
            self.config.symbol.clone(),
            self.fetch_policy.clone(),
            self.engine_config.cancel_max_attempts,
        ));

        let balances = self.gateway.available_balances().await?;
        let quote_balance = balances.get(&pair.quote).copied().unwrap_or(0.0);

        let market_order = if quote_balance > 0.0 {
            let request = self.tagged(OrderRequest::market(&self.config.symbol, Side::Buy, quote_balance));
            match self.gateway.create_order(&request).await {
                Ok(result) => {
                    info!("🚨 Market buy with {:.2} {} (hash: {})", quote_balance, pair.quote, result.hash);
                    self.journal_order(OrderRecord::placed(OrderKind::Emergency, &request, &result));
                    Some(result)
                }
                Err(e) => {
                    self.journal_order(OrderRecord::failed(OrderKind::Emergency, &request, &e));
                    return Err(e.into());
                }
            }
        } else {
            info!("No {} balance left to convert", pair.quote);
            None
        };

        Ok(EmergencyReport { cancel_task, quote_balance, market_order })
    }

    /// Open orders with the transient-empty retry applied
    pub(super) async fn fetch_open_orders(&self) -> Result<Vec<Order>, GatewayError> {
        let gateway = &self.gateway;
        let symbol = self.config.symbol.as_str();
        self.fetch_policy
            .execute_until_nonempty(|| async move { gateway.open_orders(symbol).await })
            .await
    }

    /// Every order this engine submits carries its own client id
    pub(super) fn tagged(&self, request: OrderRequest) -> OrderRequest {
        request.with_client_id(Uuid::new_v4().to_string())
    }

    /// Journal failures never interrupt trading
    pub(super) fn journal_order(&self, record: OrderRecord) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.record_order(&record) {
                warn!("⚠️  Failed to journal order: {}", e);
            }
        }
    }
}

/// Ledger entry for an order we just created, used until the next
/// open-order listing reports it
pub(super) fn order_from_result(request: &OrderRequest, result: &OrderResult) -> Order {
    Order {
        id: result.id.clone(),
        hash: result.hash.clone(),
        side: request.side,
        order_type: OrderType::Limit,
        rate: result.rate,
        fee: result.fee,
        credit: 0.0,
        amount: result.amount,
        receive: result.receive,
        client_id: request.client_id.clone(),
        created_at: Some(chrono::Utc::now()),
    }
}

/// Listings go through `policy`, so a transient empty response is not
/// mistaken for a clear book.
async fn cancel_all<G: ExchangeGateway + ?Sized>(
    gateway: Arc<G>,
    symbol: String,
    policy: RetryPolicy,
    max_attempts: u32,
) -> TradingResult<usize> {
    let max_attempts = max_attempts.max(1);
    let mut cancelled = 0;
    let (gateway, symbol, policy) = (&*gateway, symbol.as_str(), &policy);
    let list = move || policy.execute_until_nonempty(move || async move { gateway.open_orders(symbol).await });

    for attempt in 1..=max_attempts {
        let open = list().await?;
        if open.is_empty() {
            if cancelled > 0 {
                info!("🧹 Cancelled {} open orders for {}", cancelled, symbol);
            }
            return Ok(cancelled);
        }

        debug!("Cancel pass {}: {} open orders", attempt, open.len());
        for order in &open {
            match gateway.cancel_order(&order.hash).await {
                Ok(()) => cancelled += 1,
                Err(e) => warn!("⚠️  Failed to cancel {}: {}", order.hash, e),
            }
        }
    }

    let remaining = list().await?;
    if remaining.is_empty() {
        info!("🧹 Cancelled {} open orders for {}", cancelled, symbol);
        Ok(cancelled)
    } else {
        error!("❌ {} orders still open after {} cancel passes", remaining.len(), max_attempts);
        Err(TradingError::MaxRetriesExceeded {
            operation: "cancel_all_orders",
            attempts: max_attempts,
        })
    }
}
