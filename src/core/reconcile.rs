// Reconciliation loop: diff the ledger against the live book, classify
// what disappeared, and replace filled rungs on the opposite side.

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use futures_util::future::join_all;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::engine::{order_from_result, GridEngine};
use crate::clients::ExchangeGateway;
use crate::core::grid::calculate_single_grid;
use crate::core::types::{Order, OrderRequest, OrderStatus, Side};
use crate::db::{ExecutionOutcome, ExecutionRecord, OrderKind, OrderRecord};
use crate::error::TradingResult;

/// What one reconciliation pass saw and did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub open_orders: usize,
    /// Ledger orders missing from the open-order list
    pub executed: usize,
    pub filled: usize,
    /// Gone from the book without being filled
    pub dropped: usize,
    pub replenished: usize,
    pub replenish_failed: usize,
    /// Order info lookup failed; kept in the ledger for the next pass
    pub unresolved: usize,
}

enum Classification {
    Filled(Order),
    Dropped(Order),
    Unresolved(Order),
}

/// Size of the opposite-side order funded by a fill, in quote currency.
///
/// A sell's `receive` is already quote currency. A buy's `receive` is base
/// currency and is valued at the rate it filled at.
pub fn replenish_quote_amount(order: &Order) -> f64 {
    match order.side {
        Side::Sell => order.receive,
        Side::Buy => order.receive * order.rate,
    }
}

impl<G: ExchangeGateway + 'static> GridEngine<G> {
    /// Run passes until stopped. Each pass finishes before the interval
    /// timer for the next one starts.
    pub(super) async fn watch(&self) {
        let interval = self.engine_config.check_interval();
        info!("👀 Watching {} orders every {:?}", self.orders.lock().await.len(), interval);

        while !self.shutdown.is_triggered() {
            match self.reconcile_once().await {
                Ok(report) if report.executed > 0 => info!(
                    "🔁 Pass: {} executed, {} filled, {} dropped, {} replenished, {} failed, {} unresolved",
                    report.executed,
                    report.filled,
                    report.dropped,
                    report.replenished,
                    report.replenish_failed,
                    report.unresolved
                ),
                Ok(report) => debug!("Pass: {} open orders, nothing executed", report.open_orders),
                Err(e) => warn!("⚠️  Reconciliation pass skipped: {}", e),
            }

            let shutdown = self.shutdown.clone();
            tokio::select! {
                _ = sleep(interval) => {}
                _ = shutdown.wait() => break,
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("🏁 Reconciliation loop stopped with {} orders in ledger", self.orders.lock().await.len());
    }

    /// One fetch, diff, classify, replenish, commit cycle.
    ///
    /// A failed open-order fetch skips the pass without touching the ledger.
    /// The ledger stays locked for the whole pass.
    pub async fn reconcile_once(&self) -> TradingResult<PassReport> {
        let mut ledger = self.orders.lock().await;

        let open = self.fetch_open_orders().await?;
        let open_ids: HashSet<&str> = open.iter().map(|o| o.id.as_str()).collect();

        let executed: Vec<Order> = ledger
            .iter()
            .filter(|o| !open_ids.contains(o.id.as_str()))
            .cloned()
            .collect();

        let mut report = PassReport {
            open_orders: open.len(),
            executed: executed.len(),
            ..PassReport::default()
        };

        if executed.is_empty() {
            return Ok(report);
        }

        debug!("Executed orders: {:?}", executed.iter().map(|o| &o.id).collect::<Vec<_>>());

        let classified = join_all(executed.into_iter().map(|order| self.classify(order))).await;

        let mut filled = Vec::new();
        let mut resolved_ids = HashSet::new();
        for item in classified {
            match item {
                Classification::Filled(order) => {
                    resolved_ids.insert(order.id.clone());
                    filled.push(order);
                }
                Classification::Dropped(order) => {
                    info!("🗑️  {} {} left the book unfilled, dropping", order.side, order.hash);
                    self.journal_execution(ExecutionRecord::new(
                        &self.config.symbol,
                        &order,
                        ExecutionOutcome::Dropped,
                    ));
                    resolved_ids.insert(order.id.clone());
                    report.dropped += 1;
                }
                Classification::Unresolved(_) => report.unresolved += 1,
            }
        }
        report.filled = filled.len();

        let replacements = self.replenish(&filled).await;

        // Commit: classified orders leave the ledger whether or not their
        // replacement went through
        ledger.retain(|o| !resolved_ids.contains(&o.id));

        for (order, replacement) in filled.iter().zip(replacements) {
            let replacement_hash = replacement.as_ref().map(|o| o.hash.clone());
            self.journal_execution(
                ExecutionRecord::new(&self.config.symbol, order, ExecutionOutcome::Filled)
                    .with_replacement(replacement_hash),
            );

            match replacement {
                Some(new_order) => {
                    report.replenished += 1;
                    ledger.push(new_order);
                }
                None => report.replenish_failed += 1,
            }
        }

        Ok(report)
    }

    async fn classify(&self, order: Order) -> Classification {
        match self.gateway.order_info(&order.hash).await {
            Ok(info) if info.status == OrderStatus::Filled => Classification::Filled(order),
            Ok(info) => {
                debug!("Order {} status {:?}", order.hash, info.status);
                Classification::Dropped(order)
            }
            Err(e) => {
                warn!("⚠️  Order info for {} failed, will retry next pass: {}", order.hash, e);
                Classification::Unresolved(order)
            }
        }
    }

    /// Place one opposite-side order per fill, all off a single ticker
    /// sample. Returns the new ledger entry for each fill, `None` where the
    /// placement failed.
    async fn replenish(&self, filled: &[Order]) -> Vec<Option<Order>> {
        if filled.is_empty() {
            return Vec::new();
        }

        let current_price = match self.gateway.ticker(&self.config.symbol).await {
            Ok(ticker) => ticker.last,
            Err(e) => {
                error!("❌ No price for replenishment, {} rungs lost: {}", filled.len(), e);
                return vec![None; filled.len()];
            }
        };

        let placements = filled.iter().map(|order| {
            let grid = calculate_single_grid(
                order.side.opposite(),
                replenish_quote_amount(order),
                self.config.grid_spacing,
                current_price,
            );
            let request = self.tagged(OrderRequest::limit(&self.config.symbol, grid.side, grid.amount, grid.price));

            async move {
                match self.gateway.create_order(&request).await {
                    Ok(result) => {
                        info!(
                            "📝 {} {} filled, placed {} {:.8} @ {:.2}",
                            order.side, order.hash, grid.side, grid.amount, grid.price
                        );
                        self.journal_order(OrderRecord::placed(OrderKind::Replenish, &request, &result));
                        Some(order_from_result(&request, &result))
                    }
                    Err(e) => {
                        error!("❌ Replacement {} for {} failed: {}", grid.side, order.hash, e);
                        self.journal_order(OrderRecord::failed(OrderKind::Replenish, &request, &e));
                        None
                    }
                }
            }
        });

        join_all(placements).await
    }

    fn journal_execution(&self, record: ExecutionRecord) {
        if let Some(journal) = &self.journal {
            if let Err(e) = journal.record_execution(&record) {
                warn!("⚠️  Failed to journal execution: {}", e);
            }
        }
    }
}
