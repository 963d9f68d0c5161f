//! Owner of the grid, ledger and session statistics

use std::time::Duration;

use log::info;
use tokio::time::Instant;

use super::config::GridConfig;
use super::errors::GridResult;
use super::executor::GridExchange;
use super::ledger::OrderLedger;
use super::model::Grid;
use super::rebalancer::{cancel_market_orders, GridRebalancer};
use super::reconciler::{FillReconciler, ReconcileSummary};
use super::types::SessionStats;

/// All mutable strategy state, driven one step at a time by the runner
#[derive(Debug)]
pub struct GridEngine {
    config: GridConfig,
    grid: Option<Grid>,
    ledger: OrderLedger,
    reconciler: FillReconciler,
    rebalancer: GridRebalancer,
    stats: SessionStats,
    started_at: Instant,
}

impl GridEngine {
    pub fn new(config: GridConfig, epoch: Duration) -> GridResult<Self> {
        config.validate()?;
        Ok(Self {
            ledger: OrderLedger::new(config.num_lines(), config.unit_size),
            reconciler: FillReconciler::new(config.fill_window()),
            rebalancer: GridRebalancer::new(epoch),
            grid: None,
            stats: SessionStats::default(),
            started_at: Instant::now(),
            config,
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Current ladder, `None` until the first rebalance succeeds
    pub fn grid(&self) -> Option<&Grid> {
        self.grid.as_ref()
    }

    pub fn ledger(&self) -> &OrderLedger {
        &self.ledger
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn rebalance_due(&self) -> bool {
        self.rebalancer.is_due(self.elapsed())
    }

    pub async fn rebalance<E>(&mut self, exchange: &E) -> GridResult<()>
    where
        E: GridExchange + ?Sized,
    {
        let elapsed = self.elapsed();
        let grid = self
            .rebalancer
            .rebalance(exchange, &self.config, &mut self.ledger, elapsed)
            .await?;
        self.grid = Some(grid);
        self.stats.epochs += 1;
        self.log_summary();
        Ok(())
    }

    pub async fn reconcile<E>(&mut self, exchange: &E) -> GridResult<ReconcileSummary>
    where
        E: GridExchange + ?Sized,
    {
        let Some(grid) = self.grid.as_ref() else {
            return Ok(ReconcileSummary::default());
        };
        self.reconciler
            .reconcile(
                exchange,
                &self.config,
                grid,
                &mut self.ledger,
                &mut self.stats,
            )
            .await
    }

    /// One loop iteration: rebalance when an epoch has passed, then reconcile
    pub async fn tick<E>(&mut self, exchange: &E) -> GridResult<ReconcileSummary>
    where
        E: GridExchange + ?Sized,
    {
        if self.rebalance_due() {
            self.rebalance(exchange).await?;
        }
        self.reconcile(exchange).await
    }

    /// Cancel every resting order in the market
    pub async fn cancel_all<E>(&mut self, exchange: &E) -> GridResult<usize>
    where
        E: GridExchange + ?Sized,
    {
        cancel_market_orders(exchange, &self.config.asset, &mut self.ledger).await
    }

    /// Flatten the market position
    pub async fn close_position<E>(&mut self, exchange: &E) -> GridResult<f64>
    where
        E: GridExchange + ?Sized,
    {
        exchange.close_position(&self.config.asset).await
    }

    pub fn log_summary(&self) {
        let stats = &self.stats;
        info!(
            "Session {}: realized pnl {:.4}, fees {:.4}, net {:.4}, fills {}, round trips {}, epochs {}, up {}s",
            self.config.asset,
            stats.realized_pnl,
            stats.total_fees,
            stats.net_pnl(),
            stats.fills_processed,
            stats.round_trips,
            stats.epochs,
            self.elapsed().as_secs()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::executor::mock::MockExchange;
    use crate::grid::types::{FillDirection, OrderSide};

    const HOUR: Duration = Duration::from_secs(3600);

    async fn engine_with_epoch(epoch: Duration) -> (GridEngine, MockExchange) {
        let exchange = MockExchange::new(100.0);
        exchange.set_closes(&[100.0; 50]).await;
        let engine = GridEngine::new(GridConfig::new("ETH", 0.01, 2, 1.0, 3), epoch).unwrap();
        (engine, exchange)
    }

    async fn engine_with_exchange() -> (GridEngine, MockExchange) {
        engine_with_epoch(HOUR).await
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(GridEngine::new(GridConfig::new("ETH", 0.01, 0, 1.0, 3), HOUR).is_err());
    }

    #[tokio::test]
    async fn test_reconcile_before_first_rebalance_is_noop() {
        let (mut engine, exchange) = engine_with_exchange().await;
        let summary = engine.reconcile(&exchange).await.unwrap();
        assert_eq!(summary, ReconcileSummary::default());
        assert!(exchange.placed_orders().await.is_empty());
    }

    #[tokio::test]
    async fn test_tick_rebalances_once_per_epoch() {
        let epoch = Duration::from_millis(200);
        let (mut engine, exchange) = engine_with_epoch(epoch).await;

        engine.tick(&exchange).await.unwrap();
        assert_eq!(engine.stats().epochs, 1);
        assert_eq!(exchange.placed_orders().await.len(), 5);

        engine.tick(&exchange).await.unwrap();
        assert_eq!(engine.stats().epochs, 1);
        assert_eq!(exchange.placed_orders().await.len(), 5);

        let buy = exchange
            .placed_orders()
            .await
            .iter()
            .find(|(_, o)| o.gridline == 1)
            .map(|(oid, _)| *oid)
            .unwrap();
        exchange.fill_order(buy, 1.0, FillDirection::OpenLong, 0.0).await;
        engine.tick(&exchange).await.unwrap();
        assert_eq!(engine.ledger().filled(1, OrderSide::Buy), 1.0);

        // next epoch: the ladder is rebuilt around the same centre
        tokio::time::sleep(epoch + Duration::from_millis(50)).await;
        exchange.set_mid_price(99.5).await;
        engine.tick(&exchange).await.unwrap();
        assert_eq!(engine.stats().epochs, 2);

        let resting = exchange.resting_orders().await;
        assert!(resting.iter().all(|o| o.oid != buy));
        let placed = exchange.placed_orders().await;
        assert_eq!(
            resting
                .iter()
                .filter_map(|o| placed.iter().find(|(oid, _)| *oid == o.oid))
                .filter(|(_, r)| (r.price - 100.0).abs() < 1e-9 && r.side == OrderSide::Sell)
                .count(),
            1
        );
        assert!(engine.ledger().is_tracked(buy));
    }

    #[tokio::test]
    async fn test_cancel_all_and_close() {
        let (mut engine, exchange) = engine_with_exchange().await;
        engine.rebalance(&exchange).await.unwrap();
        exchange.set_position(-2.0).await;

        assert_eq!(engine.cancel_all(&exchange).await.unwrap(), 5);
        assert!(exchange.resting_orders().await.is_empty());
        assert_eq!(engine.close_position(&exchange).await.unwrap(), 2.0);
        assert_eq!(exchange.close_position_calls().await, 1);
    }
}
