//! Grid bot runner - main execution loop

use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use super::engine::GridEngine;
use super::errors::{GridError, GridResult};
use super::executor::GridExchange;
use super::types::SessionStats;

/// Grid bot runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub poll_interval: Duration,
    /// Attempts per wind-down step before giving up
    pub wind_down_attempts: u32,
    pub wind_down_retry_delay: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(15),
            wind_down_attempts: 10,
            wind_down_retry_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum WindDownStep {
    CancelOrders,
    ClosePosition,
}

/// Drives a [`GridEngine`] until the shutdown signal flips to `true`.
///
/// The signal is also watched while a tick is in flight, so a tick stuck
/// in retries is abandoned. Dropping the sending side also stops the runner.
pub struct GridRunner<E: GridExchange> {
    engine: GridEngine,
    exchange: E,
    config: RunnerConfig,
    shutdown: watch::Receiver<bool>,
}

impl<E: GridExchange> GridRunner<E> {
    pub fn new(
        engine: GridEngine,
        exchange: E,
        config: RunnerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            engine,
            exchange,
            config,
            shutdown,
        }
    }

    pub fn engine(&self) -> &GridEngine {
        &self.engine
    }

    /// Set leverage and lay down the first ladder. Errors here are fatal.
    pub async fn start(&mut self) -> GridResult<()> {
        let asset = self.engine.config().asset.clone();
        let leverage = self.engine.config().leverage;

        info!("Starting grid bot on {}", asset);
        self.exchange
            .update_leverage(&asset, leverage, true)
            .await
            .map_err(|e| GridError::Initialization(format!("setting leverage: {}", e)))?;
        info!("Leverage set to {}x cross on {}", leverage, asset);

        self.engine
            .rebalance(&self.exchange)
            .await
            .map_err(|e| GridError::Initialization(format!("initial grid: {}", e)))
    }

    /// Run until shutdown, then cancel orders and close the position.
    pub async fn run(mut self) -> GridResult<SessionStats> {
        self.start().await?;

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately; the initial rebalance just ran
        ticker.tick().await;

        let mut shutdown = self.shutdown.clone();
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown signal dropped, stopping");
                        break;
                    }
                    continue;
                }
            }
            tokio::select! {
                _ = self.iterate() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        warn!("Shutdown signal dropped, stopping");
                        break;
                    }
                    warn!("Shutdown requested, abandoning the current iteration");
                }
            }
        }

        info!("Shutting down");
        let outcome = self.wind_down().await;
        self.engine.log_summary();
        outcome.map(|_| self.engine.stats().clone())
    }

    /// One tick. Errors are logged; network trouble also forces a reconnect.
    async fn iterate(&mut self) {
        let err = match self.engine.tick(&self.exchange).await {
            Ok(summary) => {
                if summary.processed > 0 {
                    info!(
                        "Processed {} fills, placed {} orders",
                        summary.processed, summary.orders_placed
                    );
                }
                return;
            }
            Err(e) => e,
        };

        error!("Grid iteration failed: {}", err);
        if err.is_transient() {
            if let Err(e) = self.exchange.reconnect().await {
                warn!("Reconnect failed: {}", e);
            }
        }
    }

    /// Cancel orders, then close the position even if canceling failed.
    ///
    /// Returns the first step's error, if any.
    async fn wind_down(&mut self) -> GridResult<()> {
        let mut first_error = None;
        for step in [WindDownStep::CancelOrders, WindDownStep::ClosePosition] {
            if let Err(e) = self.run_wind_down_step(step).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn run_wind_down_step(&mut self, step: WindDownStep) -> GridResult<()> {
        let attempts = self.config.wind_down_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let result = match step {
                WindDownStep::CancelOrders => self
                    .engine
                    .cancel_all(&self.exchange)
                    .await
                    .map(|n| info!("Canceled {} open orders", n)),
                WindDownStep::ClosePosition => self
                    .engine
                    .close_position(&self.exchange)
                    .await
                    .map(|size| info!("Closed position of size {}", size)),
            };

            match result {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => {
                    warn!(
                        "{:?} failed (attempt {}/{}): {}",
                        step, attempt, attempts, e
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.config.wind_down_retry_delay).await;
                    }
                }
                Err(e) => {
                    error!("{:?} failed: {}", step, e);
                    return Err(e);
                }
            }
        }

        error!("Giving up on {:?} after {} attempts", step, attempts);
        Err(GridError::RetriesExhausted {
            operation: format!("{:?}", step),
            attempts,
            reason: last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::config::GridConfig;
    use crate::grid::executor::mock::MockExchange;
    use std::sync::Arc;

    fn fast_config() -> RunnerConfig {
        RunnerConfig {
            poll_interval: Duration::from_millis(10),
            wind_down_attempts: 3,
            wind_down_retry_delay: Duration::from_millis(1),
        }
    }

    fn engine() -> GridEngine {
        GridEngine::new(
            GridConfig::new("ETH", 0.01, 2, 1.0, 5),
            Duration::from_secs(3600),
        )
        .unwrap()
    }

    async fn exchange() -> Arc<MockExchange> {
        let exchange = Arc::new(MockExchange::new(100.0));
        exchange.set_closes(&[100.0; 50]).await;
        exchange
    }

    #[tokio::test]
    async fn test_run_until_shutdown_then_wind_down() {
        let exchange = exchange().await;
        exchange.set_position(1.5).await;
        let (tx, rx) = watch::channel(false);
        let runner = GridRunner::new(engine(), exchange.clone(), fast_config(), rx);

        let (stats, _) = tokio::join!(runner.run(), async {
            tokio::time::sleep(Duration::from_millis(60)).await;
            tx.send(true).unwrap();
        });

        let stats = stats.unwrap();
        assert_eq!(stats.epochs, 1);
        assert_eq!(
            exchange.leverage_updates().await,
            vec![("ETH".to_string(), 5, true)]
        );
        assert_eq!(exchange.placed_orders().await.len(), 5);
        assert!(exchange.resting_orders().await.is_empty());
        assert_eq!(exchange.close_position_calls().await, 1);
    }

    #[tokio::test]
    async fn test_startup_failure_is_fatal() {
        let exchange = Arc::new(MockExchange::new(100.0));
        let (_tx, rx) = watch::channel(false);
        let runner = GridRunner::new(engine(), exchange.clone(), fast_config(), rx);

        let err = runner.run().await.unwrap_err();
        assert!(matches!(err, GridError::Initialization(_)));
        assert_eq!(exchange.close_position_calls().await, 0);
    }

    #[tokio::test]
    async fn test_transient_iteration_error_reconnects() {
        let exchange = exchange().await;
        let (_tx, rx) = watch::channel(false);
        let mut runner = GridRunner::new(engine(), exchange.clone(), fast_config(), rx);
        runner.start().await.unwrap();

        exchange.fail_next(1).await;
        runner.iterate().await;
        assert_eq!(exchange.reconnect_calls().await, 1);

        runner.iterate().await;
        assert_eq!(exchange.reconnect_calls().await, 1);
    }

    #[tokio::test]
    async fn test_wind_down_retries_transient_failures() {
        let exchange = exchange().await;
        let (_tx, rx) = watch::channel(false);
        let mut runner = GridRunner::new(engine(), exchange.clone(), fast_config(), rx);
        runner.start().await.unwrap();

        exchange.fail_next(2).await;
        runner.wind_down().await.unwrap();
        assert!(exchange.resting_orders().await.is_empty());
        assert_eq!(exchange.close_position_calls().await, 1);

        exchange.fail_next(10).await;
        let err = runner.wind_down().await.unwrap_err();
        assert!(matches!(err, GridError::RetriesExhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_wind_down_closes_position_when_cancel_fails() {
        let exchange = exchange().await;
        exchange.set_position(2.0).await;
        let (_tx, rx) = watch::channel(false);
        let mut runner = GridRunner::new(engine(), exchange.clone(), fast_config(), rx);
        runner.start().await.unwrap();

        exchange
            .fail_operation(
                "open_orders",
                GridError::JsonParse("bad openOrders payload".into()),
                1,
            )
            .await;
        let err = runner.wind_down().await.unwrap_err();
        assert!(matches!(err, GridError::JsonParse(_)));
        assert_eq!(exchange.close_position_calls().await, 1);

        exchange.fail_next(10).await;
        assert!(runner.wind_down().await.is_err());
        assert_eq!(exchange.close_position_calls().await, 1);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_stalled_tick() {
        let exchange = exchange().await;
        exchange.set_position(1.0).await;
        exchange.stall_operation("recent_fills").await;
        let (tx, rx) = watch::channel(false);
        let runner = GridRunner::new(engine(), exchange.clone(), fast_config(), rx);

        let (stats, _) = tokio::join!(
            tokio::time::timeout(Duration::from_secs(5), runner.run()),
            async {
                tokio::time::sleep(Duration::from_millis(60)).await;
                tx.send(true).unwrap();
            }
        );

        assert!(stats.expect("runner should stop on shutdown").is_ok());
        assert!(exchange.resting_orders().await.is_empty());
        assert_eq!(exchange.close_position_calls().await, 1);
    }
}
