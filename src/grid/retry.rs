//! Bounded retry with reconnect around any [`GridExchange`]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::{primitives::Address, signers::local::PrivateKeySigner};
use async_trait::async_trait;
use log::{info, warn};
use tokio::sync::RwLock;

use crate::exchange::{ExchangeClient, HttpClient, InfoClient};
use crate::BaseUrl;

use super::errors::{GridError, GridResult};
use super::executor::{GridExchange, HyperliquidExchange};
use super::types::{Candle, GridFill, GridOrderRequest, OpenOrder, OrderResult};

/// Builds a fresh exchange connection
#[async_trait]
pub trait ExchangeConnector: Send + Sync {
    type Exchange: GridExchange + 'static;

    async fn connect(&self) -> GridResult<Self::Exchange>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first
    pub max_attempts: u32,
    /// Pause before reconnecting
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Exchange wrapper that rebuilds its client after network failures.
///
/// Every call is attempted up to `max_attempts` times. Only
/// [`GridError::Network`] is retried; anything else is returned as is.
pub struct ReconnectingExchange<C: ExchangeConnector> {
    connector: C,
    current: RwLock<Arc<C::Exchange>>,
    policy: RetryPolicy,
}

impl<C: ExchangeConnector> ReconnectingExchange<C> {
    /// Connect once; a failure here is returned to the caller.
    pub async fn connect(connector: C, policy: RetryPolicy) -> GridResult<Self> {
        let exchange = connector.connect().await?;
        Ok(Self {
            connector,
            current: RwLock::new(Arc::new(exchange)),
            policy,
        })
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn rebuild(&self) -> GridResult<()> {
        let fresh = self.connector.connect().await?;
        *self.current.write().await = Arc::new(fresh);
        info!("Exchange connection rebuilt");
        Ok(())
    }

    async fn with_reconnect<T, F, Fut>(&self, operation: &str, call: F) -> GridResult<T>
    where
        T: Send,
        F: Fn(Arc<C::Exchange>) -> Fut + Send + Sync,
        Fut: Future<Output = GridResult<T>> + Send,
    {
        let attempts = self.policy.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let exchange = self.current.read().await.clone();
            match call(exchange).await {
                Err(GridError::Network(reason)) => {
                    warn!(
                        "{} failed (attempt {}/{}): {}",
                        operation, attempt, attempts, reason
                    );
                    last_error = reason;
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.delay).await;
                        if let Err(e) = self.rebuild().await {
                            warn!("Reconnect before retrying {} failed: {}", operation, e);
                        }
                    }
                }
                result => return result,
            }
        }

        Err(GridError::RetriesExhausted {
            operation: operation.to_string(),
            attempts,
            reason: last_error,
        })
    }
}

#[async_trait]
impl<C: ExchangeConnector> GridExchange for ReconnectingExchange<C> {
    async fn place_order(&self, asset: &str, order: &GridOrderRequest) -> GridResult<OrderResult> {
        self.with_reconnect("place_order", |ex| async move {
            ex.place_order(asset, order).await
        })
        .await
    }

    async fn cancel_order(&self, asset: &str, oid: u64) -> GridResult<bool> {
        self.with_reconnect("cancel_order", |ex| async move {
            ex.cancel_order(asset, oid).await
        })
        .await
    }

    async fn open_orders(&self) -> GridResult<Vec<OpenOrder>> {
        self.with_reconnect("open_orders", |ex| async move { ex.open_orders().await })
            .await
    }

    async fn recent_fills(&self) -> GridResult<Vec<GridFill>> {
        self.with_reconnect("recent_fills", |ex| async move { ex.recent_fills().await })
            .await
    }

    async fn get_mid_price(&self, asset: &str) -> GridResult<f64> {
        self.with_reconnect("get_mid_price", |ex| async move {
            ex.get_mid_price(asset).await
        })
        .await
    }

    async fn candles(
        &self,
        asset: &str,
        interval: &str,
        start_ms: u64,
        end_ms: u64,
    ) -> GridResult<Vec<Candle>> {
        self.with_reconnect("candles", |ex| async move {
            ex.candles(asset, interval, start_ms, end_ms).await
        })
        .await
    }

    async fn close_position(&self, asset: &str) -> GridResult<f64> {
        self.with_reconnect("close_position", |ex| async move {
            ex.close_position(asset).await
        })
        .await
    }

    async fn update_leverage(&self, asset: &str, leverage: u32, is_cross: bool) -> GridResult<()> {
        self.with_reconnect("update_leverage", |ex| async move {
            ex.update_leverage(asset, leverage, is_cross).await
        })
        .await
    }

    async fn reconnect(&self) -> GridResult<()> {
        self.rebuild().await
    }
}

/// Connects to Hyperliquid and loads asset metadata
pub struct HyperliquidConnector {
    base_url: BaseUrl,
    wallet: PrivateKeySigner,
    account: Address,
}

impl HyperliquidConnector {
    pub fn new(base_url: BaseUrl, wallet: PrivateKeySigner, account: Address) -> Self {
        Self {
            base_url,
            wallet,
            account,
        }
    }
}

#[async_trait]
impl ExchangeConnector for HyperliquidConnector {
    type Exchange = HyperliquidExchange;

    async fn connect(&self) -> GridResult<HyperliquidExchange> {
        let http_client = HttpClient::new(self.base_url)?;
        let info_client = InfoClient::new(http_client.clone());
        let meta = info_client.meta().await?;

        info!(
            "Connected to {} ({} perp assets)",
            http_client.base_url,
            meta.universe.len()
        );

        let exchange_client = ExchangeClient::new(http_client, self.wallet.clone(), &meta);
        Ok(HyperliquidExchange::new(
            exchange_client,
            info_client,
            self.account,
            &meta,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::executor::mock::MockExchange;
    use crate::grid::types::OrderSide;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockConnector {
        exchange: Arc<MockExchange>,
        connects: AtomicU32,
    }

    impl MockConnector {
        fn new(exchange: Arc<MockExchange>) -> Self {
            Self {
                exchange,
                connects: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ExchangeConnector for Arc<MockConnector> {
        type Exchange = Arc<MockExchange>;

        async fn connect(&self) -> GridResult<Arc<MockExchange>> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(self.exchange.clone())
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retries_network_errors_and_reconnects() {
        let mock = Arc::new(MockExchange::new(100.0));
        let connector = Arc::new(MockConnector::new(mock.clone()));
        let exchange = ReconnectingExchange::connect(connector.clone(), fast_policy())
            .await
            .unwrap();

        mock.fail_next(2).await;
        let price = exchange.get_mid_price("ETH").await.unwrap();

        assert_eq!(price, 100.0);
        // initial connect plus one per retry
        assert_eq!(connector.connects.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhaustion_reports_attempts() {
        let mock = Arc::new(MockExchange::new(100.0));
        let connector = Arc::new(MockConnector::new(mock.clone()));
        let exchange = ReconnectingExchange::connect(connector, fast_policy())
            .await
            .unwrap();

        mock.fail_next(5).await;
        let err = exchange.open_orders().await.unwrap_err();
        match err {
            GridError::RetriesExhausted {
                operation,
                attempts,
                ..
            } => {
                assert_eq!(operation, "open_orders");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(exchange.open_orders().await.is_ok());
    }

    #[tokio::test]
    async fn test_rejections_are_not_retried() {
        let mock = Arc::new(MockExchange::new(100.0));
        let connector = Arc::new(MockConnector::new(mock.clone()));
        let exchange = ReconnectingExchange::connect(connector.clone(), fast_policy())
            .await
            .unwrap();

        mock.set_reject_orders(true).await;
        let order = GridOrderRequest::new(0, 99.0, 1.0, OrderSide::Buy);
        let err = exchange.place_order("ETH", &order).await.unwrap_err();

        assert!(matches!(err, GridError::OrderRejected(_)));
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }
}
