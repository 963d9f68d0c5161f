//! Exchange abstraction for grid trading - enables mocking for tests

use std::collections::HashMap;
use std::sync::Arc;

use alloy::primitives::Address;
use async_trait::async_trait;
use log::{debug, info, warn};

use crate::exchange::{
    ClientOrderRequest, ExchangeClient, ExchangeDataStatus, ExchangeResponseStatus, InfoClient,
    Meta,
};
use crate::helpers::EPSILON;

use super::config::AssetPrecision;
use super::errors::{GridError, GridResult};
use super::types::{
    Candle, FillDirection, GridFill, GridOrderRequest, OpenOrder, OrderResult, OrderResultStatus,
};

/// Slippage applied to the mid price when flattening a position
const CLOSE_SLIPPAGE: f64 = 0.05;

/// Exchange operations trait - can be mocked for testing
#[async_trait]
pub trait GridExchange: Send + Sync {
    /// Place a good-til-canceled limit order
    async fn place_order(&self, asset: &str, order: &GridOrderRequest) -> GridResult<OrderResult>;

    /// Cancel an order by oid. `Ok(false)` means the exchange did not cancel it.
    async fn cancel_order(&self, asset: &str, oid: u64) -> GridResult<bool>;

    /// All resting orders of the account
    async fn open_orders(&self) -> GridResult<Vec<OpenOrder>>;

    /// Account fills, most recent first
    async fn recent_fills(&self) -> GridResult<Vec<GridFill>>;

    /// Get current mid price
    async fn get_mid_price(&self, asset: &str) -> GridResult<f64>;

    /// Candles whose open time falls in `[start_ms, end_ms]`
    async fn candles(
        &self,
        asset: &str,
        interval: &str,
        start_ms: u64,
        end_ms: u64,
    ) -> GridResult<Vec<Candle>>;

    /// Flatten the position in `asset` at market. Returns the size closed.
    async fn close_position(&self, asset: &str) -> GridResult<f64>;

    /// Update leverage for perp trading
    async fn update_leverage(&self, asset: &str, leverage: u32, is_cross: bool) -> GridResult<()>;

    /// Drop and rebuild the underlying connection, where there is one
    async fn reconnect(&self) -> GridResult<()> {
        Ok(())
    }
}

#[async_trait]
impl<E: GridExchange + ?Sized> GridExchange for Arc<E> {
    async fn place_order(&self, asset: &str, order: &GridOrderRequest) -> GridResult<OrderResult> {
        (**self).place_order(asset, order).await
    }

    async fn cancel_order(&self, asset: &str, oid: u64) -> GridResult<bool> {
        (**self).cancel_order(asset, oid).await
    }

    async fn open_orders(&self) -> GridResult<Vec<OpenOrder>> {
        (**self).open_orders().await
    }

    async fn recent_fills(&self) -> GridResult<Vec<GridFill>> {
        (**self).recent_fills().await
    }

    async fn get_mid_price(&self, asset: &str) -> GridResult<f64> {
        (**self).get_mid_price(asset).await
    }

    async fn candles(
        &self,
        asset: &str,
        interval: &str,
        start_ms: u64,
        end_ms: u64,
    ) -> GridResult<Vec<Candle>> {
        (**self).candles(asset, interval, start_ms, end_ms).await
    }

    async fn close_position(&self, asset: &str) -> GridResult<f64> {
        (**self).close_position(asset).await
    }

    async fn update_leverage(&self, asset: &str, leverage: u32, is_cross: bool) -> GridResult<()> {
        (**self).update_leverage(asset, leverage, is_cross).await
    }

    async fn reconnect(&self) -> GridResult<()> {
        (**self).reconnect().await
    }
}

/// Place an order, turning an exchange rejection into `None`.
///
/// Rejections are logged and never abort the caller; every other error
/// propagates.
pub async fn submit_order<E>(
    exchange: &E,
    asset: &str,
    order: &GridOrderRequest,
) -> GridResult<Option<u64>>
where
    E: GridExchange + ?Sized,
{
    match exchange.place_order(asset, order).await {
        Ok(result) => {
            info!(
                "{} {} {} order placed at {} (gridline {}, oid {})",
                order.size, asset, order.side, order.price, order.gridline, result.oid
            );
            if let OrderResultStatus::Filled {
                avg_price,
                filled_size,
            } = result.status
            {
                info!(
                    "Order {} filled immediately: {} @ {}",
                    result.oid, filled_size, avg_price
                );
            }
            Ok(Some(result.oid))
        }
        Err(GridError::OrderRejected(reason)) => {
            warn!(
                "{} {} {} order at {} rejected: {}",
                order.size, asset, order.side, order.price, reason
            );
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

fn parse_number(field: &str, value: &str) -> GridResult<f64> {
    value
        .parse::<f64>()
        .map_err(|e| GridError::JsonParse(format!("{} '{}': {}", field, value, e)))
}

// ============================================================================
// Real Hyperliquid Implementation
// ============================================================================

/// Real Hyperliquid exchange implementation
pub struct HyperliquidExchange {
    exchange_client: ExchangeClient,
    info_client: InfoClient,
    user_address: Address,
    precision: HashMap<String, AssetPrecision>,
}

impl HyperliquidExchange {
    pub fn new(
        exchange_client: ExchangeClient,
        info_client: InfoClient,
        user_address: Address,
        meta: &Meta,
    ) -> Self {
        let precision = meta
            .universe
            .iter()
            .map(|asset| (asset.name.clone(), AssetPrecision::for_perp(asset.sz_decimals)))
            .collect();
        Self {
            exchange_client,
            info_client,
            user_address,
            precision,
        }
    }

    pub fn user_address(&self) -> Address {
        self.user_address
    }

    fn precision(&self, asset: &str) -> GridResult<AssetPrecision> {
        self.precision
            .get(asset)
            .copied()
            .ok_or_else(|| GridError::AssetNotFound(asset.to_string()))
    }

    async fn send_order(&self, request: ClientOrderRequest) -> GridResult<OrderResult> {
        let fallback_px = request.limit_px;
        let fallback_sz = request.sz;
        let response = self.exchange_client.order(request).await?;

        match response.first_status() {
            Ok(Some(ExchangeDataStatus::Resting(resting))) => Ok(OrderResult {
                oid: resting.oid,
                status: OrderResultStatus::Resting,
            }),
            Ok(Some(ExchangeDataStatus::Filled(filled))) => Ok(OrderResult {
                oid: filled.oid,
                status: OrderResultStatus::Filled {
                    avg_price: filled.avg_px.parse().unwrap_or(fallback_px),
                    filled_size: filled.total_sz.parse().unwrap_or(fallback_sz),
                },
            }),
            Ok(Some(ExchangeDataStatus::Error(e))) => Err(GridError::OrderRejected(e.clone())),
            Ok(Some(other)) => Err(GridError::Exchange(format!(
                "Unexpected order status: {:?}",
                other
            ))),
            Ok(None) => Err(GridError::Exchange("No status in order response".into())),
            Err(e) => Err(GridError::OrderRejected(e.to_string())),
        }
    }
}

#[async_trait]
impl GridExchange for HyperliquidExchange {
    async fn place_order(&self, asset: &str, order: &GridOrderRequest) -> GridResult<OrderResult> {
        let precision = self.precision(asset)?;
        let limit_px = precision.round_price(order.price);
        let sz = precision.round_size(order.size);
        if sz <= 0.0 {
            return Err(GridError::OrderRejected(format!(
                "size {} rounds to zero at {} decimals",
                order.size, precision.sz_decimals
            )));
        }

        self.send_order(ClientOrderRequest {
            asset: asset.to_string(),
            is_buy: order.side.is_buy(),
            reduce_only: false,
            limit_px,
            sz,
            tif: "Gtc".to_string(),
        })
        .await
    }

    async fn cancel_order(&self, asset: &str, oid: u64) -> GridResult<bool> {
        let response = self.exchange_client.cancel(asset, oid).await?;

        match response.first_status() {
            Ok(Some(ExchangeDataStatus::Success)) => Ok(true),
            Ok(Some(ExchangeDataStatus::Error(e))) => {
                debug!("Cancel of order {} refused: {}", oid, e);
                Ok(false)
            }
            Ok(_) => Ok(false),
            Err(e) => Err(GridError::Exchange(e.to_string())),
        }
    }

    async fn open_orders(&self) -> GridResult<Vec<OpenOrder>> {
        let orders = self.info_client.open_orders(self.user_address).await?;

        Ok(orders
            .into_iter()
            .map(|o| OpenOrder {
                oid: o.oid,
                coin: o.coin,
            })
            .collect())
    }

    async fn recent_fills(&self) -> GridResult<Vec<GridFill>> {
        let fills = self.info_client.user_fills(self.user_address).await?;

        let mut parsed = Vec::with_capacity(fills.len());
        for fill in fills {
            let Some(direction) = FillDirection::parse(&fill.dir) else {
                debug!(
                    "Skipping unsupported fill direction '{}' on order {}",
                    fill.dir, fill.oid
                );
                continue;
            };
            parsed.push(GridFill {
                oid: fill.oid,
                price: parse_number("px", &fill.px)?,
                size: parse_number("sz", &fill.sz)?,
                closed_pnl: parse_number("closedPnl", &fill.closed_pnl)?,
                fee: parse_number("fee", &fill.fee)?,
                direction,
                time: fill.time,
                hash: fill.hash,
                coin: fill.coin,
            });
        }
        Ok(parsed)
    }

    async fn get_mid_price(&self, asset: &str) -> GridResult<f64> {
        let all_mids = self.info_client.all_mids().await?;

        let mid = all_mids
            .get(asset)
            .ok_or_else(|| GridError::AssetNotFound(asset.to_string()))?;
        parse_number("mid", mid)
    }

    async fn candles(
        &self,
        asset: &str,
        interval: &str,
        start_ms: u64,
        end_ms: u64,
    ) -> GridResult<Vec<Candle>> {
        let candles = self
            .info_client
            .candles_snapshot(asset.to_string(), interval.to_string(), start_ms, end_ms)
            .await?;

        candles
            .iter()
            .map(|c| -> GridResult<Candle> {
                Ok(Candle {
                    open_time: c.time_open,
                    close: parse_number("c", &c.close)?,
                })
            })
            .collect()
    }

    async fn close_position(&self, asset: &str) -> GridResult<f64> {
        let user_state = self.info_client.user_state(self.user_address).await?;

        let size = match user_state
            .asset_positions
            .iter()
            .find(|p| p.position.coin == asset)
        {
            Some(p) => parse_number("szi", &p.position.szi)?,
            None => 0.0,
        };
        if size.abs() < EPSILON {
            info!("No open {} position to close", asset);
            return Ok(0.0);
        }

        let precision = self.precision(asset)?;
        let mid = self.get_mid_price(asset).await?;
        let is_buy = size < 0.0;
        let limit_px = if is_buy {
            mid * (1.0 + CLOSE_SLIPPAGE)
        } else {
            mid * (1.0 - CLOSE_SLIPPAGE)
        };

        let result = self
            .send_order(ClientOrderRequest {
                asset: asset.to_string(),
                is_buy,
                reduce_only: true,
                limit_px: precision.round_price(limit_px),
                sz: precision.round_size(size.abs()),
                tif: "Ioc".to_string(),
            })
            .await?;

        info!("Closed {} {} position (oid {})", size, asset, result.oid);
        Ok(size.abs())
    }

    async fn update_leverage(&self, asset: &str, leverage: u32, is_cross: bool) -> GridResult<()> {
        let response = self
            .exchange_client
            .update_leverage(leverage, asset, is_cross)
            .await?;

        match response {
            ExchangeResponseStatus::Ok(_) => Ok(()),
            ExchangeResponseStatus::Err(e) => Err(GridError::Exchange(e)),
        }
    }
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

/// Mock exchange for testing grid bots without a real exchange connection.
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use tokio::sync::Mutex;

    /// Mock exchange for testing
    ///
    /// Orders rest until canceled or filled through [`MockExchange::fill_order`].
    /// Fills are served most recent first, like the real fills endpoint.
    pub struct MockExchange {
        placed: Mutex<Vec<(u64, GridOrderRequest)>>,
        open: Mutex<Vec<OpenOrder>>,
        canceled: Mutex<Vec<u64>>,
        fills: Mutex<Vec<GridFill>>,
        mid_price: Mutex<f64>,
        candles: Mutex<Vec<Candle>>,
        position: Mutex<f64>,
        leverage_updates: Mutex<Vec<(String, u32, bool)>>,
        close_calls: Mutex<u32>,
        reconnects: Mutex<u32>,
        reject_orders: Mutex<bool>,
        network_failures: Mutex<u32>,
        scripted_failures: Mutex<Vec<(&'static str, GridError, u32)>>,
        stalled: Mutex<Option<&'static str>>,
        next_oid: AtomicU64,
        next_fill: AtomicU64,
    }

    impl MockExchange {
        pub fn new(mid_price: f64) -> Self {
            Self {
                placed: Mutex::new(Vec::new()),
                open: Mutex::new(Vec::new()),
                canceled: Mutex::new(Vec::new()),
                fills: Mutex::new(Vec::new()),
                mid_price: Mutex::new(mid_price),
                candles: Mutex::new(Vec::new()),
                position: Mutex::new(0.0),
                leverage_updates: Mutex::new(Vec::new()),
                close_calls: Mutex::new(0),
                reconnects: Mutex::new(0),
                reject_orders: Mutex::new(false),
                network_failures: Mutex::new(0),
                scripted_failures: Mutex::new(Vec::new()),
                stalled: Mutex::new(None),
                next_oid: AtomicU64::new(1000),
                next_fill: AtomicU64::new(1),
            }
        }

        pub async fn set_mid_price(&self, price: f64) {
            *self.mid_price.lock().await = price;
        }

        /// Hourly candles all closing at `closes`, oldest first
        pub async fn set_closes(&self, closes: &[f64]) {
            *self.candles.lock().await = closes
                .iter()
                .enumerate()
                .map(|(i, close)| Candle {
                    open_time: i as u64 * 3_600_000,
                    close: *close,
                })
                .collect();
        }

        pub async fn set_position(&self, size: f64) {
            *self.position.lock().await = size;
        }

        pub async fn set_reject_orders(&self, reject: bool) {
            *self.reject_orders.lock().await = reject;
        }

        /// Make the next `count` calls fail with a network error
        pub async fn fail_next(&self, count: u32) {
            *self.network_failures.lock().await = count;
        }

        /// Make the next `count` calls of `operation` (e.g. "place_order")
        /// fail with `error`
        pub async fn fail_operation(&self, operation: &'static str, error: GridError, count: u32) {
            self.scripted_failures
                .lock()
                .await
                .push((operation, error, count));
        }

        /// Make every call of `operation` hang until the future is dropped
        pub async fn stall_operation(&self, operation: &'static str) {
            *self.stalled.lock().await = Some(operation);
        }

        /// Append a fill as the most recent one
        pub async fn push_fill(&self, fill: GridFill) {
            self.fills.lock().await.insert(0, fill);
        }

        /// Fill `size` of a placed order and return the fill hash.
        ///
        /// The order leaves the book. `closed_pnl` is reported on the fill as is.
        pub async fn fill_order(
            &self,
            oid: u64,
            size: f64,
            direction: FillDirection,
            closed_pnl: f64,
        ) -> String {
            let price = self
                .placed
                .lock()
                .await
                .iter()
                .find(|(placed_oid, _)| *placed_oid == oid)
                .map(|(_, order)| order.price)
                .unwrap_or_default();
            self.open.lock().await.retain(|o| o.oid != oid);

            let hash = format!("0x{:x}", self.next_fill.fetch_add(1, Ordering::SeqCst));
            self.push_fill(GridFill {
                oid,
                hash: hash.clone(),
                coin: String::new(),
                price,
                size,
                direction,
                closed_pnl,
                fee: 0.0,
                time: 0,
            })
            .await;
            hash
        }

        pub async fn placed_orders(&self) -> Vec<(u64, GridOrderRequest)> {
            self.placed.lock().await.clone()
        }

        pub async fn resting_orders(&self) -> Vec<OpenOrder> {
            self.open.lock().await.clone()
        }

        pub async fn canceled_oids(&self) -> Vec<u64> {
            self.canceled.lock().await.clone()
        }

        pub async fn leverage_updates(&self) -> Vec<(String, u32, bool)> {
            self.leverage_updates.lock().await.clone()
        }

        pub async fn close_position_calls(&self) -> u32 {
            *self.close_calls.lock().await
        }

        pub async fn reconnect_calls(&self) -> u32 {
            *self.reconnects.lock().await
        }

        async fn check_network(&self, operation: &str) -> GridResult<()> {
            let stalled = *self.stalled.lock().await == Some(operation);
            if stalled {
                std::future::pending::<()>().await;
            }

            let mut scripted = self.scripted_failures.lock().await;
            if let Some(i) = scripted
                .iter()
                .position(|(op, _, left)| *op == operation && *left > 0)
            {
                let (_, error, left) = &mut scripted[i];
                *left -= 1;
                let error = error.clone();
                if *left == 0 {
                    scripted.remove(i);
                }
                return Err(error);
            }
            drop(scripted);

            let mut failures = self.network_failures.lock().await;
            if *failures > 0 {
                *failures -= 1;
                return Err(GridError::Network(format!("mock {} timed out", operation)));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl GridExchange for MockExchange {
        async fn place_order(&self, asset: &str, order: &GridOrderRequest) -> GridResult<OrderResult> {
            self.check_network("place_order").await?;
            if *self.reject_orders.lock().await {
                return Err(GridError::OrderRejected("Mock rejection".into()));
            }

            let oid = self.next_oid.fetch_add(1, Ordering::SeqCst);
            self.placed.lock().await.push((oid, order.clone()));
            self.open.lock().await.push(OpenOrder {
                oid,
                coin: asset.to_string(),
            });

            Ok(OrderResult {
                oid,
                status: OrderResultStatus::Resting,
            })
        }

        async fn cancel_order(&self, _asset: &str, oid: u64) -> GridResult<bool> {
            self.check_network("cancel_order").await?;
            let mut open = self.open.lock().await;
            let before = open.len();
            open.retain(|o| o.oid != oid);
            if open.len() == before {
                return Ok(false);
            }
            self.canceled.lock().await.push(oid);
            Ok(true)
        }

        async fn open_orders(&self) -> GridResult<Vec<OpenOrder>> {
            self.check_network("open_orders").await?;
            Ok(self.open.lock().await.clone())
        }

        async fn recent_fills(&self) -> GridResult<Vec<GridFill>> {
            self.check_network("recent_fills").await?;
            Ok(self.fills.lock().await.clone())
        }

        async fn get_mid_price(&self, _asset: &str) -> GridResult<f64> {
            self.check_network("get_mid_price").await?;
            Ok(*self.mid_price.lock().await)
        }

        async fn candles(
            &self,
            _asset: &str,
            _interval: &str,
            _start_ms: u64,
            _end_ms: u64,
        ) -> GridResult<Vec<Candle>> {
            self.check_network("candles").await?;
            Ok(self.candles.lock().await.clone())
        }

        async fn close_position(&self, _asset: &str) -> GridResult<f64> {
            self.check_network("close_position").await?;
            *self.close_calls.lock().await += 1;
            let mut position = self.position.lock().await;
            let closed = position.abs();
            *position = 0.0;
            Ok(closed)
        }

        async fn update_leverage(&self, asset: &str, leverage: u32, is_cross: bool) -> GridResult<()> {
            self.check_network("update_leverage").await?;
            self.leverage_updates
                .lock()
                .await
                .push((asset.to_string(), leverage, is_cross));
            Ok(())
        }

        async fn reconnect(&self) -> GridResult<()> {
            *self.reconnects.lock().await += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockExchange;
    use super::*;
    use crate::grid::types::OrderSide;

    #[tokio::test]
    async fn test_submit_order_rejection_is_none() {
        let exchange = MockExchange::new(100.0);
        let order = GridOrderRequest::new(1, 99.0, 1.0, OrderSide::Buy);

        assert_eq!(submit_order(&exchange, "ETH", &order).await.unwrap(), Some(1000));

        exchange.set_reject_orders(true).await;
        assert_eq!(submit_order(&exchange, "ETH", &order).await.unwrap(), None);
        assert_eq!(exchange.placed_orders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_order_propagates_network_errors() {
        let exchange = MockExchange::new(100.0);
        exchange.fail_next(1).await;
        let order = GridOrderRequest::new(1, 99.0, 1.0, OrderSide::Buy);

        let err = submit_order(&exchange, "ETH", &order).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_mock_fills_most_recent_first() {
        let exchange = MockExchange::new(100.0);
        let first = GridOrderRequest::new(1, 99.0, 1.0, OrderSide::Buy);
        let second = GridOrderRequest::new(3, 101.0, 1.0, OrderSide::Sell);
        let a = exchange.place_order("ETH", &first).await.unwrap().oid;
        let b = exchange.place_order("ETH", &second).await.unwrap().oid;

        exchange.fill_order(a, 1.0, FillDirection::OpenLong, 0.0).await;
        exchange.fill_order(b, 1.0, FillDirection::OpenShort, 0.0).await;

        let fills = exchange.recent_fills().await.unwrap();
        assert_eq!(fills[0].oid, b);
        assert_eq!(fills[1].oid, a);
        assert_eq!(fills[1].price, 99.0);
        assert!(exchange.resting_orders().await.is_empty());
        assert!(!exchange.cancel_order("ETH", a).await.unwrap());
    }
}
