//! Epoch schedule and ladder rebuild around a fresh SMA centre

use std::time::Duration;

use log::{info, warn};

use crate::helpers::{now_millis, EPSILON};

use super::config::GridConfig;
use super::errors::{GridError, GridResult};
use super::executor::{submit_order, GridExchange};
use super::ledger::OrderLedger;
use super::model::Grid;
use super::types::{GridOrderRequest, OrderSide};

const HOUR_MS: u64 = 3_600_000;

/// Counts completed epochs against a monotonic elapsed time.
///
/// A rebalance is due once `elapsed >= epochs * epoch`. Completing one at
/// `elapsed` moves the counter to `floor(elapsed / epoch) + 1`, so a late
/// tick fires once rather than catching up on every missed epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebalanceSchedule {
    epoch: Duration,
    epochs: u64,
}

impl RebalanceSchedule {
    pub fn new(epoch: Duration) -> Self {
        Self { epoch, epochs: 0 }
    }

    pub fn epochs(&self) -> u64 {
        self.epochs
    }

    pub fn is_due(&self, elapsed: Duration) -> bool {
        elapsed.as_millis() >= self.epoch.as_millis() * u128::from(self.epochs)
    }

    pub fn complete(&mut self, elapsed: Duration) {
        let epoch_ms = self.epoch.as_millis().max(1);
        self.epochs = (elapsed.as_millis() / epoch_ms) as u64 + 1;
    }
}

/// One order of a rebuilt ladder
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOrder {
    pub gridline: usize,
    pub side: OrderSide,
    pub price: f64,
    pub size: f64,
    /// Opening order this one offsets, for closing orders
    pub closes: Option<u64>,
}

/// Lay out the ladder for a new grid, carrying open fills forward.
///
/// A gridline directly below a filled sell, or directly above a filled
/// buy, hosts a closing order. Other gridlines get an opening order: buys
/// at or below the centre, sells above it. Opening orders strictly between
/// the market price and the centre are left out. Every order is sized to
/// the part of the unit not yet filled on its side at its own gridline.
pub fn plan_orders(
    grid: &Grid,
    ledger: &OrderLedger,
    unit_size: f64,
    current_price: f64,
) -> Vec<PlannedOrder> {
    let center = grid.center();
    let (low, high) = if current_price < center {
        (current_price, center)
    } else {
        (center, current_price)
    };

    let mut plan = Vec::with_capacity(grid.len());
    for (i, &price) in grid.lines().iter().enumerate() {
        let above = ledger.filled(i + 1, OrderSide::Sell);
        let below = if i > 0 {
            ledger.filled(i - 1, OrderSide::Buy)
        } else {
            0.0
        };

        let (side, closes) = if above > EPSILON {
            (OrderSide::Buy, ledger.slot(i + 1).and_then(|s| s.sell_oid))
        } else if below > EPSILON {
            (OrderSide::Sell, ledger.slot(i - 1).and_then(|s| s.buy_oid))
        } else if price > low && price < high {
            continue;
        } else if price <= center {
            (OrderSide::Buy, None)
        } else {
            (OrderSide::Sell, None)
        };

        let is_closing = above > EPSILON || below > EPSILON;
        if !is_closing && ledger.is_fully_filled(i, side) {
            continue;
        }
        let size = unit_size - ledger.filled(i, side);
        if size <= EPSILON {
            continue;
        }
        plan.push(PlannedOrder {
            gridline: i,
            side,
            price,
            size,
            closes,
        });
    }
    plan
}

/// Cancel every resting order in `asset`, retiring each canceled one.
///
/// Returns how many were canceled. Only transient errors abort.
pub async fn cancel_market_orders<E>(
    exchange: &E,
    asset: &str,
    ledger: &mut OrderLedger,
) -> GridResult<usize>
where
    E: GridExchange + ?Sized,
{
    let open_orders = exchange.open_orders().await?;
    let mut canceled = 0;
    for order in open_orders.iter().filter(|o| o.coin == asset) {
        match exchange.cancel_order(asset, order.oid).await {
            Ok(true) => {
                ledger.retire_order(order.oid);
                canceled += 1;
            }
            Ok(false) => warn!("Order {} was not canceled", order.oid),
            Err(e) if e.is_transient() => return Err(e),
            Err(e) => warn!("Failed to cancel order {}: {}", order.oid, e),
        }
    }
    Ok(canceled)
}

#[derive(Debug, Clone)]
pub struct GridRebalancer {
    schedule: RebalanceSchedule,
}

impl GridRebalancer {
    pub fn new(epoch: Duration) -> Self {
        Self {
            schedule: RebalanceSchedule::new(epoch),
        }
    }

    pub fn schedule(&self) -> &RebalanceSchedule {
        &self.schedule
    }

    pub fn is_due(&self, elapsed: Duration) -> bool {
        self.schedule.is_due(elapsed)
    }

    /// Mean close of the last `sma_window_hours` candles
    pub async fn compute_center<E>(&self, exchange: &E, config: &GridConfig) -> GridResult<f64>
    where
        E: GridExchange + ?Sized,
    {
        let end = now_millis();
        let start = end.saturating_sub(config.sma_window_hours * HOUR_MS);
        let mut candles = exchange
            .candles(&config.asset, &config.candle_interval, start, end)
            .await?;
        candles.sort_by_key(|c| c.open_time);

        let window = config.sma_window_hours as usize;
        let recent = &candles[candles.len().saturating_sub(window)..];
        if recent.is_empty() {
            return Err(GridError::Exchange(format!(
                "No {} candles returned for {}",
                config.candle_interval, config.asset
            )));
        }
        Ok(recent.iter().map(|c| c.close).sum::<f64>() / recent.len() as f64)
    }

    /// Cancel the market's resting orders and lay down a ladder around `center`.
    ///
    /// Only a transient failure while canceling aborts; the ledger's fill
    /// counters survive either way.
    pub async fn reset<E>(
        &self,
        exchange: &E,
        config: &GridConfig,
        ledger: &mut OrderLedger,
        center: f64,
        current_price: f64,
    ) -> GridResult<Grid>
    where
        E: GridExchange + ?Sized,
    {
        cancel_market_orders(exchange, &config.asset, ledger).await?;

        let grid = Grid::build(center, config.interval, config.half_width)?;
        let plan = plan_orders(&grid, ledger, config.unit_size, current_price);

        let mut placed = 0usize;
        for planned in &plan {
            let request =
                GridOrderRequest::new(planned.gridline, planned.price, planned.size, planned.side);
            let Some(oid) = submit_order(exchange, &config.asset, &request).await? else {
                continue;
            };
            ledger.record_placement(planned.gridline, planned.side, oid)?;
            if let Some(opening) = planned.closes {
                ledger.link_closing(oid, opening);
            }
            placed += 1;
        }

        info!(
            "Grid reset around {:.4} (market {}): {}/{} orders placed",
            center,
            current_price,
            placed,
            plan.len()
        );
        Ok(grid)
    }

    /// Recentre on the SMA and mark the epoch complete.
    ///
    /// A failure leaves the schedule untouched so the next tick retries.
    pub async fn rebalance<E>(
        &mut self,
        exchange: &E,
        config: &GridConfig,
        ledger: &mut OrderLedger,
        elapsed: Duration,
    ) -> GridResult<Grid>
    where
        E: GridExchange + ?Sized,
    {
        let center = self.compute_center(exchange, config).await?;
        let current_price = exchange.get_mid_price(&config.asset).await?;
        let grid = self
            .reset(exchange, config, ledger, center, current_price)
            .await?;
        self.schedule.complete(elapsed);
        Ok(grid)
    }
}
