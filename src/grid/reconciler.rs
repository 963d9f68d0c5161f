//! Matches exchange fills to the ladder and places the follow-up orders

use log::{debug, error, info, warn};

use super::config::GridConfig;
use super::errors::{GridError, GridResult};
use super::executor::{submit_order, GridExchange};
use super::ledger::{LedgerMiss, OrderLedger};
use super::model::Grid;
use super::types::{GridFill, GridOrderRequest, SessionStats};

/// What one reconciliation pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub processed: usize,
    pub untracked: usize,
    pub broken_links: usize,
    pub orders_placed: usize,
}

#[derive(Debug, Clone)]
pub struct FillReconciler {
    fill_window: usize,
}

impl FillReconciler {
    pub fn new(fill_window: usize) -> Self {
        Self { fill_window }
    }

    pub fn fill_window(&self) -> usize {
        self.fill_window
    }

    /// Process the newest `fill_window` fills, oldest first.
    ///
    /// An opening fill gets a closing order one gridline away; a closing
    /// fill re-places the opening order at the gridline it came from.
    ///
    /// A fill only touches the ledger once its follow-up order went out or
    /// failed for good. On a network fault the fill stays unseen and the
    /// error is returned, so the next poll handles it again.
    pub async fn reconcile<E>(
        &self,
        exchange: &E,
        config: &GridConfig,
        grid: &Grid,
        ledger: &mut OrderLedger,
        stats: &mut SessionStats,
    ) -> GridResult<ReconcileSummary>
    where
        E: GridExchange + ?Sized,
    {
        let mut fills = exchange.recent_fills().await?;
        fills.truncate(self.fill_window);
        fills.reverse();

        let mut summary = ReconcileSummary::default();
        for fill in fills {
            if !ledger.is_tracked(fill.oid) {
                debug!("Ignoring fill of untracked order {}", fill.oid);
                summary.untracked += 1;
                continue;
            }
            if ledger.is_seen(&fill.hash) {
                continue;
            }

            let gridline = match fill_gridline(ledger, &fill) {
                Ok(gridline) => Some(gridline),
                Err(miss) => {
                    warn!("Dropping fill {}: {}", fill.hash, miss);
                    if !fill.direction.is_opening() {
                        summary.broken_links += 1;
                    }
                    None
                }
            };
            let follow_up = match gridline {
                Some(gridline) => follow_up_order(grid, &fill, gridline)?,
                None => None,
            };

            let placed_oid = match &follow_up {
                Some(request) => match submit_order(exchange, &config.asset, request).await {
                    Ok(oid) => oid,
                    Err(e) if e.is_transient() => {
                        warn!("Fill {} left for the next poll: {}", fill.hash, e);
                        return Err(e);
                    }
                    Err(e) => {
                        error!("Follow-up order for fill {} failed: {}", fill.hash, e);
                        None
                    }
                },
                None => None,
            };

            ledger.mark_seen(&fill.hash);
            summary.processed += 1;
            stats.add_fill(fill.closed_pnl, fill.fee, !fill.direction.is_opening());
            info!(
                "Fill: {:?} {} {} @ {} (oid {}, pnl {})",
                fill.direction, fill.size, config.asset, fill.price, fill.oid, fill.closed_pnl
            );

            let opening_side = fill.direction.opening_side();
            if let Some(gridline) = gridline {
                if fill.direction.is_opening() {
                    if let Err(miss) = ledger.record_fill(fill.oid, opening_side, fill.size) {
                        warn!("Dropping fill {}: {}", fill.hash, miss);
                    }
                } else {
                    ledger.release_fill(gridline, opening_side, fill.size);
                }
            }

            if let (Some(request), Some(oid)) = (follow_up, placed_oid) {
                ledger.record_placement(request.gridline, request.side, oid)?;
                if fill.direction.is_opening() {
                    ledger.link_closing(oid, fill.oid);
                }
                summary.orders_placed += 1;
            }
        }

        Ok(summary)
    }
}

/// Gridline a fill books against: the order's own gridline for an opening
/// fill, the linked opening order's gridline for a closing one
fn fill_gridline(ledger: &OrderLedger, fill: &GridFill) -> Result<usize, LedgerMiss> {
    if fill.direction.is_opening() {
        ledger
            .locate(fill.oid)
            .map(|(gridline, _)| gridline)
            .ok_or(LedgerMiss::UnknownOrder(fill.oid))
    } else {
        ledger.resolve_opening_gridline(fill.oid)
    }
}

/// Closing order one gridline away for an opening fill, or the re-placed
/// opening order for a closing fill
fn follow_up_order(
    grid: &Grid,
    fill: &GridFill,
    gridline: usize,
) -> GridResult<Option<GridOrderRequest>> {
    let opening_side = fill.direction.opening_side();
    if !fill.direction.is_opening() {
        let price = line_price(grid, gridline)?;
        return Ok(Some(GridOrderRequest::new(
            gridline,
            price,
            fill.size,
            opening_side,
        )));
    }

    let Some(target) = grid.neighbour(gridline, opening_side.is_buy()) else {
        warn!(
            "No gridline beyond {} to close the {} fill of order {}",
            gridline, opening_side, fill.oid
        );
        return Ok(None);
    };
    let price = line_price(grid, target)?;
    Ok(Some(GridOrderRequest::new(
        target,
        price,
        fill.size,
        opening_side.opposite(),
    )))
}

fn line_price(grid: &Grid, gridline: usize) -> GridResult<f64> {
    grid.price(gridline)
        .ok_or(GridError::LevelNotFound(gridline))
}
