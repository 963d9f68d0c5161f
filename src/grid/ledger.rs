//! Per-gridline order bookkeeping
//!
//! The ledger ties exchange order ids to gridlines, tracks how much of each
//! gridline's unit has been filled on either side, and remembers which
//! closing order offsets which opening order.

use std::collections::{HashMap, HashSet};

use log::warn;
use thiserror::Error;

use crate::helpers::EPSILON;

use super::errors::{GridError, GridResult};
use super::types::OrderSide;

/// Orders and filled quantity held at one gridline
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrderSlot {
    pub buy_oid: Option<u64>,
    pub buy_filled: f64,
    pub sell_oid: Option<u64>,
    pub sell_filled: f64,
}

impl OrderSlot {
    pub fn oid(&self, side: OrderSide) -> Option<u64> {
        match side {
            OrderSide::Buy => self.buy_oid,
            OrderSide::Sell => self.sell_oid,
        }
    }

    pub fn filled(&self, side: OrderSide) -> f64 {
        match side {
            OrderSide::Buy => self.buy_filled,
            OrderSide::Sell => self.sell_filled,
        }
    }

    fn oid_mut(&mut self, side: OrderSide) -> &mut Option<u64> {
        match side {
            OrderSide::Buy => &mut self.buy_oid,
            OrderSide::Sell => &mut self.sell_oid,
        }
    }

    fn filled_mut(&mut self, side: OrderSide) -> &mut f64 {
        match side {
            OrderSide::Buy => &mut self.buy_filled,
            OrderSide::Sell => &mut self.sell_filled,
        }
    }
}

/// Recoverable lookup failure while matching a fill to the ladder
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerMiss {
    #[error("order {0} is not tracked by the grid")]
    UnknownOrder(u64),

    #[error("closing order {closing_oid} has no tracked opening order")]
    BrokenLink { closing_oid: u64 },
}

#[derive(Debug, Clone)]
pub struct OrderLedger {
    slots: Vec<OrderSlot>,
    order_index: HashMap<u64, (usize, OrderSide)>,
    closing_to_opening: HashMap<u64, u64>,
    seen_fills: HashSet<String>,
    unit_size: f64,
}

impl OrderLedger {
    pub fn new(num_lines: usize, unit_size: f64) -> Self {
        Self {
            slots: vec![OrderSlot::default(); num_lines],
            order_index: HashMap::new(),
            closing_to_opening: HashMap::new(),
            seen_fills: HashSet::new(),
            unit_size,
        }
    }

    pub fn unit_size(&self) -> f64 {
        self.unit_size
    }

    pub fn slot(&self, gridline: usize) -> Option<&OrderSlot> {
        self.slots.get(gridline)
    }

    pub fn slots(&self) -> &[OrderSlot] {
        &self.slots
    }

    /// Filled quantity on `side` at `gridline`, zero outside the ladder
    pub fn filled(&self, gridline: usize, side: OrderSide) -> f64 {
        self.slots.get(gridline).map_or(0.0, |s| s.filled(side))
    }

    /// Gridline and side of a tracked order
    pub fn locate(&self, oid: u64) -> Option<(usize, OrderSide)> {
        self.order_index.get(&oid).copied()
    }

    pub fn is_tracked(&self, oid: u64) -> bool {
        self.order_index.contains_key(&oid)
    }

    pub fn closing_link(&self, closing_oid: u64) -> Option<u64> {
        self.closing_to_opening.get(&closing_oid).copied()
    }

    pub fn record_placement(&mut self, gridline: usize, side: OrderSide, oid: u64) -> GridResult<()> {
        let slot = self
            .slots
            .get_mut(gridline)
            .ok_or(GridError::LevelNotFound(gridline))?;
        *slot.oid_mut(side) = Some(oid);
        self.order_index.insert(oid, (gridline, side));
        Ok(())
    }

    /// Add `qty` to the `side` filled counter of the order's gridline.
    pub fn record_fill(&mut self, oid: u64, side: OrderSide, qty: f64) -> Result<usize, LedgerMiss> {
        let (gridline, _) = self.locate(oid).ok_or(LedgerMiss::UnknownOrder(oid))?;
        let unit = self.unit_size;
        let slot = self
            .slots
            .get_mut(gridline)
            .ok_or(LedgerMiss::UnknownOrder(oid))?;
        let filled = slot.filled_mut(side);
        let next = *filled + qty;
        if next > unit + EPSILON {
            warn!(
                "Fill of {} on {} at gridline {} exceeds unit size {}, clamping",
                qty, side, gridline, unit
            );
        }
        *filled = next.clamp(0.0, unit);
        Ok(gridline)
    }

    /// Remove `qty` from a gridline's filled counter, never below zero.
    pub fn release_fill(&mut self, gridline: usize, side: OrderSide, qty: f64) {
        let Some(slot) = self.slots.get_mut(gridline) else {
            warn!("Release on unknown gridline {}", gridline);
            return;
        };
        let filled = slot.filled_mut(side);
        let next = *filled - qty;
        if next < -EPSILON {
            warn!(
                "Release of {} on {} at gridline {} exceeds filled {}, clamping",
                qty, side, gridline, *filled
            );
        }
        *filled = next.max(0.0);
    }

    pub fn link_closing(&mut self, closing_oid: u64, opening_oid: u64) {
        self.closing_to_opening.insert(closing_oid, opening_oid);
    }

    /// Gridline of the opening order a closing order offsets
    pub fn resolve_opening_gridline(&self, closing_oid: u64) -> Result<usize, LedgerMiss> {
        let broken = LedgerMiss::BrokenLink { closing_oid };
        let opening_oid = self.closing_link(closing_oid).ok_or_else(|| broken.clone())?;
        self.locate(opening_oid)
            .map(|(gridline, _)| gridline)
            .ok_or(broken)
    }

    pub fn is_fully_filled(&self, gridline: usize, side: OrderSide) -> bool {
        self.filled(gridline, side) >= self.unit_size - EPSILON
    }

    /// Record a fill hash; false when it was already processed
    pub fn mark_seen(&mut self, hash: &str) -> bool {
        self.seen_fills.insert(hash.to_string())
    }

    pub fn is_seen(&self, hash: &str) -> bool {
        self.seen_fills.contains(hash)
    }

    /// Forget a canceled order.
    ///
    /// The closing link always goes. The index entry stays while the
    /// order's gridline still holds filled quantity on its side, since
    /// closing orders placed later resolve through it.
    pub fn retire_order(&mut self, oid: u64) {
        self.closing_to_opening.remove(&oid);

        let Some((gridline, side)) = self.locate(oid) else {
            return;
        };
        if self.filled(gridline, side) > EPSILON {
            return;
        }
        self.order_index.remove(&oid);
        if let Some(slot) = self.slots.get_mut(gridline) {
            let slot_oid = slot.oid_mut(side);
            if *slot_oid == Some(oid) {
                *slot_oid = None;
            }
        }
    }

    /// Sum of filled quantity on one side across the ladder
    pub fn total_filled(&self, side: OrderSide) -> f64 {
        self.slots.iter().map(|s| s.filled(side)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_release() {
        let mut ledger = OrderLedger::new(5, 1.0);
        ledger.record_placement(1, OrderSide::Buy, 7).unwrap();
        assert!(ledger.is_tracked(7));
        assert_eq!(ledger.record_fill(7, OrderSide::Buy, 1.0), Ok(1));
        assert!(ledger.is_fully_filled(1, OrderSide::Buy));

        ledger.release_fill(1, OrderSide::Buy, 0.4);
        assert!((ledger.filled(1, OrderSide::Buy) - 0.6).abs() < 1e-9);
        ledger.release_fill(1, OrderSide::Buy, 5.0);
        assert_eq!(ledger.filled(1, OrderSide::Buy), 0.0);
    }

    #[test]
    fn test_fill_is_clamped_to_unit() {
        let mut ledger = OrderLedger::new(3, 1.0);
        ledger.record_placement(0, OrderSide::Sell, 1).unwrap();
        ledger.record_fill(1, OrderSide::Sell, 0.8).unwrap();
        ledger.record_fill(1, OrderSide::Sell, 0.8).unwrap();
        assert_eq!(ledger.filled(0, OrderSide::Sell), 1.0);
    }

    #[test]
    fn test_unknown_order_and_broken_link() {
        let mut ledger = OrderLedger::new(3, 1.0);
        assert_eq!(
            ledger.record_fill(99, OrderSide::Buy, 1.0),
            Err(LedgerMiss::UnknownOrder(99))
        );
        assert_eq!(
            ledger.resolve_opening_gridline(5),
            Err(LedgerMiss::BrokenLink { closing_oid: 5 })
        );

        ledger.link_closing(5, 4);
        assert!(ledger.resolve_opening_gridline(5).is_err());

        ledger.record_placement(2, OrderSide::Buy, 4).unwrap();
        assert_eq!(ledger.resolve_opening_gridline(5), Ok(2));
    }

    #[test]
    fn test_record_placement_out_of_range() {
        let mut ledger = OrderLedger::new(3, 1.0);
        assert!(matches!(
            ledger.record_placement(3, OrderSide::Buy, 1),
            Err(GridError::LevelNotFound(3))
        ));
    }

    #[test]
    fn test_mark_seen_once() {
        let mut ledger = OrderLedger::new(1, 1.0);
        assert!(ledger.mark_seen("0xabc"));
        assert!(!ledger.mark_seen("0xabc"));
        assert!(ledger.is_seen("0xabc"));
    }

    #[test]
    fn test_retire_keeps_filled_openings() {
        let mut ledger = OrderLedger::new(5, 1.0);
        ledger.record_placement(1, OrderSide::Buy, 10).unwrap();
        ledger.record_placement(3, OrderSide::Buy, 11).unwrap();
        ledger.record_fill(10, OrderSide::Buy, 0.5).unwrap();
        ledger.record_placement(2, OrderSide::Sell, 12).unwrap();
        ledger.link_closing(12, 10);

        ledger.retire_order(10);
        ledger.retire_order(11);
        ledger.retire_order(12);

        assert!(ledger.is_tracked(10));
        assert_eq!(ledger.slot(1).unwrap().buy_oid, Some(10));
        assert!(!ledger.is_tracked(11));
        assert_eq!(ledger.slot(3).unwrap().buy_oid, None);
        assert!(!ledger.is_tracked(12));
        assert_eq!(ledger.closing_link(12), None);
    }
}
