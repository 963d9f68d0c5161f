//! Core data types for grid trading

use serde::{Deserialize, Serialize};

/// Order side for grid levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, OrderSide::Buy)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a perp fill did to the account's position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillDirection {
    OpenLong,
    CloseLong,
    OpenShort,
    CloseShort,
}

impl FillDirection {
    /// Parse the exchange's `dir` field ("Open Long", "Close Short", ...).
    ///
    /// Liquidations, spot fills and position flips return `None`.
    pub fn parse(dir: &str) -> Option<Self> {
        match dir {
            "Open Long" => Some(FillDirection::OpenLong),
            "Close Long" => Some(FillDirection::CloseLong),
            "Open Short" => Some(FillDirection::OpenShort),
            "Close Short" => Some(FillDirection::CloseShort),
            _ => None,
        }
    }

    /// Side of the order that opened the position this fill touches
    pub fn opening_side(&self) -> OrderSide {
        match self {
            FillDirection::OpenLong | FillDirection::CloseLong => OrderSide::Buy,
            FillDirection::OpenShort | FillDirection::CloseShort => OrderSide::Sell,
        }
    }

    pub fn is_opening(&self) -> bool {
        matches!(self, FillDirection::OpenLong | FillDirection::OpenShort)
    }
}

/// Fill event from exchange
#[derive(Debug, Clone, PartialEq)]
pub struct GridFill {
    /// Exchange order ID
    pub oid: u64,
    /// Fill identifier used for de-duplication
    pub hash: String,
    /// Asset/coin
    pub coin: String,
    pub price: f64,
    pub size: f64,
    pub direction: FillDirection,
    /// Realized PnL reported by the exchange
    pub closed_pnl: f64,
    pub fee: f64,
    /// Timestamp (ms)
    pub time: u64,
}

/// Request to place a grid order
#[derive(Debug, Clone, PartialEq)]
pub struct GridOrderRequest {
    /// Gridline this order belongs to
    pub gridline: usize,
    pub price: f64,
    pub size: f64,
    pub side: OrderSide,
}

impl GridOrderRequest {
    pub fn new(gridline: usize, price: f64, size: f64, side: OrderSide) -> Self {
        Self {
            gridline,
            price,
            size,
            side,
        }
    }
}

/// Order result from exchange
#[derive(Debug, Clone, PartialEq)]
pub struct OrderResult {
    /// Exchange order ID
    pub oid: u64,
    pub status: OrderResultStatus,
}

/// Status of order placement
#[derive(Debug, Clone, PartialEq)]
pub enum OrderResultStatus {
    /// Order is resting on the book
    Resting,
    /// Order crossed the book and filled on placement
    Filled { avg_price: f64, filled_size: f64 },
}

/// Resting order as reported by the exchange
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub oid: u64,
    pub coin: String,
}

/// The part of a candle the SMA needs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub open_time: u64,
    pub close: f64,
}

/// Running totals for the current session
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Sum of realized PnL reported on processed fills
    pub realized_pnl: f64,
    pub total_fees: f64,
    pub fills_processed: u64,
    /// Closing fills, each completing an open/close pair
    pub round_trips: u64,
    /// Rebalances completed
    pub epochs: u64,
}

impl SessionStats {
    pub fn add_fill(&mut self, pnl: f64, fee: f64, closes_position: bool) {
        self.realized_pnl += pnl;
        self.total_fees += fee;
        self.fills_processed += 1;
        if closes_position {
            self.round_trips += 1;
        }
    }

    /// Net profit after fees
    pub fn net_pnl(&self) -> f64 {
        self.realized_pnl - self.total_fees
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_direction_parsing() {
        assert_eq!(FillDirection::parse("Open Long"), Some(FillDirection::OpenLong));
        assert_eq!(FillDirection::parse("Close Short"), Some(FillDirection::CloseShort));
        assert_eq!(FillDirection::parse("Long > Short"), None);
        assert_eq!(FillDirection::parse("Buy"), None);
    }

    #[test]
    fn test_opening_side() {
        assert_eq!(FillDirection::CloseLong.opening_side(), OrderSide::Buy);
        assert_eq!(FillDirection::CloseShort.opening_side(), OrderSide::Sell);
        assert!(FillDirection::OpenShort.is_opening());
        assert!(!FillDirection::CloseLong.is_opening());
    }

    #[test]
    fn test_session_stats() {
        let mut stats = SessionStats::default();
        stats.add_fill(0.0, 0.1, false);
        stats.add_fill(1.5, 0.1, true);
        assert_eq!(stats.fills_processed, 2);
        assert_eq!(stats.round_trips, 1);
        assert!((stats.net_pnl() - 1.3).abs() < 1e-9);
    }
}
