//! Grid trading configuration

use serde::{Deserialize, Serialize};

use crate::helpers::round_to_decimals;

use super::errors::{GridError, GridResult};

/// Asset precision information fetched from exchange meta
///
/// According to Hyperliquid docs:
/// - Prices can have up to 5 significant figures
/// - Price decimals = 6 - szDecimals for perps
/// - Size decimals = szDecimals from meta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPrecision {
    /// Decimal places for size (szDecimals from meta)
    pub sz_decimals: u32,
    /// Decimal places for price
    pub price_decimals: u32,
}

impl AssetPrecision {
    /// Create precision for a perp asset
    pub fn for_perp(sz_decimals: u32) -> Self {
        const MAX_DECIMALS_PERP: u32 = 6;
        Self {
            sz_decimals,
            price_decimals: MAX_DECIMALS_PERP.saturating_sub(sz_decimals),
        }
    }

    /// Round a price to at most 5 significant figures and `price_decimals` places.
    /// Integer prices are always valid.
    pub fn round_price(&self, price: f64) -> f64 {
        if !price.is_finite() || price <= 0.0 || price.fract() == 0.0 {
            return price;
        }
        let first_digit_pos = price.log10().floor() as i32;
        let decimals_for_5_sig = (4 - first_digit_pos).max(0) as u32;
        round_to_decimals(price, decimals_for_5_sig.min(self.price_decimals))
    }

    /// Round a size to the correct precision
    pub fn round_size(&self, size: f64) -> f64 {
        round_to_decimals(size, self.sz_decimals)
    }
}

impl Default for AssetPrecision {
    fn default() -> Self {
        Self::for_perp(0)
    }
}

/// Grid strategy parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// Perp coin to trade (e.g., "BTC", "ETH")
    pub asset: String,

    /// Fractional spacing between adjacent gridlines (0.01 = 1%)
    pub interval: f64,

    /// Gridlines on each side of the midline
    pub half_width: usize,

    /// Size of every grid order, in coins
    pub unit_size: f64,

    /// Cross leverage applied once at startup
    pub leverage: u32,

    /// Number of most recent fills examined per tick
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_window: Option<usize>,

    /// Hours of hourly candles averaged into the grid centre
    #[serde(default = "default_sma_window_hours")]
    pub sma_window_hours: u64,

    /// Candle interval used for the SMA
    #[serde(default = "default_candle_interval")]
    pub candle_interval: String,
}

fn default_sma_window_hours() -> u64 {
    50
}

fn default_candle_interval() -> String {
    "1h".to_string()
}

impl GridConfig {
    pub fn new(
        asset: impl Into<String>,
        interval: f64,
        half_width: usize,
        unit_size: f64,
        leverage: u32,
    ) -> Self {
        Self {
            asset: asset.into(),
            interval,
            half_width,
            unit_size,
            leverage,
            fill_window: None,
            sma_window_hours: default_sma_window_hours(),
            candle_interval: default_candle_interval(),
        }
    }

    pub fn with_fill_window(mut self, fill_window: usize) -> Self {
        self.fill_window = Some(fill_window);
        self
    }

    /// Total number of gridlines (2N + 1)
    pub fn num_lines(&self) -> usize {
        self.half_width * 2 + 1
    }

    /// Fills examined per tick, defaulting to the half-width
    pub fn fill_window(&self) -> usize {
        self.fill_window.unwrap_or(self.half_width)
    }

    /// Validate the configuration
    pub fn validate(&self) -> GridResult<()> {
        if self.asset.trim().is_empty() {
            return Err(GridError::InvalidConfig("Asset cannot be empty".into()));
        }

        if !self.interval.is_finite() || self.interval <= 0.0 {
            return Err(GridError::InvalidConfig(format!(
                "Grid interval must be positive, got {}",
                self.interval
            )));
        }

        if self.half_width == 0 {
            return Err(GridError::InvalidConfig(
                "Number of grid intervals must be at least 1".into(),
            ));
        }

        if self.interval * self.half_width as f64 >= 1.0 {
            return Err(GridError::InvalidConfig(format!(
                "Grid interval {} with {} intervals puts the lowest line at or below zero",
                self.interval, self.half_width
            )));
        }

        if !self.unit_size.is_finite() || self.unit_size <= 0.0 {
            return Err(GridError::InvalidConfig(format!(
                "Unit size must be positive, got {}",
                self.unit_size
            )));
        }

        if self.leverage == 0 {
            return Err(GridError::InvalidConfig("Leverage must be at least 1".into()));
        }

        if self.fill_window == Some(0) {
            return Err(GridError::InvalidConfig("Fill window cannot be 0".into()));
        }

        if self.sma_window_hours == 0 {
            return Err(GridError::InvalidConfig("SMA window cannot be 0".into()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let config = GridConfig::new("ETH", 0.01, 5, 0.1, 3);
        assert!(config.validate().is_ok());
        assert_eq!(config.num_lines(), 11);
        assert_eq!(config.fill_window(), 5);

        assert!(GridConfig::new("", 0.01, 5, 0.1, 3).validate().is_err());
        assert!(GridConfig::new("ETH", 0.0, 5, 0.1, 3).validate().is_err());
        assert!(GridConfig::new("ETH", -0.01, 5, 0.1, 3).validate().is_err());
        assert!(GridConfig::new("ETH", 0.01, 0, 0.1, 3).validate().is_err());
        assert!(GridConfig::new("ETH", 0.2, 5, 0.1, 3).validate().is_err());
        assert!(GridConfig::new("ETH", 0.01, 5, 0.0, 3).validate().is_err());
        assert!(GridConfig::new("ETH", 0.01, 5, 0.1, 0).validate().is_err());
        assert!(GridConfig::new("ETH", 0.01, 5, 0.1, 3)
            .with_fill_window(0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_price_rounding() {
        let precision = AssetPrecision::for_perp(4);
        assert_eq!(precision.price_decimals, 2);
        assert_eq!(precision.round_price(1893.456), 1893.5);
        assert_eq!(precision.round_price(12.3456), 12.35);
        assert_eq!(precision.round_price(99.0), 99.0);

        let precision = AssetPrecision::for_perp(0);
        assert_eq!(precision.round_price(0.123456789), 0.12346);
    }

    #[test]
    fn test_size_rounding() {
        let precision = AssetPrecision::for_perp(3);
        assert_eq!(precision.round_size(0.12345), 0.123);
        assert_eq!(precision.round_size(1.0), 1.0);
    }
}
