//! Gridline ladder around a centre price

use super::errors::{GridError, GridResult};

/// Symmetric ladder of `2 * half_width + 1` prices.
///
/// `lines[i] = center * (1 + interval * (i - half_width))`, so index
/// `half_width` is the midline and prices strictly increase with index.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    center: f64,
    interval: f64,
    half_width: usize,
    lines: Vec<f64>,
}

impl Grid {
    pub fn build(center: f64, interval: f64, half_width: usize) -> GridResult<Self> {
        if !center.is_finite() || center <= 0.0 {
            return Err(GridError::InvalidConfig(format!(
                "Grid center must be a positive price, got {}",
                center
            )));
        }
        if half_width == 0 {
            return Err(GridError::InvalidConfig(
                "Grid needs at least one interval on each side".into(),
            ));
        }
        if !interval.is_finite() || interval <= 0.0 {
            return Err(GridError::InvalidConfig(format!(
                "Grid interval must be positive, got {}",
                interval
            )));
        }
        if interval * half_width as f64 >= 1.0 {
            return Err(GridError::InvalidConfig(format!(
                "Lowest gridline would be non-positive (interval {} x {} intervals)",
                interval, half_width
            )));
        }

        let lines = (0..=2 * half_width)
            .map(|i| {
                let offset = i as f64 - half_width as f64;
                center * (1.0 + interval * offset)
            })
            .collect();

        Ok(Self {
            center,
            interval,
            half_width,
            lines,
        })
    }

    /// Price of gridline `i`, or `None` outside the ladder
    pub fn price(&self, i: usize) -> Option<f64> {
        self.lines.get(i).copied()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Index of the centre line
    pub fn midline(&self) -> usize {
        self.half_width
    }

    pub fn lines(&self) -> &[f64] {
        &self.lines
    }

    pub fn center(&self) -> f64 {
        self.center
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn half_width(&self) -> usize {
        self.half_width
    }

    /// Neighbouring gridline one step up (`is_up`) or down, if it exists
    pub fn neighbour(&self, i: usize, is_up: bool) -> Option<usize> {
        let j = if is_up { i.checked_add(1)? } else { i.checked_sub(1)? };
        (j < self.len()).then_some(j)
    }
}
