//! Bar — the fundamental market data unit.

use super::{Price, Quantity, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OHLCV + open interest snapshot for one instrument over one time bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: Timestamp,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Quantity,
    #[serde(default)]
    pub open_interest: Quantity,
    /// Forward-filled by the clock synchronizer, not delivered by the feed.
    #[serde(default)]
    pub synthetic: bool,
}

/// Reasons a bar fails the sanity check.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarError {
    #[error("high {high} is below low {low}")]
    HighBelowLow { high: Price, low: Price },

    #[error("{field} {value} lies outside the [{low}, {high}] range")]
    OutsideRange {
        field: &'static str,
        value: Price,
        low: Price,
        high: Price,
    },

    #[error("non-positive price in bar")]
    NonPositivePrice,

    #[error("negative volume {0}")]
    NegativeVolume(Quantity),
}

impl Bar {
    pub fn new(
        timestamp: Timestamp,
        open: Price,
        high: Price,
        low: Price,
        close: Price,
        volume: Quantity,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
            open_interest: Decimal::ZERO,
            synthetic: false,
        }
    }

    /// Zero-volume bar at `timestamp` carrying `previous.close` forward on all
    /// four prices.
    pub fn forward_fill(previous: &Bar, timestamp: Timestamp) -> Self {
        Self {
            timestamp,
            open: previous.close,
            high: previous.close,
            low: previous.close,
            close: previous.close,
            volume: Decimal::ZERO,
            open_interest: previous.open_interest,
            synthetic: true,
        }
    }

    /// Basic OHLCV sanity check: high >= low, open/close inside the range,
    /// positive prices, non-negative volume.
    pub fn validate(&self) -> Result<(), BarError> {
        if self.open <= Decimal::ZERO
            || self.high <= Decimal::ZERO
            || self.low <= Decimal::ZERO
            || self.close <= Decimal::ZERO
        {
            return Err(BarError::NonPositivePrice);
        }
        if self.high < self.low {
            return Err(BarError::HighBelowLow {
                high: self.high,
                low: self.low,
            });
        }
        for (field, value) in [("open", self.open), ("close", self.close)] {
            if value < self.low || value > self.high {
                return Err(BarError::OutsideRange {
                    field,
                    value,
                    low: self.low,
                    high: self.high,
                });
            }
        }
        if self.volume < Decimal::ZERO {
            return Err(BarError::NegativeVolume(self.volume));
        }
        Ok(())
    }
}
