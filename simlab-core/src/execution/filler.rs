//! Volume filler — how much of an order a bar can absorb.
//!
//! The unfilled remainder stays alive and is offered to later bars.

use crate::domain::{Bar, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum FillerPolicy {
    /// Fill the whole remainder regardless of volume.
    #[default]
    Unlimited,
    /// At most this many units per order per bar.
    FixedSize(Quantity),
    /// At most this percentage (0–100] of the bar's volume, shared by every
    /// order on the stream during the bar.
    BarPercent(Decimal),
}

impl FillerPolicy {
    /// Fresh volume budget for one bar.
    pub fn budget(&self, bar: &Bar) -> BarBudget {
        let shared = match self {
            FillerPolicy::BarPercent(pct) => Some((bar.volume * *pct / HUNDRED).floor()),
            _ => None,
        };
        BarBudget {
            policy: *self,
            shared,
        }
    }
}

/// Volume left on one bar for one stream.
#[derive(Debug, Clone)]
pub struct BarBudget {
    policy: FillerPolicy,
    shared: Option<Quantity>,
}

impl BarBudget {
    /// Size an order wanting `wanted` may fill now. Does not consume.
    pub fn available(&self, wanted: Quantity) -> Quantity {
        let capped = match self.policy {
            FillerPolicy::Unlimited => wanted,
            FillerPolicy::FixedSize(size) => wanted.min(size),
            FillerPolicy::BarPercent(_) => wanted.min(self.shared.unwrap_or(Decimal::ZERO)),
        };
        capped.max(Decimal::ZERO)
    }

    /// Record `size` as filled against the bar.
    pub fn consume(&mut self, size: Quantity) {
        if let Some(left) = self.shared.as_mut() {
            *left -= size;
        }
    }
}
