//! Slippage — directional price adjustment applied after volume capping.
//!
//! Buyers get a worse (higher) price, sellers a worse (lower) one. Limit fills
//! never slip past their limit. Prices pushed outside the bar range are capped
//! at the high/low (`slip_match`), allowed through (`slip_out`), or the order
//! waits for a later bar.

use crate::domain::{Bar, OrderSide, Price};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum SlippageKind {
    None,
    /// Fraction of price, e.g. `0.001` for 10 bps.
    Percent(Decimal),
    /// Absolute price units.
    Fixed(Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlippageConfig {
    pub kind: SlippageKind,
    /// Slip fills that happen at the bar open.
    pub slip_open: bool,
    /// Slip limit fills (bounded by the limit price).
    pub slip_limit: bool,
    /// Cap slipped prices at the bar high/low.
    pub slip_match: bool,
    /// Allow slipped prices outside the bar range.
    pub slip_out: bool,
}

impl Default for SlippageConfig {
    fn default() -> Self {
        Self {
            kind: SlippageKind::None,
            slip_open: false,
            slip_limit: true,
            slip_match: true,
            slip_out: false,
        }
    }
}

impl SlippageConfig {
    pub fn percent(fraction: Decimal) -> Self {
        Self {
            kind: SlippageKind::Percent(fraction),
            ..Self::default()
        }
    }

    pub fn fixed(amount: Decimal) -> Self {
        Self {
            kind: SlippageKind::Fixed(amount),
            ..Self::default()
        }
    }

    /// Final execution price, or `None` when the slipped price is outside the
    /// bar and neither matching nor out-of-range fills are allowed.
    pub fn apply(
        &self,
        side: OrderSide,
        price: Price,
        bar: &Bar,
        at_open: bool,
        limit: Option<Price>,
    ) -> Option<Price> {
        let amount = match self.kind {
            SlippageKind::None => return Some(price),
            SlippageKind::Percent(fraction) => price * fraction,
            SlippageKind::Fixed(amount) => amount,
        };
        if amount.is_zero()
            || (at_open && !self.slip_open)
            || (limit.is_some() && !self.slip_limit)
        {
            return Some(price);
        }

        let mut slipped = match side {
            OrderSide::Buy => price + amount,
            OrderSide::Sell => price - amount,
        };
        if let Some(limit) = limit {
            slipped = match side {
                OrderSide::Buy => slipped.min(limit),
                OrderSide::Sell => slipped.max(limit),
            };
        }

        if (bar.low..=bar.high).contains(&slipped) || self.slip_out {
            Some(slipped)
        } else if self.slip_match {
            Some(slipped.clamp(bar.low, bar.high))
        } else {
            None
        }
    }
}
