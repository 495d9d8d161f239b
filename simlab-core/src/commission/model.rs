//! CommissionModel — profile kinds dispatched to cost, margin, P&L and interest.

use super::money::MoneyPolicy;
use super::profile::{
    CommissionKind, CommissionProfile, MarginRequirement, ProfileKind, Settlement,
};
use crate::domain::{Price, Quantity, StreamId};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

const DAYS_PER_YEAR: Decimal = Decimal::from_parts(365, 0, 0, false, 0);

/// Pure calculator over one profile. All outputs are rounded by the money
/// policy; sizes are signed (positive long) where a sign matters.
#[derive(Debug, Clone, PartialEq)]
pub struct CommissionModel {
    profile: CommissionProfile,
    money: MoneyPolicy,
}

impl CommissionModel {
    pub fn new(profile: CommissionProfile, money: MoneyPolicy) -> Self {
        Self { profile, money }
    }

    pub fn profile(&self) -> &CommissionProfile {
        &self.profile
    }

    pub fn money(&self) -> MoneyPolicy {
        self.money
    }

    pub fn kind(&self) -> ProfileKind {
        self.profile.kind()
    }

    pub fn is_stock_like(&self) -> bool {
        self.kind() == ProfileKind::StockLike
    }

    pub fn settlement(&self) -> Settlement {
        self.profile.settlement
    }

    pub fn multiplier(&self) -> Decimal {
        self.profile.multiplier
    }

    /// Commission for trading `size` units at `price`.
    pub fn commission(&self, size: Quantity, price: Price) -> Decimal {
        let raw = match self.profile.commission {
            CommissionKind::Percentage => {
                size.abs() * price * self.profile.multiplier * self.profile.rate
            }
            CommissionKind::FixedPerUnit => size.abs() * self.profile.rate,
        };
        self.money.round(raw)
    }

    /// Unrounded margin for one unit at `price`.
    fn margin_per_unit(&self, price: Price) -> Decimal {
        match self.profile.margin {
            MarginRequirement::FixedPerUnit(m) => m,
            MarginRequirement::PercentOfPrice(p) => price * self.profile.multiplier * p,
            MarginRequirement::Unset => price * self.profile.multiplier / self.profile.leverage,
        }
    }

    /// Cash needed to open `size` units at `price`: full notional for
    /// stock-like instruments, the margin requirement otherwise.
    pub fn margin(&self, size: Quantity, price: Price) -> Decimal {
        match self.kind() {
            ProfileKind::StockLike => self.money.round(size.abs() * price * self.profile.multiplier),
            ProfileKind::MarginBased => self.money.round(size.abs() * self.margin_per_unit(price)),
        }
    }

    /// Realized P&L of `size` (signed, positive long) moving from `entry` to `exit`.
    pub fn pnl(&self, size: Quantity, entry: Price, exit: Price) -> Decimal {
        self.money.round(size * (exit - entry) * self.profile.multiplier)
    }

    /// Mark-to-market cash adjustment for holding `size` while the mark moves
    /// from `from` to `to`. Zero for cash-settled instruments.
    pub fn cash_adjust(&self, size: Quantity, from: Price, to: Price) -> Decimal {
        match self.profile.settlement {
            Settlement::MarkToMarket => self.pnl(size, from, to),
            Settlement::Cash => Decimal::ZERO,
        }
    }

    /// Carrying interest on `size` at `price` for `days` calendar days.
    /// Shorts always pay; longs pay only when the profile says so.
    pub fn interest(&self, size: Quantity, price: Price, days: i64) -> Decimal {
        let terms = self.profile.interest;
        if days <= 0 || terms.annual_rate.is_zero() || size.is_zero() {
            return Decimal::ZERO;
        }
        if size > Decimal::ZERO && !terms.charge_longs {
            return Decimal::ZERO;
        }
        let notional = size.abs() * price * self.profile.multiplier;
        self.money
            .round(notional * terms.annual_rate * Decimal::from(days) / DAYS_PER_YEAR)
    }

    /// Contribution of an open position to account value.
    ///
    /// Stock-like: `size × price × multiplier`. Margin-based: the margin held
    /// plus unrealized P&L against `basis` (the average price, or the last
    /// settlement mark for mark-to-market instruments).
    pub fn position_value(
        &self,
        size: Quantity,
        basis: Price,
        price: Price,
        margin_held: Decimal,
    ) -> Decimal {
        match self.kind() {
            ProfileKind::StockLike => self.money.round(size * price * self.profile.multiplier),
            ProfileKind::MarginBased => margin_held + self.pnl(size, basis, price),
        }
    }
}

/// Per-stream commission models with a default for unlisted streams.
#[derive(Debug, Clone)]
pub struct ProfileBook {
    default: CommissionModel,
    per_stream: BTreeMap<StreamId, CommissionModel>,
}

impl ProfileBook {
    pub fn new(default: CommissionModel) -> Self {
        Self {
            default,
            per_stream: BTreeMap::new(),
        }
    }

    pub fn with_stream(mut self, stream: StreamId, model: CommissionModel) -> Self {
        self.per_stream.insert(stream, model);
        self
    }

    pub fn insert(&mut self, stream: StreamId, model: CommissionModel) {
        self.per_stream.insert(stream, model);
    }

    pub fn for_stream(&self, stream: StreamId) -> &CommissionModel {
        self.per_stream.get(&stream).unwrap_or(&self.default)
    }
}

impl Default for ProfileBook {
    fn default() -> Self {
        Self::new(CommissionModel::new(
            CommissionProfile::default(),
            MoneyPolicy::default(),
        ))
    }
}
