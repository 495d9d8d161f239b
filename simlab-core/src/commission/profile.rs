//! Commission/margin profile: the immutable per-instrument cost terms.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionKind {
    /// `rate` is a fraction of notional (0.001 = 0.1%).
    Percentage,
    /// `rate` is charged per unit traded.
    FixedPerUnit,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "value")]
pub enum MarginRequirement {
    /// Notional divided by leverage.
    Unset,
    /// Flat amount per contract.
    FixedPerUnit(Decimal),
    /// Fraction of notional.
    PercentOfPrice(Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    /// P&L is credited when the position closes.
    Cash,
    /// P&L is credited every tick against the previous mark.
    MarkToMarket,
}

/// Carrying cost of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterestTerms {
    /// Yearly rate as a fraction; charged per elapsed calendar day over 365.
    pub annual_rate: Decimal,
    /// Shorts always pay. Longs pay only when this is set.
    pub charge_longs: bool,
}

impl Default for InterestTerms {
    fn default() -> Self {
        Self {
            annual_rate: Decimal::ZERO,
            charge_longs: false,
        }
    }
}

/// Derived instrument class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileKind {
    /// Full notional changes hands.
    StockLike,
    /// Only margin is posted; P&L flows as cash.
    MarginBased,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionProfile {
    pub commission: CommissionKind,
    pub rate: Decimal,
    pub margin: MarginRequirement,
    pub leverage: Decimal,
    pub multiplier: Decimal,
    pub settlement: Settlement,
    pub interest: InterestTerms,
}

impl Default for CommissionProfile {
    fn default() -> Self {
        Self {
            commission: CommissionKind::Percentage,
            rate: Decimal::ZERO,
            margin: MarginRequirement::Unset,
            leverage: Decimal::ONE,
            multiplier: Decimal::ONE,
            settlement: Settlement::Cash,
            interest: InterestTerms::default(),
        }
    }
}

impl CommissionProfile {
    /// Stock-like percentage commission, e.g. `0.001` for 0.1%.
    pub fn stock(rate: Decimal) -> Self {
        Self {
            rate,
            ..Self::default()
        }
    }

    /// Futures-style: fixed commission per contract, fixed margin, marked to
    /// market every tick.
    pub fn futures(commission_per_unit: Decimal, margin: Decimal, multiplier: Decimal) -> Self {
        Self {
            commission: CommissionKind::FixedPerUnit,
            rate: commission_per_unit,
            margin: MarginRequirement::FixedPerUnit(margin),
            multiplier,
            settlement: Settlement::MarkToMarket,
            ..Self::default()
        }
    }

    pub fn kind(&self) -> ProfileKind {
        if self.margin == MarginRequirement::Unset
            && self.leverage == Decimal::ONE
            && self.settlement == Settlement::Cash
        {
            ProfileKind::StockLike
        } else {
            ProfileKind::MarginBased
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.rate < Decimal::ZERO {
            return Err(format!("commission rate must be non-negative, got {}", self.rate));
        }
        if self.leverage <= Decimal::ZERO {
            return Err(format!("leverage must be positive, got {}", self.leverage));
        }
        if self.multiplier <= Decimal::ZERO {
            return Err(format!("multiplier must be positive, got {}", self.multiplier));
        }
        match self.margin {
            MarginRequirement::FixedPerUnit(m) | MarginRequirement::PercentOfPrice(m)
                if m <= Decimal::ZERO =>
            {
                return Err(format!("margin requirement must be positive, got {m}"));
            }
            _ => {}
        }
        if self.interest.annual_rate < Decimal::ZERO {
            return Err("interest rate must be non-negative".into());
        }
        Ok(())
    }
}
