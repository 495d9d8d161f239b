use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Rounding policy for every monetary output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyPolicy {
    /// Decimal places kept after rounding.
    pub precision: u32,
}

impl Default for MoneyPolicy {
    fn default() -> Self {
        Self { precision: 8 }
    }
}

impl MoneyPolicy {
    pub fn new(precision: u32) -> Self {
        Self { precision }
    }

    /// Banker's rounding (half-even) at the configured precision.
    pub fn round(&self, value: Decimal) -> Decimal {
        value.round_dp_with_strategy(self.precision, RoundingStrategy::MidpointNearestEven)
    }
}
