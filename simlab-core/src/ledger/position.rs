use crate::domain::{Price, Quantity, Timestamp};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Signed position on one stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Positive long, negative short.
    pub size: Quantity,
    /// Volume-weighted average entry price; meaningless when flat.
    pub price: Price,
    /// Margin currently posted (margin-based instruments only).
    pub margin_held: Decimal,
    /// Last settlement mark (mark-to-market instruments only).
    pub mark: Price,
    /// Last known price, from a fill or a settlement close.
    pub last_price: Price,
    pub opened_at: Option<Timestamp>,
    /// Date interest was last charged through.
    pub interest_date: Option<NaiveDate>,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.size.is_zero()
    }

    pub fn is_long(&self) -> bool {
        self.size > Decimal::ZERO
    }

    pub fn is_short(&self) -> bool {
        self.size < Decimal::ZERO
    }

    /// Split a signed size change into the portion that reduces the current
    /// position and the portion that opens (or extends) exposure.
    ///
    /// Both parts carry the sign of `delta`. A sign-flipping change closes the
    /// whole position first.
    pub fn split(&self, delta: Quantity) -> (Quantity, Quantity) {
        if self.size.is_zero()
            || delta.is_zero()
            || self.size.is_sign_positive() == delta.is_sign_positive()
        {
            return (Decimal::ZERO, delta);
        }
        let closing_abs = delta.abs().min(self.size.abs());
        let closing = if delta.is_sign_positive() {
            closing_abs
        } else {
            -closing_abs
        };
        (closing, delta - closing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pos(size: Decimal) -> Position {
        Position {
            size,
            price: dec!(100),
            ..Position::default()
        }
    }

    #[test]
    fn flat_position_opens_everything() {
        assert_eq!(Position::default().split(dec!(5)), (dec!(0), dec!(5)));
        assert_eq!(Position::default().split(dec!(-5)), (dec!(0), dec!(-5)));
    }

    #[test]
    fn same_direction_extends() {
        assert_eq!(pos(dec!(10)).split(dec!(5)), (dec!(0), dec!(5)));
        assert_eq!(pos(dec!(-10)).split(dec!(-5)), (dec!(0), dec!(-5)));
    }

    #[test]
    fn partial_reduction() {
        assert_eq!(pos(dec!(10)).split(dec!(-4)), (dec!(-4), dec!(0)));
        assert_eq!(pos(dec!(-10)).split(dec!(4)), (dec!(4), dec!(0)));
    }

    #[test]
    fn flip_closes_then_opens() {
        assert_eq!(pos(dec!(10)).split(dec!(-15)), (dec!(-10), dec!(-5)));
        assert_eq!(pos(dec!(-3)).split(dec!(5)), (dec!(3), dec!(2)));
    }
}
