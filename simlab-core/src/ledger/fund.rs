//! Fund-share accounting: the account expressed as shares × value per share.

use crate::commission::MoneyPolicy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundAccount {
    pub shares: Decimal,
}

impl FundAccount {
    /// Issue the initial shares so that one share is worth `start_value`.
    pub fn new(initial_value: Decimal, start_value: Decimal) -> Self {
        let shares = if start_value.is_zero() {
            Decimal::ZERO
        } else {
            initial_value / start_value
        };
        Self { shares }
    }

    /// Value per share for a total account value.
    pub fn nav(&self, account_value: Decimal, money: MoneyPolicy) -> Decimal {
        if self.shares.is_zero() {
            return Decimal::ZERO;
        }
        money.round(account_value / self.shares)
    }

    /// Issue (positive `amount`) or redeem (negative) shares at `nav`.
    pub fn flow(&mut self, amount: Decimal, nav: Decimal) {
        if nav.is_zero() {
            return;
        }
        self.shares += amount / nav;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn deposits_issue_shares_at_nav() {
        let money = MoneyPolicy::default();
        let mut fund = FundAccount::new(dec!(10000), dec!(100));
        assert_eq!(fund.shares, dec!(100));
        // account grew to 12000 → nav 120
        let nav = fund.nav(dec!(12000), money);
        assert_eq!(nav, dec!(120));
        fund.flow(dec!(1200), nav);
        assert_eq!(fund.shares, dec!(110));
        assert_eq!(fund.nav(dec!(13200), money), dec!(120));
    }

    #[test]
    fn withdrawals_redeem_shares() {
        let mut fund = FundAccount::new(dec!(10000), dec!(100));
        fund.flow(dec!(-1000), dec!(100));
        assert_eq!(fund.shares, dec!(90));
    }
}
