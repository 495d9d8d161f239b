//! Ledger — cash and positions, mutated only by confirmed fills and
//! post-tick settlement.

use super::fund::FundAccount;
use super::position::Position;
use super::trades::{FillLeg, TradeTracker};
use crate::commission::{CommissionModel, MoneyPolicy, ProfileBook, Settlement};
use crate::domain::{Price, Quantity, StreamId, Timestamp, TradeRecord};
use crate::error::MarginError;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use tracing::debug;

/// Cash effects of one applied fill.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillOutcome {
    /// Signed size that reduced the existing position.
    pub closing: Quantity,
    /// Signed size that opened or extended exposure.
    pub opening: Quantity,
    /// P&L of the closing portion against the average entry, before commission.
    pub realized_pnl: Decimal,
    /// Net change to cash, commission included.
    pub cash_delta: Decimal,
}

#[derive(Debug, Clone)]
pub struct Ledger {
    cash: Decimal,
    positions: BTreeMap<StreamId, Position>,
    fund: Option<FundAccount>,
    trades: TradeTracker,
    money: MoneyPolicy,
    total_commission: Decimal,
    total_interest: Decimal,
}

impl Ledger {
    pub fn new(initial_cash: Decimal, money: MoneyPolicy) -> Self {
        Self {
            cash: money.round(initial_cash),
            positions: BTreeMap::new(),
            fund: None,
            trades: TradeTracker::default(),
            money,
            total_commission: Decimal::ZERO,
            total_interest: Decimal::ZERO,
        }
    }

    /// Express the account in fund shares, one share worth `start_value`.
    pub fn with_fund(mut self, start_value: Decimal) -> Self {
        self.fund = Some(FundAccount::new(self.cash, start_value));
        self
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn money(&self) -> MoneyPolicy {
        self.money
    }

    pub fn position(&self, stream: StreamId) -> Position {
        self.positions.get(&stream).cloned().unwrap_or_default()
    }

    pub fn position_size(&self, stream: StreamId) -> Quantity {
        self.positions
            .get(&stream)
            .map(|p| p.size)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn positions(&self) -> impl Iterator<Item = (StreamId, &Position)> {
        self.positions.iter().map(|(id, p)| (*id, p))
    }

    pub fn total_commission(&self) -> Decimal {
        self.total_commission
    }

    pub fn total_interest(&self) -> Decimal {
        self.total_interest
    }

    pub fn trades(&self) -> &[TradeRecord] {
        self.trades.closed()
    }

    pub fn fund(&self) -> Option<&FundAccount> {
        self.fund.as_ref()
    }

    /// Cash plus the value of every open position at its last known price.
    pub fn value(&self, profiles: &ProfileBook) -> Decimal {
        let positions: Decimal = self
            .positions
            .iter()
            .filter(|(_, p)| !p.is_flat())
            .map(|(stream, p)| {
                let model = profiles.for_stream(*stream);
                let basis = match model.settlement() {
                    Settlement::MarkToMarket => p.mark,
                    Settlement::Cash => p.price,
                };
                model.position_value(p.size, basis, p.last_price, p.margin_held)
            })
            .sum();
        self.cash + positions
    }

    /// Value per fund share, when fund mode is on.
    pub fn fund_value(&self, profiles: &ProfileBook) -> Option<Decimal> {
        self.fund
            .as_ref()
            .map(|fund| fund.nav(self.value(profiles), self.money))
    }

    /// Apply a confirmed fill of signed `delta` at `price`.
    ///
    /// With `check_cash` set, a fill that opens exposure the account cannot
    /// afford fails with [`MarginError`] and leaves the ledger untouched.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_fill(
        &mut self,
        model: &CommissionModel,
        stream: StreamId,
        delta: Quantity,
        price: Price,
        commission: Decimal,
        timestamp: Timestamp,
        tick: u64,
        check_cash: bool,
    ) -> Result<FillOutcome, MarginError> {
        let current = self.positions.get(&stream).cloned().unwrap_or_default();
        let plan = plan_fill(model, &current, delta, price, commission);

        if check_cash
            && !plan.outcome.opening.is_zero()
            && self.cash + plan.cash_delta < Decimal::ZERO
        {
            return Err(MarginError {
                required: -plan.cash_delta,
                available: self.cash,
            });
        }

        let mut next = plan.position;
        // opened from flat, or flipped through it
        if !plan.outcome.opening.is_zero() && plan.size_after_close.is_zero() {
            next.opened_at = Some(timestamp);
            next.interest_date = Some(timestamp.date());
        }

        self.trades.on_fill(
            FillLeg {
                stream,
                timestamp,
                tick,
                price,
                commission,
            },
            plan.outcome.closing,
            plan.outcome.opening,
            plan.size_after_close,
            current.price,
            plan.outcome.realized_pnl,
            self.money,
        );

        self.cash += plan.cash_delta;
        self.total_commission += commission;
        debug!(
            %stream,
            %delta,
            %price,
            %commission,
            cash = %self.cash,
            size = %next.size,
            "fill applied"
        );
        self.positions.insert(stream, next);
        Ok(plan.outcome)
    }

    /// Post-tick settlement for a stream that printed `close` at `timestamp`:
    /// mark-to-market cash adjustment and carrying interest for the days
    /// elapsed since the last charge.
    pub fn settle(
        &mut self,
        model: &CommissionModel,
        stream: StreamId,
        close: Price,
        timestamp: Timestamp,
    ) {
        let Some(pos) = self.positions.get_mut(&stream) else {
            return;
        };
        pos.last_price = close;
        if pos.is_flat() {
            return;
        }

        let adjust = model.cash_adjust(pos.size, pos.mark, close);
        if !adjust.is_zero() {
            self.cash += adjust;
        }
        if model.settlement() == Settlement::MarkToMarket {
            pos.mark = close;
        }

        let today = timestamp.date();
        if let Some(since) = pos.interest_date {
            let days = (today - since).num_days();
            if days > 0 {
                let interest = model.interest(pos.size, close, days);
                if !interest.is_zero() {
                    self.cash -= interest;
                    self.total_interest += interest;
                    debug!(%stream, %interest, days, "interest charged");
                }
                pos.interest_date = Some(today);
            }
        }
    }

    /// Add (`amount > 0`) or remove cash. In fund mode shares are issued or
    /// redeemed at the current value per share.
    pub fn cash_flow(
        &mut self,
        profiles: &ProfileBook,
        amount: Decimal,
    ) -> Result<(), MarginError> {
        let amount = self.money.round(amount);
        if self.cash + amount < Decimal::ZERO {
            return Err(MarginError {
                required: -amount,
                available: self.cash,
            });
        }
        let nav = self.fund_value(profiles);
        if let (Some(fund), Some(nav)) = (self.fund.as_mut(), nav) {
            fund.flow(amount, nav);
        }
        self.cash += amount;
        Ok(())
    }
}

struct FillPlan {
    outcome: FillOutcome,
    cash_delta: Decimal,
    position: Position,
    size_after_close: Quantity,
}

/// Compute the effect of a fill on one position without committing it.
fn plan_fill(
    model: &CommissionModel,
    current: &Position,
    delta: Quantity,
    price: Price,
    commission: Decimal,
) -> FillPlan {
    let money = model.money();
    let multiplier = model.multiplier();
    let (closing, opening) = current.split(delta);
    let mut next = current.clone();
    next.last_price = price;
    let mut cash_delta = -commission;
    let mut realized = Decimal::ZERO;

    if !closing.is_zero() {
        // the part of the position being closed, in the position's sign
        let closed = -closing;
        realized = model.pnl(closed, current.price, price);
        if model.is_stock_like() {
            cash_delta -= money.round(closing * price * multiplier);
        } else {
            let release = if closing.abs() == current.size.abs() {
                current.margin_held
            } else {
                money.round(current.margin_held * closing.abs() / current.size.abs())
            };
            cash_delta += release;
            next.margin_held -= release;
            let basis = match model.settlement() {
                Settlement::MarkToMarket => current.mark,
                Settlement::Cash => current.price,
            };
            cash_delta += model.pnl(closed, basis, price);
        }
        next.size += closing;
        if next.is_flat() {
            next = Position {
                last_price: price,
                ..Position::default()
            };
        }
    }
    let size_after_close = next.size;

    if !opening.is_zero() {
        if model.is_stock_like() {
            cash_delta -= money.round(opening * price * multiplier);
        } else {
            let margin = model.margin(opening, price);
            cash_delta -= margin;
            next.margin_held += margin;
        }
        let new_size = next.size + opening;
        if next.is_flat() {
            next.price = price;
            next.mark = price;
        } else {
            next.price = (next.size * next.price + opening * price) / new_size;
            next.mark = (next.size * next.mark + opening * price) / new_size;
        }
        next.size = new_size;
    }

    FillPlan {
        outcome: FillOutcome {
            closing,
            opening,
            realized_pnl: realized,
            cash_delta,
        },
        cash_delta,
        position: next,
        size_after_close,
    }
}
