//! Round-trip extraction: fills folded into trade records as they arrive.

use crate::commission::MoneyPolicy;
use crate::domain::{Price, Quantity, StreamId, Timestamp, TradeDirection, TradeRecord};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct OpenTrade {
    direction: TradeDirection,
    opened_at: Timestamp,
    opened_tick: u64,
    max_size: Quantity,
    exit_qty: Quantity,
    exit_notional: Decimal,
    gross_pnl: Decimal,
    commission: Decimal,
}

/// One part of a fill as seen by the tracker.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FillLeg {
    pub stream: StreamId,
    pub timestamp: Timestamp,
    pub tick: u64,
    pub price: Price,
    pub commission: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct TradeTracker {
    open: BTreeMap<StreamId, OpenTrade>,
    closed: Vec<TradeRecord>,
}

impl TradeTracker {
    pub fn closed(&self) -> &[TradeRecord] {
        &self.closed
    }

    pub fn into_closed(self) -> Vec<TradeRecord> {
        self.closed
    }

    /// Record the effect of one fill.
    ///
    /// `closing` and `opening` are the split of the signed fill size,
    /// `size_after_close` is the position after the closing part and
    /// `entry_price` the position's average price before the fill.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn on_fill(
        &mut self,
        leg: FillLeg,
        closing: Quantity,
        opening: Quantity,
        size_after_close: Quantity,
        entry_price: Price,
        realized_pnl: Decimal,
        money: MoneyPolicy,
    ) {
        let total = closing.abs() + opening.abs();
        if total.is_zero() {
            return;
        }
        let close_commission = money.round(leg.commission * closing.abs() / total);
        let open_commission = leg.commission - close_commission;

        if !closing.is_zero() {
            if let Some(trade) = self.open.get_mut(&leg.stream) {
                trade.exit_qty += closing.abs();
                trade.exit_notional += closing.abs() * leg.price;
                trade.gross_pnl += realized_pnl;
                trade.commission += close_commission;
            }
            if size_after_close.is_zero() {
                if let Some(trade) = self.open.remove(&leg.stream) {
                    let exit_price = if trade.exit_qty.is_zero() {
                        leg.price
                    } else {
                        money.round(trade.exit_notional / trade.exit_qty)
                    };
                    self.closed.push(TradeRecord {
                        stream: leg.stream,
                        direction: trade.direction,
                        opened_at: trade.opened_at,
                        closed_at: leg.timestamp,
                        max_size: trade.max_size,
                        entry_price,
                        exit_price,
                        gross_pnl: trade.gross_pnl,
                        commission: trade.commission,
                        net_pnl: trade.gross_pnl - trade.commission,
                        bars_held: leg.tick.saturating_sub(trade.opened_tick),
                    });
                }
            }
        }

        if !opening.is_zero() {
            let size_after = size_after_close + opening;
            let trade = self.open.entry(leg.stream).or_insert_with(|| OpenTrade {
                direction: if opening > Decimal::ZERO {
                    TradeDirection::Long
                } else {
                    TradeDirection::Short
                },
                opened_at: leg.timestamp,
                opened_tick: leg.tick,
                max_size: Decimal::ZERO,
                exit_qty: Decimal::ZERO,
                exit_notional: Decimal::ZERO,
                gross_pnl: Decimal::ZERO,
                commission: Decimal::ZERO,
            });
            trade.commission += open_commission;
            trade.max_size = trade.max_size.max(size_after.abs());
        }
    }
}
