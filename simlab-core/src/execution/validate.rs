//! Structural order validation and the acceptance screen shared by every venue.

use super::pretrade;
use super::{ExecutionContext, MarketView};
use crate::domain::{Order, OrderKind, OrderSide, TimeInForce, Timestamp, TrailAmount};
use crate::error::ValidationError;
use crate::orders::OrderBook;
use rust_decimal::Decimal;

/// Reject orders that could never be executed as written.
pub fn validate(
    order: &Order,
    book: &OrderBook,
    market: &MarketView<'_>,
    now: Timestamp,
) -> Result<(), ValidationError> {
    if order.size <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveSize(order.size));
    }
    if order.stream.0 >= market.stream_count() {
        return Err(ValidationError::UnknownStream(order.stream));
    }
    let prices: Vec<(&'static str, Decimal)> = match &order.kind {
        OrderKind::Market | OrderKind::MarketOnClose => Vec::new(),
        OrderKind::Limit { limit } => vec![("limit", *limit)],
        OrderKind::Stop { stop } => vec![("stop", *stop)],
        OrderKind::StopLimit { stop, limit } => vec![("stop", *stop), ("limit", *limit)],
        OrderKind::StopTrail { trail } => {
            let amount = match trail {
                TrailAmount::Absolute(a) | TrailAmount::Percent(a) => *a,
            };
            if amount <= Decimal::ZERO {
                return Err(ValidationError::NonPositiveTrail(amount));
            }
            Vec::new()
        }
    };
    for (field, value) in prices {
        if value <= Decimal::ZERO {
            return Err(ValidationError::NonPositivePrice { field, value });
        }
    }
    if let TimeInForce::GoodTillDate(until) = order.time_in_force {
        if until < now {
            return Err(ValidationError::ExpiredOnArrival { until, now });
        }
    }
    validate_bracket(order, book)
}

/// A buy entry needs its stop below its target; a sell entry the reverse.
fn validate_bracket(entry: &Order, book: &OrderBook) -> Result<(), ValidationError> {
    let mut stop = None;
    let mut target = None;
    for child in book.dormant_children(entry.id) {
        match book.get(*child).map(|o| &o.kind) {
            Some(OrderKind::Stop { stop: s }) => stop = Some(*s),
            Some(OrderKind::Limit { limit }) => target = Some(*limit),
            _ => {}
        }
    }
    let Some(stop) = stop else {
        return Ok(());
    };
    if stop <= Decimal::ZERO {
        return Err(ValidationError::NonPositivePrice {
            field: "bracket stop",
            value: stop,
        });
    }
    if let Some(target) = target {
        let ordered = match entry.side {
            OrderSide::Buy => stop < target,
            OrderSide::Sell => stop > target,
        };
        if !ordered {
            return Err(ValidationError::BracketOrdering { stop, target });
        }
    }
    Ok(())
}

/// Decision on a submitted order.
#[derive(Debug, Clone, PartialEq)]
pub enum Screening {
    Pass,
    Rejected(String),
    MarginRejected(String),
}

/// Validation first, then (optionally) the pre-trade cash check.
pub fn screen(ctx: &ExecutionContext<'_>, order: &Order, check_submit: bool) -> Screening {
    if let Err(err) = validate(order, ctx.book, &ctx.market, ctx.now) {
        return Screening::Rejected(err.to_string());
    }
    if check_submit {
        if let Err(err) = pretrade::check(order, ctx.book, ctx.ledger, ctx.profiles, &ctx.market) {
            return Screening::MarginRejected(err.to_string());
        }
    }
    Screening::Pass
}
