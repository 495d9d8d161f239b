//! Pre-trade cash check.
//!
//! Before a submitted order is accepted, every working order is replayed in
//! submission order against a scratch copy of positions and cash, each at its
//! worst-case price, followed by the candidate. Closing portions earn no
//! credit. The candidate is refused when its opening portion would leave
//! projected cash negative.

use super::MarketView;
use crate::commission::ProfileBook;
use crate::domain::{Order, Price, StreamId};
use crate::error::MarginError;
use crate::ledger::{Ledger, Position};
use crate::orders::OrderBook;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Highest of the last close and any price attached to the order.
fn reference_price(order: &Order, market: &MarketView<'_>) -> Option<Price> {
    market
        .last_close(order.stream)
        .into_iter()
        .chain(order.reference_prices())
        .max()
}

pub fn check(
    candidate: &Order,
    book: &OrderBook,
    ledger: &Ledger,
    profiles: &ProfileBook,
    market: &MarketView<'_>,
) -> Result<(), MarginError> {
    let mut sizes: BTreeMap<StreamId, Decimal> = BTreeMap::new();
    let mut cash = ledger.cash();
    let mut committed = Decimal::ZERO;

    let mut project = |order: &Order| -> Decimal {
        let Some(price) = reference_price(order, market) else {
            return Decimal::ZERO;
        };
        let model = profiles.for_stream(order.stream);
        let size = sizes
            .entry(order.stream)
            .or_insert_with(|| ledger.position_size(order.stream));
        let delta = order.signed_remaining();
        let position = Position {
            size: *size,
            ..Position::default()
        };
        let (_, opening) = position.split(delta);
        *size += delta;
        let cost = model.margin(opening, price) + model.commission(delta, price);
        cash -= cost;
        if opening.is_zero() {
            Decimal::ZERO
        } else {
            cost
        }
    };

    for order in book.working() {
        committed += project(order);
    }
    let candidate_cost = project(candidate);
    drop(project);

    if candidate_cost > Decimal::ZERO && cash < Decimal::ZERO {
        return Err(MarginError {
            required: committed + candidate_cost,
            available: ledger.cash(),
        });
    }
    Ok(())
}
