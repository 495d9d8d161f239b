//! Matching rules — does a bar fill an order, and at what raw price?
//!
//! Prices here are before slippage and volume capping. Gaps always fill at
//! the open when the open is already through the order's price.

use crate::domain::{Bar, Order, OrderKind, OrderSide, Price};

/// Outcome of evaluating one order against one bar.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    NoMatch,
    Fill {
        price: Price,
        /// The price is the bar open.
        at_open: bool,
        /// Price was bounded by a limit, which slippage may not cross.
        limit: Option<Price>,
    },
    /// Stop-limit whose stop fired but whose limit was not reached.
    Triggered,
}

impl MatchResult {
    fn at(price: Price, bar: &Bar, limit: Option<Price>) -> Self {
        MatchResult::Fill {
            price,
            at_open: price == bar.open,
            limit,
        }
    }
}

pub fn evaluate(order: &Order, bar: &Bar) -> MatchResult {
    match &order.kind {
        OrderKind::Market => MatchResult::Fill {
            price: bar.open,
            at_open: true,
            limit: None,
        },
        OrderKind::MarketOnClose => MatchResult::Fill {
            price: bar.close,
            at_open: false,
            limit: None,
        },
        OrderKind::Limit { limit } => check_limit(order.side, *limit, bar.open, bar),
        OrderKind::Stop { stop } => check_stop(order.side, *stop, bar),
        OrderKind::StopLimit { stop, limit } => {
            check_stop_limit(order.side, *stop, *limit, order.triggered, bar)
        }
        OrderKind::StopTrail { .. } => match order.trail_stop {
            Some(stop) => check_stop(order.side, stop, bar),
            None => MatchResult::NoMatch,
        },
    }
}

/// Buy: fills iff low ≤ limit, at the open when the open is already at or
/// below the limit. Sell mirrors with the high.
///
/// `reference` is the first price the order can see on this bar: the open,
/// or the stop for a stop-limit triggered mid-bar.
fn check_limit(side: OrderSide, limit: Price, reference: Price, bar: &Bar) -> MatchResult {
    match side {
        OrderSide::Buy => {
            if reference <= limit {
                MatchResult::at(reference, bar, Some(limit))
            } else if bar.low <= limit {
                MatchResult::at(limit, bar, Some(limit))
            } else {
                MatchResult::NoMatch
            }
        }
        OrderSide::Sell => {
            if reference >= limit {
                MatchResult::at(reference, bar, Some(limit))
            } else if bar.high >= limit {
                MatchResult::at(limit, bar, Some(limit))
            } else {
                MatchResult::NoMatch
            }
        }
    }
}

/// Buy: triggers iff high ≥ stop, fills at max(stop, open). Sell mirrors.
fn check_stop(side: OrderSide, stop: Price, bar: &Bar) -> MatchResult {
    match side {
        OrderSide::Buy if bar.high >= stop => MatchResult::at(stop.max(bar.open), bar, None),
        OrderSide::Sell if bar.low <= stop => MatchResult::at(stop.min(bar.open), bar, None),
        _ => MatchResult::NoMatch,
    }
}

fn check_stop_limit(
    side: OrderSide,
    stop: Price,
    limit: Price,
    already_triggered: bool,
    bar: &Bar,
) -> MatchResult {
    let reference = if already_triggered {
        bar.open
    } else {
        let (gapped, reached) = match side {
            OrderSide::Buy => (bar.open >= stop, bar.high >= stop),
            OrderSide::Sell => (bar.open <= stop, bar.low <= stop),
        };
        if gapped {
            bar.open
        } else if reached {
            stop
        } else {
            return MatchResult::NoMatch;
        }
    };
    match check_limit(side, limit, reference, bar) {
        MatchResult::NoMatch => MatchResult::Triggered,
        fill => fill,
    }
}

/// New trailing stop level after a bar that did not trigger it. The stop
/// only ever tightens.
pub fn ratchet_trail(order: &Order, close: Price) -> Option<Price> {
    let OrderKind::StopTrail { trail } = &order.kind else {
        return None;
    };
    let distance = trail.distance(close);
    let candidate = match order.side {
        OrderSide::Buy => close + distance,
        OrderSide::Sell => close - distance,
    };
    Some(match (order.trail_stop, order.side) {
        (None, _) => candidate,
        (Some(current), OrderSide::Buy) => current.min(candidate),
        (Some(current), OrderSide::Sell) => current.max(candidate),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderId, OrderRequest, StreamId, Timestamp, TrailAmount};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn ts() -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn bar(o: Decimal, h: Decimal, l: Decimal, c: Decimal) -> Bar {
        Bar::new(ts(), o, h, l, c, dec!(1000))
    }

    fn order(side: OrderSide, kind: OrderKind) -> Order {
        Order::from_request(
            OrderId(1),
            OrderRequest::new(StreamId(0), side, dec!(1), kind),
            ts(),
        )
    }

    fn price_of(result: MatchResult) -> Option<Decimal> {
        match result {
            MatchResult::Fill { price, .. } => Some(price),
            _ => None,
        }
    }

    // ── Market ────────────────────────────────────────────────────────

    #[test]
    fn market_fills_at_open_and_moc_at_close() {
        let b = bar(dec!(100), dec!(105), dec!(98), dec!(103));
        assert_eq!(
            price_of(evaluate(&order(OrderSide::Buy, OrderKind::Market), &b)),
            Some(dec!(100))
        );
        assert_eq!(
            price_of(evaluate(&order(OrderSide::Sell, OrderKind::MarketOnClose), &b)),
            Some(dec!(103))
        );
    }

    // ── Limit ─────────────────────────────────────────────────────────

    #[test]
    fn buy_limit_at_exact_low_fills() {
        let b = bar(dec!(100), dec!(105), dec!(98), dec!(103));
        let o = order(OrderSide::Buy, OrderKind::Limit { limit: dec!(98) });
        assert_eq!(price_of(evaluate(&o, &b)), Some(dec!(98)));
    }

    #[test]
    fn buy_limit_one_tick_below_low_does_not_fill() {
        let b = bar(dec!(100), dec!(105), dec!(98), dec!(103));
        let o = order(OrderSide::Buy, OrderKind::Limit { limit: dec!(97.99) });
        assert_eq!(evaluate(&o, &b), MatchResult::NoMatch);
    }

    #[test]
    fn buy_limit_gap_down_fills_at_open() {
        let b = bar(dec!(95), dec!(99), dec!(94), dec!(97));
        let o = order(OrderSide::Buy, OrderKind::Limit { limit: dec!(98) });
        assert_eq!(price_of(evaluate(&o, &b)), Some(dec!(95)));
    }

    #[test]
    fn sell_limit_mirrors() {
        let b = bar(dec!(100), dec!(105), dec!(98), dec!(103));
        let o = order(OrderSide::Sell, OrderKind::Limit { limit: dec!(104) });
        assert_eq!(price_of(evaluate(&o, &b)), Some(dec!(104)));
        let gap = bar(dec!(106), dec!(108), dec!(105), dec!(107));
        assert_eq!(price_of(evaluate(&o, &gap)), Some(dec!(106)));
        let miss = order(OrderSide::Sell, OrderKind::Limit { limit: dec!(105.01) });
        assert_eq!(evaluate(&miss, &b), MatchResult::NoMatch);
    }

    // ── Stop ──────────────────────────────────────────────────────────

    #[test]
    fn buy_stop_fills_at_stop_or_gap_open() {
        let o = order(OrderSide::Buy, OrderKind::Stop { stop: dec!(104) });
        let b = bar(dec!(100), dec!(105), dec!(98), dec!(103));
        assert_eq!(price_of(evaluate(&o, &b)), Some(dec!(104)));
        let gap = bar(dec!(106), dec!(108), dec!(105), dec!(107));
        assert_eq!(price_of(evaluate(&o, &gap)), Some(dec!(106)));
        let miss = bar(dec!(100), dec!(103), dec!(98), dec!(101));
        assert_eq!(evaluate(&o, &miss), MatchResult::NoMatch);
    }

    #[test]
    fn sell_stop_fills_at_min_of_stop_and_open() {
        let o = order(OrderSide::Sell, OrderKind::Stop { stop: dec!(99) });
        let b = bar(dec!(100), dec!(105), dec!(98), dec!(103));
        assert_eq!(price_of(evaluate(&o, &b)), Some(dec!(99)));
        let gap = bar(dec!(95), dec!(97), dec!(94), dec!(96));
        assert_eq!(price_of(evaluate(&o, &gap)), Some(dec!(95)));
    }

    // ── Stop-limit ────────────────────────────────────────────────────

    #[test]
    fn stop_limit_triggers_without_fill() {
        let o = order(
            OrderSide::Buy,
            OrderKind::StopLimit {
                stop: dec!(104),
                limit: dec!(103),
            },
        );
        let b = bar(dec!(100), dec!(105), dec!(99), dec!(104));
        // touched mid-bar, then traded back down through the limit
        assert_eq!(price_of(evaluate(&o, &b)), Some(dec!(103)));

        // gapped over the stop and never came back to the limit
        let b = bar(dec!(105), dec!(108), dec!(104), dec!(107));
        assert_eq!(evaluate(&o, &b), MatchResult::Triggered);
    }

    #[test]
    fn triggered_stop_limit_behaves_as_limit() {
        let mut o = order(
            OrderSide::Buy,
            OrderKind::StopLimit {
                stop: dec!(104),
                limit: dec!(103),
            },
        );
        o.triggered = true;
        let b = bar(dec!(102), dec!(103), dec!(100), dec!(101));
        assert_eq!(price_of(evaluate(&o, &b)), Some(dec!(102)));
    }

    #[test]
    fn stop_limit_mid_bar_trigger_fills_at_stop_when_within_limit() {
        let o = order(
            OrderSide::Buy,
            OrderKind::StopLimit {
                stop: dec!(104),
                limit: dec!(106),
            },
        );
        let b = bar(dec!(100), dec!(107), dec!(99), dec!(105));
        assert_eq!(price_of(evaluate(&o, &b)), Some(dec!(104)));
    }

    // ── Stop-trail ────────────────────────────────────────────────────

    #[test]
    fn sell_trail_ratchets_up_only() {
        let mut o = order(
            OrderSide::Sell,
            OrderKind::StopTrail {
                trail: TrailAmount::Absolute(dec!(5)),
            },
        );
        o.trail_stop = ratchet_trail(&o, dec!(100));
        assert_eq!(o.trail_stop, Some(dec!(95)));
        o.trail_stop = ratchet_trail(&o, dec!(110));
        assert_eq!(o.trail_stop, Some(dec!(105)));
        o.trail_stop = ratchet_trail(&o, dec!(102));
        assert_eq!(o.trail_stop, Some(dec!(105)));

        let b = bar(dec!(107), dec!(108), dec!(104), dec!(104));
        assert_eq!(price_of(evaluate(&o, &b)), Some(dec!(105)));
    }

    #[test]
    fn buy_trail_percent_ratchets_down() {
        let mut o = order(
            OrderSide::Buy,
            OrderKind::StopTrail {
                trail: TrailAmount::Percent(dec!(0.1)),
            },
        );
        o.trail_stop = ratchet_trail(&o, dec!(100));
        assert_eq!(o.trail_stop, Some(dec!(110)));
        o.trail_stop = ratchet_trail(&o, dec!(90));
        assert_eq!(o.trail_stop, Some(dec!(99)));
    }

    #[test]
    fn uninitialized_trail_never_fills() {
        let o = order(
            OrderSide::Sell,
            OrderKind::StopTrail {
                trail: TrailAmount::Absolute(dec!(5)),
            },
        );
        let b = bar(dec!(100), dec!(105), dec!(1), dec!(103));
        assert_eq!(evaluate(&o, &b), MatchResult::NoMatch);
    }
}
