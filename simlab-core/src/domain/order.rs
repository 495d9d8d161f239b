//! Orders, order requests, and the lifecycle status table.

use super::ids::{OcoGroupId, OrderId, StreamId};
use super::{Price, Quantity, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells.
    pub fn sign(self) -> Decimal {
        match self {
            OrderSide::Buy => Decimal::ONE,
            OrderSide::Sell => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

/// Distance a trailing stop keeps from the reference close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TrailAmount {
    Absolute(Price),
    /// Fraction of price, e.g. `0.02` for 2%.
    Percent(Decimal),
}

impl TrailAmount {
    pub fn distance(&self, reference: Price) -> Price {
        match self {
            TrailAmount::Absolute(amount) => *amount,
            TrailAmount::Percent(pct) => reference * *pct,
        }
    }
}

/// What kind of order and its price parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Fills at the open of the evaluation bar.
    Market,
    /// Fills at the close of the evaluation bar.
    MarketOnClose,
    /// Fills at the limit price or better.
    Limit { limit: Price },
    /// Triggers when price reaches `stop`, then fills as market.
    Stop { stop: Price },
    /// Triggers at `stop`, then rests as a limit at `limit`.
    StopLimit { stop: Price, limit: Price },
    /// Stop whose trigger follows the close at a fixed distance, only ever
    /// tightening.
    StopTrail { trail: TrailAmount },
}

impl OrderKind {
    /// Market-type orders are evaluated before limit/stop orders on every bar.
    pub fn is_market_type(&self) -> bool {
        matches!(self, OrderKind::Market | OrderKind::MarketOnClose)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    GoodTillCanceled,
    /// Expires once the master clock moves past the calendar day of acceptance.
    Day,
    /// Expires once the master clock moves strictly past the timestamp.
    GoodTillDate(Timestamp),
}

/// Order lifecycle states.
///
/// ```text
/// Created → Submitted → Accepted | Rejected | MarginRejected
/// Accepted → PartiallyFilled* → Completed
/// alive → Canceled | Expired | MarginRejected
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Created,
    Submitted,
    Accepted,
    PartiallyFilled,
    Completed,
    Canceled,
    Expired,
    Rejected,
    MarginRejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed
                | OrderStatus::Canceled
                | OrderStatus::Expired
                | OrderStatus::Rejected
                | OrderStatus::MarginRejected
        )
    }

    pub fn is_alive(self) -> bool {
        !self.is_terminal()
    }

    /// Accepted orders (including partially filled ones) are eligible for matching.
    pub fn is_working(self) -> bool {
        matches!(self, OrderStatus::Accepted | OrderStatus::PartiallyFilled)
    }

    /// The legal transition table.
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Created, Submitted) | (Created, Canceled) => true,
            (Submitted, Accepted)
            | (Submitted, Rejected)
            | (Submitted, MarginRejected)
            | (Submitted, Canceled) => true,
            (Accepted | PartiallyFilled, PartiallyFilled)
            | (Accepted | PartiallyFilled, Completed)
            | (Accepted | PartiallyFilled, Canceled)
            | (Accepted | PartiallyFilled, Expired)
            | (Accepted | PartiallyFilled, MarginRejected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Created => "created",
            OrderStatus::Submitted => "submitted",
            OrderStatus::Accepted => "accepted",
            OrderStatus::PartiallyFilled => "partially_filled",
            OrderStatus::Completed => "completed",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Expired => "expired",
            OrderStatus::Rejected => "rejected",
            OrderStatus::MarginRejected => "margin_rejected",
        };
        f.write_str(s)
    }
}

/// What a strategy asks for. The order book turns it into an [`Order`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub stream: StreamId,
    pub side: OrderSide,
    pub size: Quantity,
    pub kind: OrderKind,
    pub time_in_force: TimeInForce,
}

impl OrderRequest {
    pub fn new(stream: StreamId, side: OrderSide, size: Quantity, kind: OrderKind) -> Self {
        Self {
            stream,
            side,
            size,
            kind,
            time_in_force: TimeInForce::GoodTillCanceled,
        }
    }

    pub fn market(stream: StreamId, side: OrderSide, size: Quantity) -> Self {
        Self::new(stream, side, size, OrderKind::Market)
    }

    pub fn market_on_close(stream: StreamId, side: OrderSide, size: Quantity) -> Self {
        Self::new(stream, side, size, OrderKind::MarketOnClose)
    }

    pub fn limit(stream: StreamId, side: OrderSide, size: Quantity, limit: Price) -> Self {
        Self::new(stream, side, size, OrderKind::Limit { limit })
    }

    pub fn stop(stream: StreamId, side: OrderSide, size: Quantity, stop: Price) -> Self {
        Self::new(stream, side, size, OrderKind::Stop { stop })
    }

    pub fn stop_limit(
        stream: StreamId,
        side: OrderSide,
        size: Quantity,
        stop: Price,
        limit: Price,
    ) -> Self {
        Self::new(stream, side, size, OrderKind::StopLimit { stop, limit })
    }

    pub fn stop_trail(stream: StreamId, side: OrderSide, size: Quantity, trail: TrailAmount) -> Self {
        Self::new(stream, side, size, OrderKind::StopTrail { trail })
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }
}

/// Entry plus protective stop and optional target.
///
/// The children take the opposite side and the entry's size. They stay dormant
/// until the entry completes and then form an OCO group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketRequest {
    pub entry: OrderRequest,
    pub stop_price: Price,
    pub target_price: Option<Price>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketIds {
    pub entry: OrderId,
    pub stop: OrderId,
    pub target: Option<OrderId>,
}

/// A single order in the order book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub stream: StreamId,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub time_in_force: TimeInForce,
    pub size: Quantity,
    pub filled: Quantity,
    pub status: OrderStatus,
    pub created_at: Timestamp,
    pub accepted_at: Option<Timestamp>,
    /// Master tick index at acceptance; drives same-bar vs next-bar eligibility.
    pub accepted_tick: Option<u64>,
    /// Stop-limit orders whose stop has fired.
    pub triggered: bool,
    /// Current trigger level of a stop-trail order.
    pub trail_stop: Option<Price>,
    /// Volume-weighted average fill price (zero until the first fill).
    pub avg_fill_price: Price,
    pub commission: Decimal,
    /// Bracket entry this order protects.
    pub parent: Option<OrderId>,
    pub oco_group: Option<OcoGroupId>,
}

impl Order {
    pub fn from_request(id: OrderId, request: OrderRequest, created_at: Timestamp) -> Self {
        Self {
            id,
            stream: request.stream,
            side: request.side,
            kind: request.kind,
            time_in_force: request.time_in_force,
            size: request.size,
            filled: Decimal::ZERO,
            status: OrderStatus::Created,
            created_at,
            accepted_at: None,
            accepted_tick: None,
            triggered: false,
            trail_stop: None,
            avg_fill_price: Decimal::ZERO,
            commission: Decimal::ZERO,
            parent: None,
            oco_group: None,
        }
    }

    pub fn remaining(&self) -> Quantity {
        self.size - self.filled
    }

    pub fn is_alive(&self) -> bool {
        self.status.is_alive()
    }

    /// Signed size still to be executed (positive for buys).
    pub fn signed_remaining(&self) -> Quantity {
        self.side.sign() * self.remaining()
    }

    /// Whether time-in-force has elapsed at `now`.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        match self.time_in_force {
            TimeInForce::GoodTillCanceled => false,
            TimeInForce::Day => self
                .accepted_at
                .is_some_and(|accepted| now.date() > accepted.date()),
            TimeInForce::GoodTillDate(until) => now > until,
        }
    }

    /// Every price attached to the order, for worst-case cost estimation.
    pub fn reference_prices(&self) -> Vec<Price> {
        match &self.kind {
            OrderKind::Market | OrderKind::MarketOnClose => Vec::new(),
            OrderKind::Limit { limit } => vec![*limit],
            OrderKind::Stop { stop } => vec![*stop],
            OrderKind::StopLimit { stop, limit } => vec![*stop, *limit],
            OrderKind::StopTrail { .. } => self.trail_stop.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn ts(day: u32) -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn order(kind: OrderKind) -> Order {
        Order::from_request(
            OrderId(1),
            OrderRequest::new(StreamId(0), OrderSide::Buy, dec!(100), kind),
            ts(2),
        )
    }

    #[test]
    fn order_remaining_quantity() {
        let mut o = order(OrderKind::Market);
        o.filled = dec!(30);
        assert_eq!(o.remaining(), dec!(70));
        assert_eq!(o.signed_remaining(), dec!(70));
    }

    #[test]
    fn terminal_states_are_not_alive() {
        for status in [
            OrderStatus::Completed,
            OrderStatus::Canceled,
            OrderStatus::Expired,
            OrderStatus::Rejected,
            OrderStatus::MarginRejected,
        ] {
            assert!(status.is_terminal());
            assert!(!status.is_alive());
        }
        assert!(OrderStatus::PartiallyFilled.is_alive());
        assert!(OrderStatus::Submitted.is_alive());
    }

    #[test]
    fn transition_table_rejects_leaving_terminal_states() {
        assert!(OrderStatus::Created.can_transition_to(OrderStatus::Submitted));
        assert!(OrderStatus::Submitted.can_transition_to(OrderStatus::MarginRejected));
        assert!(OrderStatus::PartiallyFilled.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::Created.can_transition_to(OrderStatus::Accepted));
        assert!(!OrderStatus::Submitted.can_transition_to(OrderStatus::Completed));
        assert!(!OrderStatus::Completed.can_transition_to(OrderStatus::Canceled));
        assert!(!OrderStatus::Canceled.can_transition_to(OrderStatus::Canceled));
    }

    #[test]
    fn day_order_expires_on_next_calendar_day() {
        let mut o = order(OrderKind::Limit { limit: dec!(99) });
        o.time_in_force = TimeInForce::Day;
        o.accepted_at = Some(ts(2));
        assert!(!o.is_expired_at(ts(2) + chrono::Duration::hours(5)));
        assert!(o.is_expired_at(ts(3)));
    }

    #[test]
    fn good_till_date_expires_strictly_after() {
        let mut o = order(OrderKind::Market);
        o.time_in_force = TimeInForce::GoodTillDate(ts(5));
        assert!(!o.is_expired_at(ts(5)));
        assert!(o.is_expired_at(ts(6)));
    }

    #[test]
    fn trail_distance_percent() {
        let trail = TrailAmount::Percent(dec!(0.02));
        assert_eq!(trail.distance(dec!(150)), dec!(3.00));
        assert_eq!(TrailAmount::Absolute(dec!(1.5)).distance(dec!(150)), dec!(1.5));
    }
}
