//! Live pass-through venue.
//!
//! Orders are screened locally (validation and, optionally, the cash check),
//! then forwarded to a [`VenueAdapter`]. Venue acknowledgements and fills are
//! reconciled into the same order book and ledger the simulator uses. The
//! venue is trusted on fills, so the ledger does not re-check cash for them.

use super::validate::{screen, Screening};
use super::{ExecutionContext, ExecutionVenue};
use crate::domain::{Fill, Order, OrderId, OrderStatus, Price, Quantity, StreamId, Timestamp};
use crate::error::{EngineError, VenueError};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VenueAck {
    Accepted,
    Rejected { reason: String },
}

/// An execution reported by the venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueFill {
    pub order_id: OrderId,
    pub size: Quantity,
    pub price: Price,
    /// Venue-reported commission; computed locally when absent.
    pub commission: Option<Decimal>,
    pub timestamp: Option<Timestamp>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VenueBalances {
    pub cash: Decimal,
    pub positions: BTreeMap<StreamId, Quantity>,
}

/// Connection to a real (or paper) venue. Wire protocols live behind this
/// trait.
pub trait VenueAdapter: Send {
    fn submit(&mut self, order: &Order) -> Result<VenueAck, VenueError>;

    /// Executions since the previous poll.
    fn poll_fills(&mut self) -> Result<Vec<VenueFill>, VenueError>;

    /// `Ok(false)` when the venue could not cancel (typically already filled).
    fn cancel(&mut self, id: OrderId) -> Result<bool, VenueError>;

    fn balances(&mut self) -> Result<VenueBalances, VenueError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per call, first one included.
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(200),
        }
    }
}

pub struct LiveVenue<A: VenueAdapter> {
    adapter: A,
    retry: RetryPolicy,
    check_submit: bool,
}

impl<A: VenueAdapter> LiveVenue<A> {
    pub fn new(adapter: A, retry: RetryPolicy, check_submit: bool) -> Self {
        Self {
            adapter,
            retry,
            check_submit,
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn into_adapter(self) -> A {
        self.adapter
    }

    /// Run `call` under the retry policy. Each transient failure is surfaced
    /// as a venue-error notification on `order` (when there is one); the order
    /// keeps its state. Fatal errors and exhausted retries stop the run.
    fn with_retry<T>(
        adapter: &mut A,
        retry: RetryPolicy,
        ctx: &mut ExecutionContext<'_>,
        order: Option<OrderId>,
        mut call: impl FnMut(&mut A) -> Result<T, VenueError>,
    ) -> Result<T, EngineError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call(adapter) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if let Some(id) = order {
                        ctx.book.notify_venue_error(id, ctx.now, err.to_string());
                    }
                    if !err.is_transient() || attempt >= retry.max_attempts.max(1) {
                        error!(%err, attempt, "venue call failed");
                        return Err(EngineError::Venue(err));
                    }
                    warn!(%err, attempt, "venue call failed, retrying");
                    if !retry.backoff.is_zero() {
                        std::thread::sleep(retry.backoff);
                    }
                }
            }
        }
    }

    /// Compare venue balances with the ledger and log any drift.
    pub fn reconcile(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
        let balances = Self::with_retry(&mut self.adapter, self.retry, ctx, None, |a| a.balances())?;
        if balances.cash != ctx.ledger.cash() {
            warn!(venue = %balances.cash, ledger = %ctx.ledger.cash(), "cash differs from venue");
        }
        for (stream, size) in &balances.positions {
            let local = ctx.ledger.position_size(*stream);
            if local != *size {
                warn!(%stream, venue = %size, ledger = %local, "position differs from venue");
            }
        }
        Ok(())
    }
}

impl<A: VenueAdapter> ExecutionVenue for LiveVenue<A> {
    fn process_cancellations(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
        for id in ctx.book.take_cancel_requests() {
            let Some(order) = ctx.book.get(id) else {
                warn!(order = %id, "cancel request for unknown order");
                continue;
            };
            if order.status.is_terminal() {
                continue;
            }
            // never reached the venue: cancel locally
            if matches!(order.status, OrderStatus::Created | OrderStatus::Submitted) {
                ctx.book.cancel(id, ctx.now, "canceled by strategy")?;
                continue;
            }
            let canceled =
                Self::with_retry(&mut self.adapter, self.retry, ctx, Some(id), |a| a.cancel(id))?;
            if canceled {
                ctx.book.cancel(id, ctx.now, "canceled by strategy")?;
            } else {
                debug!(order = %id, "venue declined cancel");
            }
        }
        Ok(())
    }

    fn process_submissions(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
        for id in ctx.book.take_awaiting() {
            let Some(order) = ctx.book.get(id).cloned() else {
                continue;
            };
            if order.status != OrderStatus::Submitted {
                continue;
            }
            match screen(ctx, &order, self.check_submit) {
                Screening::Rejected(reason) => {
                    warn!(order = %id, %reason, "order rejected");
                    ctx.book.reject(id, ctx.now, reason)?;
                }
                Screening::MarginRejected(reason) => {
                    warn!(order = %id, %reason, "order margin-rejected");
                    ctx.book.margin_reject(id, ctx.now, reason)?;
                }
                Screening::Pass => {
                    let ack = Self::with_retry(&mut self.adapter, self.retry, ctx, Some(id), |a| {
                        a.submit(&order)
                    })?;
                    match ack {
                        VenueAck::Accepted => {
                            info!(order = %id, "accepted by venue");
                            ctx.book.accept(id, ctx.now, ctx.tick)?;
                        }
                        VenueAck::Rejected { reason } => {
                            warn!(order = %id, %reason, "rejected by venue");
                            ctx.book.reject(id, ctx.now, reason)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn execute_tick(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<Vec<Fill>, EngineError> {
        let reported = Self::with_retry(&mut self.adapter, self.retry, ctx, None, |a| a.poll_fills())?;
        let profiles = ctx.profiles;
        let mut fills = Vec::new();
        for venue_fill in reported {
            let id = venue_fill.order_id;
            let order = match ctx.book.get(id) {
                Some(o) if o.status.is_working() => o.clone(),
                _ => {
                    warn!(order = %id, "venue fill for an order that is not working");
                    continue;
                }
            };
            let mut size = venue_fill.size;
            if size > order.remaining() {
                warn!(order = %id, reported = %size, remaining = %order.remaining(), "venue overfill clamped");
                size = order.remaining();
            }
            if size <= Decimal::ZERO {
                continue;
            }
            let model = profiles.for_stream(order.stream);
            let commission = venue_fill
                .commission
                .unwrap_or_else(|| model.commission(size, venue_fill.price));
            let timestamp = venue_fill.timestamp.unwrap_or(ctx.now);
            let outcome = ctx
                .ledger
                .apply_fill(
                    model,
                    order.stream,
                    order.side.sign() * size,
                    venue_fill.price,
                    commission,
                    timestamp,
                    ctx.tick,
                    false,
                )?;
            let fill = Fill {
                order_id: id,
                stream: order.stream,
                timestamp,
                tick: ctx.tick,
                side: order.side,
                size,
                price: venue_fill.price,
                commission,
                realized_pnl: outcome.realized_pnl,
            };
            ctx.book.record_fill(fill.clone())?;
            fills.push(fill);
        }
        Ok(fills)
    }

    fn finish(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
        self.reconcile(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commission::{MoneyPolicy, ProfileBook};
    use crate::domain::{OrderRequest, OrderSide};
    use crate::execution::MarketView;
    use crate::ledger::Ledger;
    use crate::orders::OrderBook;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;

    /// Scripted adapter: queued fills, optional failures before success.
    #[derive(Default)]
    struct Scripted {
        fills: Vec<VenueFill>,
        submit_failures: VecDeque<VenueError>,
        submitted: Vec<OrderId>,
        reject_all: bool,
    }

    impl VenueAdapter for Scripted {
        fn submit(&mut self, order: &Order) -> Result<VenueAck, VenueError> {
            if let Some(err) = self.submit_failures.pop_front() {
                return Err(err);
            }
            self.submitted.push(order.id);
            if self.reject_all {
                Ok(VenueAck::Rejected {
                    reason: "closed".into(),
                })
            } else {
                Ok(VenueAck::Accepted)
            }
        }

        fn poll_fills(&mut self) -> Result<Vec<VenueFill>, VenueError> {
            Ok(std::mem::take(&mut self.fills))
        }

        fn cancel(&mut self, _id: OrderId) -> Result<bool, VenueError> {
            Ok(true)
        }

        fn balances(&mut self) -> Result<VenueBalances, VenueError> {
            Ok(VenueBalances::default())
        }
    }

    fn ts() -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn no_wait(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: Duration::ZERO,
        }
    }

    struct World {
        book: OrderBook,
        ledger: Ledger,
        profiles: ProfileBook,
        latest: Vec<Option<crate::domain::Bar>>,
    }

    impl World {
        fn new() -> Self {
            Self {
                book: OrderBook::new(),
                ledger: Ledger::new(dec!(10000), MoneyPolicy::default()),
                profiles: ProfileBook::default(),
                latest: vec![None],
            }
        }

        fn ctx(&mut self) -> ExecutionContext<'_> {
            ExecutionContext {
                book: &mut self.book,
                ledger: &mut self.ledger,
                profiles: &self.profiles,
                market: MarketView {
                    bars: &[],
                    latest: &self.latest,
                },
                now: ts(),
                tick: 0,
            }
        }
    }

    #[test]
    fn venue_fill_reconciles_into_book_and_ledger() {
        let mut world = World::new();
        let id = world
            .book
            .submit_order(OrderRequest::market(StreamId(0), OrderSide::Buy, dec!(10)), ts());
        let mut venue = LiveVenue::new(Scripted::default(), no_wait(1), false);
        venue.process_submissions(&mut world.ctx()).unwrap();
        assert_eq!(world.book.get(id).unwrap().status, OrderStatus::Accepted);

        venue.adapter.fills.push(VenueFill {
            order_id: id,
            size: dec!(10),
            price: dec!(100),
            commission: Some(dec!(1)),
            timestamp: None,
        });
        let fills = venue.execute_tick(&mut world.ctx()).unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(world.book.get(id).unwrap().status, OrderStatus::Completed);
        assert_eq!(world.ledger.cash(), dec!(8999));
    }

    #[test]
    fn transient_errors_are_retried_and_notified() {
        let mut world = World::new();
        let id = world
            .book
            .submit_order(OrderRequest::market(StreamId(0), OrderSide::Buy, dec!(1)), ts());
        world.book.drain_notifications();
        let adapter = Scripted {
            submit_failures: VecDeque::from([VenueError::Transient("timeout".into())]),
            ..Scripted::default()
        };
        let mut venue = LiveVenue::new(adapter, no_wait(3), false);
        venue.process_submissions(&mut world.ctx()).unwrap();

        let notes = world.book.drain_notifications();
        assert!(matches!(
            notes[0].kind,
            crate::domain::NotificationKind::VenueError { .. }
        ));
        assert_eq!(notes[0].status, OrderStatus::Submitted);
        assert_eq!(world.book.get(id).unwrap().status, OrderStatus::Accepted);
    }

    #[test]
    fn exhausted_retries_are_fatal() {
        let mut world = World::new();
        world
            .book
            .submit_order(OrderRequest::market(StreamId(0), OrderSide::Buy, dec!(1)), ts());
        let adapter = Scripted {
            submit_failures: VecDeque::from([
                VenueError::Transient("a".into()),
                VenueError::Transient("b".into()),
            ]),
            ..Scripted::default()
        };
        let mut venue = LiveVenue::new(adapter, no_wait(2), false);
        let err = venue.process_submissions(&mut world.ctx()).unwrap_err();
        assert!(matches!(err, EngineError::Venue(VenueError::Transient(_))));
    }

    #[test]
    fn venue_rejection_rejects_order() {
        let mut world = World::new();
        let id = world
            .book
            .submit_order(OrderRequest::market(StreamId(0), OrderSide::Buy, dec!(1)), ts());
        let adapter = Scripted {
            reject_all: true,
            ..Scripted::default()
        };
        let mut venue = LiveVenue::new(adapter, no_wait(1), false);
        venue.process_submissions(&mut world.ctx()).unwrap();
        assert_eq!(world.book.get(id).unwrap().status, OrderStatus::Rejected);
    }
}
