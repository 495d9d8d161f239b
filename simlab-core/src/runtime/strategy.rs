//! Strategy callback surface.
//!
//! The engine calls [`Strategy::on_tick`] once per master tick with a
//! [`StrategyContext`]: read access to bars, indicators and the ledger, plus
//! the order-placing operations. Orders placed here are processed by the
//! venue later in the same tick.

use super::indicator::Indicator;
use super::series::StreamHistory;
use super::stop::StopHandle;
use crate::commission::ProfileBook;
use crate::domain::{
    Bar, BracketIds, BracketRequest, Notification, Order, OrderId, OrderRequest, StreamId,
    Timestamp,
};
use crate::ledger::{Ledger, Position};
use crate::orders::OrderBook;
use rust_decimal::Decimal;

pub trait Strategy: Send {
    /// Indicators evaluated on every stream. Names must be unique.
    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        Vec::new()
    }

    /// Bars of raw history the strategy reads beyond its indicators.
    fn lookback(&self) -> usize {
        0
    }

    /// Called once before the first tick with the registered stream names.
    fn on_start(&mut self, _streams: &[String]) {}

    fn on_tick(&mut self, ctx: &mut StrategyContext<'_>);

    /// Called once after the last tick with the notifications the final tick
    /// produced.
    fn on_stop(&mut self, _notifications: &[Notification]) {}
}

/// Cash moved in or out of the account by the strategy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct CashFlow(pub Decimal);

pub struct StrategyContext<'a> {
    pub(crate) now: Timestamp,
    pub(crate) tick: u64,
    pub(crate) names: &'a [String],
    pub(crate) indicator_names: &'a [String],
    pub(crate) histories: &'a [StreamHistory],
    pub(crate) ledger: &'a Ledger,
    pub(crate) profiles: &'a ProfileBook,
    pub(crate) book: &'a mut OrderBook,
    pub(crate) notifications: &'a [Notification],
    pub(crate) cash_flows: &'a mut Vec<CashFlow>,
    pub(crate) stop: &'a StopHandle,
}

impl<'a> StrategyContext<'a> {
    // ── Time ─────────────────────────────────────────────────────────

    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Zero-based master tick index.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    // ── Streams and bars ─────────────────────────────────────────────

    pub fn stream_count(&self) -> usize {
        self.names.len()
    }

    pub fn stream_id(&self, name: &str) -> Option<StreamId> {
        self.names.iter().position(|n| n == name).map(StreamId)
    }

    pub fn stream_name(&self, stream: StreamId) -> Option<&str> {
        self.names.get(stream.0).map(String::as_str)
    }

    /// Whether `stream` delivered a bar (fresh or forward-filled) on this tick.
    pub fn advanced(&self, stream: StreamId) -> bool {
        self.histories.get(stream.0).is_some_and(|h| h.fresh)
    }

    /// Most recent bar of `stream`, possibly from an earlier tick.
    pub fn bar(&self, stream: StreamId) -> Option<&Bar> {
        self.histories.get(stream.0)?.bars.current()
    }

    pub fn bar_ago(&self, stream: StreamId, ago: usize) -> Option<&Bar> {
        self.histories.get(stream.0)?.bars.ago(ago)
    }

    /// Retained bars of `stream`, oldest first.
    pub fn bars(&self, stream: StreamId) -> &[Bar] {
        self.histories
            .get(stream.0)
            .map(|h| h.bars.as_slice())
            .unwrap_or(&[])
    }

    /// Bars delivered on `stream` so far, dropped ones included.
    pub fn bar_count(&self, stream: StreamId) -> usize {
        self.histories.get(stream.0).map_or(0, |h| h.bars.len())
    }

    // ── Indicators ───────────────────────────────────────────────────

    /// Current value of the named indicator; `None` while warming up.
    pub fn indicator(&self, stream: StreamId, name: &str) -> Option<f64> {
        self.indicator_ago(stream, name, 0)
    }

    pub fn indicator_ago(&self, stream: StreamId, name: &str, ago: usize) -> Option<f64> {
        let index = self.indicator_names.iter().position(|n| n == name)?;
        let value = *self
            .histories
            .get(stream.0)?
            .indicators
            .get(index)?
            .ago(ago)?;
        (!value.is_nan()).then_some(value)
    }

    // ── Account ──────────────────────────────────────────────────────

    pub fn position(&self, stream: StreamId) -> Position {
        self.ledger.position(stream)
    }

    pub fn cash(&self) -> Decimal {
        self.ledger.cash()
    }

    pub fn value(&self) -> Decimal {
        self.ledger.value(self.profiles)
    }

    /// Value per fund share; `None` unless fund mode is on.
    pub fn fund_value(&self) -> Option<Decimal> {
        self.ledger.fund_value(self.profiles)
    }

    /// Add cash to the account at the end of this callback.
    pub fn deposit(&mut self, amount: Decimal) {
        self.cash_flows.push(CashFlow(amount.abs()));
    }

    pub fn withdraw(&mut self, amount: Decimal) {
        self.cash_flows.push(CashFlow(-amount.abs()));
    }

    // ── Orders ───────────────────────────────────────────────────────

    /// Notifications produced since the previous callback, in order.
    pub fn notifications(&self) -> &[Notification] {
        self.notifications
    }

    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.book.get(id)
    }

    /// Orders not yet in a terminal state.
    pub fn open_orders(&self, stream: StreamId) -> Vec<&Order> {
        self.book.alive().filter(|o| o.stream == stream).collect()
    }

    pub fn submit_order(&mut self, request: OrderRequest) -> OrderId {
        self.book.submit_order(request, self.now)
    }

    pub fn submit_bracket(&mut self, bracket: BracketRequest) -> BracketIds {
        self.book.submit_bracket(bracket, self.now)
    }

    pub fn submit_oco(&mut self, requests: Vec<OrderRequest>) -> Vec<OrderId> {
        self.book.submit_oco(requests, self.now)
    }

    /// Request cancellation. Idempotent; terminal orders are left alone.
    pub fn cancel_order(&mut self, id: OrderId) {
        self.book.request_cancel(id);
    }

    /// Finish the current tick, then end the run.
    pub fn stop_run(&mut self) {
        self.stop.stop();
    }
}
