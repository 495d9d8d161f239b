//! Bar-level matching simulator.
//!
//! Per master tick: expire orders whose time-in-force elapsed, then for every
//! stream with a fresh (non-synthetic) bar, in processing order, evaluate
//! market-type orders first and limit/stop orders after, each group in
//! submission order. Each fill is priced, capped by the filler, slipped,
//! charged commission and applied to the ledger and the order book as one step.

use super::matching::{self, MatchResult};
use super::validate::{screen, Screening};
use super::{ExecutionConfig, ExecutionContext, ExecutionVenue};
use crate::domain::{Fill, OrderId, OrderKind, OrderStatus};
use crate::error::EngineError;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct SimulatedVenue {
    config: ExecutionConfig,
}

impl SimulatedVenue {
    pub fn new(config: ExecutionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    fn eligible(&self, accepted_tick: Option<u64>, tick: u64) -> bool {
        match accepted_tick {
            Some(accepted) if self.config.same_bar => accepted <= tick,
            Some(accepted) => accepted < tick,
            None => false,
        }
    }

    fn expire_orders(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
        let expired: Vec<OrderId> = ctx
            .book
            .working()
            .filter(|o| o.is_expired_at(ctx.now))
            .map(|o| o.id)
            .collect();
        for id in expired {
            // an earlier expiry may have canceled this one through its OCO group
            if ctx.book.get(id).is_some_and(|o| o.status.is_working()) {
                debug!(order = %id, "time in force elapsed");
                ctx.book.expire(id, ctx.now)?;
            }
        }
        Ok(())
    }
}

impl ExecutionVenue for SimulatedVenue {
    fn process_cancellations(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
        for id in ctx.book.take_cancel_requests() {
            match ctx.book.cancel(id, ctx.now, "canceled by strategy") {
                Ok(true) => {}
                Ok(false) => debug!(order = %id, "cancel ignored: order already terminal"),
                Err(err) => warn!(order = %id, %err, "cancel request for unknown order"),
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
            match screen(ctx, &order, self.config.check_submit) {
                Screening::Rejected(reason) => {
                    warn!(order = %id, %reason, "order rejected");
                    ctx.book.reject(id, ctx.now, reason)?;
                }
                Screening::MarginRejected(reason) => {
                    warn!(order = %id, %reason, "order margin-rejected");
                    ctx.book.margin_reject(id, ctx.now, reason)?;
                }
                Screening::Pass => {
                    ctx.book.accept(id, ctx.now, ctx.tick)?;
                    if let (OrderKind::StopTrail { .. }, Some(close)) =
                        (&order.kind, ctx.market.last_close(order.stream))
                    {
                        if let Some(stop) = matching::ratchet_trail(&order, close) {
                            ctx.book.set_trail_stop(id, stop)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn execute_tick(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<Vec<Fill>, EngineError> {
        self.expire_orders(ctx)?;

        let bars = ctx.market.bars;
        let profiles = ctx.profiles;
        let mut fills = Vec::new();
        for stream_bar in bars {
            if stream_bar.bar.synthetic {
                continue;
            }
            let stream = stream_bar.stream;
            let bar = &stream_bar.bar;

            // market-type first, then the rest; each in submission order
            let mut ids = ctx.book.working_ids_for(stream);
            ids.retain(|id| {
                ctx.book
                    .get(*id)
                    .is_some_and(|o| self.eligible(o.accepted_tick, ctx.tick))
            });
            ids.sort_by_key(|id| {
                let market_type = ctx.book.get(*id).is_some_and(|o| o.kind.is_market_type());
                (!market_type, *id)
            });

            let model = profiles.for_stream(stream);
            let mut budget = self.config.filler.budget(bar);

            for id in ids {
                // re-fetch: an OCO sibling may have been canceled by an earlier fill
                let order = match ctx.book.get(id) {
                    Some(o) if o.status.is_working() => o.clone(),
                    _ => continue,
                };

                match matching::evaluate(&order, bar) {
                    MatchResult::NoMatch => {
                        if let Some(stop) = matching::ratchet_trail(&order, bar.close) {
                            ctx.book.set_trail_stop(id, stop)?;
                        }
                    }
                    MatchResult::Triggered => {
                        debug!(order = %id, "stop-limit triggered");
                        ctx.book.mark_triggered(id)?;
                    }
                    MatchResult::Fill {
                        price,
                        at_open,
                        limit,
                    } => {
                        if matches!(order.kind, OrderKind::StopLimit { .. }) && !order.triggered {
                            ctx.book.mark_triggered(id)?;
                        }
                        let size = budget.available(order.remaining());
                        if size.is_zero() {
                            continue;
                        }
                        let Some(price) =
                            self.config
                                .slippage
                                .apply(order.side, price, bar, at_open, limit)
                        else {
                            continue;
                        };
                        let commission = model.commission(size, price);
                        let delta = order.side.sign() * size;
                        let outcome = match ctx.ledger.apply_fill(
                            model, stream, delta, price, commission, ctx.now, ctx.tick, true,
                        ) {
                            Ok(outcome) => outcome,
                            Err(err) => {
                                warn!(order = %id, %err, "fill refused: insufficient cash");
                                ctx.book.margin_reject(id, ctx.now, err.to_string())?;
                                continue;
                            }
                        };
                        budget.consume(size);
                        let fill = Fill {
                            order_id: id,
                            stream,
                            timestamp: ctx.now,
                            tick: ctx.tick,
                            side: order.side,
                            size,
                            price,
                            commission,
                            realized_pnl: outcome.realized_pnl,
                        };
                        debug!(
                            order = %id,
                            side = ?order.side,
                            %size,
                            %price,
                            %commission,
                            "filled"
                        );
                        ctx.book.record_fill(fill.clone())?;
                        fills.push(fill);
                    }
                }
            }
        }
        Ok(fills)
    }
}
