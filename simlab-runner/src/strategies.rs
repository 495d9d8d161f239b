//! Reference strategies selectable from a run file.

use crate::config::StrategyConfig;
use rust_decimal::Decimal;
use simlab_core::domain::{OrderRequest, OrderSide, StreamId};
use simlab_core::runtime::{Indicator, Sma, Strategy, StrategyContext};
use tracing::debug;

pub fn build_strategy(config: &StrategyConfig) -> Box<dyn Strategy> {
    match config {
        StrategyConfig::SmaCross { fast, slow, size } => {
            Box::new(SmaCross::new(*fast, *slow, *size))
        }
        StrategyConfig::BuyAndHold { size } => Box::new(BuyAndHold::new(*size)),
    }
}

/// Long `size` units while the fast SMA is above the slow SMA.
///
/// Acts on every stream independently and only when the stream has no open
/// orders, so signals never stack while an order is in flight.
#[derive(Debug, Clone)]
pub struct SmaCross {
    fast: Sma,
    slow: Sma,
    size: Decimal,
}

impl SmaCross {
    pub fn new(fast: usize, slow: usize, size: Decimal) -> Self {
        Self {
            fast: Sma::new(fast),
            slow: Sma::new(slow),
            size,
        }
    }
}

impl Strategy for SmaCross {
    fn indicators(&self) -> Vec<Box<dyn Indicator>> {
        vec![Box::new(self.fast.clone()), Box::new(self.slow.clone())]
    }

    fn on_tick(&mut self, ctx: &mut StrategyContext<'_>) {
        for index in 0..ctx.stream_count() {
            let stream = StreamId(index);
            if !ctx.advanced(stream) || !ctx.open_orders(stream).is_empty() {
                continue;
            }
            let (Some(fast), Some(slow)) = (
                ctx.indicator(stream, self.fast.name()),
                ctx.indicator(stream, self.slow.name()),
            ) else {
                continue;
            };
            let held = ctx.position(stream).size;
            if fast > slow && held.is_zero() {
                debug!(%stream, fast, slow, "cross up");
                ctx.submit_order(OrderRequest::market(stream, OrderSide::Buy, self.size));
            } else if fast < slow && held > Decimal::ZERO {
                debug!(%stream, fast, slow, "cross down");
                ctx.submit_order(OrderRequest::market(stream, OrderSide::Sell, held));
            }
        }
    }
}

/// Buy `size` units of every stream on its first bar.
#[derive(Debug, Clone)]
pub struct BuyAndHold {
    size: Decimal,
    bought: Vec<bool>,
}

impl BuyAndHold {
    pub fn new(size: Decimal) -> Self {
        Self {
            size,
            bought: Vec::new(),
        }
    }
}

impl Strategy for BuyAndHold {
    fn on_start(&mut self, streams: &[String]) {
        self.bought = vec![false; streams.len()];
    }

    fn on_tick(&mut self, ctx: &mut StrategyContext<'_>) {
        for (index, bought) in self.bought.iter_mut().enumerate() {
            let stream = StreamId(index);
            if !*bought && ctx.advanced(stream) {
                ctx.submit_order(OrderRequest::market(stream, OrderSide::Buy, self.size));
                *bought = true;
            }
        }
    }
}
