//! Execution — turns working orders and the current bars into fills.
//!
//! Venues are stateless apart from configuration (and, for live trading, the
//! adapter). They borrow the order book and ledger for one phase at a time
//! through [`ExecutionContext`]. Three phase methods map to the tick:
//! - `process_cancellations`: strategy cancel requests
//! - `process_submissions`: validation, pre-trade check, acceptance
//! - `execute_tick`: expirations and matching (or venue fill reconciliation)

pub mod filler;
pub mod live;
pub mod matching;
pub mod pretrade;
pub mod simulated;
pub mod slippage;
pub mod validate;

pub use filler::{BarBudget, FillerPolicy};
pub use live::{LiveVenue, RetryPolicy, VenueAck, VenueAdapter, VenueBalances, VenueFill};
pub use matching::MatchResult;
pub use simulated::SimulatedVenue;
pub use slippage::{SlippageConfig, SlippageKind};

use crate::clock::StreamBar;
use crate::commission::ProfileBook;
use crate::domain::{Bar, Fill, Price, StreamId, Timestamp};
use crate::error::EngineError;
use crate::ledger::Ledger;
use crate::orders::OrderBook;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub slippage: SlippageConfig,
    pub filler: FillerPolicy,
    /// Let orders fill on the bar they were accepted on. Off by default:
    /// orders see the next bar.
    pub same_bar: bool,
    /// Run the pre-trade cash check before accepting orders.
    pub check_submit: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            slippage: SlippageConfig::default(),
            filler: FillerPolicy::Unlimited,
            same_bar: false,
            check_submit: true,
        }
    }
}

/// Read-only view of the market at the current tick.
#[derive(Debug, Clone, Copy)]
pub struct MarketView<'a> {
    /// Bars delivered on this tick, in processing order.
    pub bars: &'a [StreamBar],
    /// Latest bar per stream, indexed by stream id.
    pub latest: &'a [Option<Bar>],
}

impl<'a> MarketView<'a> {
    pub fn stream_count(&self) -> usize {
        self.latest.len()
    }

    pub fn last_close(&self, stream: StreamId) -> Option<Price> {
        self.latest
            .get(stream.0)
            .and_then(|bar| bar.as_ref())
            .map(|bar| bar.close)
    }
}

/// Everything a venue may touch during one phase.
pub struct ExecutionContext<'a> {
    pub book: &'a mut OrderBook,
    pub ledger: &'a mut Ledger,
    pub profiles: &'a ProfileBook,
    pub market: MarketView<'a>,
    pub now: Timestamp,
    pub tick: u64,
}

/// Where fills come from: the bar-level simulator or a live venue.
pub trait ExecutionVenue {
    fn process_cancellations(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError>;

    fn process_submissions(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError>;

    fn execute_tick(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<Vec<Fill>, EngineError>;

    /// Called once after the last tick.
    fn finish(&mut self, _ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
        Ok(())
    }
}

impl<V: ExecutionVenue + ?Sized> ExecutionVenue for Box<V> {
    fn process_cancellations(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
        (**self).process_cancellations(ctx)
    }

    fn process_submissions(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
        (**self).process_submissions(ctx)
    }

    fn execute_tick(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<Vec<Fill>, EngineError> {
        (**self).execute_tick(ctx)
    }

    fn finish(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), EngineError> {
        (**self).finish(ctx)
    }
}
