//! Error taxonomy shared across the engine.
//!
//! Per-order errors (`ValidationError`, `MarginError`) never escape the tick:
//! they turn into order transitions. `DataError` halts a stream and
//! `VenueError` is retried; either may escalate into a fatal `EngineError`.

use crate::domain::{BarError, OrderId, StreamId, Timestamp};
use rust_decimal::Decimal;
use thiserror::Error;

/// A stream delivered something unusable. The stream is halted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("{stream} ({name}): bar at {got} is earlier than previous bar at {previous}")]
    NonMonotonic {
        stream: StreamId,
        name: String,
        previous: Timestamp,
        got: Timestamp,
    },

    #[error("{stream} ({name}): malformed bar at {timestamp}: {source}")]
    Malformed {
        stream: StreamId,
        name: String,
        timestamp: Timestamp,
        #[source]
        source: BarError,
    },

    #[error("{stream} ({name}): feed failure: {message}")]
    Feed {
        stream: StreamId,
        name: String,
        message: String,
    },
}

impl DataError {
    pub fn stream(&self) -> StreamId {
        match self {
            DataError::NonMonotonic { stream, .. }
            | DataError::Malformed { stream, .. }
            | DataError::Feed { stream, .. } => *stream,
        }
    }
}

/// A feed could not produce its next bar (I/O, parse failure, ...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct FeedFault(pub String);

/// Order is structurally invalid. The order goes straight to Rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("order size must be positive, got {0}")]
    NonPositiveSize(Decimal),

    #[error("{field} price must be positive, got {value}")]
    NonPositivePrice { field: &'static str, value: Decimal },

    #[error("unknown stream {0}")]
    UnknownStream(StreamId),

    #[error("trail amount must be positive, got {0}")]
    NonPositiveTrail(Decimal),

    #[error("good-till-date {until} is already in the past at {now}")]
    ExpiredOnArrival { until: Timestamp, now: Timestamp },

    #[error("bracket stop {stop} and target {target} are on the wrong sides of each other")]
    BracketOrdering { stop: Decimal, target: Decimal },
}

/// Not enough cash to carry an order or fill.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("insufficient cash: required {required}, available {available}")]
pub struct MarginError {
    pub required: Decimal,
    pub available: Decimal,
}

/// Live venue failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VenueError {
    /// Worth retrying (timeouts, throttling).
    #[error("transient venue error: {0}")]
    Transient(String),

    #[error("fatal venue error: {0}")]
    Fatal(String),
}

impl VenueError {
    pub fn is_transient(&self) -> bool {
        matches!(self, VenueError::Transient(_))
    }
}

/// Order book misuse. These indicate engine bugs, not user mistakes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderBookError {
    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error("order {id}: illegal transition from {from} to {to}")]
    InvalidTransition {
        id: OrderId,
        from: crate::domain::OrderStatus,
        to: crate::domain::OrderStatus,
    },

    #[error("order {id}: fill of {fill} exceeds remaining {remaining}")]
    OverFill {
        id: OrderId,
        fill: Decimal,
        remaining: Decimal,
    },

    #[error("order {id}: fill size must be positive, got {fill}")]
    NonPositiveFill { id: OrderId, fill: Decimal },
}

/// Fatal run errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("venue error: {0}")]
    Venue(#[from] VenueError),

    #[error("order book error: {0}")]
    OrderBook(#[from] OrderBookError),

    #[error("ledger error: {0}")]
    Ledger(#[from] MarginError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("timed out after {0:?} waiting for live data")]
    Timeout(std::time::Duration),
}
