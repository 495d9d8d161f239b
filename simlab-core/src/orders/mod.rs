//! Order lifecycle state machine, shared by simulated and live execution.

pub mod book;

pub use book::OrderBook;
