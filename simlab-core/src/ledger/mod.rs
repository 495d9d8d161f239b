//! Position ledger — cash, per-stream positions, fund shares and round trips.
//!
//! The ledger is owned by the run controller and lent by `&mut` to the
//! execution venue each tick. Positions change only through confirmed fills.

pub mod account;
pub mod fund;
pub mod position;
pub mod trades;

pub use account::{FillOutcome, Ledger};
pub use fund::FundAccount;
pub use position::Position;
pub use trades::TradeTracker;
