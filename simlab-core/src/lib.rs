//! SimLab Core — event-driven backtest and live-trading engine.
//!
//! - Domain types (bars, orders, fills, notifications, round trips)
//! - Clock synchronizer aligning any number of bar streams
//! - Commission and margin model with banker's rounding
//! - Position ledger with fund-share accounting
//! - Order lifecycle state machine with brackets and OCO groups
//! - Bar-level matching simulator and a live venue bridge
//! - Run controller with vectorized and incremental schedules

pub mod clock;
pub mod commission;
pub mod domain;
pub mod error;
pub mod execution;
pub mod ledger;
pub mod orders;
pub mod runtime;

pub use error::EngineError;
pub use runtime::{Engine, EngineConfig, RunReport, Strategy, StrategyContext};
