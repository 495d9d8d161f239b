//! Runtime: engine configuration, strategy surface, run controller and
//! report.

pub mod config;
pub mod engine;
pub mod indicator;
pub mod report;
pub mod series;
pub mod stop;
pub mod strategy;

pub use config::{EngineConfig, FundConfig, Retention, RunMode, Schedule};
pub use engine::Engine;
pub use indicator::{compute_warmup, precompute_indicators, Indicator, Sma};
pub use report::{fingerprint_fills, EquityPoint, HaltedStream, RunReport, StreamPosition};
pub use series::{Series, StreamHistory};
pub use stop::StopHandle;
pub use strategy::{Strategy, StrategyContext};
