//! SimLab Runner — run files, CSV feeds and reference strategies.
//!
//! This crate builds on `simlab-core` to provide:
//! - TOML run files converted into engine settings and commission profiles
//! - A lazily read CSV bar feed
//! - Reference strategies (SMA cross, buy-and-hold)
//! - Single and parallel batch runs with JSON report output

pub mod config;
pub mod feed;
pub mod runner;
pub mod strategies;

pub use config::{ConfigError, ProfileConfig, RunFileConfig, StrategyConfig, StreamConfig};
pub use feed::{CsvFeed, FeedError};
pub use runner::{run_config, run_file, run_files, write_output, RunError, RunOutput};
pub use strategies::{build_strategy, BuyAndHold, SmaCross};
