//! Runner — wires a run file into the engine and writes the report.

use crate::config::{ConfigError, RunFileConfig};
use crate::feed::{CsvFeed, FeedError};
use crate::strategies::build_strategy;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use simlab_core::clock::StreamOptions;
use simlab_core::runtime::{Engine, RunReport};
use simlab_core::EngineError;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Current schema version for written reports.
pub const SCHEMA_VERSION: u32 = 1;

/// Report file contents: the run report plus where it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutput {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub config_hash: String,
    pub report: RunReport,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

/// Run `config`, resolving stream paths against `base_dir`.
pub fn run_config(config: &RunFileConfig, base_dir: &Path) -> Result<RunOutput, RunError> {
    let engine_config = config.engine_config()?;
    let profiles = config.profile_book(engine_config.money);
    let mut engine = Engine::backtest(engine_config, profiles);
    for stream in &config.streams {
        let feed = CsvFeed::open(base_dir.join(&stream.path))?;
        let mut options = StreamOptions::new(stream.name.clone());
        options.required = stream.required;
        engine.add_stream(feed, options);
    }
    let mut strategy = build_strategy(&config.strategy);
    let report = engine.run(strategy.as_mut())?;
    Ok(RunOutput {
        schema_version: SCHEMA_VERSION,
        config_hash: config.config_hash(),
        report,
    })
}

/// Load the run file at `path` and run it.
pub fn run_file(path: &Path) -> Result<RunOutput, RunError> {
    let config = RunFileConfig::from_path(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    info!(file = %path.display(), streams = config.streams.len(), "loaded run file");
    run_config(&config, base_dir)
}

/// Run several files in parallel. Results keep the input order.
pub fn run_files(paths: &[PathBuf]) -> Vec<Result<RunOutput, RunError>> {
    paths.par_iter().map(|path| run_file(path)).collect()
}

/// Write `output` as pretty JSON.
pub fn write_output(output: &RunOutput, path: &Path) -> Result<(), RunError> {
    let json = serde_json::to_string_pretty(output)?;
    std::fs::write(path, json).map_err(|source| RunError::Write {
        path: path.to_path_buf(),
        source,
    })
}
