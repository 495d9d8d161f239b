//! SimLab CLI — run files from the command line.
//!
//! Commands:
//! - `run` — execute one run file and print a summary
//! - `batch` — execute several run files in parallel
//! - `check-config` — parse and validate a run file without running it

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use simlab_runner::{run_file, run_files, write_output, RunFileConfig, RunOutput};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "simlab", version, about = "SimLab CLI — event-driven backtest engine")]
struct Cli {
    /// Log filter used when RUST_LOG is not set (e.g. info, debug, simlab_core=trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a run file and print a summary.
    Run {
        /// Path to a TOML run file.
        #[arg(long)]
        config: PathBuf,

        /// Write the full JSON report here.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Execute several run files in parallel.
    Batch {
        /// Run files to execute.
        #[arg(required = true)]
        configs: Vec<PathBuf>,

        /// Directory for one JSON report per run file.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Parse and validate a run file without running it.
    CheckConfig {
        /// Path to a TOML run file.
        #[arg(long)]
        config: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Run { config, output } => run_cmd(&config, output.as_deref()),
        Commands::Batch {
            configs,
            output_dir,
        } => run_batch(&configs, output_dir.as_deref()),
        Commands::CheckConfig { config } => run_check_config(&config),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init()?;
    Ok(())
}

fn run_cmd(config: &Path, output: Option<&Path>) -> Result<()> {
    let result = run_file(config).with_context(|| format!("run {} failed", config.display()))?;
    print_summary(config, &result);
    if let Some(path) = output {
        write_output(&result, path)?;
        println!("Report saved to: {}", path.display());
    }
    Ok(())
}

fn run_batch(configs: &[PathBuf], output_dir: Option<&Path>) -> Result<()> {
    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("cannot create {}", dir.display()))?;
    }

    let results = run_files(configs);
    let mut failures = 0usize;
    for (path, result) in configs.iter().zip(results) {
        match result {
            Ok(output) => {
                print_summary(path, &output);
                if let Some(dir) = output_dir {
                    let target = dir.join(report_name(path));
                    write_output(&output, &target)?;
                    info!(report = %target.display(), "report written");
                }
            }
            Err(err) => {
                failures += 1;
                error!(file = %path.display(), %err, "run failed");
                eprintln!("Error for {}: {err}", path.display());
            }
        }
    }

    if failures > 0 {
        bail!("{failures} of {} runs failed", configs.len());
    }
    Ok(())
}

fn run_check_config(config: &Path) -> Result<()> {
    let parsed = RunFileConfig::from_path(config)?;
    let engine = parsed.engine_config()?;
    println!("{}: ok", config.display());
    println!("  mode:      {:?}", engine.mode);
    println!("  schedule:  {:?}", engine.schedule);
    println!("  retention: {:?}", engine.retention);
    println!("  streams:   {}", parsed.streams.len());
    println!("  hash:      {}", parsed.config_hash());
    Ok(())
}

/// `runs/momentum.toml` becomes `momentum.json`.
fn report_name(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".into());
    PathBuf::from(format!("{stem}.json"))
}

fn print_summary(path: &Path, output: &RunOutput) {
    let report = &output.report;
    println!();
    println!("=== {} ===", path.display());
    println!("Schedule:      {:?}", report.schedule);
    println!("Streams:       {}", report.streams.join(", "));
    println!("Ticks:         {}", report.ticks);
    println!("Fills:         {}", report.fills.len());
    println!("Trades:        {} ({} winners)", report.trades.len(), report.winners());
    println!("Initial cash:  {}", report.initial_cash);
    println!("Final cash:    {}", report.final_cash);
    println!("Final value:   {}", report.final_value);
    println!("Net PnL:       {}", report.net_pnl());
    println!("Commission:    {}", report.total_commission);
    println!("Interest:      {}", report.total_interest);
    if let Some(fund) = report.final_fund_value {
        println!("Fund value:    {fund}");
    }
    for halted in &report.halted_streams {
        println!("Halted:        {} ({})", halted.name, halted.reason);
    }
    if report.stopped_early {
        println!("Stopped early");
    }
    println!("Fingerprint:   {}", report.fingerprint);
    println!("Config hash:   {}", output.config_hash);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn report_name_uses_file_stem() {
        assert_eq!(
            report_name(Path::new("runs/momentum.toml")),
            PathBuf::from("momentum.json")
        );
    }

    #[test]
    fn run_parses_config_and_output() {
        let cli = Cli::try_parse_from([
            "simlab", "run", "--config", "a.toml", "--output", "out.json",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { config, output } => {
                assert_eq!(config, PathBuf::from("a.toml"));
                assert_eq!(output, Some(PathBuf::from("out.json")));
            }
            _ => panic!("expected run"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn batch_requires_at_least_one_file() {
        assert!(Cli::try_parse_from(["simlab", "batch"]).is_err());
    }
}
