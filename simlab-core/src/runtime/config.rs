//! Engine configuration.

use crate::clock::{HaltPolicy, TieBreak};
use crate::commission::MoneyPolicy;
use crate::execution::ExecutionConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Backtest,
    Live,
}

/// How ticks are driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    /// Vectorized when eligible, incremental otherwise.
    #[default]
    Auto,
    Incremental,
    Vectorized,
}

/// How much per-stream history is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "bars")]
pub enum Retention {
    #[default]
    Full,
    /// At least this many bars, and never fewer than the declared lookback needs.
    Window(usize),
    /// Exactly what the declared lookback needs.
    Minimal,
}

impl Retention {
    /// Bars to keep per stream for a declared `lookback`; `None` keeps everything.
    pub fn capacity(&self, lookback: usize) -> Option<usize> {
        let needed = lookback + 1;
        match self {
            Retention::Full => None,
            Retention::Window(bars) => Some((*bars).max(needed)),
            Retention::Minimal => Some(needed),
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Retention::Full)
    }
}

/// Fund-share accounting switch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundConfig {
    /// Value of one share at the start of the run.
    pub start_value: Decimal,
}

impl Default for FundConfig {
    fn default() -> Self {
        Self {
            start_value: dec!(100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub initial_cash: Decimal,
    pub money: MoneyPolicy,
    pub mode: RunMode,
    pub schedule: Schedule,
    pub retention: Retention,
    pub tie_break: TieBreak,
    pub halt_policy: HaltPolicy,
    pub execution: ExecutionConfig,
    /// Longest a live run may go without a new bar; `None` waits forever.
    pub live_bar_timeout: Option<Duration>,
    /// How long each wait for live data blocks before the stop flag is
    /// checked again.
    pub poll_interval: Duration,
    pub fund: Option<FundConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_cash: dec!(10000),
            money: MoneyPolicy::default(),
            mode: RunMode::Backtest,
            schedule: Schedule::Auto,
            retention: Retention::Full,
            tie_break: TieBreak::Registration,
            halt_policy: HaltPolicy::Continue,
            execution: ExecutionConfig::default(),
            live_bar_timeout: None,
            poll_interval: Duration::from_millis(100),
            fund: None,
        }
    }
}

impl EngineConfig {
    pub fn new(initial_cash: Decimal) -> Self {
        Self {
            initial_cash,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.initial_cash < Decimal::ZERO {
            return Err(format!(
                "initial cash must be non-negative, got {}",
                self.initial_cash
            ));
        }
        if self.money.precision > 28 {
            return Err(format!(
                "precision {} exceeds the 28 decimal places available",
                self.money.precision
            ));
        }
        if let Retention::Window(0) = self.retention {
            return Err("retention window must be at least one bar".into());
        }
        if let Some(fund) = self.fund {
            if fund.start_value <= Decimal::ZERO {
                return Err("fund start value must be positive".into());
            }
        }
        if self.poll_interval.is_zero() {
            return Err("poll interval must be positive".into());
        }
        Ok(())
    }
}
