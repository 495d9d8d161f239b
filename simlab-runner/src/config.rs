//! Run file: the TOML description of one run.
//!
//! ```toml
//! [run]
//! initial_cash = 10000
//! schedule = "auto"
//!
//! [execution]
//! filler = { type = "bar_percent", value = 25 }
//!
//! [[streams]]
//! name = "ES"
//! path = "es.csv"
//! profile = "futures"
//!
//! [profiles.futures]
//! commission = "fixed_per_unit"
//! rate = 2
//! margin = 50
//! settlement = "mark_to_market"
//!
//! [strategy]
//! type = "sma_cross"
//! fast = 10
//! slow = 30
//! size = 1
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use simlab_core::clock::{HaltPolicy, TieBreak};
use simlab_core::commission::{
    CommissionKind, CommissionModel, CommissionProfile, InterestTerms, MarginRequirement,
    MoneyPolicy, ProfileBook, Settlement,
};
use simlab_core::domain::StreamId;
use simlab_core::execution::{ExecutionConfig, FillerPolicy, SlippageConfig};
use simlab_core::runtime::{EngineConfig, FundConfig, Retention, RunMode, Schedule};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Profile used by streams that do not name one.
pub const DEFAULT_PROFILE: &str = "default";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("stream '{stream}' uses unknown profile '{profile}'")]
    UnknownProfile { stream: String, profile: String },

    #[error("stream name '{0}' is used twice")]
    DuplicateStream(String),

    #[error("profile '{name}': {reason}")]
    Profile { name: String, reason: String },

    #[error("{0}")]
    Invalid(String),
}

/// Complete run file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFileConfig {
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub execution: ExecutionSection,
    pub streams: Vec<StreamConfig>,
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
    pub strategy: StrategyConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionSetting {
    #[default]
    Full,
    Window,
    Minimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSection {
    pub mode: RunMode,
    pub schedule: Schedule,
    pub retention: RetentionSetting,
    /// Bars kept per stream with `retention = "window"`.
    pub retention_bars: usize,
    pub tie_break: TieBreak,
    pub halt_policy: HaltPolicy,
    pub initial_cash: Decimal,
    pub same_bar_execution: bool,
    pub check_submit: bool,
    pub precision: u32,
    pub live_bar_timeout_ms: Option<u64>,
    pub poll_interval_ms: u64,
    pub fund_mode: bool,
    pub fund_start_value: Decimal,
}

impl Default for RunSection {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            mode: engine.mode,
            schedule: engine.schedule,
            retention: RetentionSetting::Full,
            retention_bars: 0,
            tie_break: engine.tie_break,
            halt_policy: engine.halt_policy,
            initial_cash: engine.initial_cash,
            same_bar_execution: engine.execution.same_bar,
            check_submit: engine.execution.check_submit,
            precision: engine.money.precision,
            live_bar_timeout_ms: None,
            poll_interval_ms: engine.poll_interval.as_millis() as u64,
            fund_mode: false,
            fund_start_value: FundConfig::default().start_value,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    pub slippage: SlippageConfig,
    pub filler: FillerPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    pub name: String,
    /// CSV file, relative to the run file.
    pub path: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub profile: Option<String>,
}

/// Commission and margin terms of one instrument class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub commission: CommissionKind,
    pub rate: Decimal,
    /// Flat margin per unit; makes the instrument margin-based.
    pub margin: Option<Decimal>,
    /// Margin as a fraction of notional; ignored when `margin` is set.
    pub margin_percent: Option<Decimal>,
    pub leverage: Decimal,
    pub multiplier: Decimal,
    pub settlement: Settlement,
    pub interest_rate: Decimal,
    pub interest_on_longs: bool,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        let profile = CommissionProfile::default();
        Self {
            commission: profile.commission,
            rate: profile.rate,
            margin: None,
            margin_percent: None,
            leverage: profile.leverage,
            multiplier: profile.multiplier,
            settlement: profile.settlement,
            interest_rate: profile.interest.annual_rate,
            interest_on_longs: profile.interest.charge_longs,
        }
    }
}

impl ProfileConfig {
    pub fn to_profile(&self) -> CommissionProfile {
        let margin = match (self.margin, self.margin_percent) {
            (Some(per_unit), _) => MarginRequirement::FixedPerUnit(per_unit),
            (None, Some(pct)) => MarginRequirement::PercentOfPrice(pct),
            (None, None) => MarginRequirement::Unset,
        };
        CommissionProfile {
            commission: self.commission,
            rate: self.rate,
            margin,
            leverage: self.leverage,
            multiplier: self.multiplier,
            settlement: self.settlement,
            interest: InterestTerms {
                annual_rate: self.interest_rate,
                charge_longs: self.interest_on_longs,
            },
        }
    }
}

/// Reference strategy selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Long when the fast SMA is above the slow one, flat otherwise.
    SmaCross {
        fast: usize,
        slow: usize,
        size: Decimal,
    },
    /// Buy once on the first bar of every stream and hold.
    BuyAndHold { size: Decimal },
}

impl RunFileConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.streams.is_empty() {
            return Err(ConfigError::Invalid("at least one [[streams]] entry is required".into()));
        }
        let mut names = BTreeSet::new();
        for stream in &self.streams {
            if !names.insert(stream.name.as_str()) {
                return Err(ConfigError::DuplicateStream(stream.name.clone()));
            }
            if let Some(profile) = &stream.profile {
                if profile != DEFAULT_PROFILE && !self.profiles.contains_key(profile) {
                    return Err(ConfigError::UnknownProfile {
                        stream: stream.name.clone(),
                        profile: profile.clone(),
                    });
                }
            }
        }
        for (name, profile) in &self.profiles {
            profile
                .to_profile()
                .validate()
                .map_err(|reason| ConfigError::Profile {
                    name: name.clone(),
                    reason,
                })?;
        }
        if let StrategyConfig::SmaCross { fast, slow, .. } = self.strategy {
            if fast == 0 || fast >= slow {
                return Err(ConfigError::Invalid(format!(
                    "sma_cross needs 0 < fast < slow, got fast={fast} slow={slow}"
                )));
            }
        }
        self.engine_config().map(|_| ())
    }

    /// Core engine settings.
    pub fn engine_config(&self) -> Result<EngineConfig, ConfigError> {
        let run = &self.run;
        let retention = match run.retention {
            RetentionSetting::Full => Retention::Full,
            RetentionSetting::Minimal => Retention::Minimal,
            RetentionSetting::Window => Retention::Window(run.retention_bars),
        };
        let config = EngineConfig {
            initial_cash: run.initial_cash,
            money: MoneyPolicy::new(run.precision),
            mode: run.mode,
            schedule: run.schedule,
            retention,
            tie_break: run.tie_break,
            halt_policy: run.halt_policy,
            execution: ExecutionConfig {
                slippage: self.execution.slippage,
                filler: self.execution.filler,
                same_bar: run.same_bar_execution,
                check_submit: run.check_submit,
            },
            live_bar_timeout: run.live_bar_timeout_ms.map(Duration::from_millis),
            poll_interval: Duration::from_millis(run.poll_interval_ms),
            fund: run.fund_mode.then_some(FundConfig {
                start_value: run.fund_start_value,
            }),
        };
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    /// Commission models per stream, streams numbered in file order.
    pub fn profile_book(&self, money: MoneyPolicy) -> ProfileBook {
        let model = |profile: &ProfileConfig| CommissionModel::new(profile.to_profile(), money);
        let default = self
            .profiles
            .get(DEFAULT_PROFILE)
            .map(model)
            .unwrap_or_else(|| CommissionModel::new(CommissionProfile::default(), money));
        let mut book = ProfileBook::new(default);
        for (index, stream) in self.streams.iter().enumerate() {
            if let Some(profile) = stream.profile.as_ref().and_then(|p| self.profiles.get(p)) {
                book.insert(StreamId(index), model(profile));
            }
        }
        book
    }

    /// Content hash of the configuration, for naming and caching outputs.
    pub fn config_hash(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => blake3::hash(json.as_bytes()).to_hex().to_string(),
            Err(_) => String::new(),
        }
    }
}
