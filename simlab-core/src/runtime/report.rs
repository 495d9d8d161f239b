//! Run report and fingerprint.

use super::config::Schedule;
use crate::domain::{Fill, Notification, StreamId, Timestamp, TradeRecord};
use crate::ledger::Position;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account snapshot at the end of one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: Timestamp,
    pub cash: Decimal,
    pub value: Decimal,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub fund_value: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaltedStream {
    pub stream: StreamId,
    pub name: String,
    pub reason: String,
}

/// Open position left at the end of the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamPosition {
    pub stream: StreamId,
    pub position: Position,
}

/// Everything a run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    /// The schedule actually used (never `Auto`).
    pub schedule: Schedule,
    pub streams: Vec<String>,
    pub ticks: u64,
    pub fills: Vec<Fill>,
    pub notifications: Vec<Notification>,
    pub equity: Vec<EquityPoint>,
    pub trades: Vec<TradeRecord>,
    pub positions: Vec<StreamPosition>,
    pub initial_cash: Decimal,
    pub final_cash: Decimal,
    pub final_value: Decimal,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub final_fund_value: Option<Decimal>,
    pub total_commission: Decimal,
    pub total_interest: Decimal,
    pub halted_streams: Vec<HaltedStream>,
    /// Ended by a stop request rather than end of data.
    pub stopped_early: bool,
    /// False when retention dropped history; the per-bar series are then
    /// incomplete and not fit for plotting.
    pub full_history: bool,
    /// Hash of the fill sequence.
    pub fingerprint: String,
}

impl RunReport {
    pub fn net_pnl(&self) -> Decimal {
        self.final_value - self.initial_cash
    }

    /// Final position on `stream`; flat if none was left open.
    pub fn position(&self, stream: StreamId) -> Position {
        self.positions
            .iter()
            .find(|p| p.stream == stream)
            .map(|p| p.position.clone())
            .unwrap_or_default()
    }

    pub fn winners(&self) -> usize {
        self.trades.iter().filter(|t| t.is_winner()).count()
    }
}

/// Deterministic hash of a fill sequence: BLAKE3 over its canonical JSON.
///
/// Identical inputs and configuration give identical fingerprints, which is
/// how vectorized and incremental runs are checked against each other.
pub fn fingerprint_fills(fills: &[Fill]) -> String {
    let mut hasher = blake3::Hasher::new();
    for fill in fills {
        // Fill holds only plain data; serialization cannot fail
        if let Ok(json) = serde_json::to_vec(fill) {
            hasher.update(&json);
        }
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}
