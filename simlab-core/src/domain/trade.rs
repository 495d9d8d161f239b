//! TradeRecord — a completed round trip on one stream.

use super::ids::StreamId;
use super::{Price, Quantity, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    Long,
    Short,
}

/// Opened when a position leaves flat, closed when it returns to flat or
/// flips. Commission covers every fill that touched the trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub stream: StreamId,
    pub direction: TradeDirection,
    pub opened_at: Timestamp,
    pub closed_at: Timestamp,
    /// Largest absolute size held during the trade.
    pub max_size: Quantity,
    pub entry_price: Price,
    pub exit_price: Price,
    pub gross_pnl: Decimal,
    pub commission: Decimal,
    pub net_pnl: Decimal,
    pub bars_held: u64,
}

impl TradeRecord {
    pub fn is_winner(&self) -> bool {
        self.net_pnl > Decimal::ZERO
    }
}
