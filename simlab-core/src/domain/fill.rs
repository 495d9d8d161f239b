//! Fill — a confirmed (possibly partial) execution.

use super::ids::{OrderId, StreamId};
use super::order::OrderSide;
use super::{Price, Quantity, Timestamp};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub stream: StreamId,
    pub timestamp: Timestamp,
    /// Master tick index the fill was produced on.
    pub tick: u64,
    pub side: OrderSide,
    /// Unsigned executed size.
    pub size: Quantity,
    pub price: Price,
    pub commission: Decimal,
    /// P&L realized by the closing portion of this fill, before commission.
    pub realized_pnl: Decimal,
}

impl Fill {
    /// Size with the side's sign applied.
    pub fn signed_size(&self) -> Quantity {
        self.side.sign() * self.size
    }
}
