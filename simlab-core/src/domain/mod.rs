//! Domain types for SimLab

pub mod bar;
pub mod fill;
pub mod ids;
pub mod notification;
pub mod order;
pub mod trade;

pub use bar::{Bar, BarError};
pub use fill::Fill;
pub use ids::{IdGen, OcoGroupId, OrderId, StreamId};
pub use notification::{Notification, NotificationKind};
pub use order::{
    BracketIds, BracketRequest, Order, OrderKind, OrderRequest, OrderSide, OrderStatus,
    TimeInForce, TrailAmount,
};
pub use trade::{TradeDirection, TradeRecord};

/// Bar and event timestamps. Feeds are expected to deliver exchange-local time.
pub type Timestamp = chrono::NaiveDateTime;

/// Prices are fixed-point decimals so repeated adjustments never drift.
pub type Price = rust_decimal::Decimal;

/// Order and position sizes.
pub type Quantity = rust_decimal::Decimal;
