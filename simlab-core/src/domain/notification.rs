use super::fill::Fill;
use super::ids::OrderId;
use super::order::OrderStatus;
use super::Timestamp;
use serde::{Deserialize, Serialize};

/// What happened to an order. One per lifecycle transition, plus venue errors
/// which leave the order in its last state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NotificationKind {
    Submitted,
    Accepted,
    Rejected { reason: String },
    MarginRejected { reason: String },
    PartiallyFilled { fill: Fill },
    Completed { fill: Fill },
    Canceled { reason: String },
    Expired,
    VenueError { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub order_id: OrderId,
    pub timestamp: Timestamp,
    /// Order status after the event.
    pub status: OrderStatus,
    pub kind: NotificationKind,
}

impl Notification {
    pub fn fill(&self) -> Option<&Fill> {
        match &self.kind {
            NotificationKind::PartiallyFilled { fill } | NotificationKind::Completed { fill } => {
                Some(fill)
            }
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal() && !matches!(self.kind, NotificationKind::VenueError { .. })
    }
}
