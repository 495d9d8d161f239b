use serde::{Deserialize, Serialize};
use std::fmt;

/// Order identifier. Assigned in strictly increasing order on submission, so
/// ordering by id is ordering by submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Instrument stream identifier: the registration index of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(pub usize);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream{}", self.0)
    }
}

/// One-cancels-other group identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OcoGroupId(pub u64);

/// Monotonic id source owned by the order book.
#[derive(Debug, Clone, Default)]
pub struct IdGen {
    last_order: u64,
    last_oco: u64,
}

impl IdGen {
    pub fn next_order_id(&mut self) -> OrderId {
        self.last_order += 1;
        OrderId(self.last_order)
    }

    pub fn next_oco_group_id(&mut self) -> OcoGroupId {
        self.last_oco += 1;
        OcoGroupId(self.last_oco)
    }
}
