//! Clock synchronizer and the feed interface it pulls from.

pub mod feed;
pub mod synchronizer;

pub use feed::{ChannelFeed, DataFeed, FeedPoll, VecFeed};
pub use synchronizer::{
    ClockEvent, ClockSynchronizer, HaltPolicy, MasterTick, StreamBar, StreamOptions, TieBreak,
};
