//! Feed adapters: where bars come from.
//!
//! The core reads every stream through [`DataFeed`]. Finite feeds end with
//! `EndOfStream`; open-ended (live) feeds may answer `Pending` and block in
//! `wait_for_data` until something arrives.

use crate::domain::{Bar, Timestamp};
use crate::error::FeedFault;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum FeedPoll {
    Bar(Bar),
    /// Open-ended feed with nothing ready yet.
    Pending,
    EndOfStream,
}

pub trait DataFeed: Send {
    fn next_bar(&mut self) -> Result<FeedPoll, FeedFault>;

    /// Timestamp of the next bar without consuming it, if one is ready.
    fn peek_timestamp(&mut self) -> Option<Timestamp>;

    /// Live feeds never know their end in advance.
    fn is_open_ended(&self) -> bool {
        false
    }

    /// Block up to `timeout` for the next bar. Returns whether data (or the
    /// end of the stream) is now available.
    fn wait_for_data(&mut self, _timeout: Duration) -> bool {
        true
    }
}

/// In-memory finite feed.
#[derive(Debug, Clone, Default)]
pub struct VecFeed {
    bars: VecDeque<Bar>,
}

impl VecFeed {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self { bars: bars.into() }
    }
}

impl DataFeed for VecFeed {
    fn next_bar(&mut self) -> Result<FeedPoll, FeedFault> {
        Ok(match self.bars.pop_front() {
            Some(bar) => FeedPoll::Bar(bar),
            None => FeedPoll::EndOfStream,
        })
    }

    fn peek_timestamp(&mut self) -> Option<Timestamp> {
        self.bars.front().map(|b| b.timestamp)
    }
}

/// Open-ended feed fed by a producer thread over a crossbeam channel. The
/// stream ends when every sender is dropped.
#[derive(Debug)]
pub struct ChannelFeed {
    rx: Receiver<Bar>,
    buffered: Option<Bar>,
    disconnected: bool,
}

impl ChannelFeed {
    pub fn new(rx: Receiver<Bar>) -> Self {
        Self {
            rx,
            buffered: None,
            disconnected: false,
        }
    }

    /// Unbounded channel with the feed on the receiving end.
    pub fn channel() -> (Sender<Bar>, Self) {
        let (tx, rx) = channel::unbounded();
        (tx, Self::new(rx))
    }

    fn fill_buffer(&mut self) {
        if self.buffered.is_some() || self.disconnected {
            return;
        }
        match self.rx.try_recv() {
            Ok(bar) => self.buffered = Some(bar),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => self.disconnected = true,
        }
    }
}

impl DataFeed for ChannelFeed {
    fn next_bar(&mut self) -> Result<FeedPoll, FeedFault> {
        self.fill_buffer();
        Ok(match self.buffered.take() {
            Some(bar) => FeedPoll::Bar(bar),
            None if self.disconnected => FeedPoll::EndOfStream,
            None => FeedPoll::Pending,
        })
    }

    fn peek_timestamp(&mut self) -> Option<Timestamp> {
        self.fill_buffer();
        self.buffered.as_ref().map(|b| b.timestamp)
    }

    fn is_open_ended(&self) -> bool {
        true
    }

    fn wait_for_data(&mut self, timeout: Duration) -> bool {
        if self.buffered.is_some() || self.disconnected {
            return true;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(bar) => {
                self.buffered = Some(bar);
                true
            }
            Err(RecvTimeoutError::Timeout) => false,
            Err(RecvTimeoutError::Disconnected) => {
                self.disconnected = true;
                true
            }
        }
    }
}
