//! Clock synchronizer — aligns any number of streams onto one master timeline.
//!
//! Every stream keeps a one-bar lookahead slot. The master clock advances to
//! the earliest timestamp among the slots; streams whose next bar carries that
//! timestamp are delivered, the rest stay stale (or receive a synthetic
//! forward-filled bar when required at every tick). A stream that delivers a
//! malformed or out-of-order bar is halted.

use super::feed::{DataFeed, FeedPoll};
use crate::domain::{Bar, StreamId, Timestamp};
use crate::error::DataError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOptions {
    pub name: String,
    /// Deliver a bar at every master tick, forward-filling when the stream
    /// has nothing at that timestamp. A data error on a required stream is
    /// fatal.
    pub required: bool,
    /// Stream replays partially built bars (repeated timestamps update the
    /// bar in progress).
    pub replay: bool,
}

impl StreamOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            replay: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn replay(mut self) -> Self {
        self.replay = true;
        self
    }
}

/// Processing order of streams delivered at the same timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    Registration,
    /// Lexicographic by stream name, registration order among equal names.
    Name,
}

/// What a data error on a non-required stream does to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltPolicy {
    /// Halt the stream, keep running.
    #[default]
    Continue,
    Abort,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamBar {
    pub stream: StreamId,
    pub bar: Bar,
}

/// One synchronized advance of the master clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterTick {
    pub timestamp: Timestamp,
    /// Streams that advanced (fresh or forward-filled), in processing order.
    pub bars: Vec<StreamBar>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClockEvent {
    Tick(MasterTick),
    /// An open-ended stream has nothing ready; try again later.
    Pending,
    EndOfData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Active,
    Exhausted,
    Halted,
}

struct StreamSlot {
    feed: Box<dyn DataFeed>,
    options: StreamOptions,
    next: Option<Bar>,
    last: Option<Bar>,
    state: SlotState,
}

pub struct ClockSynchronizer {
    streams: Vec<StreamSlot>,
    order: Vec<usize>,
    tie_break: TieBreak,
    halt_policy: HaltPolicy,
    halted: Vec<(StreamId, DataError)>,
}

impl ClockSynchronizer {
    pub fn new(tie_break: TieBreak, halt_policy: HaltPolicy) -> Self {
        Self {
            streams: Vec::new(),
            order: Vec::new(),
            tie_break,
            halt_policy,
            halted: Vec::new(),
        }
    }

    /// Register a stream. Ids are assigned in registration order.
    pub fn add_stream(&mut self, feed: Box<dyn DataFeed>, options: StreamOptions) -> StreamId {
        let id = StreamId(self.streams.len());
        self.streams.push(StreamSlot {
            feed,
            options,
            next: None,
            last: None,
            state: SlotState::Active,
        });
        self.rebuild_order();
        id
    }

    fn rebuild_order(&mut self) {
        let mut order: Vec<usize> = (0..self.streams.len()).collect();
        if self.tie_break == TieBreak::Name {
            order.sort_by(|a, b| {
                self.streams[*a]
                    .options
                    .name
                    .cmp(&self.streams[*b].options.name)
                    .then(a.cmp(b))
            });
        }
        self.order = order;
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    pub fn stream_name(&self, stream: StreamId) -> Option<&str> {
        self.streams.get(stream.0).map(|s| s.options.name.as_str())
    }

    pub fn stream_names(&self) -> Vec<String> {
        self.streams.iter().map(|s| s.options.name.clone()).collect()
    }

    pub fn is_open_ended(&self) -> bool {
        self.streams.iter().any(|s| s.feed.is_open_ended())
    }

    pub fn any_replay(&self) -> bool {
        self.streams.iter().any(|s| s.options.replay)
    }

    /// Streams halted by data errors so far.
    pub fn halted(&self) -> &[(StreamId, DataError)] {
        &self.halted
    }

    /// Latest delivered bar per stream, indexed by stream id.
    pub fn latest(&self) -> Vec<Option<Bar>> {
        self.streams.iter().map(|s| s.last.clone()).collect()
    }

    /// Block up to `timeout` on every pending open-ended stream. Returns
    /// whether any of them has data now.
    pub fn wait_for_data(&mut self, timeout: Duration) -> bool {
        let mut ready = false;
        for slot in &mut self.streams {
            if slot.state == SlotState::Active && slot.next.is_none() {
                ready |= slot.feed.wait_for_data(timeout);
            }
        }
        ready
    }

    pub fn advance(&mut self) -> Result<ClockEvent, DataError> {
        let mut pending = false;
        for index in 0..self.streams.len() {
            if !self.fill_slot(index)? {
                pending = true;
            }
        }
        if pending {
            return Ok(ClockEvent::Pending);
        }

        let Some(timestamp) = self
            .streams
            .iter()
            .filter_map(|s| s.next.as_ref().map(|b| b.timestamp))
            .min()
        else {
            return Ok(ClockEvent::EndOfData);
        };

        let mut bars = Vec::new();
        for &index in &self.order {
            let slot = &mut self.streams[index];
            let stream = StreamId(index);
            if slot.next.as_ref().is_some_and(|b| b.timestamp == timestamp) {
                if let Some(bar) = slot.next.take() {
                    slot.last = Some(bar.clone());
                    bars.push(StreamBar { stream, bar });
                }
            } else if slot.options.required && slot.state != SlotState::Halted {
                if let Some(last) = &slot.last {
                    let bar = Bar::forward_fill(last, timestamp);
                    slot.last = Some(bar.clone());
                    bars.push(StreamBar { stream, bar });
                }
            }
        }
        Ok(ClockEvent::Tick(MasterTick { timestamp, bars }))
    }

    /// Make sure the slot holds its next bar. Returns `false` when an
    /// open-ended stream has nothing ready.
    fn fill_slot(&mut self, index: usize) -> Result<bool, DataError> {
        let stream = StreamId(index);
        let slot = &mut self.streams[index];
        if slot.state != SlotState::Active || slot.next.is_some() {
            return Ok(true);
        }
        let polled = slot.feed.next_bar();
        let name = slot.options.name.clone();
        let error = match polled {
            Ok(FeedPoll::Pending) => return Ok(false),
            Ok(FeedPoll::EndOfStream) => {
                debug!(%stream, %name, "stream exhausted");
                slot.state = SlotState::Exhausted;
                return Ok(true);
            }
            Ok(FeedPoll::Bar(bar)) => {
                let previous = slot.last.as_ref().map(|b| b.timestamp);
                if let Err(source) = bar.validate() {
                    DataError::Malformed {
                        stream,
                        name,
                        timestamp: bar.timestamp,
                        source,
                    }
                } else if let Some(previous) = previous.filter(|p| bar.timestamp < *p) {
                    DataError::NonMonotonic {
                        stream,
                        name,
                        previous,
                        got: bar.timestamp,
                    }
                } else {
                    slot.next = Some(bar);
                    return Ok(true);
                }
            }
            Err(fault) => DataError::Feed {
                stream,
                name,
                message: fault.to_string(),
            },
        };
        self.halt(index, error)
    }

    fn halt(&mut self, index: usize, error: DataError) -> Result<bool, DataError> {
        let slot = &mut self.streams[index];
        slot.state = SlotState::Halted;
        slot.next = None;
        if slot.options.required || self.halt_policy == HaltPolicy::Abort {
            return Err(error);
        }
        warn!(%error, "stream halted");
        self.halted.push((StreamId(index), error));
        Ok(true)
    }
}
