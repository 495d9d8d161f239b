//! CSV bar feed.
//!
//! Expected header: `timestamp,open,high,low,close,volume` with an optional
//! `open_interest` column. Timestamps are `YYYY-MM-DD` or
//! `YYYY-MM-DD HH:MM[:SS]` (a `T` separator is accepted too). Rows are read
//! lazily, one per `next_bar` call.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::Deserialize;
use simlab_core::clock::{DataFeed, FeedPoll};
use simlab_core::domain::{Bar, Timestamp};
use simlab_core::error::FeedFault;
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path}, row {row}: {source}")]
    Row {
        path: PathBuf,
        row: u64,
        #[source]
        source: csv::Error,
    },

    #[error("{path}, row {row}: unrecognized timestamp '{value}'")]
    Timestamp { path: PathBuf, row: u64, value: String },
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
    #[serde(default)]
    open_interest: Option<Decimal>,
}

pub struct CsvFeed {
    path: PathBuf,
    rows: csv::DeserializeRecordsIntoIter<File, CsvRow>,
    row: u64,
    peeked: Option<Bar>,
    done: bool,
}

impl CsvFeed {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let path = path.as_ref().to_path_buf();
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&path)
            .map_err(|source| FeedError::Open {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            rows: reader.into_deserialize(),
            row: 0,
            peeked: None,
            done: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&mut self) -> Result<Option<Bar>, FeedError> {
        let Some(record) = self.rows.next() else {
            return Ok(None);
        };
        self.row += 1;
        let row = record.map_err(|source| FeedError::Row {
            path: self.path.clone(),
            row: self.row,
            source,
        })?;
        let timestamp = parse_timestamp(&row.timestamp).ok_or_else(|| FeedError::Timestamp {
            path: self.path.clone(),
            row: self.row,
            value: row.timestamp.clone(),
        })?;
        let mut bar = Bar::new(timestamp, row.open, row.high, row.low, row.close, row.volume);
        bar.open_interest = row.open_interest.unwrap_or_default();
        Ok(Some(bar))
    }
}

impl DataFeed for CsvFeed {
    fn next_bar(&mut self) -> Result<FeedPoll, FeedFault> {
        if let Some(bar) = self.peeked.take() {
            return Ok(FeedPoll::Bar(bar));
        }
        if self.done {
            return Ok(FeedPoll::EndOfStream);
        }
        match self.read() {
            Ok(Some(bar)) => Ok(FeedPoll::Bar(bar)),
            Ok(None) => {
                self.done = true;
                Ok(FeedPoll::EndOfStream)
            }
            Err(err) => {
                self.done = true;
                Err(FeedFault(err.to_string()))
            }
        }
    }

    fn peek_timestamp(&mut self) -> Option<Timestamp> {
        if self.peeked.is_none() && !self.done {
            // errors resurface from next_bar once the peek slot is empty
            match self.read() {
                Ok(Some(bar)) => self.peeked = Some(bar),
                Ok(None) => self.done = true,
                Err(_) => return None,
            }
        }
        self.peeked.as_ref().map(|bar| bar.timestamp)
    }
}

/// Parse the timestamp formats accepted in CSV files.
pub fn parse_timestamp(value: &str) -> Option<Timestamp> {
    const DATETIME_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    let value = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}
