//! NDJSON detection feed produced by an external face encoder.
//!
//! One JSON object per line:
//!
//! ```text
//! {"t": 12.4, "faces": [{"encoding": [..], "region": {"x":..,"y":..,"width":..,"height":..}}]}
//! ```
//!
//! `t` is seconds since the start of the recording. It is required when the
//! feed is replayed and ignored when frames are stamped on arrival.

use crate::matcher::FaceSample;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("line {line}: timestamp must be finite and non-negative")]
    BadTimestamp { line: usize },
    #[error("feed read failed: {0}")]
    Io(#[from] std::io::Error),
}

impl FeedError {
    /// Whether the reader can continue past this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, FeedError::Io(_))
    }
}

/// All faces found in one captured frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedFrame {
    #[serde(default)]
    pub t: Option<f64>,
    #[serde(default)]
    pub faces: Vec<FaceSample>,
}

/// Line-by-line frame reader. Blank lines are skipped.
pub struct FeedReader<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
}

impl<R: BufRead> FeedReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for FeedReader<R> {
    type Item = Result<FeedFrame, FeedError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(l) => l,
                Err(e) => return Some(Err(FeedError::Io(e))),
            };
            self.line_no += 1;
            if line.trim().is_empty() {
                continue;
            }

            let line_no = self.line_no;
            let frame: FeedFrame = match serde_json::from_str(&line) {
                Ok(f) => f,
                Err(source) => return Some(Err(FeedError::Parse { line: line_no, source })),
            };
            if frame.t.is_some_and(|t| !t.is_finite() || t < 0.0) {
                return Some(Err(FeedError::BadTimestamp { line: line_no }));
            }
            return Some(Ok(frame));
        }
    }
}
