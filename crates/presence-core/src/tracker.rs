//! Single-owner driver glue around the ledger and the window evaluator.
//!
//! The window anchor is set from the first observed frame. Before that,
//! nothing can be evaluated and [`Tracker::evaluate`] reports
//! [`TrackerError::NotStarted`].

use crate::evaluator::{WindowConfig, WindowEvaluator, WindowEvents};
use crate::ledger::AttendanceLedger;
use crate::types::Identity;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TrackerError {
    #[error("window anchor not set: no frame has been observed yet")]
    NotStarted,
}

pub struct Tracker {
    ledger: AttendanceLedger,
    config: WindowConfig,
    evaluator: Option<WindowEvaluator>,
}

impl Tracker {
    pub fn new(ledger: AttendanceLedger, config: WindowConfig) -> Self {
        Self {
            ledger,
            config,
            evaluator: None,
        }
    }

    pub fn ledger(&self) -> &AttendanceLedger {
        &self.ledger
    }

    pub fn is_started(&self) -> bool {
        self.evaluator.is_some()
    }

    /// Anchor the first window at `now`. Later calls are ignored.
    pub fn start(&mut self, now: Instant) {
        if self.evaluator.is_none() {
            self.evaluator = Some(WindowEvaluator::new(self.config, now));
        }
    }

    pub fn mark_detected(&mut self, id: &str) -> bool {
        self.ledger.mark_detected(id)
    }

    /// False until started.
    pub fn should_evaluate(&self, now: Instant) -> bool {
        self.evaluator
            .as_ref()
            .is_some_and(|ev| ev.should_evaluate(now))
    }

    pub fn evaluate(&mut self, now: Instant) -> Result<WindowEvents, TrackerError> {
        let evaluator = self.evaluator.as_mut().ok_or(TrackerError::NotStarted)?;
        Ok(evaluator.evaluate(&mut self.ledger, now))
    }

    /// Time until the next evaluation is due, if started.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.evaluator.as_ref().map(|ev| ev.remaining(now))
    }

    /// Process one frame's identities: anchor on first use, mark, then
    /// evaluate if the window is due. Detections in the frame that closes a
    /// window count toward that window.
    pub fn observe<'a, I>(&mut self, now: Instant, identities: I) -> Option<WindowEvents>
    where
        I: IntoIterator<Item = &'a Identity>,
    {
        self.start(now);
        for id in identities {
            if !self.ledger.mark_detected(id.as_str()) {
                tracing::trace!(identity = %id, "detection outside roster ignored");
            }
        }
        self.tick(now)
    }

    /// Evaluate if due. Used by timers when no frame arrives.
    pub fn tick(&mut self, now: Instant) -> Option<WindowEvents> {
        if self.should_evaluate(now) {
            self.evaluate(now).ok()
        } else {
            None
        }
    }

    pub fn into_ledger(self) -> AttendanceLedger {
        self.ledger
    }
}
