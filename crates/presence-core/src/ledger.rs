//! Per-identity attendance counters.

use crate::record::AttendanceRecord;
use crate::roster::Roster;
use crate::types::Identity;
use std::collections::HashMap;
use std::time::Duration;

/// Counters for one person.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonCounters {
    /// Time credited as worked.
    pub worked_time: Duration,
    /// Current unbroken absence run, not yet finalized.
    pub absent_time: Duration,
    /// Sum of finalized absences. Grows only in threshold-sized steps.
    pub total_absent_time: Duration,
    /// Seen at least once since the last window evaluation.
    pub detected_in_window: bool,
}

/// Outcome of applying a persisted record to the ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Values written into roster identities.
    pub applied: usize,
    /// Values for identities not on the roster.
    pub ignored: usize,
}

/// Attendance counters keyed by the roster's identities, in roster order.
///
/// The key space is fixed at construction. Detections of identities outside
/// it are ignored.
#[derive(Debug, Clone, Default)]
pub struct AttendanceLedger {
    entries: Vec<(Identity, PersonCounters)>,
    index: HashMap<Identity, usize>,
}

impl AttendanceLedger {
    /// Create a zeroed ledger. Repeated identities are tracked once.
    pub fn new<I>(identities: I) -> Self
    where
        I: IntoIterator<Item = Identity>,
    {
        let mut ledger = Self::default();
        for id in identities {
            if ledger.index.contains_key(&id) {
                continue;
            }
            ledger.index.insert(id.clone(), ledger.entries.len());
            ledger.entries.push((id, PersonCounters::default()));
        }
        ledger
    }

    /// Zeroed ledger keyed by the roster's identities.
    pub fn from_roster(roster: &Roster) -> Self {
        Self::new(roster.identities().cloned())
    }

    /// Record that `id` was seen in the current window.
    ///
    /// Returns `false` (and changes nothing) for identities outside the roster.
    pub fn mark_detected(&mut self, id: &str) -> bool {
        match self.index.get(id) {
            Some(&idx) => {
                self.entries[idx].1.detected_in_window = true;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn counters(&self, id: &str) -> Option<&PersonCounters> {
        self.index.get(id).map(|&idx| &self.entries[idx].1)
    }

    pub fn worked_time(&self, id: &str) -> Option<Duration> {
        self.counters(id).map(|c| c.worked_time)
    }

    pub fn absent_time(&self, id: &str) -> Option<Duration> {
        self.counters(id).map(|c| c.absent_time)
    }

    pub fn total_absent_time(&self, id: &str) -> Option<Duration> {
        self.counters(id).map(|c| c.total_absent_time)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Identity, &PersonCounters)> + '_ {
        self.entries.iter().map(|(id, c)| (id, c))
    }

    pub(crate) fn iter_mut(
        &mut self,
    ) -> impl Iterator<Item = (&Identity, &mut PersonCounters)> + '_ {
        self.entries.iter_mut().map(|(id, c)| (&*id, c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Overwrite durable counters from a persisted record.
    ///
    /// Only roster identities are touched; identities missing from the record
    /// keep their current values. A record holding any value that does not fit
    /// a `Duration` is not applied at all.
    pub fn load(&mut self, record: &AttendanceRecord) -> LoadSummary {
        let worked = match to_durations(&record.worked_time) {
            Some(v) => v,
            None => {
                tracing::warn!("persisted worked_time out of range; nothing loaded");
                return LoadSummary::default();
            }
        };
        let totals = match to_durations(&record.total_absent_time) {
            Some(v) => v,
            None => {
                tracing::warn!("persisted total_absent_time out of range; nothing loaded");
                return LoadSummary::default();
            }
        };

        let mut summary = LoadSummary::default();
        for (id, value) in worked {
            match self.index.get(id.as_str()) {
                Some(&idx) => {
                    self.entries[idx].1.worked_time = value;
                    summary.applied += 1;
                }
                None => summary.ignored += 1,
            }
        }
        for (id, value) in totals {
            match self.index.get(id.as_str()) {
                Some(&idx) => {
                    self.entries[idx].1.total_absent_time = value;
                    summary.applied += 1;
                }
                None => summary.ignored += 1,
            }
        }
        summary
    }

    /// Durable fields as of now, for saving.
    pub fn snapshot_for_persistence(&self) -> AttendanceRecord {
        let mut record = AttendanceRecord::default();
        for (id, c) in &self.entries {
            record.worked_time.insert(id.clone(), c.worked_time.as_secs_f64());
            record
                .total_absent_time
                .insert(id.clone(), c.total_absent_time.as_secs_f64());
        }
        record
    }
}

fn to_durations<'a, I>(values: I) -> Option<Vec<(&'a Identity, Duration)>>
where
    I: IntoIterator<Item = (&'a Identity, &'a f64)>,
{
    values
        .into_iter()
        .map(|(id, secs)| Duration::try_from_secs_f64(*secs).ok().map(|d| (id, d)))
        .collect()
}
