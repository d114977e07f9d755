//! presence-core — Attendance accounting from a recognized-identity stream.
//!
//! Matches externally-extracted face encodings against an enrolled roster,
//! accumulates per-person worked and absent time in fixed windows, and
//! defines the durable record those totals are saved in.

pub mod display;
pub mod evaluator;
pub mod feed;
pub mod ledger;
pub mod matcher;
pub mod record;
pub mod roster;
pub mod tracker;
pub mod types;

pub use evaluator::{WindowConfig, WindowEvaluator, WindowEvents};
pub use feed::{FeedError, FeedFrame, FeedReader};
pub use ledger::{AttendanceLedger, LoadSummary, PersonCounters};
pub use matcher::{FaceSample, GalleryMatcher, IdentityMatcher, MatchResult, Matcher};
pub use record::{AttendanceRecord, RecordError, RecordFormat};
pub use roster::{Roster, RosterEntry, RosterError};
pub use tracker::{Tracker, TrackerError};
pub use types::{BoundingBox, Embedding, Identity, Observation, Recognition};

