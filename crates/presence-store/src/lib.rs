//! presence-store — Durable attendance totals.
//!
//! Two backends implement [`AttendanceStore`]: a versioned JSON file and a
//! SQLite database that also keeps per-day history. Both are read once at
//! startup and written once at shutdown.

pub mod json;
pub mod sqlite;

use presence_core::{AttendanceRecord, RecordError, RecordFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

pub use json::JsonFileStore;
pub use sqlite::{DailyRow, SqliteStore};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("bad attendance record: {0}")]
    Record(#[from] RecordError),
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("unknown store backend: {0} (expected json or sqlite)")]
    UnknownBackend(String),
}

/// A record as read back from storage, with the shape it was found in.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedRecord {
    pub record: AttendanceRecord,
    pub format: RecordFormat,
}

/// Durable home of the attendance totals.
pub trait AttendanceStore {
    /// Read the saved record. `Ok(None)` means nothing has been saved yet.
    fn load(&self) -> Result<Option<LoadedRecord>, StoreError>;

    /// Replace the saved record.
    fn save(&mut self, record: &AttendanceRecord) -> Result<(), StoreError>;

    /// Human-readable location, for logs.
    fn location(&self) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Json,
    Sqlite,
}

impl StoreBackend {
    /// File name used when no explicit store path is configured.
    pub fn default_file_name(self) -> &'static str {
        match self {
            StoreBackend::Json => "attendance.json",
            StoreBackend::Sqlite => "attendance.db",
        }
    }
}

impl FromStr for StoreBackend {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(StoreBackend::Json),
            "sqlite" | "sqlite3" => Ok(StoreBackend::Sqlite),
            other => Err(StoreError::UnknownBackend(other.to_string())),
        }
    }
}

/// Open the configured backend at `path`.
pub fn open_store(
    backend: StoreBackend,
    path: &Path,
) -> Result<Box<dyn AttendanceStore + Send>, StoreError> {
    match backend {
        StoreBackend::Json => Ok(Box::new(JsonFileStore::new(path))),
        StoreBackend::Sqlite => Ok(Box::new(SqliteStore::open(path)?)),
    }
}
