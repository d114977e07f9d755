//! Versioned JSON file backend.

use crate::{AttendanceStore, LoadedRecord, StoreError};
use presence_core::AttendanceRecord;
use std::path::PathBuf;

pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

impl AttendanceStore for JsonFileStore {
    fn load(&self) -> Result<Option<LoadedRecord>, StoreError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        let (record, format) = AttendanceRecord::from_json_slice(&bytes)?;
        Ok(Some(LoadedRecord { record, format }))
    }

    /// Write via a sibling temp file and rename, so a crash mid-write never
    /// leaves a truncated record behind.
    fn save(&mut self, record: &AttendanceRecord) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let bytes = record.to_json_vec()?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, bytes).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;

        tracing::debug!(path = %self.path.display(), "attendance record written");
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
