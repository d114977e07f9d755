//! SQLite backend.
//!
//! `attendance_totals` holds the durable counters, one row per identity.
//! `attendance_daily` keeps a per-day copy of those totals, upserted on
//! every save and keyed by `(identity, date)`, so earlier days stay
//! queryable after the totals move on.

use crate::{AttendanceStore, LoadedRecord, StoreError};
use chrono::{Local, NaiveDate, Utc};
use presence_core::{AttendanceRecord, Identity, RecordError, RecordFormat};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS attendance_totals (
    identity          TEXT PRIMARY KEY,
    worked_secs       REAL NOT NULL,
    total_absent_secs REAL NOT NULL,
    updated_at        TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS attendance_daily (
    identity          TEXT NOT NULL,
    date              TEXT NOT NULL,
    worked_secs       REAL NOT NULL,
    total_absent_secs REAL NOT NULL,
    updated_at        TEXT NOT NULL,
    PRIMARY KEY (identity, date)
);
";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One identity's totals as saved on a given day.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyRow {
    pub identity: Identity,
    pub date: NaiveDate,
    pub worked_secs: f64,
    pub total_absent_secs: f64,
}

pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and ensure the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = %path.display(), "sqlite store opened");
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    /// Save, recording the daily history row under `date`.
    pub fn save_on(
        &mut self,
        record: &AttendanceRecord,
        date: NaiveDate,
    ) -> Result<(), StoreError> {
        let updated_at = Utc::now().to_rfc3339();
        let day = date.format(DATE_FORMAT).to_string();

        let ids: BTreeSet<&Identity> = record
            .worked_time
            .keys()
            .chain(record.total_absent_time.keys())
            .collect();

        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM attendance_totals", [])?;
        for id in ids {
            let worked = record.worked_time.get(id).copied().unwrap_or(0.0);
            let absent = record.total_absent_time.get(id).copied().unwrap_or(0.0);
            tx.execute(
                "INSERT INTO attendance_totals
                     (identity, worked_secs, total_absent_secs, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id.as_str(), worked, absent, updated_at],
            )?;
            tx.execute(
                "INSERT INTO attendance_daily
                     (identity, date, worked_secs, total_absent_secs, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (identity, date) DO UPDATE SET
                     worked_secs = excluded.worked_secs,
                     total_absent_secs = excluded.total_absent_secs,
                     updated_at = excluded.updated_at",
                params![id.as_str(), day, worked, absent, updated_at],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Daily history rows, newest day first. `on` restricts to a single day.
    pub fn daily_history(&self, on: Option<NaiveDate>) -> Result<Vec<DailyRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT identity, date, worked_secs, total_absent_secs
             FROM attendance_daily
             WHERE ?1 IS NULL OR date = ?1
             ORDER BY date DESC, identity ASC",
        )?;
        let filter = on.map(|d| d.format(DATE_FORMAT).to_string());

        let rows = stmt.query_map(params![filter], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (identity, date, worked_secs, total_absent_secs) = row?;
            let Ok(date) = NaiveDate::parse_from_str(&date, DATE_FORMAT) else {
                tracing::warn!(
                    identity = %identity,
                    date = %date,
                    "skipping daily row with malformed date"
                );
                continue;
            };
            out.push(DailyRow {
                identity: Identity::new(identity),
                date,
                worked_secs,
                total_absent_secs,
            });
        }
        Ok(out)
    }

    /// Timestamp of the most recent save, if any.
    pub fn last_updated(&self) -> Result<Option<String>, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT MAX(updated_at) FROM attendance_totals", [], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()?
            .flatten())
    }
}

impl AttendanceStore for SqliteStore {
    fn load(&self) -> Result<Option<LoadedRecord>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT identity, worked_secs, total_absent_secs FROM attendance_totals")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;

        let mut record = AttendanceRecord::default();
        for row in rows {
            let (identity, worked, absent) = row?;
            for (field, value) in [("worked_time", worked), ("total_absent_time", absent)] {
                if !value.is_finite() || value < 0.0 {
                    return Err(StoreError::Record(RecordError::InvalidValue {
                        field,
                        identity: identity.clone(),
                        value: value.to_string(),
                    }));
                }
            }
            let id = Identity::new(identity);
            record.worked_time.insert(id.clone(), worked);
            record.total_absent_time.insert(id, absent);
        }

        if record.is_empty() {
            return Ok(None);
        }
        Ok(Some(LoadedRecord {
            record,
            format: RecordFormat::Current,
        }))
    }

    fn save(&mut self, record: &AttendanceRecord) -> Result<(), StoreError> {
        self.save_on(record, Local::now().date_naive())
    }

    fn location(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(worked: f64, absent: f64) -> AttendanceRecord {
        let mut r = AttendanceRecord::default();
        r.worked_time.insert("E001".into(), worked);
        r.total_absent_time.insert("E001".into(), absent);
        r
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn test_empty_database_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("a.db")).unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(store.last_updated().unwrap().is_none());
    }

    #[test]
    fn test_totals_replaced_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SqliteStore::open(&dir.path().join("a.db")).unwrap();
        store.save_on(&record(10.0, 0.0), day("2026-03-01")).unwrap();
        store.save_on(&record(25.0, 30.0), day("2026-03-01")).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.record, record(25.0, 30.0));
        assert!(store.last_updated().unwrap().is_some());
    }

    #[test]
    fn test_daily_history_keyed_by_date() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SqliteStore::open(&dir.path().join("a.db")).unwrap();
        store.save_on(&record(10.0, 0.0), day("2026-03-01")).unwrap();
        store.save_on(&record(12.0, 0.0), day("2026-03-01")).unwrap();
        store.save_on(&record(40.0, 30.0), day("2026-03-02")).unwrap();

        let all = store.daily_history(None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].date, day("2026-03-02"));
        assert_eq!(all[1].worked_secs, 12.0);

        let first = store.daily_history(Some(day("2026-03-01"))).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].identity.as_str(), "E001");
    }

    #[test]
    fn test_identity_missing_from_one_map_defaults_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SqliteStore::open(&dir.path().join("a.db")).unwrap();
        let mut r = AttendanceRecord::default();
        r.worked_time.insert("E002".into(), 4.0);
        store.save_on(&r, day("2026-03-01")).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.record.total_absent_time.get("E002"), Some(&0.0));
    }

    #[test]
    fn test_negative_row_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.db");
        let store = SqliteStore::open(&path).unwrap();
        store
            .conn
            .execute(
                "INSERT INTO attendance_totals VALUES ('E001', -5.0, 0.0, 'x')",
                [],
            )
            .unwrap();
        assert!(matches!(
            store.load(),
            Err(StoreError::Record(RecordError::InvalidValue { .. }))
        ));
    }
}
