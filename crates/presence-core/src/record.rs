//! Durable attendance record and its on-disk JSON format.
//!
//! Current files carry an explicit `version` marker. Two older shapes are
//! still accepted on read and are recognized explicitly:
//!
//! - unversioned: `{"worked_time": {..}, "total_absent_time": {..}}`
//! - flat: `{"<id>": <worked seconds>, ..}` (no absence totals)
//!
//! Writes always produce the current version.

use crate::types::Identity;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

pub const RECORD_VERSION: u64 = 2;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported record version {0}")]
    UnsupportedVersion(u64),
    #[error("unrecognized record shape: {0}")]
    UnrecognizedShape(String),
    #[error("invalid {field} value for {identity}: {value}")]
    InvalidValue {
        field: &'static str,
        identity: String,
        value: String,
    },
}

/// Which on-disk shape a record was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    Current,
    Unversioned,
    LegacyFlat,
}

impl RecordFormat {
    pub fn is_legacy(self) -> bool {
        self != RecordFormat::Current
    }
}

/// Durable per-identity totals, in seconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub worked_time: BTreeMap<Identity, f64>,
    pub total_absent_time: BTreeMap<Identity, f64>,
}

#[derive(Serialize)]
struct VersionedRecordRef<'a> {
    version: u64,
    worked_time: &'a BTreeMap<Identity, f64>,
    total_absent_time: &'a BTreeMap<Identity, f64>,
}

impl AttendanceRecord {
    pub fn is_empty(&self) -> bool {
        self.worked_time.is_empty() && self.total_absent_time.is_empty()
    }

    /// Parse a record in any supported shape.
    ///
    /// The whole record is rejected if any value is non-numeric, negative,
    /// or non-finite, so a partially valid file never half-loads.
    pub fn from_json_slice(bytes: &[u8]) -> Result<(Self, RecordFormat), RecordError> {
        let value: Value = serde_json::from_slice(bytes)?;
        let Value::Object(map) = value else {
            return Err(RecordError::UnrecognizedShape(
                "top-level value is not an object".into(),
            ));
        };

        if let Some(version) = map.get("version") {
            let version = version.as_u64().ok_or_else(|| {
                RecordError::UnrecognizedShape(format!("non-integer version {version}"))
            })?;
            if version != RECORD_VERSION {
                return Err(RecordError::UnsupportedVersion(version));
            }
            let record = Self {
                worked_time: seconds_map(&map, "worked_time")?,
                total_absent_time: seconds_map(&map, "total_absent_time")?,
            };
            return Ok((record, RecordFormat::Current));
        }

        if map.contains_key("worked_time") && map.contains_key("total_absent_time") {
            let record = Self {
                worked_time: seconds_map(&map, "worked_time")?,
                total_absent_time: seconds_map(&map, "total_absent_time")?,
            };
            return Ok((record, RecordFormat::Unversioned));
        }

        if map.values().all(Value::is_number) {
            let record = Self {
                worked_time: seconds_entries(&map, "worked_time")?,
                total_absent_time: BTreeMap::new(),
            };
            return Ok((record, RecordFormat::LegacyFlat));
        }

        Err(RecordError::UnrecognizedShape(
            "expected versioned record or flat id→seconds map".into(),
        ))
    }

    /// Serialize in the current versioned format.
    pub fn to_json_vec(&self) -> Result<Vec<u8>, RecordError> {
        let out = VersionedRecordRef {
            version: RECORD_VERSION,
            worked_time: &self.worked_time,
            total_absent_time: &self.total_absent_time,
        };
        Ok(serde_json::to_vec_pretty(&out)?)
    }
}

fn seconds_map(
    map: &Map<String, Value>,
    field: &'static str,
) -> Result<BTreeMap<Identity, f64>, RecordError> {
    match map.get(field) {
        Some(Value::Object(inner)) => seconds_entries(inner, field),
        Some(other) => Err(RecordError::UnrecognizedShape(format!(
            "{field} is not an object: {other}"
        ))),
        None => Err(RecordError::UnrecognizedShape(format!("missing {field}"))),
    }
}

fn seconds_entries(
    map: &Map<String, Value>,
    field: &'static str,
) -> Result<BTreeMap<Identity, f64>, RecordError> {
    let mut out = BTreeMap::new();
    for (id, value) in map {
        let secs = value
            .as_f64()
            .filter(|s| s.is_finite() && *s >= 0.0)
            .ok_or_else(|| RecordError::InvalidValue {
                field,
                identity: id.clone(),
                value: value.to_string(),
            })?;
        out.insert(Identity::new(id.as_str()), secs);
    }
    Ok(out)
}
