//! Enrolled-person roster.
//!
//! The roster fixes the identity key space for a run. It is loaded once at
//! startup from a JSON list of `{ "id", "name", "encodings" }` objects.

use crate::types::{Embedding, Identity};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("roster file not found: {0}")]
    NotFound(String),
    #[error("failed to read roster {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed roster: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One enrolled person with their enrollment encodings (one per captured pose).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: Identity,
    pub name: String,
    #[serde(default)]
    pub encodings: Vec<Embedding>,
}

/// Fixed set of known people for one run, in enrollment order.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    /// Build a roster, dropping entries that can never be matched.
    ///
    /// Duplicate IDs keep the first occurrence. Entries without encodings,
    /// or whose encodings disagree on dimension, are skipped.
    pub fn from_entries(entries: Vec<RosterEntry>) -> Self {
        let mut seen = HashSet::new();
        let mut kept = Vec::with_capacity(entries.len());

        for entry in entries {
            if !seen.insert(entry.id.clone()) {
                tracing::warn!(identity = %entry.id, "duplicate roster id; keeping first entry");
                continue;
            }
            if entry.encodings.is_empty() {
                tracing::warn!(identity = %entry.id, "roster entry has no encodings; skipping");
                continue;
            }
            let dim = entry.encodings[0].dim();
            if dim == 0 || entry.encodings.iter().any(|e| e.dim() != dim) {
                tracing::warn!(
                    identity = %entry.id,
                    "roster entry has inconsistent encodings; skipping"
                );
                continue;
            }
            kept.push(entry);
        }

        Self { entries: kept }
    }

    pub fn from_json_str(src: &str) -> Result<Self, RosterError> {
        let entries: Vec<RosterEntry> = serde_json::from_str(src)?;
        Ok(Self::from_entries(entries))
    }

    /// Load the roster from a JSON file.
    pub fn load(path: &Path) -> Result<Self, RosterError> {
        if !path.exists() {
            return Err(RosterError::NotFound(path.display().to_string()));
        }
        let src = std::fs::read_to_string(path).map_err(|source| RosterError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let roster = Self::from_json_str(&src)?;
        tracing::info!(path = %path.display(), people = roster.len(), "loaded roster");
        Ok(roster)
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> + '_ {
        self.entries.iter().map(|e| &e.id)
    }

    pub fn get(&self, id: &str) -> Option<&RosterEntry> {
        self.entries.iter().find(|e| e.id.as_str() == id)
    }

    /// Display name for an identity, falling back to the ID itself.
    pub fn display_name<'a>(&'a self, id: &'a Identity) -> &'a str {
        self.get(id.as_str()).map(|e| e.name.as_str()).unwrap_or(id.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
