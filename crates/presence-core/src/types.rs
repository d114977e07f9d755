use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Stable identifier for an enrolled person (e.g., an employee ID).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Identity {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identity {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for Identity {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Region of a frame where a face was found, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Face encoding vector produced by the external encoder (128-dim for dlib).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Embeddings of different dimension are never comparable and yield
    /// `f32::INFINITY`.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Element-wise mean of a set of same-dimension embeddings.
    ///
    /// Returns `None` for an empty set or mixed dimensions.
    pub fn mean(set: &[Embedding]) -> Option<Embedding> {
        let first = set.first()?;
        let dim = first.dim();
        if set.iter().any(|e| e.dim() != dim) {
            return None;
        }
        let mut acc = vec![0.0f32; dim];
        for e in set {
            for (a, v) in acc.iter_mut().zip(e.values.iter()) {
                *a += v;
            }
        }
        let n = set.len() as f32;
        Some(Embedding {
            values: acc.into_iter().map(|a| a / n).collect(),
        })
    }
}

/// What the recognizer concluded about one face (or the absence of one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recognition {
    /// Matched an enrolled identity.
    Known(Identity),
    /// A face is present but matches nobody on the roster.
    Unknown,
    /// The frame contained no face at all.
    NoPersonFound,
    /// More than one face in a frame where only one is allowed.
    MultiplePeople,
}

impl Recognition {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Recognition::Known(id) => Some(id),
            _ => None,
        }
    }

    /// Short label used by logs and overlays.
    pub fn label(&self) -> &str {
        match self {
            Recognition::Known(id) => id.as_str(),
            Recognition::Unknown => "unknown_person",
            Recognition::NoPersonFound => "no_persons_found",
            Recognition::MultiplePeople => "multiple_faces_detected",
        }
    }
}

/// One recognizer output for a frame: who, and where (if anywhere).
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub recognition: Recognition,
    pub region: Option<BoundingBox>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance_identical() {
        let a = Embedding::new(vec![0.5, 0.25, -0.5]);
        assert_eq!(a.euclidean_distance(&a.clone()), 0.0);
    }

    #[test]
    fn test_euclidean_distance_known_value() {
        let a = Embedding::new(vec![0.0, 0.0]);
        let b = Embedding::new(vec![3.0, 4.0]);
        assert!((a.euclidean_distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_euclidean_distance_dimension_mismatch() {
        let a = Embedding::new(vec![1.0, 0.0]);
        let b = Embedding::new(vec![1.0, 0.0, 0.0]);
        assert!(a.euclidean_distance(&b).is_infinite());
    }

    #[test]
    fn test_mean_embedding() {
        let set = vec![
            Embedding::new(vec![1.0, 0.0]),
            Embedding::new(vec![0.0, 1.0]),
        ];
        let mean = Embedding::mean(&set).unwrap();
        assert_eq!(mean.values, vec![0.5, 0.5]);
    }

    #[test]
    fn test_mean_rejects_empty_and_mixed() {
        assert!(Embedding::mean(&[]).is_none());
        let mixed = vec![Embedding::new(vec![1.0]), Embedding::new(vec![1.0, 2.0])];
        assert!(Embedding::mean(&mixed).is_none());
    }

    #[test]
    fn test_identity_serializes_as_plain_string() {
        let id = Identity::new("E042");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"E042\"");
        let back: Identity = serde_json::from_str("\"E042\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_recognition_labels() {
        assert_eq!(Recognition::Known("E1".into()).label(), "E1");
        assert_eq!(Recognition::Unknown.label(), "unknown_person");
        assert!(Recognition::NoPersonFound.identity().is_none());
    }
}
