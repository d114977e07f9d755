//! Matching externally-extracted face encodings against the roster gallery.
//!
//! The encoder itself is outside this crate: it hands over, per frame, a
//! list of [`FaceSample`]s. The matcher turns those into [`Observation`]s.

use crate::roster::Roster;
use crate::types::{BoundingBox, Embedding, Identity, Observation, Recognition};
use serde::{Deserialize, Serialize};

/// Default maximum distance to a person's averaged encoding.
pub const DEFAULT_MATCH_TOLERANCE: f32 = 0.43;
/// Default maximum distance to any single enrollment encoding.
pub const DEFAULT_FALLBACK_TOLERANCE: f32 = 0.53;

/// One face found in a frame by the external encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceSample {
    pub encoding: Embedding,
    #[serde(default)]
    pub region: Option<BoundingBox>,
}

/// Result of matching a query embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Distance of the best candidate (infinite for an empty gallery).
    pub distance: f32,
    pub identity: Option<Identity>,
    /// True when the match came from an individual encoding rather than the average.
    pub via_fallback: bool,
}

impl MatchResult {
    fn miss(distance: f32) -> Self {
        Self {
            matched: false,
            distance,
            identity: None,
            via_fallback: false,
        }
    }
}

/// Strategy for comparing one query embedding against the enrolled gallery.
pub trait Matcher {
    fn compare(&self, query: &Embedding) -> MatchResult;
}

/// Turns the faces of one frame into recognitions.
pub trait IdentityMatcher {
    fn identify(&self, faces: &[FaceSample]) -> Vec<Observation>;
}

struct GalleryEntry {
    id: Identity,
    average: Embedding,
    encodings: Vec<Embedding>,
}

/// Two-stage nearest-neighbour matcher.
///
/// Stage one compares against each person's averaged encoding with the
/// strict tolerance, accepting only distances below it. Stage two compares
/// against every enrollment encoding with the looser fallback tolerance,
/// where a distance equal to the tolerance still matches. Every gallery entry is visited in
/// both stages.
pub struct GalleryMatcher {
    gallery: Vec<GalleryEntry>,
    tolerance: f32,
    fallback_tolerance: f32,
    single_person: bool,
}

impl GalleryMatcher {
    pub fn new(roster: &Roster, tolerance: f32, fallback_tolerance: f32) -> Self {
        let gallery = roster
            .entries()
            .iter()
            .filter_map(|entry| {
                Embedding::mean(&entry.encodings).map(|average| GalleryEntry {
                    id: entry.id.clone(),
                    average,
                    encodings: entry.encodings.clone(),
                })
            })
            .collect();

        Self {
            gallery,
            tolerance,
            fallback_tolerance,
            single_person: false,
        }
    }

    /// Report frames with more than one face as [`Recognition::MultiplePeople`].
    pub fn single_person(mut self, enabled: bool) -> Self {
        self.single_person = enabled;
        self
    }
}

impl Matcher for GalleryMatcher {
    fn compare(&self, query: &Embedding) -> MatchResult {
        let mut best_avg = f32::INFINITY;
        let mut best_avg_idx: Option<usize> = None;
        for (i, entry) in self.gallery.iter().enumerate() {
            let d = query.euclidean_distance(&entry.average);
            if d < best_avg {
                best_avg = d;
                best_avg_idx = Some(i);
            }
        }

        if let Some(idx) = best_avg_idx {
            if best_avg < self.tolerance {
                return MatchResult {
                    matched: true,
                    distance: best_avg,
                    identity: Some(self.gallery[idx].id.clone()),
                    via_fallback: false,
                };
            }
        }

        let mut best_any = f32::INFINITY;
        let mut best_any_idx: Option<usize> = None;
        for (i, entry) in self.gallery.iter().enumerate() {
            for enc in &entry.encodings {
                let d = query.euclidean_distance(enc);
                if d < best_any {
                    best_any = d;
                    best_any_idx = Some(i);
                }
            }
        }

        match best_any_idx {
            Some(idx) if best_any <= self.fallback_tolerance => MatchResult {
                matched: true,
                distance: best_any,
                identity: Some(self.gallery[idx].id.clone()),
                via_fallback: true,
            },
            _ => MatchResult::miss(best_avg),
        }
    }
}

impl IdentityMatcher for GalleryMatcher {
    fn identify(&self, faces: &[FaceSample]) -> Vec<Observation> {
        if faces.is_empty() {
            return vec![Observation {
                recognition: Recognition::NoPersonFound,
                region: None,
            }];
        }
        if self.single_person && faces.len() > 1 {
            return vec![Observation {
                recognition: Recognition::MultiplePeople,
                region: None,
            }];
        }

        faces
            .iter()
            .map(|face| {
                let result = self.compare(&face.encoding);
                let recognition = match result.identity {
                    Some(id) => Recognition::Known(id),
                    None => Recognition::Unknown,
                };
                Observation {
                    recognition,
                    region: face.region,
                }
            })
            .collect()
    }
}
