use std::ops::RangeInclusive;

use crate::detection::domain::face_tracker::TrackId;
use crate::detection::domain::raw_detection::{
    Gender, MalformedSignal, RawDetection, RawSignal, SignalField,
};

use super::fusion::{fuse_age, fuse_embedding, fuse_gender, FusedSignals};
use super::history::BoundedHistory;

/// Signals from one frame, borrowed from the matched detection.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Observation<'a> {
    pub age: Option<&'a RawSignal>,
    pub gender: Option<&'a RawSignal>,
    pub embedding: Option<&'a [f32]>,
}

impl<'a> Observation<'a> {
    /// An empty embedding counts as absent.
    pub fn from_detection(detection: &'a RawDetection) -> Self {
        Self {
            age: detection.age.as_ref(),
            gender: detection.gender.as_ref(),
            embedding: (!detection.embedding.is_empty()).then_some(detection.embedding.as_slice()),
        }
    }
}

/// History window sizes and fusion fallbacks.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryLimits {
    pub age: usize,
    pub gender: usize,
    pub embedding: usize,
    pub embedding_dim: usize,
    pub default_age: u32,
    pub default_gender: Gender,
    pub valid_age_range: RangeInclusive<u32>,
}

/// Bounded per-identity signal history.
#[derive(Clone, Debug)]
pub struct TrackState {
    track_id: TrackId,
    ages: BoundedHistory<u32>,
    genders: BoundedHistory<Gender>,
    embeddings: BoundedHistory<Vec<f32>>,
}

impl TrackState {
    pub fn new(track_id: TrackId, limits: &HistoryLimits) -> Self {
        Self {
            track_id,
            ages: BoundedHistory::new(limits.age),
            genders: BoundedHistory::new(limits.gender),
            embeddings: BoundedHistory::new(limits.embedding),
        }
    }

    pub fn track_id(&self) -> TrackId {
        self.track_id
    }

    /// Appends every present, well-formed field. Returns the fields that were
    /// present but dropped.
    pub fn record(
        &mut self,
        observation: Observation<'_>,
        limits: &HistoryLimits,
    ) -> Vec<MalformedSignal> {
        let mut dropped = Vec::new();

        if let Some(raw) = observation.age {
            match raw.to_age(&limits.valid_age_range) {
                Ok(age) => self.ages.push(age),
                Err(e) => dropped.push(e),
            }
        }
        if let Some(raw) = observation.gender {
            match raw.to_gender() {
                Ok(gender) => self.genders.push(gender),
                Err(e) => dropped.push(e),
            }
        }
        if let Some(embedding) = observation.embedding {
            match self.check_embedding(embedding) {
                Ok(()) => self.embeddings.push(embedding.to_vec()),
                Err(e) => dropped.push(e),
            }
        }

        dropped
    }

    fn check_embedding(&self, embedding: &[f32]) -> Result<(), MalformedSignal> {
        if embedding.is_empty() {
            return Err(MalformedSignal::new(SignalField::Embedding, "empty vector"));
        }
        if embedding.iter().any(|v| !v.is_finite()) {
            return Err(MalformedSignal::new(
                SignalField::Embedding,
                "contains non-finite values",
            ));
        }
        if let Some(previous) = self.embeddings.latest() {
            if previous.len() != embedding.len() {
                return Err(MalformedSignal::new(
                    SignalField::Embedding,
                    format!(
                        "dimension {} differs from track history {}",
                        embedding.len(),
                        previous.len()
                    ),
                ));
            }
        }
        Ok(())
    }

    pub fn fuse(&self, limits: &HistoryLimits) -> FusedSignals {
        FusedSignals {
            age: fuse_age(&self.ages, limits.default_age),
            gender: fuse_gender(&self.genders, limits.default_gender),
            embedding: fuse_embedding(&self.embeddings, limits.embedding_dim),
        }
    }

    /// `(ages, genders, embeddings)` currently held.
    pub fn history_lengths(&self) -> (usize, usize, usize) {
        (self.ages.len(), self.genders.len(), self.embeddings.len())
    }
}
