use serde::{Deserialize, Serialize};

use crate::detection::domain::raw_detection::Gender;
use crate::shared::bbox::{BBox, NormalizedBox};
use crate::shared::constants::{
    DEFAULT_AGE_CONFIDENCE, DEFAULT_GENDER_CONFIDENCE, DEFAULT_LIVENESS_FACTOR,
};
use crate::tracking::fusion::FusedSignals;

/// Outcome for one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub face_detected: bool,
    pub total_faces: usize,
    pub faces: Vec<FaceRecord>,
}

impl DetectionResult {
    pub fn empty() -> Self {
        Self {
            face_detected: false,
            total_faces: 0,
            faces: Vec::new(),
        }
    }
}

/// `{"result": ...}` wrapper returned by the detect route.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionEnvelope {
    pub result: DetectionResult,
}

impl From<DetectionResult> for DetectionEnvelope {
    fn from(result: DetectionResult) -> Self {
        Self { result }
    }
}

/// One face as serialized. The normalized box appears both nested under
/// `bbox` and flattened beside it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FaceRecord {
    pub track_id: i64,
    pub bbox: NormalizedBox,
    #[serde(flatten)]
    pub flat_bbox: NormalizedBox,
    pub embedding: Vec<f32>,
    pub confidence: f64,
    pub demographics: DemographicsRecord,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemographicsRecord {
    pub age: u32,
    pub gender: Gender,
    pub confidence: DemographicConfidence,
    pub liveness_score: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DemographicConfidence {
    pub age: f64,
    pub gender: f64,
}

/// A face ready for output, before serialization.
#[derive(Clone, Debug, PartialEq)]
pub struct FusedFace {
    pub track_id: i64,
    pub bbox: NormalizedBox,
    pub embedding: Vec<f32>,
    pub confidence: f64,
    pub age: u32,
    pub gender: Gender,
    pub liveness_score: f64,
}

/// Builds per-face records and the frame result.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResponseAssembler {
    liveness_factor: f64,
    confidence: DemographicConfidence,
}

impl ResponseAssembler {
    pub fn new(liveness_factor: f64, age_confidence: f64, gender_confidence: f64) -> Self {
        Self {
            liveness_factor,
            confidence: DemographicConfidence {
                age: age_confidence,
                gender: gender_confidence,
            },
        }
    }

    /// `liveness_score` is `confidence * liveness_factor` rounded to 4 places.
    pub fn face(
        &self,
        track_id: i64,
        bbox: &BBox,
        frame_size: (u32, u32),
        confidence: f64,
        signals: FusedSignals,
    ) -> FusedFace {
        FusedFace {
            track_id,
            bbox: NormalizedBox::from_absolute(bbox, frame_size.0, frame_size.1),
            embedding: signals.embedding,
            confidence,
            age: signals.age,
            gender: signals.gender,
            liveness_score: round4(confidence * self.liveness_factor),
        }
    }

    pub fn record(&self, face: FusedFace) -> FaceRecord {
        FaceRecord {
            track_id: face.track_id,
            bbox: face.bbox,
            flat_bbox: face.bbox,
            embedding: face.embedding,
            confidence: face.confidence,
            demographics: DemographicsRecord {
                age: face.age,
                gender: face.gender,
                confidence: self.confidence,
                liveness_score: face.liveness_score,
            },
        }
    }

    pub fn assemble(&self, faces: Vec<FusedFace>) -> DetectionResult {
        let faces: Vec<FaceRecord> = faces.into_iter().map(|f| self.record(f)).collect();
        DetectionResult {
            face_detected: !faces.is_empty(),
            total_faces: faces.len(),
            faces,
        }
    }
}

impl Default for ResponseAssembler {
    fn default() -> Self {
        Self::new(
            DEFAULT_LIVENESS_FACTOR,
            DEFAULT_AGE_CONFIDENCE,
            DEFAULT_GENDER_CONFIDENCE,
        )
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
