use std::path::Path;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::detection::domain::face_oracle::{FaceOracle, OracleError};
use crate::detection::domain::raw_detection::{RawDetection, RawSignal};
use crate::shared::frame::Frame;

use super::onnx_arcface_embedder::ArcFaceEmbedder;
use super::onnx_genderage_estimator::GenderAgeEstimator;
use super::onnx_yolo_detector::{ScoredBox, YoloFaceDetector};

/// Detector thresholds for the ONNX oracle.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub confidence: f64,
    pub nms_iou: f64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            confidence: 0.15,
            nms_iou: 0.45,
        }
    }
}

/// Full-frame analysis backed by local ONNX models.
///
/// YOLO finds boxes, ArcFace embeds each square crop, and the optional
/// genderage model fills in demographics. Without it, age and gender are
/// reported absent.
pub struct OnnxFaceOracle {
    detector: Mutex<YoloFaceDetector>,
    embedder: ArcFaceEmbedder,
    demographics: Option<GenderAgeEstimator>,
}

impl OnnxFaceOracle {
    pub fn new(
        detector_model: &Path,
        embedder_model: &Path,
        genderage_model: Option<&Path>,
        config: OracleConfig,
    ) -> Result<Self, OracleError> {
        let detector = YoloFaceDetector::new(detector_model, config.confidence, config.nms_iou)
            .map_err(OracleError)?;
        let embedder = ArcFaceEmbedder::new(embedder_model).map_err(OracleError)?;
        let demographics = genderage_model
            .map(GenderAgeEstimator::new)
            .transpose()
            .map_err(OracleError)?;
        if demographics.is_none() {
            log::info!("No genderage model configured; demographics will use defaults");
        }
        Ok(Self {
            detector: Mutex::new(detector),
            embedder,
            demographics,
        })
    }

    fn describe(&self, frame: &Frame, scored: ScoredBox) -> Result<RawDetection, OracleError> {
        let bbox = scored.bbox.map(f64::trunc);
        let mut detection = RawDetection {
            bbox,
            det_score: scored.score,
            embedding: Vec::new(),
            age: None,
            gender: None,
        };
        let Some(crop) = frame.square_crop(&bbox) else {
            return Ok(detection);
        };
        detection.embedding = self.embedder.embed(&crop).map_err(OracleError)?;
        if let Some(estimator) = &self.demographics {
            let estimate = estimator.estimate(&crop).map_err(OracleError)?;
            detection.age = Some(RawSignal::Number(estimate.age));
            detection.gender = Some(RawSignal::Number(estimate.gender_code as f64));
        }
        Ok(detection)
    }
}

impl FaceOracle for OnnxFaceOracle {
    fn analyze(&self, frame: &Frame) -> Result<Vec<RawDetection>, OracleError> {
        let boxes = {
            let mut detector = self
                .detector
                .lock()
                .map_err(|e| OracleError::new(format!("Lock poisoned: {e}")))?;
            detector.detect(frame).map_err(OracleError)?
        };
        log::debug!("Frame {}: {} face boxes", frame.index(), boxes.len());
        boxes
            .into_iter()
            .map(|scored| self.describe(frame, scored))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oracle_config_defaults() {
        let config = OracleConfig::default();
        assert_eq!(config.confidence, 0.15);
        assert_eq!(config.nms_iou, 0.45);
    }

    #[test]
    fn test_oracle_config_partial_json() {
        let config: OracleConfig = serde_json::from_str(r#"{"confidence": 0.4}"#).unwrap();
        assert_eq!(config.confidence, 0.4);
        assert_eq!(config.nms_iou, 0.45);
    }

    #[test]
    fn test_missing_model_is_oracle_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.onnx");
        let result = OnnxFaceOracle::new(&missing, &missing, None, OracleConfig::default());
        assert!(result.is_err());
    }
}
