use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detection::domain::raw_detection::Gender;
use crate::detection::infrastructure::bytetrack_tracker::ByteTrackConfig;
use crate::detection::infrastructure::onnx_face_oracle::OracleConfig;
use crate::shared::constants::{
    DEFAULT_AGE, DEFAULT_AGE_CONFIDENCE, DEFAULT_AGE_HISTORY, DEFAULT_ASSOCIATION_IOU,
    DEFAULT_EMBEDDING_DIM, DEFAULT_EMBEDDING_HISTORY, DEFAULT_GENDER_CONFIDENCE,
    DEFAULT_GENDER_HISTORY, DEFAULT_LIVENESS_FACTOR, DEFAULT_MAX_IDLE_FRAMES, DEFAULT_MAX_TRACKS,
};
use crate::tracking::track_state::HistoryLimits;
use crate::tracking::track_state_store::TrackStoreConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Tunables for association, history, fusion fallbacks and the response.
///
/// Every field has a default, so a JSON file only lists what it overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// A confirmed track matches a detection only above this IoU.
    pub iou_threshold: f64,
    pub age_history: usize,
    pub gender_history: usize,
    pub embedding_history: usize,
    pub embedding_dim: usize,
    pub default_age: u32,
    pub default_gender: Gender,
    pub liveness_factor: f64,
    pub age_confidence: f64,
    pub gender_confidence: f64,
    pub max_idle_frames: u64,
    pub max_tracks: usize,
    pub valid_age_range: RangeInclusive<u32>,
    pub tracker: ByteTrackConfig,
    pub oracle: OracleConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            iou_threshold: DEFAULT_ASSOCIATION_IOU,
            age_history: DEFAULT_AGE_HISTORY,
            gender_history: DEFAULT_GENDER_HISTORY,
            embedding_history: DEFAULT_EMBEDDING_HISTORY,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            default_age: DEFAULT_AGE,
            default_gender: Gender::Male,
            liveness_factor: DEFAULT_LIVENESS_FACTOR,
            age_confidence: DEFAULT_AGE_CONFIDENCE,
            gender_confidence: DEFAULT_GENDER_CONFIDENCE,
            max_idle_frames: DEFAULT_MAX_IDLE_FRAMES,
            max_tracks: DEFAULT_MAX_TRACKS,
            valid_age_range: 0..=120,
            tracker: ByteTrackConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
            ConfigError::Invalid {
                field,
                reason: reason.into(),
            }
        }

        if !(0.0..1.0).contains(&self.iou_threshold) {
            return Err(invalid("iou_threshold", "must be in [0, 1)"));
        }
        for (field, value) in [
            ("age_history", self.age_history),
            ("gender_history", self.gender_history),
            ("embedding_history", self.embedding_history),
            ("embedding_dim", self.embedding_dim),
            ("max_tracks", self.max_tracks),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be at least 1"));
            }
        }
        if !self.liveness_factor.is_finite() || self.liveness_factor < 0.0 {
            return Err(invalid("liveness_factor", "must be a non-negative number"));
        }
        for (field, value) in [
            ("age_confidence", self.age_confidence),
            ("gender_confidence", self.gender_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, "must be in [0, 1]"));
            }
        }
        if self.valid_age_range.is_empty() {
            return Err(invalid("valid_age_range", "start is after end"));
        }
        if !self.valid_age_range.contains(&self.default_age) {
            return Err(invalid(
                "default_age",
                format!(
                    "{} outside {}..={}",
                    self.default_age,
                    self.valid_age_range.start(),
                    self.valid_age_range.end()
                ),
            ));
        }
        Ok(())
    }

    pub fn store_config(&self) -> TrackStoreConfig {
        TrackStoreConfig {
            limits: HistoryLimits {
                age: self.age_history,
                gender: self.gender_history,
                embedding: self.embedding_history,
                embedding_dim: self.embedding_dim,
                default_age: self.default_age,
                default_gender: self.default_gender,
                valid_age_range: self.valid_age_range.clone(),
            },
            max_idle_frames: self.max_idle_frames,
            max_tracks: self.max_tracks,
        }
    }
}
