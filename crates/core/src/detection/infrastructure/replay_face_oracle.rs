use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::detection::domain::face_oracle::{FaceOracle, OracleError};
use crate::detection::domain::raw_detection::RawDetection;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("failed to read replay file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid replay data: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Replays recorded oracle output by frame index.
///
/// The recording is a JSON array with one entry per frame, each entry the
/// list of detections for that frame. Frames past the end of the recording
/// have no faces.
pub struct ReplayFaceOracle {
    cache: Arc<HashMap<usize, Vec<RawDetection>>>,
}

impl ReplayFaceOracle {
    pub fn new(cache: Arc<HashMap<usize, Vec<RawDetection>>>) -> Self {
        Self { cache }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ReplayError> {
        let frames: Vec<Vec<RawDetection>> = serde_json::from_str(json)?;
        Ok(Self::new(Arc::new(frames.into_iter().enumerate().collect())))
    }

    pub fn from_json_path(path: &Path) -> Result<Self, ReplayError> {
        let json = std::fs::read_to_string(path).map_err(|source| ReplayError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let oracle = Self::from_json_str(&json)?;
        log::info!(
            "Loaded replay of {} frames from {}",
            oracle.cache.len(),
            path.display()
        );
        Ok(oracle)
    }

    pub fn frame_count(&self) -> usize {
        self.cache.len()
    }
}

impl FaceOracle for ReplayFaceOracle {
    fn analyze(&self, frame: &Frame) -> Result<Vec<RawDetection>, OracleError> {
        Ok(self.cache.get(&frame.index()).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::raw_detection::RawSignal;
    use std::io::Write;

    fn frame(index: usize) -> Frame {
        Frame::new(vec![0u8; 4 * 4 * 3], 4, 4, 3, index)
    }

    const RECORDING: &str = r#"[
        [{"bbox": [10, 20, 110, 140], "det_score": 0.9, "age": 30, "gender": 1}],
        [],
        [
            {"bbox": [0, 0, 50, 50], "det_score": 0.8, "embedding": [1.0, 0.0]},
            {"bbox": [60, 0, 110, 50], "det_score": 0.7, "gender": "female"}
        ]
    ]"#;

    #[test]
    fn test_returns_recorded_detections_for_frame() {
        let oracle = ReplayFaceOracle::from_json_str(RECORDING).unwrap();

        let result = oracle.analyze(&frame(0)).unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].age, Some(RawSignal::Number(30.0)));
    }

    #[test]
    fn test_empty_and_multi_face_frames() {
        let oracle = ReplayFaceOracle::from_json_str(RECORDING).unwrap();

        assert!(oracle.analyze(&frame(1)).unwrap().is_empty());
        assert_eq!(oracle.analyze(&frame(2)).unwrap().len(), 2);
        assert_eq!(oracle.frame_count(), 3);
    }

    #[test]
    fn test_frames_past_recording_are_empty() {
        let oracle = ReplayFaceOracle::from_json_str(RECORDING).unwrap();
        assert!(oracle.analyze(&frame(99)).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = ReplayFaceOracle::from_json_str("{not json").err().unwrap();
        assert!(matches!(err, ReplayError::Parse(_)));
    }

    #[test]
    fn test_from_json_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(RECORDING.as_bytes()).unwrap();

        let oracle = ReplayFaceOracle::from_json_path(file.path()).unwrap();

        assert_eq!(oracle.frame_count(), 3);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReplayFaceOracle::from_json_path(&dir.path().join("missing.json"))
            .err()
            .unwrap();
        assert!(matches!(err, ReplayError::Read { .. }));
    }
}
