use thiserror::Error;

use crate::detection::domain::raw_detection::RawDetection;
use crate::shared::frame::Frame;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Upstream analysis fault. Carries the adapter's own error as its source.
#[derive(Error, Debug)]
#[error("face analysis failed: {0}")]
pub struct OracleError(#[source] pub BoxError);

impl OracleError {
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self(source.into())
    }
}

/// Domain interface for full-frame face analysis.
///
/// Returns every face in the frame with its box, score, embedding and raw
/// demographic estimates. Takes `&self` so one oracle can serve concurrent
/// frames; implementations guard any mutable inference state themselves.
pub trait FaceOracle: Send + Sync {
    fn analyze(&self, frame: &Frame) -> Result<Vec<RawDetection>, OracleError>;
}
