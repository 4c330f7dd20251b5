use thiserror::Error;

use crate::shared::bbox::BBox;
use crate::shared::frame::Frame;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Stable identity assigned by the tracker.
pub type TrackId = u32;

#[derive(Error, Debug)]
#[error("tracker update failed: {0}")]
pub struct TrackerError(#[source] pub BoxError);

impl TrackerError {
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self(source.into())
    }
}

/// One detection as handed to the tracker.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackerDetection {
    pub bbox: BBox,
    pub score: f64,
    pub label: String,
}

/// An identity the tracker reports as present in the current frame.
///
/// The tracker does not say which input detection it consumed; callers
/// recover that by spatial association.
#[derive(Clone, Debug, PartialEq)]
pub struct ConfirmedTrack {
    pub track_id: TrackId,
    pub bbox: BBox,
    /// Score of the detection matched in this frame.
    pub confidence: f64,
}

/// Domain interface for frame-to-frame identity tracking.
///
/// Stateful across frames, hence `&mut self`. `embeddings` is either empty or
/// parallel to `detections`.
pub trait FaceTracker: Send {
    fn update(
        &mut self,
        detections: &[TrackerDetection],
        frame: &Frame,
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<ConfirmedTrack>, TrackerError>;
}
