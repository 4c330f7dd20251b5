use thiserror::Error;

use crate::detection::domain::face_oracle::OracleError;
use crate::detection::domain::face_tracker::TrackerError;
use crate::video::domain::frame_decoder::DecodeError;

/// Faults that abort one frame. The pipeline downgrades each of them to an
/// empty result; none reach the caller.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Oracle(#[from] OracleError),
    #[error(transparent)]
    Tracker(#[from] TrackerError),
}
