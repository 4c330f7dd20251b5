use thiserror::Error;

use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty input")]
    Empty,
    #[error("image has zero width or height")]
    ZeroSized,
    #[error("cannot decode image: {0}")]
    Format(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Turns raw encoded bytes into an RGB frame.
///
/// `index` is stamped onto the frame so stream-aware oracles can key on it.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8], index: usize) -> Result<Frame, DecodeError>;
}
