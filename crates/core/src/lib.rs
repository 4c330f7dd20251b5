//! Identity-persistent face tracking and temporal fusion.
//!
//! A frame goes through an external face analysis oracle and, in live mode,
//! an external multi-object tracker. This crate reconciles the two object
//! lists by spatial overlap, keeps bounded per-identity signal history and
//! fuses it into stable per-face output.

pub mod detection;
pub mod pipeline;
pub mod shared;
pub mod tracking;
pub mod video;
