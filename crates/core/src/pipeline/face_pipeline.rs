use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use crate::detection::domain::face_oracle::FaceOracle;
use crate::detection::domain::face_tracker::{ConfirmedTrack, FaceTracker, TrackerDetection};
use crate::detection::domain::raw_detection::{Gender, MalformedSignal, RawDetection};
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::error::PipelineError;
use crate::pipeline::pipeline_logger::{metric, stage, NullPipelineLogger, PipelineLogger};
use crate::pipeline::response::{DetectionResult, FusedFace, ResponseAssembler};
use crate::shared::bbox::with_min_size;
use crate::shared::constants::UNTRACKED_ID;
use crate::shared::frame::Frame;
use crate::tracking::association::AssociationMatcher;
use crate::tracking::fusion::FusedSignals;
use crate::tracking::track_state::Observation;
use crate::tracking::track_state_store::TrackStateStore;
use crate::video::domain::frame_decoder::FrameDecoder;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessingMode {
    /// Still image: oracle output is formatted directly, no tracking.
    Static,
    /// Video frame: tracker, association and temporal fusion.
    Live,
}

impl ProcessingMode {
    pub fn from_static_flag(is_static: bool) -> Self {
        if is_static {
            ProcessingMode::Static
        } else {
            ProcessingMode::Live
        }
    }
}

/// Fallbacks for demographics in static mode, where there is no history.
#[derive(Clone, Debug, PartialEq)]
struct StaticDefaults {
    age: u32,
    gender: Gender,
    valid_age_range: RangeInclusive<u32>,
}

/// Frame in, stabilized face list out.
///
/// Any decode, oracle or tracker fault turns into an empty result; callers
/// never see an error. Safe to share across threads: the tracker is
/// serialized behind a mutex and the track store locks per track.
pub struct FacePipeline {
    decoder: Box<dyn FrameDecoder>,
    oracle: Box<dyn FaceOracle>,
    tracker: Mutex<Box<dyn FaceTracker>>,
    store: TrackStateStore,
    matcher: AssociationMatcher,
    assembler: ResponseAssembler,
    static_defaults: StaticDefaults,
    logger: Mutex<Box<dyn PipelineLogger>>,
    next_index: AtomicUsize,
}

impl FacePipeline {
    pub fn new(
        decoder: Box<dyn FrameDecoder>,
        oracle: Box<dyn FaceOracle>,
        tracker: Box<dyn FaceTracker>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            decoder,
            oracle,
            tracker: Mutex::new(tracker),
            store: TrackStateStore::new(config.store_config()),
            matcher: AssociationMatcher::new(config.iou_threshold),
            assembler: ResponseAssembler::new(
                config.liveness_factor,
                config.age_confidence,
                config.gender_confidence,
            ),
            static_defaults: StaticDefaults {
                age: config.default_age,
                gender: config.default_gender,
                valid_age_range: config.valid_age_range.clone(),
            },
            logger: Mutex::new(Box::new(NullPipelineLogger)),
            next_index: AtomicUsize::new(0),
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = Mutex::new(logger);
        self
    }

    pub fn store(&self) -> &TrackStateStore {
        &self.store
    }

    /// Processes the next frame of the caller's stream.
    pub fn detect(&self, bytes: &[u8], is_static: bool) -> DetectionResult {
        let index = self.reserve_indices(1);
        self.process(index, bytes, ProcessingMode::from_static_flag(is_static))
    }

    /// Processes a frame whose stream position is already known.
    pub fn process(&self, index: usize, bytes: &[u8], mode: ProcessingMode) -> DetectionResult {
        match self.try_process(index, bytes, mode) {
            Ok(result) => result,
            Err(e) => {
                log::warn!("Frame {index}: {e}; returning empty result");
                self.logger().metric(metric::DEGRADED_FRAMES, 1.0);
                DetectionResult::empty()
            }
        }
    }

    /// Claims `count` consecutive frame indices; returns the first.
    pub fn reserve_indices(&self, count: usize) -> usize {
        self.next_index.fetch_add(count, Ordering::SeqCst)
    }

    pub fn report_progress(&self, current: usize, total: usize) {
        self.logger().progress(current, total);
    }

    pub fn summary(&self) {
        self.logger().summary();
    }

    /// Forgets every track history.
    pub fn reset(&self) {
        self.store.clear();
    }

    fn try_process(
        &self,
        index: usize,
        bytes: &[u8],
        mode: ProcessingMode,
    ) -> Result<DetectionResult, PipelineError> {
        let start = Instant::now();
        let frame = self.decoder.decode(bytes, index)?;
        self.record_timing(stage::DECODE, start);

        let start = Instant::now();
        let detections = self.oracle.analyze(&frame)?;
        self.record_timing(stage::ANALYZE, start);

        let faces = match mode {
            ProcessingMode::Static => self.static_faces(&frame, &detections),
            ProcessingMode::Live => self.live_faces(&frame, &detections)?,
        };
        self.logger().metric(metric::FACES, faces.len() as f64);
        Ok(self.assembler.assemble(faces))
    }

    fn static_faces(&self, frame: &Frame, detections: &[RawDetection]) -> Vec<FusedFace> {
        let defaults = &self.static_defaults;
        detections
            .iter()
            .map(|det| {
                let age = det
                    .age
                    .as_ref()
                    .and_then(|raw| raw.to_age(&defaults.valid_age_range).map_err(log_dropped).ok())
                    .unwrap_or(defaults.age);
                let gender = det
                    .gender
                    .as_ref()
                    .and_then(|raw| raw.to_gender().map_err(log_dropped).ok())
                    .unwrap_or(defaults.gender);
                let signals = FusedSignals {
                    age,
                    gender,
                    embedding: det.embedding.clone(),
                };
                self.assembler.face(
                    UNTRACKED_ID,
                    &det.bbox,
                    (frame.width(), frame.height()),
                    det.det_score,
                    signals,
                )
            })
            .collect()
    }

    fn live_faces(
        &self,
        frame: &Frame,
        detections: &[RawDetection],
    ) -> Result<Vec<FusedFace>, PipelineError> {
        let evicted = self.store.begin_frame();
        if evicted > 0 {
            log::debug!("Frame {}: evicted {evicted} idle tracks", frame.index());
        }

        let start = Instant::now();
        let tracks = self.update_tracker(frame, detections)?;
        self.record_timing(stage::TRACK, start);

        let start = Instant::now();
        let mut faces = Vec::with_capacity(tracks.len());
        for track in &tracks {
            let Some(assoc) = self.matcher.best_match(&track.bbox, detections) else {
                log::debug!(
                    "Frame {}: track {} has no detection above IoU {}",
                    frame.index(),
                    track.track_id,
                    self.matcher.iou_threshold()
                );
                continue;
            };
            let observation = Observation::from_detection(&detections[assoc.index]);
            let (fused, dropped) = self.store.observe_and_fuse(track.track_id, observation);
            for signal in dropped {
                log::debug!("Track {}: {signal}", track.track_id);
            }
            faces.push(self.assembler.face(
                track.track_id as i64,
                &track.bbox,
                (frame.width(), frame.height()),
                track.confidence,
                fused,
            ));
        }
        self.record_timing(stage::FUSE, start);
        self.logger()
            .metric(metric::TRACKED_IDENTITIES, self.store.len() as f64);

        Ok(faces)
    }

    fn update_tracker(
        &self,
        frame: &Frame,
        detections: &[RawDetection],
    ) -> Result<Vec<ConfirmedTrack>, PipelineError> {
        let inputs: Vec<TrackerDetection> = detections
            .iter()
            .enumerate()
            .map(|(i, det)| TrackerDetection {
                bbox: with_min_size(&det.bbox, 1.0),
                score: det.det_score,
                label: format!("face_{i}"),
            })
            .collect();
        let embeddings: Vec<Vec<f32>> = detections.iter().map(|d| d.embedding.clone()).collect();

        let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(tracker.update(&inputs, frame, &embeddings)?)
    }

    fn logger(&self) -> MutexGuard<'_, Box<dyn PipelineLogger>> {
        self.logger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_timing(&self, stage: &str, start: Instant) {
        let ms = start.elapsed().as_secs_f64() * 1000.0;
        self.logger().timing(stage, ms);
    }
}

fn log_dropped(signal: MalformedSignal) {
    log::debug!("Static frame: {signal}; using default");
}
