use crate::pipeline::face_pipeline::{FacePipeline, ProcessingMode};
use crate::pipeline::response::DetectionResult;

const DEFAULT_CHANNEL_CAPACITY: usize = 8;

/// Runs a batch of encoded frames through a [`FacePipeline`].
///
/// Static frames are independent, so they fan out over `workers` threads fed
/// by a bounded queue. Live frames depend on tracker state from the previous
/// frame and run one at a time in order. Either way results come back in
/// input order.
pub struct BatchExecutor {
    workers: usize,
    channel_capacity: usize,
}

impl BatchExecutor {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Frames are pulled from `frames` as workers free up, so a lazy iterator
    /// (such as one reading files) keeps at most a bounded number of encoded
    /// frames in memory.
    pub fn run<I>(
        &self,
        pipeline: &FacePipeline,
        frames: I,
        mode: ProcessingMode,
    ) -> Vec<DetectionResult>
    where
        I: IntoIterator<Item = Vec<u8>>,
        I::IntoIter: ExactSizeIterator + Send,
    {
        let frames = frames.into_iter();
        let first_index = pipeline.reserve_indices(frames.len());
        let results = match mode {
            ProcessingMode::Static if self.workers > 1 && frames.len() > 1 => {
                self.run_parallel(pipeline, first_index, frames)
            }
            _ => run_sequential(pipeline, first_index, frames, mode),
        };
        pipeline.summary();
        results
    }

    fn run_parallel<I>(
        &self,
        pipeline: &FacePipeline,
        first_index: usize,
        frames: I,
    ) -> Vec<DetectionResult>
    where
        I: ExactSizeIterator<Item = Vec<u8>> + Send,
    {
        let total = frames.len();
        let (job_tx, job_rx) =
            crossbeam_channel::bounded::<(usize, Vec<u8>)>(self.channel_capacity);
        let (result_tx, result_rx) =
            crossbeam_channel::bounded::<(usize, DetectionResult)>(self.channel_capacity);

        let mut slots: Vec<Option<DetectionResult>> = vec![None; total];

        std::thread::scope(|scope| {
            scope.spawn(move || {
                for job in frames.enumerate() {
                    if job_tx.send(job).is_err() {
                        break;
                    }
                }
            });

            for _ in 0..self.workers.min(total) {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for (offset, bytes) in job_rx {
                        let result =
                            pipeline.process(first_index + offset, &bytes, ProcessingMode::Static);
                        if result_tx.send((offset, result)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(job_rx);
            drop(result_tx);

            let mut done = 0;
            for (offset, result) in result_rx {
                if let Some(slot) = slots.get_mut(offset) {
                    *slot = Some(result);
                }
                done += 1;
                pipeline.report_progress(done, total);
            }
        });

        slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(DetectionResult::empty))
            .collect()
    }
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new(
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        )
    }
}

fn run_sequential<I>(
    pipeline: &FacePipeline,
    first_index: usize,
    frames: I,
    mode: ProcessingMode,
) -> Vec<DetectionResult>
where
    I: ExactSizeIterator<Item = Vec<u8>>,
{
    let total = frames.len();
    frames
        .enumerate()
        .map(|(offset, bytes)| {
            let result = pipeline.process(first_index + offset, &bytes, mode);
            pipeline.report_progress(offset + 1, total);
            result
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_oracle::{FaceOracle, OracleError};
    use crate::detection::domain::face_tracker::{
        ConfirmedTrack, FaceTracker, TrackerDetection, TrackerError,
    };
    use crate::detection::domain::raw_detection::RawDetection;
    use crate::detection::infrastructure::bytetrack_tracker::ByteTracker;
    use crate::pipeline::config::PipelineConfig;
    use crate::shared::frame::Frame;
    use crate::video::domain::frame_decoder::{DecodeError, FrameDecoder};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    // --- Stubs ---

    /// Encodes the frame's "width" as the first byte so results are traceable.
    struct ByteDecoder;

    impl FrameDecoder for ByteDecoder {
        fn decode(&self, bytes: &[u8], index: usize) -> Result<Frame, DecodeError> {
            let w = *bytes.first().ok_or(DecodeError::Empty)? as u32;
            Ok(Frame::new(vec![0u8; (w * 10 * 3) as usize], w, 10, 3, index))
        }
    }

    /// One 5 px wide face, so its normalized width identifies the frame.
    struct WidthOracle;

    impl FaceOracle for WidthOracle {
        fn analyze(&self, _frame: &Frame) -> Result<Vec<RawDetection>, OracleError> {
            Ok(vec![RawDetection {
                bbox: [0.0, 0.0, 5.0, 10.0],
                det_score: 0.9,
                embedding: Vec::new(),
                age: None,
                gender: None,
            }])
        }
    }

    /// Counts frames as they reach the decoder.
    struct CountingDecoder(Arc<AtomicUsize>);

    impl FrameDecoder for CountingDecoder {
        fn decode(&self, bytes: &[u8], index: usize) -> Result<Frame, DecodeError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            ByteDecoder.decode(bytes, index)
        }
    }

    struct NeverTracker;

    impl FaceTracker for NeverTracker {
        fn update(
            &mut self,
            _detections: &[TrackerDetection],
            _frame: &Frame,
            _embeddings: &[Vec<f32>],
        ) -> Result<Vec<ConfirmedTrack>, TrackerError> {
            Err(TrackerError::new("not expected in static mode"))
        }
    }

    fn pipeline(tracker: Box<dyn FaceTracker>) -> FacePipeline {
        FacePipeline::new(
            Box::new(ByteDecoder),
            Box::new(WidthOracle),
            tracker,
            &PipelineConfig::default(),
        )
    }

    fn frames(widths: &[u8]) -> Vec<Vec<u8>> {
        widths.iter().map(|&w| vec![w]).collect()
    }

    #[test]
    fn test_parallel_static_preserves_order() {
        let p = pipeline(Box::new(NeverTracker));
        let widths: Vec<u8> = (10..60).collect();

        let results = BatchExecutor::new(4).run(&p, frames(&widths), ProcessingMode::Static);

        assert_eq!(results.len(), widths.len());
        for (result, &w) in results.iter().zip(&widths) {
            assert_eq!(result.total_faces, 1);
            assert_eq!(result.faces[0].track_id, -1);
            assert!((result.faces[0].bbox.width - 5.0 / w as f64).abs() < 1e-9);
        }
    }

    #[test]
    fn test_failed_frame_keeps_its_slot() {
        let p = pipeline(Box::new(NeverTracker));
        let mut batch = frames(&[20, 30, 40]);
        batch[1].clear();

        let results = BatchExecutor::new(3).run(&p, batch, ProcessingMode::Static);

        assert!(results[0].face_detected);
        assert!(!results[1].face_detected);
        assert!(results[2].face_detected);
    }

    #[test]
    fn test_live_frames_keep_identity() {
        let p = pipeline(Box::new(ByteTracker::default()));

        let results = BatchExecutor::new(4).run(&p, frames(&[50, 50, 50]), ProcessingMode::Live);

        let ids: Vec<i64> = results.iter().map(|r| r.faces[0].track_id).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.iter().all(|&id| id == ids[0] && id >= 0));
        assert_eq!(p.store().len(), 1);
    }

    #[test]
    fn test_indices_continue_across_batches() {
        let p = pipeline(Box::new(NeverTracker));
        let executor = BatchExecutor::new(2);
        executor.run(&p, frames(&[10, 10]), ProcessingMode::Static);
        executor.run(&p, frames(&[10, 10, 10]), ProcessingMode::Static);
        assert_eq!(p.reserve_indices(1), 5);
    }

    fn max_frames_in_flight(workers: usize, mode: ProcessingMode) -> usize {
        let decoded = Arc::new(AtomicUsize::new(0));
        let read = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let p = FacePipeline::new(
            Box::new(CountingDecoder(Arc::clone(&decoded))),
            Box::new(WidthOracle),
            Box::new(ByteTracker::default()),
            &PipelineConfig::default(),
        );

        let lazy = (0..200).map(|_| {
            let n = read.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(n - decoded.load(Ordering::SeqCst), Ordering::SeqCst);
            vec![20u8]
        });
        let results = BatchExecutor::new(workers).run(&p, lazy, mode);

        assert_eq!(results.len(), 200);
        assert_eq!(decoded.load(Ordering::SeqCst), 200);
        peak.load(Ordering::SeqCst)
    }

    #[test]
    fn test_parallel_reads_frames_on_demand() {
        let workers = 2;
        let peak = max_frames_in_flight(workers, ProcessingMode::Static);
        assert!(peak <= DEFAULT_CHANNEL_CAPACITY + workers + 1, "peak {peak}");
    }

    #[test]
    fn test_sequential_reads_one_frame_at_a_time() {
        assert_eq!(max_frames_in_flight(4, ProcessingMode::Live), 1);
    }

    #[test]
    fn test_empty_batch() {
        let p = pipeline(Box::new(NeverTracker));
        assert!(BatchExecutor::default()
            .run(&p, Vec::<Vec<u8>>::new(), ProcessingMode::Static)
            .is_empty());
    }

    #[test]
    fn test_worker_floor() {
        assert_eq!(BatchExecutor::new(0).workers(), 1);
    }
}
