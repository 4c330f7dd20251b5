use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use facetrack_core::detection::domain::face_oracle::FaceOracle;
use facetrack_core::detection::infrastructure::bytetrack_tracker::ByteTracker;
use facetrack_core::detection::infrastructure::onnx_face_oracle::OnnxFaceOracle;
use facetrack_core::detection::infrastructure::replay_face_oracle::ReplayFaceOracle;
use facetrack_core::pipeline::batch_executor::BatchExecutor;
use facetrack_core::pipeline::config::PipelineConfig;
use facetrack_core::pipeline::face_pipeline::{FacePipeline, ProcessingMode};
use facetrack_core::pipeline::pipeline_logger::SummaryPipelineLogger;
use facetrack_core::pipeline::response::DetectionEnvelope;
use facetrack_core::shared::constants::{
    EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL, GENDERAGE_MODEL_NAME, IMAGE_EXTENSIONS,
    YOLO_MODEL_NAME, YOLO_MODEL_URL,
};
use facetrack_core::shared::model_resolver::{self, ModelSource};
use facetrack_core::video::infrastructure::image_frame_decoder::ImageFrameDecoder;

/// Identity-persistent face tracking over a sequence of image frames.
///
/// Prints one `{"result": ...}` JSON line per frame, in input order.
#[derive(Parser)]
#[command(name = "facetrack")]
struct Cli {
    /// Frame image files, or directories of frames (sorted by file name).
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Treat every frame as an independent still image (no tracking).
    #[arg(long = "static")]
    is_static: bool,

    /// JSON config file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Replay recorded oracle output instead of running ONNX models.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Directory searched for model files before the user cache.
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Face detector model path.
    #[arg(long)]
    detector_model: Option<PathBuf>,

    /// Face embedding model path.
    #[arg(long)]
    embedder_model: Option<PathBuf>,

    /// Gender/age model path. Without one, demographics use defaults.
    #[arg(long)]
    genderage_model: Option<PathBuf>,

    /// Worker threads for static frames (default: available cores).
    #[arg(long)]
    jobs: Option<usize>,

    /// Minimum IoU for re-associating a track with a detection.
    #[arg(long)]
    iou_threshold: Option<f64>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Live frames a track may go unseen before its history is dropped.
    #[arg(long)]
    max_idle_frames: Option<u64>,

    /// Tracker matches required before a track is reported.
    #[arg(long)]
    min_hits: Option<usize>,

    /// Log per-stage timing and a run summary.
    #[arg(long)]
    summary: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let frame_paths = collect_frames(&cli.inputs)?;
    if frame_paths.is_empty() {
        return Err("No image frames found in the given inputs".into());
    }

    let oracle = build_oracle(&cli, &config)?;
    let mut pipeline = FacePipeline::new(
        Box::new(ImageFrameDecoder::new()),
        oracle,
        Box::new(ByteTracker::new(config.tracker.clone())),
        &config,
    );
    if cli.summary {
        pipeline = pipeline.with_logger(Box::new(SummaryPipelineLogger::default()));
    }

    let executor = match cli.jobs {
        Some(n) => BatchExecutor::new(n),
        None => BatchExecutor::default(),
    };
    let mode = ProcessingMode::from_static_flag(cli.is_static);
    log::info!(
        "Processing {} frames ({mode:?}, {} workers)",
        frame_paths.len(),
        executor.workers()
    );
    let frames = frame_paths.iter().map(|path| read_frame(path));
    let results = executor.run(&pipeline, frames, mode);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for result in results {
        serde_json::to_writer(&mut out, &DetectionEnvelope::from(result))?;
        writeln!(out)?;
    }
    Ok(())
}

fn build_config(cli: &Cli) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(iou) = cli.iou_threshold {
        config.iou_threshold = iou;
    }
    if let Some(confidence) = cli.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(
                format!("Confidence must be between 0.0 and 1.0, got {confidence}").into(),
            );
        }
        config.oracle.confidence = confidence;
    }
    if let Some(frames) = cli.max_idle_frames {
        config.max_idle_frames = frames;
    }
    if let Some(hits) = cli.min_hits {
        config.tracker.min_hits = hits;
    }
    config.validate()?;
    Ok(config)
}

fn build_oracle(
    cli: &Cli,
    config: &PipelineConfig,
) -> Result<Box<dyn FaceOracle>, Box<dyn std::error::Error>> {
    if let Some(path) = &cli.replay {
        return Ok(Box::new(ReplayFaceOracle::from_json_path(path)?));
    }

    let search_dir = cli.model_dir.as_deref();
    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let detector = model_resolver::resolve(
        ModelSource {
            name: YOLO_MODEL_NAME,
            url: Some(YOLO_MODEL_URL),
        },
        cli.detector_model.as_deref(),
        search_dir,
        Some(Box::new(download_progress)),
    )?;
    log::info!("Resolving model: {EMBEDDING_MODEL_NAME}");
    let embedder = model_resolver::resolve(
        ModelSource {
            name: EMBEDDING_MODEL_NAME,
            url: Some(EMBEDDING_MODEL_URL),
        },
        cli.embedder_model.as_deref(),
        search_dir,
        Some(Box::new(download_progress)),
    )?;
    let genderage = model_resolver::resolve_optional(
        ModelSource {
            name: GENDERAGE_MODEL_NAME,
            url: None,
        },
        cli.genderage_model.as_deref(),
        search_dir,
    )?;

    Ok(Box::new(OnnxFaceOracle::new(
        &detector,
        &embedder,
        genderage.as_deref(),
        config.oracle,
    )?))
}

/// Expands directories to their image files, sorted by name.
fn collect_frames(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut frames = Vec::new();
    for input in inputs {
        if input.is_dir() {
            let mut entries: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| is_image(path))
                .collect();
            entries.sort();
            frames.extend(entries);
        } else {
            frames.push(input.clone());
        }
    }
    Ok(frames)
}

/// Unreadable files become empty input, which the pipeline reports as an
/// empty result for that frame.
fn read_frame(path: &Path) -> Vec<u8> {
    std::fs::read(path).unwrap_or_else(|e| {
        log::warn!("Cannot read {}: {e}", path.display());
        Vec::new()
    })
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading model... {pct}%");
        if downloaded >= total {
            eprintln!();
        }
    } else {
        eprint!("\rDownloading model... {downloaded} bytes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("facetrack").chain(args.iter().copied()))
    }

    #[test]
    fn test_overrides_apply_on_top_of_defaults() {
        let cli = parse(&[
            "a.jpg",
            "--iou-threshold",
            "0.5",
            "--confidence",
            "0.3",
            "--min-hits",
            "3",
        ]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.iou_threshold, 0.5);
        assert_eq!(config.oracle.confidence, 0.3);
        assert_eq!(config.tracker.min_hits, 3);
        assert_eq!(config.age_history, 7);
    }

    #[test]
    fn test_invalid_override_rejected() {
        assert!(build_config(&parse(&["a.jpg", "--iou-threshold", "1.5"])).is_err());
        assert!(build_config(&parse(&["a.jpg", "--confidence", "2"])).is_err());
    }

    #[test]
    fn test_static_flag() {
        assert!(parse(&["a.jpg", "--static"]).is_static);
        assert!(!parse(&["a.jpg"]).is_static);
    }

    #[test]
    fn test_collect_frames_expands_directory_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.jpg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let extra = PathBuf::from("explicit.webp");

        let frames = collect_frames(&[dir.path().to_path_buf(), extra.clone()]).unwrap();

        assert_eq!(
            frames,
            vec![dir.path().join("a.jpg"), dir.path().join("b.png"), extra]
        );
    }

    #[test]
    fn test_unreadable_frame_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_frame(&dir.path().join("missing.jpg")).is_empty());
    }

    #[test]
    fn test_is_image() {
        assert!(is_image(Path::new("frame_001.JPG")));
        assert!(!is_image(Path::new("video.mp4")));
        assert!(!is_image(Path::new("noext")));
    }
}
