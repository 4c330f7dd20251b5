pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

/// Gender/age model has no public download; it is only picked up from disk.
pub const GENDERAGE_MODEL_NAME: &str = "genderage.onnx";

/// Max frames a track can be lost before the tracker drops it (~1 second at 30 fps).
pub const TRACKER_MAX_LOST: usize = 30;

/// Minimum IoU for a confirmed track to be re-associated with a raw detection.
pub const DEFAULT_ASSOCIATION_IOU: f64 = 0.3;

pub const DEFAULT_AGE_HISTORY: usize = 7;
pub const DEFAULT_GENDER_HISTORY: usize = 7;
pub const DEFAULT_EMBEDDING_HISTORY: usize = 5;

/// ArcFace embedding dimensionality; also the size of the zero embedding
/// emitted for a track without embedding history.
pub const DEFAULT_EMBEDDING_DIM: usize = 512;

pub const DEFAULT_AGE: u32 = 25;

/// Live frames a track may go unobserved before its history is evicted.
/// Twice the tracker's own retention so a re-found track keeps its history.
pub const DEFAULT_MAX_IDLE_FRAMES: u64 = 2 * TRACKER_MAX_LOST as u64;

pub const DEFAULT_MAX_TRACKS: usize = 1024;

/// Liveness is a confidence-derived proxy, not a liveness model.
pub const DEFAULT_LIVENESS_FACTOR: f64 = 0.98;

pub const DEFAULT_AGE_CONFIDENCE: f64 = 0.9;
pub const DEFAULT_GENDER_CONFIDENCE: f64 = 0.95;

/// Track id reported for faces emitted without tracking (static mode).
pub const UNTRACKED_ID: i64 = -1;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
