/// YOLO face box detector using ONNX Runtime via `ort`.
///
/// Handles letterbox preprocessing, inference and NMS. Keypoint columns of
/// pose-style models are ignored; only boxes and scores come out.
use std::path::Path;

use crate::shared::bbox::{bbox_iou, BBox};
use crate::shared::frame::Frame;

use super::onnx_session::{declared_input_size, load_session};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// A scored face box in original frame coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredBox {
    pub bbox: BBox,
    pub score: f64,
}

pub struct YoloFaceDetector {
    session: ort::session::Session,
    confidence: f64,
    nms_iou: f64,
    input_size: u32,
}

impl YoloFaceDetector {
    pub fn new(model_path: &Path, confidence: f64, nms_iou: f64) -> Result<Self, BoxError> {
        let session = load_session(model_path)?;
        let input_size = declared_input_size(&session).unwrap_or(DEFAULT_INPUT_SIZE);
        Ok(Self {
            session,
            confidence,
            nms_iou,
            input_size,
        })
    }

    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<ScoredBox>, BoxError> {
        let (input_tensor, scale, pad_x, pad_y) = letterbox(frame, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        if shape.len() != 3 {
            return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
        }
        // [1, features, detections] when features < detections, else [1, detections, features]
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        if num_feats < 5 {
            return Err(format!("YOLO output has {num_feats} features, need 5").into());
        }
        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
        let at = |det: usize, feat: usize| -> f64 {
            if transposed {
                data[feat * num_dets + det] as f64
            } else {
                data[det * num_feats + feat] as f64
            }
        };

        let mut boxes = Vec::new();
        for i in 0..num_dets {
            let score = at(i, 4);
            if score < self.confidence {
                continue;
            }
            let (cx, cy, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));
            boxes.push(ScoredBox {
                bbox: unletterbox(
                    [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
                    scale,
                    pad_x,
                    pad_y,
                ),
                score,
            });
        }

        Ok(nms(boxes, self.nms_iou))
    }
}

/// Letterbox-resize a frame to `target_size` × `target_size`.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(frame: &Frame, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    // Padding is 114/255 gray, YOLO convention
    let gray = 114.0f32 / 255.0;
    let mut tensor =
        ndarray::Array4::<f32>::from_elem((1, 3, target_size as usize, target_size as usize), gray);

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

fn unletterbox(b: BBox, scale: f64, pad_x: u32, pad_y: u32) -> BBox {
    let px = pad_x as f64;
    let py = pad_y as f64;
    [
        (b[0] - px) / scale,
        (b[1] - py) / scale,
        (b[2] - px) / scale,
        (b[3] - py) / scale,
    ]
}

/// Greedy NMS: highest score first, suppress boxes overlapping a kept one.
fn nms(mut boxes: Vec<ScoredBox>, iou_thresh: f64) -> Vec<ScoredBox> {
    boxes.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<ScoredBox> = Vec::with_capacity(boxes.len());
    for b in boxes {
        if keep.iter().all(|k| bbox_iou(&k.bbox, &b.bbox) <= iou_thresh) {
            keep.push(b);
        }
    }
    keep
}
