use serde::{Deserialize, Serialize};

/// Absolute pixel box as `[x1, y1, x2, y2]`.
pub type BBox = [f64; 4];

/// IoU between two boxes represented as `[x1, y1, x2, y2]`.
///
/// Returns 0 for disjoint boxes and whenever the union area is not positive
/// (including NaN), so the result always lies in `[0, 1]`.
pub fn bbox_iou(a: &BBox, b: &BBox) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }

    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    let union = area_a + area_b - inter;
    if union.is_nan() || union <= 0.0 {
        return 0.0;
    }
    inter / union
}

/// Grows a box to at least `min_size` pixels on each axis, anchored at its
/// top-left corner.
pub fn with_min_size(bbox: &BBox, min_size: f64) -> BBox {
    let w = (bbox[2] - bbox[0]).max(min_size);
    let h = (bbox[3] - bbox[1]).max(min_size);
    [bbox[0], bbox[1], bbox[0] + w, bbox[1] + h]
}

/// Frame-relative box: every field is a fraction of the frame dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub xmin: f64,
    pub ymin: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedBox {
    /// Converts an absolute box to fractions of a `frame_width` × `frame_height`
    /// frame.
    ///
    /// Inverted boxes (`x2 < x1`) are not clamped: the width comes out negative
    /// and callers decide how to treat it.
    pub fn from_absolute(bbox: &BBox, frame_width: u32, frame_height: u32) -> Self {
        let fw = frame_width as f64;
        let fh = frame_height as f64;
        Self {
            xmin: bbox[0] / fw,
            ymin: bbox[1] / fh,
            width: (bbox[2] - bbox[0]) / fw,
            height: (bbox[3] - bbox[1]) / fh,
        }
    }
}
