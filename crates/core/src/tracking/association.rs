use crate::detection::domain::raw_detection::RawDetection;
use crate::shared::bbox::{bbox_iou, BBox};
use crate::shared::constants::DEFAULT_ASSOCIATION_IOU;

/// A raw detection paired with a confirmed track box.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Association {
    pub index: usize,
    pub iou: f64,
}

/// Recovers which raw detection a confirmed track box came from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AssociationMatcher {
    iou_threshold: f64,
}

impl AssociationMatcher {
    pub fn new(iou_threshold: f64) -> Self {
        Self { iou_threshold }
    }

    pub fn iou_threshold(&self) -> f64 {
        self.iou_threshold
    }

    /// Highest-IoU detection for `track_bbox`, if that IoU is strictly above
    /// the threshold. The first detection in list order wins ties.
    pub fn best_match(&self, track_bbox: &BBox, detections: &[RawDetection]) -> Option<Association> {
        let mut best: Option<Association> = None;
        for (index, det) in detections.iter().enumerate() {
            let iou = bbox_iou(track_bbox, &det.bbox);
            if best.map_or(true, |b| iou > b.iou) {
                best = Some(Association { index, iou });
            }
        }
        best.filter(|b| b.iou > self.iou_threshold)
    }
}

impl Default for AssociationMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_ASSOCIATION_IOU)
    }
}
