/// Simplified ByteTrack multi-object tracker with an appearance gate.
///
/// Two-stage association: high-confidence detections are matched first, then
/// low-confidence detections fill the remaining unmatched tracks. Only
/// high-confidence detections start new tracks. When both a track and a
/// detection carry an embedding, the pair must also be close in appearance.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::detection::domain::face_tracker::{
    ConfirmedTrack, FaceTracker, TrackId, TrackerDetection, TrackerError,
};
use crate::shared::bbox::{bbox_iou, BBox};
use crate::shared::constants::TRACKER_MAX_LOST;
use crate::shared::frame::Frame;

use super::math::cosine_distance;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ByteTrackConfig {
    /// Frames a track may go unmatched before it is dropped.
    pub max_lost: usize,
    /// Matches required before a track is reported.
    pub min_hits: usize,
    pub high_thresh: f64,
    pub match_thresh: f64,
    pub max_cosine_distance: f64,
}

impl Default for ByteTrackConfig {
    fn default() -> Self {
        Self {
            max_lost: TRACKER_MAX_LOST,
            min_hits: 1,
            high_thresh: 0.5,
            match_thresh: 0.3,
            max_cosine_distance: 0.4,
        }
    }
}

#[derive(Clone, Debug)]
struct Tracklet {
    id: TrackId,
    bbox: BBox,
    frames_lost: usize,
    hits: usize,
    matched: bool,
    score: f64,
    embedding: Option<Vec<f32>>,
}

impl Tracklet {
    fn confirmed(&self, min_hits: usize) -> bool {
        self.hits >= min_hits
    }
}

pub struct ByteTracker {
    config: ByteTrackConfig,
    tracks: Vec<Tracklet>,
    next_id: TrackId,
}

/// Borrowed view of one detection for matching.
#[derive(Clone, Copy)]
struct Candidate<'a> {
    index: usize,
    bbox: &'a BBox,
    score: f64,
    embedding: Option<&'a [f32]>,
}

impl ByteTracker {
    pub fn new(config: ByteTrackConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn step(&mut self, candidates: &[Candidate<'_>]) -> Vec<ConfirmedTrack> {
        let (high, low): (Vec<Candidate<'_>>, Vec<Candidate<'_>>) = candidates
            .iter()
            .partition(|c| c.score >= self.config.high_thresh);

        self.reset_match_flags();
        let num_existing = self.tracks.len();

        let all: Vec<usize> = (0..num_existing).collect();
        let matched_high = self.match_into(&all, &high);
        let unmatched: Vec<usize> = all.into_iter().filter(|&i| !self.tracks[i].matched).collect();
        self.match_into(&unmatched, &low);

        self.create_new_tracks(&high, &matched_high);
        self.age_unmatched_tracks(num_existing);

        self.active_tracks()
    }

    fn reset_match_flags(&mut self) {
        for track in &mut self.tracks {
            track.matched = false;
        }
    }

    /// Matches the tracks at `track_indices` against `candidates` and applies
    /// the matches. Returns the consumed detection indices.
    fn match_into(&mut self, track_indices: &[usize], candidates: &[Candidate<'_>]) -> HashSet<usize> {
        let pairs = self.greedy_match(track_indices, candidates);
        let mut consumed = HashSet::new();
        for (ti, ci) in pairs {
            let c = candidates[ci];
            let track = &mut self.tracks[ti];
            track.bbox = *c.bbox;
            track.frames_lost = 0;
            track.hits += 1;
            track.matched = true;
            track.score = c.score;
            if let Some(e) = c.embedding {
                track.embedding = Some(e.to_vec());
            }
            consumed.insert(c.index);
        }
        consumed
    }

    /// Greedy matching: admissible pairs sorted by descending IoU, each track
    /// and candidate used at most once.
    fn greedy_match(&self, track_indices: &[usize], candidates: &[Candidate<'_>]) -> Vec<(usize, usize)> {
        let mut pairs: Vec<(usize, usize, f64)> = Vec::new();
        for &ti in track_indices {
            let track = &self.tracks[ti];
            for (ci, c) in candidates.iter().enumerate() {
                let score = bbox_iou(&track.bbox, c.bbox);
                if score >= self.config.match_thresh && self.appearance_ok(track, c) {
                    pairs.push((ti, ci, score));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut used_tracks = HashSet::new();
        let mut used_cands = HashSet::new();
        let mut matches = Vec::new();
        for (ti, ci, _) in pairs {
            if !used_tracks.contains(&ti) && !used_cands.contains(&ci) {
                used_tracks.insert(ti);
                used_cands.insert(ci);
                matches.push((ti, ci));
            }
        }
        matches
    }

    fn appearance_ok(&self, track: &Tracklet, candidate: &Candidate<'_>) -> bool {
        match (&track.embedding, candidate.embedding) {
            (Some(a), Some(b)) => cosine_distance(a, b) <= self.config.max_cosine_distance,
            _ => true,
        }
    }

    fn create_new_tracks(&mut self, high: &[Candidate<'_>], consumed: &HashSet<usize>) {
        for c in high.iter().filter(|c| !consumed.contains(&c.index)) {
            self.tracks.push(Tracklet {
                id: self.next_id,
                bbox: *c.bbox,
                frames_lost: 0,
                hits: 1,
                matched: true,
                score: c.score,
                embedding: c.embedding.map(<[f32]>::to_vec),
            });
            self.next_id += 1;
        }
    }

    /// Unmatched confirmed tracks are kept up to `max_lost` frames for
    /// re-identification; unmatched tentative tracks are dropped at once.
    fn age_unmatched_tracks(&mut self, num_existing: usize) {
        for track in self.tracks.iter_mut().take(num_existing) {
            if !track.matched {
                track.frames_lost += 1;
            }
        }
        let max_lost = self.config.max_lost;
        let min_hits = self.config.min_hits;
        self.tracks.retain(|t| {
            t.frames_lost <= max_lost && (t.matched || t.confirmed(min_hits))
        });
    }

    /// Only confirmed tracks matched in this frame are reported.
    fn active_tracks(&self) -> Vec<ConfirmedTrack> {
        self.tracks
            .iter()
            .filter(|t| t.matched && t.confirmed(self.config.min_hits))
            .map(|t| ConfirmedTrack {
                track_id: t.id,
                bbox: t.bbox,
                confidence: t.score,
            })
            .collect()
    }
}

impl Default for ByteTracker {
    fn default() -> Self {
        Self::new(ByteTrackConfig::default())
    }
}

impl FaceTracker for ByteTracker {
    fn update(
        &mut self,
        detections: &[TrackerDetection],
        _frame: &Frame,
        embeddings: &[Vec<f32>],
    ) -> Result<Vec<ConfirmedTrack>, TrackerError> {
        if !embeddings.is_empty() && embeddings.len() != detections.len() {
            return Err(TrackerError::new(format!(
                "{} embeddings for {} detections",
                embeddings.len(),
                detections.len()
            )));
        }

        let candidates: Vec<Candidate<'_>> = detections
            .iter()
            .enumerate()
            .map(|(i, d)| Candidate {
                index: i,
                bbox: &d.bbox,
                score: d.score,
                embedding: embeddings
                    .get(i)
                    .filter(|e| !e.is_empty())
                    .map(Vec::as_slice),
            })
            .collect();

        Ok(self.step(&candidates))
    }
}
