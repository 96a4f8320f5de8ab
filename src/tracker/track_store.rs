//! Track store: IoU association, track creation, update and eviction.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::tracker::matching::{self, AssignmentResult, Detection, DetectionError};
use crate::tracker::rect::Rect;
use crate::tracker::track::{Track, TrackId};

/// How detections are assigned to live tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationMethod {
    /// Minimum-cost assignment (Jonker-Volgenant), robust to crossing trajectories
    #[default]
    Optimal,
    /// Greedy by descending IoU
    Greedy,
}

/// Configuration for the [`TrackStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Minimum IoU for a track/detection pair to be accepted as a match.
    pub min_iou: f32,
    /// Consecutive unmatched frames after which a track is evicted.
    pub grace_period: u32,
    /// Number of position samples retained per track.
    pub history_len: usize,
    /// Detections scoring below this are dropped before association.
    pub min_score: f32,
    pub method: AssociationMethod,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_iou: 0.3,
            grace_period: 30,
            history_len: 300,
            min_score: 0.0,
            method: AssociationMethod::Optimal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackStoreError {
    #[error("frame {frame_index} was already applied")]
    DuplicateFrame { frame_index: u64 },
    #[error("frame {frame_index} arrived after frame {last}")]
    OutOfOrderFrame { frame_index: u64, last: u64 },
}

/// A detection refused before association, with its position in the input list.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedDetection {
    pub index: usize,
    pub detection: Detection,
    pub error: DetectionError,
}

/// Owns the set of live tracks across frames.
#[derive(Debug, Clone)]
pub struct TrackStore {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u64,
    last_frame: Option<u64>,
    rejected: Vec<RejectedDetection>,
    evicted: Vec<TrackId>,
}

impl Default for TrackStore {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl TrackStore {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
            last_frame: None,
            rejected: Vec::new(),
            evicted: Vec::new(),
        }
    }

    /// Associate `detections` with live tracks for `frame_index` and return the live set.
    ///
    /// Frame indices must strictly increase; a repeated or older index is
    /// rejected and leaves the store untouched. Invalid detections are skipped
    /// and listed in [`TrackStore::rejected`].
    pub fn update(
        &mut self,
        frame_index: u64,
        detections: Vec<Detection>,
    ) -> Result<&[Track], TrackStoreError> {
        self.check_frame(frame_index)?;
        self.last_frame = Some(frame_index);
        self.rejected.clear();
        self.evicted.clear();

        let detections = self.screen(frame_index, detections);

        // Step 1: associate against each track's last known box
        let track_rects: Vec<Rect> = self.tracks.iter().map(Track::bbox).collect();
        let det_rects: Vec<Rect> = detections.iter().map(|d| d.bbox).collect();
        let dists = matching::iou_distance(&track_rects, &det_rects);
        let thresh = 1.0 - self.config.min_iou;

        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = match self.config.method {
            AssociationMethod::Optimal => matching::linear_assignment(&dists, thresh)
                .unwrap_or_else(|| {
                    warn!(frame_index, "optimal assignment failed, falling back to greedy");
                    matching::greedy_assignment(&dists, thresh)
                }),
            AssociationMethod::Greedy => matching::greedy_assignment(&dists, thresh),
        };

        // Step 2: update matched tracks
        for (itrack, idet) in matches {
            self.tracks[itrack].update(&detections[idet], frame_index)?;
        }

        // Step 3: age unmatched tracks, evict expired ones
        let mut expired = vec![false; self.tracks.len()];
        for itrack in unmatched_tracks {
            let track = &mut self.tracks[itrack];
            if track.mark_missed() >= self.config.grace_period {
                debug!(frame_index, track_id = %track.id(), "evicting track");
                self.evicted.push(track.id());
                expired[itrack] = true;
            }
        }
        let mut index = 0;
        self.tracks.retain(|_| {
            let keep = !expired[index];
            index += 1;
            keep
        });

        // Step 4: spawn tracks for unmatched detections
        for idet in unmatched_detections {
            let id = TrackId(self.next_id);
            self.next_id += 1;
            debug!(frame_index, track_id = %id, "new track");
            self.tracks.push(Track::new(
                id,
                &detections[idet],
                frame_index,
                self.config.history_len,
            ));
        }

        Ok(&self.tracks)
    }

    /// Fails if `frame_index` does not come after the last applied frame.
    pub fn check_frame(&self, frame_index: u64) -> Result<(), TrackStoreError> {
        match self.last_frame {
            Some(last) if frame_index == last => Err(TrackStoreError::DuplicateFrame { frame_index }),
            Some(last) if frame_index < last => {
                Err(TrackStoreError::OutOfOrderFrame { frame_index, last })
            }
            _ => Ok(()),
        }
    }

    /// Drop low-score detections and record invalid ones.
    fn screen(&mut self, frame_index: u64, detections: Vec<Detection>) -> Vec<Detection> {
        let mut accepted = Vec::with_capacity(detections.len());
        for (index, detection) in detections.into_iter().enumerate() {
            if let Err(error) = detection.validate() {
                warn!(frame_index, index, %error, "skipping malformed detection");
                self.rejected.push(RejectedDetection {
                    index,
                    detection,
                    error,
                });
            } else if detection.score >= self.config.min_score {
                accepted.push(detection);
            }
        }
        accepted
    }

    /// Live tracks, in creation order.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Live tracks for annotation. Identity, box and history stay read-only.
    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id() == id)
    }

    /// Detections refused during the last successful update.
    pub fn rejected(&self) -> &[RejectedDetection] {
        &self.rejected
    }

    /// Identities evicted during the last successful update.
    pub fn evicted(&self) -> &[TrackId] {
        &self.evicted
    }

    pub fn last_frame(&self) -> Option<u64> {
        self.last_frame
    }

    /// Number of identities ever allocated.
    pub fn created_count(&self) -> u64 {
        self.next_id - 1
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}
