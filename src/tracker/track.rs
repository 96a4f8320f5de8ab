//! A persistent object identity and its bounded motion history.

use std::collections::VecDeque;
use std::fmt;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::tracker::matching::Detection;
use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackState;
use crate::tracker::track_store::TrackStoreError;

/// Unique track identity. Allocated once by the track store, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Visual group assigned by the grouping collaborator.
pub type GroupId = u32;

/// Box center observed at a given frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub x: f32,
    pub y: f32,
    pub frame_index: u64,
}

impl PositionSample {
    pub fn distance_to(&self, other: &PositionSample) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Text read from a track's crop, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextReading {
    pub text: String,
    pub frame_index: u64,
}

/// Single object track.
///
/// Identity, box and history are owned by the [`TrackStore`](super::TrackStore);
/// everything else can only be annotated through the `set_*`/`merge_*` methods.
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    state: TrackState,
    bbox: Rect,
    score: f32,
    class_id: u32,
    label: String,
    start_frame: u64,
    last_seen_frame: u64,
    missed_frames: u32,
    history: VecDeque<PositionSample>,
    history_cap: usize,
    group_id: Option<GroupId>,
    text: Option<TextReading>,
    map_position: Option<Point2<f64>>,
}

impl Track {
    pub(crate) fn new(id: TrackId, det: &Detection, frame_index: u64, history_cap: usize) -> Self {
        let history_cap = history_cap.max(1);
        let mut track = Self {
            id,
            state: TrackState::Tracked,
            bbox: det.bbox,
            score: det.score,
            class_id: det.class_id,
            label: det.label.clone(),
            start_frame: frame_index,
            last_seen_frame: frame_index,
            missed_frames: 0,
            history: VecDeque::with_capacity(history_cap),
            history_cap,
            group_id: None,
            text: None,
            map_position: None,
        };
        track.push_sample(frame_index);
        track
    }

    /// Apply a matched detection for `frame_index`.
    ///
    /// Fails without touching the track if a sample for this or a later frame exists.
    pub(crate) fn update(&mut self, det: &Detection, frame_index: u64) -> Result<(), TrackStoreError> {
        if let Some(last) = self.history.back() {
            if frame_index <= last.frame_index {
                return Err(TrackStoreError::DuplicateFrame { frame_index });
            }
        }
        self.bbox = det.bbox;
        self.score = det.score;
        self.class_id = det.class_id;
        self.label.clone_from(&det.label);
        self.last_seen_frame = frame_index;
        self.missed_frames = 0;
        self.state = TrackState::Tracked;
        self.push_sample(frame_index);
        Ok(())
    }

    /// Record one more consecutive frame without a match and return the new count.
    pub(crate) fn mark_missed(&mut self) -> u32 {
        self.missed_frames += 1;
        self.state = TrackState::Lost;
        self.missed_frames
    }

    fn push_sample(&mut self, frame_index: u64) {
        let (x, y) = self.bbox.center();
        if self.history.len() == self.history_cap {
            self.history.pop_front();
        }
        self.history.push_back(PositionSample { x, y, frame_index });
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn bbox(&self) -> Rect {
        self.bbox
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn class_id(&self) -> u32 {
        self.class_id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn center(&self) -> (f32, f32) {
        self.bbox.center()
    }

    pub fn start_frame(&self) -> u64 {
        self.start_frame
    }

    pub fn last_seen_frame(&self) -> u64 {
        self.last_seen_frame
    }

    pub fn missed_frames(&self) -> u32 {
        self.missed_frames
    }

    /// True when the track was matched at `frame_index`.
    pub fn is_observed_at(&self, frame_index: u64) -> bool {
        self.state == TrackState::Tracked && self.last_seen_frame == frame_index
    }

    /// Position samples, oldest first, strictly increasing in frame index.
    pub fn history(&self) -> &VecDeque<PositionSample> {
        &self.history
    }

    /// The most recent `n` samples, oldest first. `None` if fewer are retained.
    pub fn recent_history(&self, n: usize) -> Option<impl Iterator<Item = &PositionSample>> {
        let len = self.history.len();
        if n == 0 || len < n {
            return None;
        }
        Some(self.history.range(len - n..))
    }

    pub fn group_id(&self) -> Option<GroupId> {
        self.group_id
    }

    pub fn text(&self) -> Option<&TextReading> {
        self.text.as_ref()
    }

    pub fn map_position(&self) -> Option<Point2<f64>> {
        self.map_position
    }

    pub fn set_group(&mut self, group_id: Option<GroupId>) {
        self.group_id = group_id;
    }

    /// Sticky merge: empty or whitespace-only reads never replace a stored value.
    /// Returns true when the stored reading changed.
    pub fn merge_text(&mut self, text: &str, frame_index: u64) -> bool {
        let text = text.trim();
        if text.is_empty() {
            return false;
        }
        self.text = Some(TextReading {
            text: text.to_owned(),
            frame_index,
        });
        true
    }

    pub fn set_map_position(&mut self, position: Option<Point2<f64>>) {
        self.map_position = position;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32) -> Detection {
        Detection::new(x, 0.0, x + 10.0, 10.0, 0.9).with_class(0, "person")
    }

    #[test]
    fn test_history_is_capped() {
        let mut track = Track::new(TrackId(1), &det(0.0), 0, 3);
        for frame in 1..5 {
            track.update(&det(frame as f32), frame).unwrap();
        }
        let frames: Vec<u64> = track.history().iter().map(|s| s.frame_index).collect();
        assert_eq!(frames, vec![2, 3, 4]);
        assert_eq!(track.history().back().unwrap().x, 9.0);
    }

    #[test]
    fn test_update_rejects_same_frame() {
        let mut track = Track::new(TrackId(1), &det(0.0), 7, 10);
        assert_eq!(
            track.update(&det(1.0), 7),
            Err(TrackStoreError::DuplicateFrame { frame_index: 7 })
        );
        assert_eq!(track.history().len(), 1);
        assert_eq!(track.bbox().x1, 0.0);
    }

    #[test]
    fn test_missed_then_matched_resets_counter() {
        let mut track = Track::new(TrackId(1), &det(0.0), 0, 10);
        assert_eq!(track.mark_missed(), 1);
        assert_eq!(track.mark_missed(), 2);
        assert_eq!(track.state(), TrackState::Lost);

        track.update(&det(1.0), 3).unwrap();
        assert_eq!(track.missed_frames(), 0);
        assert!(track.is_observed_at(3));
    }

    #[test]
    fn test_text_merge_is_sticky() {
        let mut track = Track::new(TrackId(1), &det(0.0), 0, 10);
        assert!(track.merge_text("23", 0));
        assert!(!track.merge_text("", 30));
        assert!(!track.merge_text("   ", 60));
        assert_eq!(
            track.text(),
            Some(&TextReading {
                text: "23".into(),
                frame_index: 0
            })
        );
        assert!(track.merge_text("7", 90));
        assert_eq!(track.text().unwrap().frame_index, 90);
    }

    #[test]
    fn test_recent_history() {
        let mut track = Track::new(TrackId(1), &det(0.0), 0, 10);
        track.update(&det(2.0), 1).unwrap();
        track.update(&det(4.0), 2).unwrap();

        assert!(track.recent_history(4).is_none());
        let frames: Vec<u64> = track.recent_history(2).unwrap().map(|s| s.frame_index).collect();
        assert_eq!(frames, vec![1, 2]);
    }
}
