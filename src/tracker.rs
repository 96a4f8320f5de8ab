mod matching;
mod rect;
mod track;
mod track_state;
mod track_store;

pub use matching::{
    AssignmentResult, Detection, DetectionError, greedy_assignment, iou_distance,
    linear_assignment,
};
pub use rect::{Rect, iou_batch};
pub use track::{GroupId, PositionSample, TextReading, Track, TrackId};
pub use track_state::TrackState;
pub use track_store::{
    AssociationMethod, RejectedDetection, TrackStore, TrackStoreError, TrackerConfig,
};
