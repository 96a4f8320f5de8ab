use serde::{Deserialize, Serialize};

/// Lifecycle state of a live track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackState {
    /// Matched to a detection in the most recent frame
    #[default]
    Tracked,
    /// Unmatched in the most recent frame, still inside the grace period
    Lost,
}
