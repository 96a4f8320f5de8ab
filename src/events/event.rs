use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tracker::TrackId;

/// Kind of temporal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum EventKind {
    /// Object stayed within a small radius for the configured window
    StationaryWarning,
    /// Object's latest position moved inside a configured zone
    ZoneEntry,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::StationaryWarning => "STATIONARY_WARNING",
            EventKind::ZoneEntry => "ZONE_ENTRY",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of an emitted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub frame_index: u64,
    pub kind: EventKind,
    pub track_id: TrackId,
    pub detail: String,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} - {}", self.frame_index, self.kind, self.detail)
    }
}
