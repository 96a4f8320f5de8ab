//! Per-track rules and the WATCHING/FLAGGED arming machine they drive.

use serde::{Deserialize, Serialize};

use crate::events::event::EventKind;
use crate::tracker::Track;

/// Arming state of one (track, rule) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArmState {
    /// Armed: the next trip emits an event
    #[default]
    Watching,
    /// Already reported: trips are suppressed until re-armed
    Flagged,
}

/// What a rule observed for a track this frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleSignal {
    /// Condition holds; carries the event detail.
    Trip(String),
    /// Condition clearly does not hold; re-arm.
    Rearm,
    /// Not enough information; keep the current state.
    Hold,
}

impl ArmState {
    /// Next state, and whether the transition emits an event.
    pub fn on_signal(self, signal: &RuleSignal) -> (ArmState, bool) {
        match (self, signal) {
            (ArmState::Watching, RuleSignal::Trip(_)) => (ArmState::Flagged, true),
            (ArmState::Flagged, RuleSignal::Trip(_)) => (ArmState::Flagged, false),
            (_, RuleSignal::Rearm) => (ArmState::Watching, false),
            (state, RuleSignal::Hold) => (state, false),
        }
    }
}

/// A condition evaluated on each track every frame.
pub trait EventRule {
    fn kind(&self) -> EventKind;

    fn evaluate(&self, track: &Track) -> RuleSignal;
}

/// Parameters of the dwell (stationary) rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DwellConfig {
    /// Number of most recent samples inspected, and the minimum frame span they must cover.
    pub window_frames: usize,
    /// Displacement in pixels below which the object counts as stationary.
    pub max_displacement: f32,
}

impl Default for DwellConfig {
    fn default() -> Self {
        Self::for_frame_rate(30.0, 3.0, 50.0)
    }
}

impl DwellConfig {
    /// Window of `seconds` at `fps`.
    pub fn for_frame_rate(fps: f32, seconds: f32, max_displacement: f32) -> Self {
        Self {
            window_frames: ((fps * seconds).round() as usize).max(1),
            max_displacement,
        }
    }
}

/// Emits `STATIONARY_WARNING` when the first and last samples of the recent
/// window lie closer than `max_displacement`.
#[derive(Debug, Clone)]
pub struct DwellRule {
    config: DwellConfig,
}

impl DwellRule {
    pub fn new(config: DwellConfig) -> Self {
        Self { config }
    }
}

impl EventRule for DwellRule {
    fn kind(&self) -> EventKind {
        EventKind::StationaryWarning
    }

    fn evaluate(&self, track: &Track) -> RuleSignal {
        let window = self.config.window_frames;
        let Some(mut recent) = track.recent_history(window) else {
            return RuleSignal::Hold;
        };
        let Some(first) = recent.next() else {
            return RuleSignal::Hold;
        };
        let last = recent.last().unwrap_or(first);

        // span counted inclusively: `window` consecutive frames cover `window` frames
        let span = last.frame_index - first.frame_index + 1;
        if span < window as u64 {
            return RuleSignal::Hold;
        }

        let displacement = first.distance_to(last);
        if displacement < self.config.max_displacement {
            RuleSignal::Trip(format!(
                "Object {} stationary for {} frames (moved {:.1} px)",
                track.id(),
                span,
                displacement
            ))
        } else {
            RuleSignal::Rearm
        }
    }
}

/// A named polygon in image space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    pub vertices: Vec<[f32; 2]>,
}

/// Emits `ZONE_ENTRY` when a track's latest position falls inside the zone.
#[derive(Debug, Clone)]
pub struct ZoneRule {
    zone: ZoneConfig,
}

impl ZoneRule {
    pub fn new(zone: ZoneConfig) -> Self {
        Self { zone }
    }

    /// Ray casting point-in-polygon test. Zones with fewer than 3 vertices contain nothing.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let vertices = &self.zone.vertices;
        if vertices.len() < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = vertices.len() - 1;
        for i in 0..vertices.len() {
            let [xi, yi] = vertices[i];
            let [xj, yj] = vertices[j];
            if ((yi > y) != (yj > y)) && (x < (xj - xi) * (y - yi) / (yj - yi) + xi) {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

impl EventRule for ZoneRule {
    fn kind(&self) -> EventKind {
        EventKind::ZoneEntry
    }

    fn evaluate(&self, track: &Track) -> RuleSignal {
        let Some(last) = track.history().back() else {
            return RuleSignal::Hold;
        };
        if self.contains(last.x, last.y) {
            RuleSignal::Trip(format!(
                "Object {} entered zone '{}'",
                track.id(),
                self.zone.name
            ))
        } else {
            RuleSignal::Rearm
        }
    }
}
