//! Event engine: runs every rule against every live track and keeps the event log.

use std::collections::{HashMap, HashSet};

use tracing::{info, warn};

use crate::events::event::Event;
use crate::events::rule::{ArmState, EventRule, RuleSignal};
use crate::tracker::{Track, TrackId};

/// Position of a rule inside the engine. Two rules of the same kind arm independently.
pub type RuleSlot = usize;

/// Consumes track histories and maintains an append-only event log.
///
/// Each (track, rule) pair carries an [`ArmState`]; an event is emitted only on
/// the WATCHING -> FLAGGED transition, and the pair re-arms when the rule
/// reports its condition cleared. State for a track is discarded once the
/// track is no longer in the live set.
#[derive(Default)]
pub struct EventEngine {
    rules: Vec<Box<dyn EventRule>>,
    states: HashMap<(TrackId, RuleSlot), ArmState>,
    log: Vec<Event>,
    last_frame: Option<u64>,
}

impl EventEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, rule: impl EventRule + 'static) -> Self {
        self.add_rule(Box::new(rule));
        self
    }

    pub fn add_rule(&mut self, rule: Box<dyn EventRule>) -> RuleSlot {
        self.rules.push(rule);
        self.rules.len() - 1
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Evaluate all rules for `frame_index` and return the cumulative log.
    ///
    /// Frame indices must strictly increase across calls, which keeps the log
    /// ordered by frame. A repeated or older index is ignored and the log is
    /// returned unchanged.
    pub fn update(&mut self, tracks: &[Track], frame_index: u64) -> &[Event] {
        if let Some(last) = self.last_frame {
            if frame_index <= last {
                warn!(frame_index, last, "ignoring event update for a stale frame");
                return &self.log;
            }
        }
        self.last_frame = Some(frame_index);

        let live: HashSet<TrackId> = tracks.iter().map(Track::id).collect();
        self.states.retain(|(id, _), _| live.contains(id));

        for track in tracks {
            for (slot, rule) in self.rules.iter().enumerate() {
                let signal = rule.evaluate(track);
                let state = self.states.entry((track.id(), slot)).or_default();
                let (next, emit) = state.on_signal(&signal);
                *state = next;

                if let (true, RuleSignal::Trip(detail)) = (emit, signal) {
                    let event = Event {
                        frame_index,
                        kind: rule.kind(),
                        track_id: track.id(),
                        detail,
                    };
                    info!(frame_index, track_id = %track.id(), kind = %event.kind, "{}", event.detail);
                    self.log.push(event);
                }
            }
        }

        &self.log
    }

    /// Arming state of a (track, rule) pair; WATCHING when never evaluated.
    pub fn state(&self, track_id: TrackId, slot: RuleSlot) -> ArmState {
        self.states
            .get(&(track_id, slot))
            .copied()
            .unwrap_or_default()
    }

    /// The full event log, in emission order.
    pub fn events(&self) -> &[Event] {
        &self.log
    }

    /// Last frame index evaluated.
    pub fn last_frame(&self) -> Option<u64> {
        self.last_frame
    }

    /// Events emitted at or after `frame_index`.
    pub fn events_since(&self, frame_index: u64) -> &[Event] {
        let start = self.log.partition_point(|e| e.frame_index < frame_index);
        &self.log[start..]
    }

    /// Events emitted at exactly `frame_index`.
    pub fn events_at(&self, frame_index: u64) -> &[Event] {
        let since = self.events_since(frame_index);
        let end = since.partition_point(|e| e.frame_index == frame_index);
        &since[..end]
    }

    /// Serialize the event log as a JSON array.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{DwellConfig, DwellRule, EventKind, ZoneConfig, ZoneRule};
    use crate::tracker::{Detection, TrackStore, TrackerConfig};

    fn at(cx: f32, cy: f32) -> Detection {
        Detection::new(cx - 20.0, cy - 20.0, cx + 20.0, cy + 20.0, 0.9)
    }

    fn store() -> TrackStore {
        TrackStore::new(TrackerConfig {
            min_iou: 0.1,
            ..Default::default()
        })
    }

    fn dwell_engine(window_frames: usize) -> EventEngine {
        EventEngine::new().with_rule(DwellRule::new(DwellConfig {
            window_frames,
            max_displacement: 10.0,
        }))
    }

    #[test]
    fn test_dwell_emits_once_while_stationary() {
        let mut store = store();
        let mut engine = dwell_engine(5);

        for frame in 0..20u64 {
            let jitter = (frame % 3) as f32;
            let tracks = store.update(frame, vec![at(100.0 + jitter, 100.0)]).unwrap();
            engine.update(tracks, frame);
        }

        assert_eq!(engine.events().len(), 1);
        let event = &engine.events()[0];
        assert_eq!(event.frame_index, 4);
        assert_eq!(event.kind, EventKind::StationaryWarning);
        assert_eq!(engine.state(event.track_id, 0), ArmState::Flagged);
    }

    #[test]
    fn test_dwell_not_emitted_before_window_fills() {
        let mut store = store();
        let mut engine = dwell_engine(10);
        for frame in 0..9u64 {
            let tracks = store.update(frame, vec![at(100.0, 100.0)]).unwrap();
            assert!(engine.update(tracks, frame).is_empty());
        }
    }

    #[test]
    fn test_moving_track_never_flagged() {
        let mut store = store();
        let mut engine = dwell_engine(5);
        for frame in 0..30u64 {
            let x = 100.0 + frame as f32 * 5.0;
            let tracks = store.update(frame, vec![at(x, 100.0)]).unwrap();
            engine.update(tracks, frame);
        }
        assert!(engine.events().is_empty());
    }

    #[test]
    fn test_state_discarded_on_eviction() {
        let mut store = TrackStore::new(TrackerConfig {
            grace_period: 1,
            ..Default::default()
        });
        let mut engine = dwell_engine(2);

        for frame in 0..3u64 {
            let tracks = store.update(frame, vec![at(100.0, 100.0)]).unwrap();
            engine.update(tracks, frame);
        }
        let id = engine.events()[0].track_id;
        assert_eq!(engine.state(id, 0), ArmState::Flagged);

        let tracks = store.update(3, vec![]).unwrap();
        engine.update(tracks, 3);
        assert_eq!(engine.state(id, 0), ArmState::Watching);
        assert_eq!(engine.events().len(), 1);
    }

    #[test]
    fn test_zone_entry_and_reentry() {
        let mut store = store();
        let mut engine = EventEngine::new().with_rule(ZoneRule::new(ZoneConfig {
            name: "door".into(),
            vertices: vec![[200.0, 0.0], [400.0, 0.0], [400.0, 400.0], [200.0, 400.0]],
        }));

        // walk right through the zone, then back
        let xs = (0..12).map(|i| 100.0 + i as f32 * 30.0).chain((0..12).rev().map(|i| 100.0 + i as f32 * 30.0));
        for (frame, x) in xs.enumerate() {
            let tracks = store.update(frame as u64, vec![at(x, 100.0)]).unwrap();
            engine.update(tracks, frame as u64);
        }

        let kinds: Vec<EventKind> = engine.events().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::ZoneEntry, EventKind::ZoneEntry]);
    }

    #[test]
    fn test_event_queries() {
        let mut store = store();
        let mut engine = dwell_engine(2);
        for frame in 0..4u64 {
            // two far-apart stationary objects, the second appearing at frame 2
            let mut dets = vec![at(100.0, 100.0)];
            if frame >= 2 {
                dets.push(at(600.0, 600.0));
            }
            let tracks = store.update(frame, dets).unwrap();
            engine.update(tracks, frame);
        }

        assert_eq!(engine.events().len(), 2);
        assert_eq!(engine.events_at(1).len(), 1);
        assert_eq!(engine.events_at(2).len(), 0);
        assert_eq!(engine.events_at(3).len(), 1);
        assert_eq!(engine.events_since(2).len(), 1);

        let json = engine.to_json().unwrap();
        assert!(json.contains("STATIONARY_WARNING"));
    }

    #[test]
    fn test_stale_frame_ignored() {
        let mut other = store();
        let mut store = store();
        let mut engine = dwell_engine(2);
        for frame in 5..7u64 {
            let tracks = store.update(frame, vec![at(100.0, 100.0)]).unwrap();
            engine.update(tracks, frame);
        }
        assert_eq!(engine.events().len(), 1);
        assert_eq!(engine.last_frame(), Some(6));

        // a second stationary object evaluated under older indices is not logged
        for frame in 0..2u64 {
            let tracks = other.update(frame, vec![at(600.0, 600.0)]).unwrap();
            engine.update(tracks, frame);
        }
        assert_eq!(engine.events().len(), 1);
        assert_eq!(engine.last_frame(), Some(6));
        assert_eq!(engine.events_since(0).len(), 1);
        assert_eq!(engine.events_at(6).len(), 1);
    }
}
