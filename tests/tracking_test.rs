use nalgebra::Point2;
use scenetrack_rs::events::{DwellConfig, DwellRule, EventEngine, EventKind};
use scenetrack_rs::tracker::{TrackId, TrackState};
use scenetrack_rs::{CoordinateMapper, Detection, TrackStore, TrackStoreError, TrackerConfig};

fn square_at(cx: f32, cy: f32, side: f32) -> Detection {
    let half = side / 2.0;
    Detection::new(cx - half, cy - half, cx + half, cy + half, 0.9).with_class(0, "person")
}

#[test]
fn test_identity_stable_under_smooth_motion() {
    let mut store = TrackStore::default();

    let mut id = None;
    for frame in 0..120u64 {
        let x = 100.0 + frame as f32 * 4.0;
        let y = 200.0 + (frame as f32 * 0.1).sin() * 10.0;
        let tracks = store.update(frame, vec![square_at(x, y, 80.0)]).unwrap();

        assert_eq!(tracks.len(), 1);
        let current = tracks[0].id();
        assert_eq!(*id.get_or_insert(current), current);
    }

    let track = &store.tracks()[0];
    assert_eq!(track.history().len(), 120);
    assert_eq!(track.label(), "person");
    assert_eq!(store.created_count(), 1);
}

#[test]
fn test_eviction_and_identity_retirement() {
    let mut store = TrackStore::new(TrackerConfig {
        grace_period: 3,
        ..Default::default()
    });

    let tracks = store.update(0, vec![square_at(100.0, 100.0, 50.0)]).unwrap();
    let original = tracks[0].id();

    // Frames 1 and 2: coasting inside the grace period
    for frame in 1..3u64 {
        let tracks = store.update(frame, vec![]).unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].state(), TrackState::Lost);
        assert_eq!(tracks[0].missed_frames(), frame as u32);
    }

    // Frame 3: third consecutive miss evicts
    assert!(store.update(3, vec![]).unwrap().is_empty());
    assert_eq!(store.evicted(), &[original]);

    // A new detection at the same place gets a fresh identity
    let tracks = store.update(4, vec![square_at(100.0, 100.0, 50.0)]).unwrap();
    assert_eq!(tracks.len(), 1);
    assert_ne!(tracks[0].id(), original);
    assert_eq!(tracks[0].id(), TrackId(2));
}

#[test]
fn test_reacquired_within_grace_keeps_identity() {
    let mut store = TrackStore::new(TrackerConfig {
        grace_period: 5,
        ..Default::default()
    });
    store.update(0, vec![square_at(100.0, 100.0, 50.0)]).unwrap();
    store.update(1, vec![]).unwrap();
    store.update(2, vec![]).unwrap();

    let tracks = store.update(3, vec![square_at(104.0, 100.0, 50.0)]).unwrap();
    assert_eq!(tracks.len(), 1);
    assert_eq!(tracks[0].id(), TrackId(1));
    assert_eq!(tracks[0].state(), TrackState::Tracked);

    let frames: Vec<u64> = tracks[0].history().iter().map(|s| s.frame_index).collect();
    assert_eq!(frames, vec![0, 3]);
}

#[test]
fn test_no_duplicate_history_for_repeated_frame() {
    let mut store = TrackStore::default();
    store.update(0, vec![square_at(100.0, 100.0, 50.0)]).unwrap();
    store.update(1, vec![square_at(102.0, 100.0, 50.0)]).unwrap();

    let err = store
        .update(1, vec![square_at(104.0, 100.0, 50.0)])
        .unwrap_err();
    assert_eq!(err, TrackStoreError::DuplicateFrame { frame_index: 1 });

    let track = &store.tracks()[0];
    let frames: Vec<u64> = track.history().iter().map(|s| s.frame_index).collect();
    assert_eq!(frames, vec![0, 1]);
    assert_eq!(track.center(), (102.0, 100.0));

    // The store continues normally afterwards
    store.update(2, vec![square_at(104.0, 100.0, 50.0)]).unwrap();
    assert_eq!(store.tracks()[0].history().len(), 3);
}

#[test]
fn test_two_objects_keep_their_identities() {
    let mut store = TrackStore::default();
    let mut ids = None;
    for frame in 0..40u64 {
        let t = frame as f32;
        let dets = vec![
            square_at(100.0 + t * 3.0, 100.0, 60.0),
            square_at(600.0 - t * 3.0, 400.0, 60.0),
        ];
        let tracks = store.update(frame, dets).unwrap();
        let current: Vec<TrackId> = tracks.iter().map(|t| t.id()).collect();
        assert_eq!(ids.get_or_insert_with(|| current.clone()), &current);
    }
}

/// Offsets within a 10-pixel radius of the anchor.
const JITTER: [(f32, f32); 5] = [(0.0, 0.0), (5.0, 0.0), (0.0, 5.0), (-5.0, 0.0), (0.0, -5.0)];

#[test]
fn test_dwell_event_fires_once_and_rearms_after_moving() {
    let mut store = TrackStore::default();
    let mut engine = EventEngine::new().with_rule(DwellRule::new(DwellConfig {
        window_frames: 10,
        max_displacement: 30.0,
    }));

    let mut frame = 0u64;
    let mut step = |store: &mut TrackStore, engine: &mut EventEngine, x: f32, y: f32| {
        let (dx, dy) = JITTER[frame as usize % JITTER.len()];
        let tracks = store.update(frame, vec![square_at(x + dx, y + dy, 100.0)]).unwrap();
        engine.update(tracks, frame);
        frame += 1;
    };

    // Hold at A
    for _ in 0..30 {
        step(&mut store, &mut engine, 200.0, 200.0);
    }
    assert_eq!(engine.events().len(), 1);

    // Move 200 px in 20 px steps, then hold at B
    for i in 1..=10 {
        step(&mut store, &mut engine, 200.0 + i as f32 * 20.0, 200.0);
    }
    for _ in 0..30 {
        step(&mut store, &mut engine, 400.0, 200.0);
    }

    let events = engine.events();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.kind == EventKind::StationaryWarning));
    assert_eq!(events[0].track_id, events[1].track_id);
    assert_eq!(events[0].frame_index, 9);
    assert!(events[1].frame_index >= 40);
    assert_eq!(store.created_count(), 1);
}

#[test]
fn test_projection_round_trip() {
    let source = [
        Point2::new(0.0, 0.0),
        Point2::new(100.0, 0.0),
        Point2::new(100.0, 100.0),
        Point2::new(0.0, 100.0),
    ];
    let destination = [
        Point2::new(0.0, 0.0),
        Point2::new(50.0, 0.0),
        Point2::new(50.0, 50.0),
        Point2::new(0.0, 50.0),
    ];

    let mut mapper = CoordinateMapper::new();
    assert_eq!(
        mapper.project(Point2::new(100.0, 100.0)).unwrap(),
        Point2::new(100.0, 100.0)
    );

    mapper.fit(&source, &destination).unwrap();
    let p = mapper.project(Point2::new(100.0, 100.0)).unwrap();
    assert!((p.x - 50.0).abs() < 1e-6);
    assert!((p.y - 50.0).abs() < 1e-6);
}
