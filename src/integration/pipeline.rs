//! FramePipeline: the frame-synchronous orchestration of detection, tracking,
//! annotation, events and rendering.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use nalgebra::Point2;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, PipelineConfig};
use crate::events::{DwellRule, Event, EventEngine, EventRule, ZoneRule};
use crate::integration::collaborators::{
    CollaboratorError, DetectionSource, EmbeddingExtractor, FrameRenderer, GroupClusterer,
    TextReader,
};
use crate::integration::crops;
use crate::integration::Frame;
use crate::projection::CoordinateMapper;
use crate::tracker::{GroupId, Track, TrackStore, TrackStoreError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Track(#[from] TrackStoreError),
}

/// Result of processing one frame.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub frame_index: u64,
    /// Live tracks after all annotation steps.
    pub tracks: Vec<Track>,
    /// Events emitted during this frame only.
    pub new_events: Vec<Event>,
    /// Number of detections refused for malformed geometry or score.
    pub rejected_detections: usize,
    /// Renderer output; `None` without a renderer or when it failed.
    pub rendered: Option<Frame>,
}

/// Totals for a [`FramePipeline::run`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub tracks_created: u64,
    pub events_emitted: usize,
    /// True when the run ended because the stop flag was raised.
    pub stopped: bool,
}

struct Grouping {
    extractor: Box<dyn EmbeddingExtractor>,
    clusterer: Box<dyn GroupClusterer>,
}

/// Drives one call per frame through a fixed order:
///
/// 1. detection
/// 2. track store update
/// 3. grouping (annotates group ids)
/// 4. text reading on the configured cadence (annotates text)
/// 5. map-space projection of track centers (annotates map positions)
/// 6. event engine update
/// 7. rendering
///
/// Steps 3-5 only annotate tracks; identities and boxes are read-only there.
/// A failing or slow collaborator degrades its step to an empty result and
/// the frame still completes.
pub struct FramePipeline<D: DetectionSource> {
    config: PipelineConfig,
    detector: D,
    grouping: Option<Grouping>,
    text_reader: Option<Box<dyn TextReader>>,
    renderer: Option<Box<dyn FrameRenderer>>,
    store: TrackStore,
    engine: EventEngine,
    mapper: CoordinateMapper,
    next_frame: u64,
}

impl<D: DetectionSource> FramePipeline<D> {
    /// Create a pipeline with the given detector and configuration.
    ///
    /// A configured projection that fails to fit leaves the mapper degraded
    /// rather than failing construction.
    pub fn new(detector: D, config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut engine = EventEngine::new().with_rule(DwellRule::new(config.dwell.clone()));
        for zone in &config.zones {
            engine.add_rule(Box::new(ZoneRule::new(zone.clone())));
        }

        let mapper = match config.mapping_points() {
            Some((source, destination)) => CoordinateMapper::with_points(&source, &destination),
            None => CoordinateMapper::new(),
        };

        Ok(Self {
            store: TrackStore::new(config.tracker.clone()),
            config,
            detector,
            grouping: None,
            text_reader: None,
            renderer: None,
            engine,
            mapper,
            next_frame: 0,
        })
    }

    /// Create a pipeline with default configuration.
    pub fn with_default_config(detector: D) -> Self {
        Self {
            config: PipelineConfig::default(),
            store: TrackStore::default(),
            engine: EventEngine::new().with_rule(DwellRule::new(Default::default())),
            mapper: CoordinateMapper::new(),
            detector,
            grouping: None,
            text_reader: None,
            renderer: None,
            next_frame: 0,
        }
    }

    pub fn with_grouping(
        mut self,
        extractor: impl EmbeddingExtractor + 'static,
        clusterer: impl GroupClusterer + 'static,
    ) -> Self {
        self.grouping = Some(Grouping {
            extractor: Box::new(extractor),
            clusterer: Box::new(clusterer),
        });
        self
    }

    pub fn with_text_reader(mut self, reader: impl TextReader + 'static) -> Self {
        self.text_reader = Some(Box::new(reader));
        self
    }

    pub fn with_renderer(mut self, renderer: impl FrameRenderer + 'static) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    pub fn with_mapper(mut self, mapper: CoordinateMapper) -> Self {
        self.mapper = mapper;
        self
    }

    /// Register an additional event rule after the configured ones.
    pub fn with_rule(mut self, rule: impl EventRule + 'static) -> Self {
        self.engine.add_rule(Box::new(rule));
        self
    }

    /// Process the next frame in sequence.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameOutput, PipelineError> {
        self.process_indexed(self.next_frame, frame)
    }

    /// Process `frame` as frame `frame_index`.
    ///
    /// Indices must strictly increase across calls; a repeated or older index
    /// is rejected before any state changes.
    pub fn process_indexed(
        &mut self,
        frame_index: u64,
        frame: &Frame,
    ) -> Result<FrameOutput, PipelineError> {
        self.store.check_frame(frame_index)?;
        let budget = self.config.collaborator_budget();

        // 1. detection
        let detector = &mut self.detector;
        let detections = guarded(budget, "detect", frame_index, || detector.detect(frame))
            .unwrap_or_default();

        // 2. association
        self.store.update(frame_index, detections)?;
        self.next_frame = frame_index.saturating_add(1);
        let rejected_detections = self.store.rejected().len();

        // 3. grouping
        if let Some(grouping) = self.grouping.as_mut() {
            if frame_index % self.config.group_every == 0 {
                assign_groups(
                    grouping,
                    self.store.tracks_mut(),
                    frame,
                    frame_index,
                    self.config.group_count,
                    budget,
                );
            }
        }

        // 4. text reading
        if let Some(reader) = self.text_reader.as_mut() {
            if frame_index % self.config.text_every == 0 {
                read_texts(&mut **reader, self.store.tracks_mut(), frame, frame_index, budget);
            }
        }

        // 5. map positions
        if self.mapper.is_active() {
            for track in self.store.tracks_mut() {
                let (cx, cy) = track.center();
                let position = match self.mapper.project(Point2::new(cx as f64, cy as f64)) {
                    Ok(p) => Some(p),
                    Err(error) => {
                        warn!(frame_index, track_id = %track.id(), %error, "projection failed");
                        None
                    }
                };
                track.set_map_position(position);
            }
        }

        // 6. events
        let before = self.engine.events().len();
        let events = self.engine.update(self.store.tracks(), frame_index);
        let new_events = events[before..].to_vec();

        // 7. rendering
        let rendered = self.renderer.as_ref().and_then(|renderer| {
            let tracks = self.store.tracks();
            let events = self.engine.events();
            guarded(budget, "render", frame_index, || renderer.render(frame, tracks, events))
        });

        debug!(
            frame_index,
            tracks = self.store.tracks().len(),
            events = self.engine.events().len(),
            "frame processed"
        );

        Ok(FrameOutput {
            frame_index,
            tracks: self.store.tracks().to_vec(),
            new_events,
            rejected_detections,
            rendered,
        })
    }

    /// Process frames in order until the iterator ends or `stop` is raised.
    ///
    /// `stop` is checked between frames; a frame in progress always completes.
    pub fn run<I, F>(
        &mut self,
        frames: I,
        stop: &AtomicBool,
        mut sink: F,
    ) -> Result<RunSummary, PipelineError>
    where
        I: IntoIterator<Item = Frame>,
        F: FnMut(FrameOutput),
    {
        let mut summary = RunSummary::default();
        for frame in frames {
            if stop.load(Ordering::SeqCst) {
                info!(frames = summary.frames_processed, "stop requested, ending run");
                summary.stopped = true;
                break;
            }
            let output = self.process_frame(&frame)?;
            summary.frames_processed += 1;
            sink(output);
        }
        summary.tracks_created = self.store.created_count();
        summary.events_emitted = self.engine.events().len();
        info!(
            frames = summary.frames_processed,
            tracks = summary.tracks_created,
            events = summary.events_emitted,
            "run complete"
        );
        Ok(summary)
    }

    pub fn tracks(&self) -> &[Track] {
        self.store.tracks()
    }

    /// Cumulative event log.
    pub fn events(&self) -> &[Event] {
        self.engine.events()
    }

    pub fn store(&self) -> &TrackStore {
        &self.store
    }

    pub fn engine(&self) -> &EventEngine {
        &self.engine
    }

    pub fn mapper(&self) -> &CoordinateMapper {
        &self.mapper
    }

    pub fn mapper_mut(&mut self) -> &mut CoordinateMapper {
        &mut self.mapper
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    /// Index `process_frame` will use next.
    pub fn next_frame_index(&self) -> u64 {
        self.next_frame
    }
}

/// Run a collaborator call, turning failures and budget overruns into `None`.
fn guarded<T>(
    budget: Option<Duration>,
    step: &'static str,
    frame_index: u64,
    call: impl FnOnce() -> Result<T, CollaboratorError>,
) -> Option<T> {
    let started = Instant::now();
    let result = call().and_then(|value| match budget {
        Some(budget) if started.elapsed() > budget => Err(CollaboratorError::Timeout { budget }),
        _ => Ok(value),
    });
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(frame_index, step, %error, "collaborator failed, continuing without it");
            None
        }
    }
}

/// Crop every track observed this frame, group the crops, and write the group
/// ids back by position.
fn assign_groups(
    grouping: &mut Grouping,
    tracks: &mut [Track],
    frame: &Frame,
    frame_index: u64,
    k: usize,
    budget: Option<Duration>,
) {
    let targets: Vec<usize> = tracks
        .iter()
        .enumerate()
        .filter(|(_, t)| t.is_observed_at(frame_index))
        .map(|(i, _)| i)
        .collect();
    if targets.is_empty() {
        return;
    }

    let crops: Vec<Frame> = targets
        .iter()
        .map(|&i| crops::crop_or_placeholder(frame, &tracks[i].bbox()))
        .collect();

    let Some(embeddings) = guarded(budget, "extract_embeddings", frame_index, || {
        let embeddings = grouping.extractor.extract_embeddings(&crops)?;
        check_len(crops.len(), embeddings.nrows())?;
        Ok(embeddings)
    }) else {
        return;
    };

    let Some(groups) = guarded(budget, "cluster", frame_index, || {
        let groups: Vec<GroupId> = grouping.clusterer.cluster(&embeddings, k)?;
        check_len(embeddings.nrows(), groups.len())?;
        Ok(groups)
    }) else {
        return;
    };

    for (&i, group) in targets.iter().zip(groups) {
        tracks[i].set_group(Some(group));
    }
}

/// Read text from every track observed this frame with a non-empty crop.
fn read_texts(
    reader: &mut dyn TextReader,
    tracks: &mut [Track],
    frame: &Frame,
    frame_index: u64,
    budget: Option<Duration>,
) {
    for track in tracks.iter_mut().filter(|t| t.is_observed_at(frame_index)) {
        let Some(crop) = crops::crop(frame, &track.bbox()) else {
            continue;
        };
        if let Some(text) = guarded(budget, "read_text", frame_index, || reader.read_text(&crop)) {
            if track.merge_text(&text, frame_index) {
                debug!(frame_index, track_id = %track.id(), text = %text.trim(), "text read");
            }
        }
    }
}

fn check_len(expected: usize, got: usize) -> Result<(), CollaboratorError> {
    if expected == got {
        Ok(())
    } else {
        Err(CollaboratorError::LengthMismatch { expected, got })
    }
}
