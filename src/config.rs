//! Aggregate pipeline configuration, loadable from JSON.

use std::path::Path;
use std::time::Duration;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::events::{DwellConfig, ZoneConfig};
use crate::tracker::TrackerConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for a [`FramePipeline`](crate::integration::FramePipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub tracker: TrackerConfig,
    pub dwell: DwellConfig,
    pub zones: Vec<ZoneConfig>,
    /// Number of visual groups requested from the clustering collaborator.
    pub group_count: usize,
    /// Run grouping on frames where `frame_index % group_every == 0`.
    pub group_every: u64,
    /// Run text reading on frames where `frame_index % text_every == 0`.
    pub text_every: u64,
    /// Results from collaborator calls slower than this are discarded.
    pub collaborator_budget_ms: Option<u64>,
    /// Image-space quadrilateral (or more points) for the map projection.
    pub source_points: Vec<[f64; 2]>,
    /// Map-space points matching `source_points`.
    pub destination_points: Vec<[f64; 2]>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            dwell: DwellConfig::default(),
            zones: Vec::new(),
            group_count: 2,
            group_every: 1,
            text_every: 30,
            collaborator_budget_ms: None,
            source_points: Vec::new(),
            destination_points: Vec::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };

        let t = &self.tracker;
        if !(t.min_iou > 0.0 && t.min_iou <= 1.0) {
            return invalid(format!("tracker.min_iou {} outside (0, 1]", t.min_iou));
        }
        if t.grace_period == 0 {
            return invalid("tracker.grace_period must be at least 1".into());
        }
        if self.dwell.window_frames == 0 {
            return invalid("dwell.window_frames must be at least 1".into());
        }
        if t.history_len < self.dwell.window_frames {
            return invalid(format!(
                "tracker.history_len {} shorter than dwell.window_frames {}",
                t.history_len, self.dwell.window_frames
            ));
        }
        if !(self.dwell.max_displacement.is_finite() && self.dwell.max_displacement > 0.0) {
            return invalid("dwell.max_displacement must be positive".into());
        }
        if self.group_every == 0 || self.text_every == 0 {
            return invalid("group_every and text_every must be at least 1".into());
        }
        if self.group_count == 0 {
            return invalid("group_count must be at least 1".into());
        }
        if let Some(zone) = self.zones.iter().find(|z| z.vertices.len() < 3) {
            return invalid(format!("zone '{}' needs at least 3 vertices", zone.name));
        }
        if self.source_points.len() != self.destination_points.len() {
            return invalid("source_points and destination_points differ in length".into());
        }
        if !self.source_points.is_empty() && self.source_points.len() < 4 {
            return invalid("a projection needs at least 4 point pairs".into());
        }
        Ok(())
    }

    pub fn collaborator_budget(&self) -> Option<Duration> {
        self.collaborator_budget_ms.map(Duration::from_millis)
    }

    /// Projection correspondences, if any are configured.
    pub fn mapping_points(&self) -> Option<(Vec<Point2<f64>>, Vec<Point2<f64>>)> {
        if self.source_points.is_empty() {
            return None;
        }
        let to_points = |raw: &[[f64; 2]]| -> Vec<Point2<f64>> {
            raw.iter().map(|&[x, y]| Point2::new(x, y)).collect()
        };
        Some((
            to_points(&self.source_points),
            to_points(&self.destination_points),
        ))
    }
}
