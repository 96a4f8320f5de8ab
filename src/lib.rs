//! Frame-synchronous video analytics core.
//!
//! Each frame flows through a fixed order: external detection, IoU-based
//! association in the [`TrackStore`], annotation of tracks by grouping,
//! text-reading and map-projection steps, the [`EventEngine`], and finally an
//! external renderer. Model inference and drawing stay behind the traits in
//! [`integration`].

pub mod config;
pub mod events;
pub mod integration;
pub mod projection;
pub mod tracker;

pub use config::{ConfigError, PipelineConfig};
pub use events::{Event, EventEngine, EventKind};
pub use integration::{FrameOutput, FramePipeline, PipelineError};
pub use projection::{CoordinateMapper, MapperStatus, ProjectionError};
pub use tracker::{Detection, Rect, Track, TrackId, TrackStore, TrackStoreError, TrackerConfig};
