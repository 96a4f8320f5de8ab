//! Frame orchestration and the collaborator interfaces it calls.
//!
//! The [`FramePipeline`] owns the track store, event engine and coordinate
//! mapper, and threads them through one synchronous call per frame. Detection,
//! embedding, clustering, text reading and rendering are supplied by the
//! caller through the traits in this module.

mod builder;
mod collaborators;
mod crops;
mod pipeline;

pub use builder::DetectionBuilder;
pub use collaborators::{
    CollaboratorError, DetectionSource, EmbeddingExtractor, FrameRenderer, GroupClusterer,
    TextReader,
};
pub use crops::{PLACEHOLDER_CROP_SIZE, crop, crop_or_placeholder};
pub use pipeline::{FrameOutput, FramePipeline, PipelineError, RunSummary};

/// An RGB video frame or crop.
pub type Frame = image::RgbImage;
