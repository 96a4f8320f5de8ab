//! Traits for the external collaborators the pipeline calls each frame.
//!
//! Implement these to connect detection, embedding, clustering, text-reading
//! and rendering backends. Mock and real implementations are interchangeable
//! and chosen when the pipeline is built.

use std::time::Duration;

use ndarray::Array2;
use thiserror::Error;

use crate::events::Event;
use crate::integration::Frame;
use crate::tracker::{Detection, GroupId, Track};

/// Failure of an external collaborator. The pipeline degrades to an empty result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CollaboratorError {
    #[error("{0}")]
    Failed(String),
    #[error("call exceeded its {budget:?} budget")]
    Timeout { budget: Duration },
    #[error("expected {expected} results, got {got}")]
    LengthMismatch { expected: usize, got: usize },
}

/// Object detection backend.
///
/// # Example
///
/// ```ignore
/// use scenetrack_rs::integration::{CollaboratorError, DetectionSource, Frame};
/// use scenetrack_rs::Detection;
///
/// struct MyDetector { /* model */ }
///
/// impl DetectionSource for MyDetector {
///     fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, CollaboratorError> {
///         Ok(vec![])
///     }
/// }
/// ```
pub trait DetectionSource {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, CollaboratorError>;
}

impl<F> DetectionSource for F
where
    F: FnMut(&Frame) -> Result<Vec<Detection>, CollaboratorError>,
{
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, CollaboratorError> {
        self(frame)
    }
}

/// Re-identification embedding backend. Returns one row per crop.
pub trait EmbeddingExtractor {
    fn extract_embeddings(&mut self, crops: &[Frame]) -> Result<Array2<f32>, CollaboratorError>;
}

/// Groups embeddings into `k` visual categories. Returns one id per embedding row.
pub trait GroupClusterer {
    fn cluster(&mut self, embeddings: &Array2<f32>, k: usize) -> Result<Vec<GroupId>, CollaboratorError>;
}

/// Reads embedded text from a crop. An empty string means no text was found.
pub trait TextReader {
    fn read_text(&mut self, crop: &Frame) -> Result<String, CollaboratorError>;
}

impl<F> TextReader for F
where
    F: FnMut(&Frame) -> Result<String, CollaboratorError>,
{
    fn read_text(&mut self, crop: &Frame) -> Result<String, CollaboratorError> {
        self(crop)
    }
}

/// Draws tracks and events onto a copy of the frame.
pub trait FrameRenderer {
    fn render(&self, frame: &Frame, tracks: &[Track], events: &[Event]) -> Result<Frame, CollaboratorError>;
}
