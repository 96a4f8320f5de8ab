//! Image-space to map-space coordinate mapping with an explicit identity fallback.

use nalgebra::Point2;
use tracing::{info, warn};

use super::homography::{Homography, ProjectionError};

/// Whether a projection is in effect.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum MapperStatus {
    /// `fit` never called: points pass through unchanged.
    #[default]
    Inactive,
    /// A homography is in effect.
    Active,
    /// The last `fit` failed: points pass through unchanged.
    Degraded(ProjectionError),
}

/// Maps image-space positions into a reference plane via a fitted homography.
///
/// Until a fit succeeds, [`CoordinateMapper::project`] returns its input
/// unchanged; check [`CoordinateMapper::status`] to tell the cases apart.
#[derive(Debug, Clone, Default)]
pub struct CoordinateMapper {
    projection: Option<Homography>,
    status: MapperStatus,
}

impl CoordinateMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mapper and fit it immediately. A failed fit leaves the mapper degraded.
    pub fn with_points(source: &[Point2<f64>], destination: &[Point2<f64>]) -> Self {
        let mut mapper = Self::new();
        // the failure is recorded in `status`
        let _ = mapper.fit(source, destination);
        mapper
    }

    /// Compute the projection from point correspondences, replacing any previous one.
    ///
    /// On failure the previous projection is discarded and the mapper falls back
    /// to identity mapping.
    pub fn fit(
        &mut self,
        source: &[Point2<f64>],
        destination: &[Point2<f64>],
    ) -> Result<(), ProjectionError> {
        match Homography::estimate(source, destination) {
            Ok(h) => {
                info!(
                    points = source.len(),
                    reprojection_error = h.reprojection_error(),
                    "homography fitted"
                );
                self.projection = Some(h);
                self.status = MapperStatus::Active;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "could not compute homography, using identity mapping");
                self.projection = None;
                self.status = MapperStatus::Degraded(e.clone());
                Err(e)
            }
        }
    }

    /// Drop the projection and return to the inactive state.
    pub fn reset(&mut self) {
        self.projection = None;
        self.status = MapperStatus::Inactive;
    }

    pub fn status(&self) -> &MapperStatus {
        &self.status
    }

    pub fn is_active(&self) -> bool {
        self.projection.is_some()
    }

    pub fn projection(&self) -> Option<&Homography> {
        self.projection.as_ref()
    }

    /// Map one point. Pass-through when no projection is active.
    pub fn project(&self, point: Point2<f64>) -> Result<Point2<f64>, ProjectionError> {
        match &self.projection {
            Some(h) => h.apply(point),
            None => Ok(point),
        }
    }

    /// Map many points; element `i` equals `project(points[i])`.
    pub fn project_batch(&self, points: &[Point2<f64>]) -> Vec<Result<Point2<f64>, ProjectionError>> {
        points.iter().map(|p| self.project(*p)).collect()
    }
}
