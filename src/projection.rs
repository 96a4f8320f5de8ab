//! Coordinate mapping from image space into a reference plane.

mod homography;
mod mapper;

pub use homography::{Homography, PROJECTION_EPSILON, ProjectionError};
pub use mapper::{CoordinateMapper, MapperStatus};
