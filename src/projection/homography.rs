//! Planar homography estimation (normalized DLT) using nalgebra.

use nalgebra::{DMatrix, Matrix3, Point2, Vector3};
use thiserror::Error;

/// Homogeneous scale below which a projection is considered degenerate.
pub const PROJECTION_EPSILON: f64 = 1e-9;

/// Ratio of the two smallest singular values under which the fit has no unique solution.
const RANK_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("need at least 4 correspondences, got {0}")]
    TooFewPoints(usize),
    #[error("source has {source_len} points but destination has {destination_len}")]
    MismatchedPoints {
        source_len: usize,
        destination_len: usize,
    },
    #[error("correspondence contains non-finite coordinates")]
    NonFinite,
    #[error("points do not determine a unique homography: {0}")]
    DegenerateFit(&'static str),
    #[error("homogeneous scale {w:e} too close to zero at ({x}, {y})")]
    DegenerateProjection { x: f64, y: f64, w: f64 },
}

/// A fitted 3x3 planar homography and the correspondences it was derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct Homography {
    matrix: Matrix3<f64>,
    source: Vec<Point2<f64>>,
    destination: Vec<Point2<f64>>,
}

impl Homography {
    /// Estimate the homography mapping `source` onto `destination`.
    ///
    /// Four pairs give an exact solution; more pairs give the algebraic
    /// least-squares solution. Both point sets are normalized (centroid at the
    /// origin, mean distance sqrt(2)) before solving.
    pub fn estimate(
        source: &[Point2<f64>],
        destination: &[Point2<f64>],
    ) -> Result<Self, ProjectionError> {
        if source.len() != destination.len() {
            return Err(ProjectionError::MismatchedPoints {
                source_len: source.len(),
                destination_len: destination.len(),
            });
        }
        if source.len() < 4 {
            return Err(ProjectionError::TooFewPoints(source.len()));
        }
        let finite = |p: &Point2<f64>| p.x.is_finite() && p.y.is_finite();
        if !source.iter().chain(destination).all(finite) {
            return Err(ProjectionError::NonFinite);
        }

        let t_src = normalizing_transform(source)?;
        let t_dst = normalizing_transform(destination)?;

        let n = source.len();
        let mut a = DMatrix::<f64>::zeros((2 * n).max(9), 9);
        for (i, (s, d)) in source.iter().zip(destination).enumerate() {
            let s = t_src.transform_point(s);
            let d = t_dst.transform_point(d);
            let (x, y, u, v) = (s.x, s.y, d.x, d.y);

            let r = 2 * i;
            a.row_mut(r)
                .copy_from_slice(&[-x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u]);
            a.row_mut(r + 1)
                .copy_from_slice(&[0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v]);
        }

        let svd = a.svd(false, true);
        let v_t = svd
            .v_t
            .ok_or(ProjectionError::DegenerateFit("singular value decomposition failed"))?;

        let mut order: Vec<usize> = (0..svd.singular_values.len()).collect();
        order.sort_by(|&i, &j| svd.singular_values[i].total_cmp(&svd.singular_values[j]));
        let smallest = order[0];
        let second = svd.singular_values[order[1]];
        let largest = svd.singular_values[order[order.len() - 1]];
        if second <= RANK_TOLERANCE * largest {
            return Err(ProjectionError::DegenerateFit("correspondences are collinear"));
        }

        let h = v_t.row(smallest);
        let normalized = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);

        // Checked in normalized coordinates so the bound does not depend on map units.
        // `normalized` has unit Frobenius norm.
        if normalized.determinant().abs() <= RANK_TOLERANCE {
            return Err(ProjectionError::DegenerateFit("matrix is singular"));
        }

        let t_dst_inv = t_dst
            .matrix()
            .try_inverse()
            .ok_or(ProjectionError::DegenerateFit("destination normalization not invertible"))?;
        let mut matrix = t_dst_inv * normalized * t_src.matrix();

        let scale = if matrix[(2, 2)].abs() > PROJECTION_EPSILON {
            matrix[(2, 2)]
        } else {
            matrix.norm()
        };
        matrix /= scale;

        if !matrix.iter().all(|v| v.is_finite()) {
            return Err(ProjectionError::DegenerateFit("non-finite matrix"));
        }
        Ok(Self {
            matrix,
            source: source.to_vec(),
            destination: destination.to_vec(),
        })
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn source_points(&self) -> &[Point2<f64>] {
        &self.source
    }

    pub fn destination_points(&self) -> &[Point2<f64>] {
        &self.destination
    }

    /// Homogeneous multiply followed by perspective divide.
    pub fn apply(&self, point: Point2<f64>) -> Result<Point2<f64>, ProjectionError> {
        let p = self.matrix * Vector3::new(point.x, point.y, 1.0);
        if p.z.abs() < PROJECTION_EPSILON {
            return Err(ProjectionError::DegenerateProjection {
                x: point.x,
                y: point.y,
                w: p.z,
            });
        }
        Ok(Point2::new(p.x / p.z, p.y / p.z))
    }

    /// Root-mean-square distance between projected source points and their destinations.
    pub fn reprojection_error(&self) -> f64 {
        let mut sum = 0.0;
        for (s, d) in self.source.iter().zip(&self.destination) {
            sum += match self.apply(*s) {
                Ok(p) => (p - *d).norm_squared(),
                Err(_) => return f64::INFINITY,
            };
        }
        (sum / self.source.len() as f64).sqrt()
    }
}

/// Similarity transform moving the centroid to the origin and scaling the
/// mean distance from it to sqrt(2).
fn normalizing_transform(points: &[Point2<f64>]) -> Result<Similarity, ProjectionError> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|p| (p.x - cx).hypot(p.y - cy))
        .sum::<f64>()
        / n;
    if mean_dist <= f64::EPSILON {
        return Err(ProjectionError::DegenerateFit("all points coincide"));
    }
    Ok(Similarity {
        scale: std::f64::consts::SQRT_2 / mean_dist,
        cx,
        cy,
    })
}

#[derive(Debug, Clone, Copy)]
struct Similarity {
    scale: f64,
    cx: f64,
    cy: f64,
}

impl Similarity {
    fn transform_point(&self, p: &Point2<f64>) -> Point2<f64> {
        Point2::new((p.x - self.cx) * self.scale, (p.y - self.cy) * self.scale)
    }

    fn matrix(&self) -> Matrix3<f64> {
        let s = self.scale;
        Matrix3::new(s, 0.0, -s * self.cx, 0.0, s, -s * self.cy, 0.0, 0.0, 1.0)
    }
}
