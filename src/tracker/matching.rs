//! Detection input and association utilities for the track store.

use crate::tracker::rect::Rect;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cost used for padded cells and gated (below-threshold) pairs.
const GATED_COST: f64 = 1e6;

/// Detection input for the tracker, produced by a detection collaborator per frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Bounding box in TLBR format (x1, y1, x2, y2)
    pub bbox: Rect,
    /// Detection confidence score in `[0, 1]`
    pub score: f32,
    pub class_id: u32,
    pub label: String,
}

/// Reason a detection was refused before association.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectionError {
    #[error("invalid box geometry ({x1}, {y1}, {x2}, {y2}): expected x1 < x2 and y1 < y2")]
    InvalidGeometry { x1: f32, y1: f32, x2: f32, y2: f32 },
    #[error("box contains non-finite coordinates")]
    NonFinite,
    #[error("confidence {0} outside [0, 1]")]
    ScoreOutOfRange(f32),
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, score: f32) -> Self {
        Self {
            bbox: Rect::from_tlbr(x1, y1, x2, y2),
            score,
            class_id: 0,
            label: String::new(),
        }
    }

    pub fn from_rect(bbox: Rect, score: f32) -> Self {
        Self {
            bbox,
            score,
            class_id: 0,
            label: String::new(),
        }
    }

    /// Attach a class id and human-readable label.
    pub fn with_class(mut self, class_id: u32, label: impl Into<String>) -> Self {
        self.class_id = class_id;
        self.label = label.into();
        self
    }

    /// Check geometry and score. Degenerate (zero-area) boxes are rejected.
    pub fn validate(&self) -> Result<(), DetectionError> {
        if !self.bbox.is_finite() {
            return Err(DetectionError::NonFinite);
        }
        if !self.bbox.is_valid() {
            let [x1, y1, x2, y2] = self.bbox.to_tlbr();
            return Err(DetectionError::InvalidGeometry { x1, y1, x2, y2 });
        }
        if !(0.0..=1.0).contains(&self.score) {
            return Err(DetectionError::ScoreOutOfRange(self.score));
        }
        Ok(())
    }
}

/// Compute IoU distance matrix between tracks and detections.
pub fn iou_distance(track_boxes: &[Rect], det_boxes: &[Rect]) -> Array2<f32> {
    let mut dists = Array2::zeros((track_boxes.len(), det_boxes.len()));
    for (i, t) in track_boxes.iter().enumerate() {
        for (j, d) in det_boxes.iter().enumerate() {
            dists[[i, j]] = 1.0 - t.iou(d);
        }
    }
    dists
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentResult {
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_detections: Vec<usize>,
}

impl AssignmentResult {
    fn from_matches(matches: Vec<(usize, usize)>, num_rows: usize, num_cols: usize) -> Self {
        let mut row_matched = vec![false; num_rows];
        let mut col_matched = vec![false; num_cols];
        for &(r, c) in &matches {
            row_matched[r] = true;
            col_matched[c] = true;
        }
        let unmatched = |mask: Vec<bool>| -> Vec<usize> {
            mask.iter()
                .enumerate()
                .filter_map(|(i, &m)| if m { None } else { Some(i) })
                .collect()
        };
        Self {
            matches,
            unmatched_tracks: unmatched(row_matched),
            unmatched_detections: unmatched(col_matched),
        }
    }
}

/// Optimal assignment over a cost matrix, accepting only pairs with cost `<= thresh`.
///
/// Pairs above `thresh` are gated before solving so that the solver maximizes
/// the number of acceptable matches first and total cost second.
/// Returns `None` when the underlying solver fails.
pub fn linear_assignment(cost_matrix: &Array2<f32>, thresh: f32) -> Option<AssignmentResult> {
    let (num_rows, num_cols) = cost_matrix.dim();

    if num_rows == 0 || num_cols == 0 {
        return Some(AssignmentResult::from_matches(vec![], num_rows, num_cols));
    }

    let size = num_rows.max(num_cols);
    let mut padded = Array2::<f64>::from_elem((size, size), GATED_COST);

    for i in 0..num_rows {
        for j in 0..num_cols {
            let cost = cost_matrix[[i, j]];
            if cost <= thresh {
                padded[[i, j]] = cost as f64;
            }
        }
    }

    let (row_to_col, _) = lapjv::lapjv(&padded).ok()?;
    let matches = row_to_col
        .iter()
        .enumerate()
        .filter(|&(row, &col)| {
            row < num_rows && col < num_cols && cost_matrix[[row, col]] <= thresh
        })
        .map(|(row, &col)| (row, col))
        .collect();

    Some(AssignmentResult::from_matches(matches, num_rows, num_cols))
}

/// Greedy assignment: repeatedly take the cheapest remaining pair with cost `<= thresh`.
///
/// Ties are broken by row then column index so the result is deterministic.
pub fn greedy_assignment(cost_matrix: &Array2<f32>, thresh: f32) -> AssignmentResult {
    let (num_rows, num_cols) = cost_matrix.dim();

    let mut candidates: Vec<(f32, usize, usize)> = cost_matrix
        .indexed_iter()
        .filter(|&(_, &cost)| cost <= thresh)
        .map(|((i, j), &cost)| (cost, i, j))
        .collect();
    candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)).then(a.2.cmp(&b.2)));

    let mut row_used = vec![false; num_rows];
    let mut col_used = vec![false; num_cols];
    let mut matches = Vec::new();
    for (_, i, j) in candidates {
        if !row_used[i] && !col_used[j] {
            row_used[i] = true;
            col_used[j] = true;
            matches.push((i, j));
        }
    }
    matches.sort_unstable();

    AssignmentResult::from_matches(matches, num_rows, num_cols)
}
