//! Builder for creating Detection objects from detector output formats.

use crate::tracker::{Detection, Rect};

/// Builder for creating `Detection` objects from various box formats.
#[derive(Debug, Clone, Default)]
pub struct DetectionBuilder {
    bbox: Rect,
    score: f32,
    class_id: u32,
    label: String,
}

impl DetectionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set bounding box in TLBR format (x1, y1, x2, y2).
    pub fn tlbr(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.bbox = Rect::from_tlbr(x1, y1, x2, y2);
        self
    }

    /// Set bounding box in XYWH format (center_x, center_y, width, height).
    pub fn xywh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.bbox = Rect::from_center(cx, cy, w, h);
        self
    }

    /// Set bounding box in TLWH format (left, top, width, height).
    pub fn tlwh(mut self, x: f32, y: f32, w: f32, h: f32) -> Self {
        self.bbox = Rect::from_tlwh(x, y, w, h);
        self
    }

    /// Set the confidence score.
    pub fn score(mut self, score: f32) -> Self {
        self.score = score;
        self
    }

    pub fn class(mut self, class_id: u32, label: impl Into<String>) -> Self {
        self.class_id = class_id;
        self.label = label.into();
        self
    }

    /// Build the final `Detection`. Geometry is checked later by the track store.
    pub fn build(self) -> Detection {
        Detection::from_rect(self.bbox, self.score).with_class(self.class_id, self.label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_builder() {
        let det = DetectionBuilder::new()
            .xywh(30.0, 50.0, 40.0, 60.0)
            .score(0.95)
            .class(32, "sports ball")
            .build();

        assert_eq!(det.bbox.to_tlbr(), [10.0, 20.0, 50.0, 80.0]);
        assert_eq!(det.score, 0.95);
        assert_eq!(det.class_id, 32);
        assert_eq!(det.label, "sports ball");
    }

    #[test]
    fn test_tlwh_matches_tlbr() {
        let a = DetectionBuilder::new().tlwh(10.0, 20.0, 40.0, 60.0).build();
        let b = DetectionBuilder::new().tlbr(10.0, 20.0, 50.0, 80.0).build();
        assert_eq!(a.bbox, b.bbox);
    }
}
