use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in TLBR form: top-left `(x1, y1)`, bottom-right `(x2, y2)`.
///
/// A well-formed box has `x1 < x2` and `y1 < y2`. Construction does not
/// enforce this; use [`Rect::is_valid`] before feeding a box into association.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Rect {
    #[inline]
    pub fn from_tlbr(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Create a Rect from top-left coordinates and dimensions.
    #[inline]
    pub fn from_tlwh(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x1: x,
            y1: y,
            x2: x + width,
            y2: y + height,
        }
    }

    /// Create a Rect centered on `(cx, cy)`.
    #[inline]
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self::from_tlwh(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    #[inline]
    pub fn to_tlbr(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Center point of the box.
    #[inline]
    pub fn center(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Area of the box; zero for inverted or empty boxes.
    #[inline]
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite()
    }

    /// True when the box is finite and has strictly positive width and height.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.is_finite() && self.x1 < self.x2 && self.y1 < self.y2
    }

    /// Calculate Intersection over Union (IoU) with another bounding box.
    pub fn iou(&self, other: &Rect) -> f32 {
        let x1 = self.x1.max(other.x1);
        let y1 = self.y1.max(other.y1);
        let x2 = self.x2.min(other.x2);
        let y2 = self.y2.min(other.y2);

        let inter_area = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union_area = self.area() + other.area() - inter_area;

        if union_area > 0.0 {
            inter_area / union_area
        } else {
            0.0
        }
    }

    /// Integer pixel region `(x, y, width, height)` of this box clipped to an
    /// image of `image_width` x `image_height`. `None` if nothing remains.
    pub fn pixel_region(&self, image_width: u32, image_height: u32) -> Option<(u32, u32, u32, u32)> {
        if !self.is_finite() {
            return None;
        }
        let clamp_x = |v: f32| v.round().clamp(0.0, image_width as f32) as u32;
        let clamp_y = |v: f32| v.round().clamp(0.0, image_height as f32) as u32;

        let (x1, x2) = (clamp_x(self.x1), clamp_x(self.x2));
        let (y1, y2) = (clamp_y(self.y1), clamp_y(self.y2));
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

/// Calculate IoU matrix between two sets of bounding boxes.
///
/// Returns a matrix of shape (M, N) where M is the length of `boxes_a`
/// and N is the length of `boxes_b`.
pub fn iou_batch(boxes_a: &[Rect], boxes_b: &[Rect]) -> Array2<f32> {
    let mut ious = Array2::zeros((boxes_a.len(), boxes_b.len()));
    for (i, a) in boxes_a.iter().enumerate() {
        for (j, b) in boxes_b.iter().enumerate() {
            ious[[i, j]] = a.iou(b);
        }
    }
    ious
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_constructors() {
        let rect = Rect::from_tlwh(10.0, 20.0, 30.0, 40.0);
        assert_eq!(rect.to_tlbr(), [10.0, 20.0, 40.0, 60.0]);
        assert_eq!(rect.center(), (25.0, 40.0));

        let centered = Rect::from_center(25.0, 40.0, 30.0, 40.0);
        assert_eq!(centered, rect);
    }

    #[test]
    fn test_validity() {
        assert!(Rect::from_tlbr(0.0, 0.0, 1.0, 1.0).is_valid());
        assert!(!Rect::from_tlbr(5.0, 0.0, 5.0, 10.0).is_valid());
        assert!(!Rect::from_tlbr(0.0, 10.0, 10.0, 2.0).is_valid());
        assert!(!Rect::from_tlbr(0.0, 0.0, f32::NAN, 10.0).is_valid());
        assert_eq!(Rect::from_tlbr(0.0, 10.0, 10.0, 2.0).area(), 0.0);
    }

    #[test]
    fn test_iou() {
        let a = Rect::from_tlwh(0.0, 0.0, 10.0, 10.0);
        let b = Rect::from_tlwh(5.0, 5.0, 10.0, 10.0);

        // Intersection: 5x5 = 25, union: 100 + 100 - 25 = 175
        let iou = a.iou(&b);
        assert!((iou - 25.0 / 175.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = Rect::from_tlwh(0.0, 0.0, 10.0, 10.0);
        let b = Rect::from_tlwh(20.0, 20.0, 10.0, 10.0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_iou_same_box() {
        let a = Rect::from_tlwh(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_batch_shape() {
        let a = [Rect::from_tlwh(0.0, 0.0, 10.0, 10.0)];
        let b = [
            Rect::from_tlwh(0.0, 0.0, 10.0, 10.0),
            Rect::from_tlwh(50.0, 50.0, 10.0, 10.0),
        ];
        let ious = iou_batch(&a, &b);
        assert_eq!(ious.dim(), (1, 2));
        assert!((ious[[0, 0]] - 1.0).abs() < 1e-6);
        assert_eq!(ious[[0, 1]], 0.0);
    }

    #[test]
    fn test_pixel_region_clips_to_image() {
        let rect = Rect::from_tlbr(-10.0, 5.0, 30.0, 200.0);
        assert_eq!(rect.pixel_region(20, 100), Some((0, 5, 20, 95)));

        let outside = Rect::from_tlbr(50.0, 50.0, 60.0, 60.0);
        assert_eq!(outside.pixel_region(20, 20), None);
    }
}
