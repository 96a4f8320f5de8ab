use image::imageops;

use crate::integration::Frame;
use crate::tracker::Rect;

/// Side length of the black crop substituted for boxes with no pixels in frame.
pub const PLACEHOLDER_CROP_SIZE: u32 = 10;

/// Pixels of `frame` under `bbox`, clipped to the frame. `None` if nothing remains.
pub fn crop(frame: &Frame, bbox: &Rect) -> Option<Frame> {
    let (x, y, w, h) = bbox.pixel_region(frame.width(), frame.height())?;
    Some(imageops::crop_imm(frame, x, y, w, h).to_image())
}

/// Like [`crop`], but never skips: degenerate regions yield a black placeholder
/// so crop lists stay index-aligned with their tracks.
pub fn crop_or_placeholder(frame: &Frame, bbox: &Rect) -> Frame {
    crop(frame, bbox).unwrap_or_else(|| Frame::new(PLACEHOLDER_CROP_SIZE, PLACEHOLDER_CROP_SIZE))
}
