//! Normalized patch extraction from frames.

use crate::models::{Frame, Point, Quad, RoiRect};
use crate::quality::PatchSource;
use crate::utils::geometry::warp_quad;
use crate::utils::resize::{crop_luma, resize_to_square};
use image::GrayImage;

/// Side of every normalized patch
pub const PATCH_SIDE: u32 = 512;

/// Crop `roi` out of the frame and scale it to `PATCH_SIDE` square
pub(crate) fn crop_patch(frame: &Frame, roi: RoiRect) -> Option<(GrayImage, PatchSource)> {
    let roi = roi.clamped_nonempty(frame.width, frame.height)?;
    let crop = crop_luma(&frame.luma, frame.width, &roi)?;
    Some((resize_to_square(&crop, PATCH_SIDE), PatchSource::Crop(roi)))
}

/// Rectify `quad` (frame coordinates) after pushing its corners out by
/// `expand` to keep a quiet zone
pub(crate) fn rectify(frame: &Frame, quad: &Quad, expand: f32) -> Option<(GrayImage, PatchSource)> {
    let expanded = quad.expanded(expand);
    let (w, h) = (frame.width, frame.height);
    let (patch, _) = warp_quad(&frame.luma[..frame.area()], w, h, &expanded, PATCH_SIDE)?;
    Some((patch, PatchSource::Warp(expanded)))
}

/// Map a patch-space rect back into the frame as a quad
pub(crate) fn rect_to_frame(rect: &RoiRect, source: &PatchSource) -> Quad {
    let corners = [
        (rect.left, rect.top),
        (rect.right, rect.top),
        (rect.right, rect.bottom),
        (rect.left, rect.bottom),
    ]
    .map(|(x, y)| source.to_frame(Point::new(x as f32, y as f32), PATCH_SIDE));
    Quad { corners }
}
