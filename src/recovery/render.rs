//! Rendering a bit grid back into pixels for the decode primitive.

use crate::utils::margins::pad_white_per_side;
use crate::utils::resize::resize_area;
use image::GrayImage;

/// Raster side used for rendered grids
pub const RENDER_SIDE: u32 = 512;

/// Draw `bits` (row-major, `size x size`, true = black) centered in a
/// `side x side` raster with `quiet_zone` light modules on every side.
/// Nearest-neighbour: every pixel takes the module it falls in.
pub fn render_grid(bits: &[bool], size: usize, quiet_zone: usize, side: u32) -> GrayImage {
    let total = (size + 2 * quiet_zone) as f32;
    let module_px = side as f32 / total.max(1.0);
    GrayImage::from_fn(side, side, |x, y| {
        let mx = ((x as f32 + 0.5) / module_px).floor() as isize - quiet_zone as isize;
        let my = ((y as f32 + 0.5) / module_px).floor() as isize - quiet_zone as isize;
        let inside = mx >= 0 && my >= 0 && (mx as usize) < size && (my as usize) < size;
        let black = inside && bits.get(my as usize * size + mx as usize).copied().unwrap_or(false);
        image::Luma([if black { 0 } else { 255 }])
    })
}

/// Pad a rendering with white on every side and scale back to its size,
/// for decoders that want a wider margin than the render gives.
pub fn pad_and_rescale(img: &GrayImage, pad_fraction: f32) -> GrayImage {
    let (w, h) = img.dimensions();
    let pad = (w.min(h) as f32 * pad_fraction).round() as u32;
    let padded = pad_white_per_side(img, pad, pad, pad, pad);
    resize_area(&padded, w, h)
}
