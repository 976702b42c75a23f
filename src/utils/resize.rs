//! Cropping and resizing into fixed-size patches.

use crate::models::RoiRect;
use image::GrayImage;
use image::imageops::{self, FilterType};

/// Copy `roi` (already clamped to the buffer) out of a row-major luma buffer
pub fn crop_luma(luma: &[u8], width: usize, roi: &RoiRect) -> Option<GrayImage> {
    if roi.is_empty() || roi.left < 0 || roi.top < 0 {
        return None;
    }
    let (x0, y0) = (roi.left as usize, roi.top as usize);
    let (w, h) = (roi.width() as usize, roi.height() as usize);
    if x0 + w > width || (y0 + h) * width > luma.len() {
        return None;
    }
    let mut out = Vec::with_capacity(w * h);
    for y in y0..y0 + h {
        out.extend_from_slice(&luma[y * width + x0..y * width + x0 + w]);
    }
    GrayImage::from_raw(w as u32, h as u32, out)
}

/// Area-averaging resize. Each destination pixel is the coverage-weighted
/// mean of the source pixels under it. Intended for downscaling.
pub fn resize_area(img: &GrayImage, dst_w: u32, dst_h: u32) -> GrayImage {
    let (sw, sh) = (img.width() as usize, img.height() as usize);
    if sw == 0 || sh == 0 || dst_w == 0 || dst_h == 0 {
        return GrayImage::new(dst_w, dst_h);
    }
    let sx = sw as f64 / dst_w as f64;
    let sy = sh as f64 / dst_h as f64;
    let src = img.as_raw();
    GrayImage::from_fn(dst_w, dst_h, |dx, dy| {
        let fx0 = dx as f64 * sx;
        let fx1 = fx0 + sx;
        let fy0 = dy as f64 * sy;
        let fy1 = fy0 + sy;
        let mut acc = 0.0f64;
        let mut weight = 0.0f64;
        let mut y = fy0.floor() as usize;
        while (y as f64) < fy1 && y < sh {
            let wy = (fy1.min(y as f64 + 1.0) - fy0.max(y as f64)).max(0.0);
            let mut x = fx0.floor() as usize;
            while (x as f64) < fx1 && x < sw {
                let wx = (fx1.min(x as f64 + 1.0) - fx0.max(x as f64)).max(0.0);
                acc += src[y * sw + x] as f64 * wx * wy;
                weight += wx * wy;
                x += 1;
            }
            y += 1;
        }
        let v = if weight > 0.0 { acc / weight } else { 255.0 };
        image::Luma([v.round().clamp(0.0, 255.0) as u8])
    })
}

/// Cubic (Catmull-Rom) resize, used for upscaling
pub fn resize_cubic(img: &GrayImage, dst_w: u32, dst_h: u32) -> GrayImage {
    imageops::resize(img, dst_w, dst_h, FilterType::CatmullRom)
}

/// Scale to `side x side`: area averaging when shrinking, cubic when growing.
pub fn resize_to_square(img: &GrayImage, side: u32) -> GrayImage {
    if img.dimensions() == (side, side) {
        return img.clone();
    }
    if img.width() >= side && img.height() >= side {
        resize_area(img, side, side)
    } else {
        resize_cubic(img, side, side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_bounds() {
        let luma: Vec<u8> = (0..100).map(|i| i as u8).collect();
        let img = crop_luma(&luma, 10, &RoiRect::new(2, 3, 5, 6)).unwrap();
        assert_eq!(img.dimensions(), (3, 3));
        assert_eq!(img.get_pixel(0, 0)[0], 32);
        assert!(crop_luma(&luma, 10, &RoiRect::new(8, 8, 12, 12)).is_none());
        assert!(crop_luma(&luma, 10, &RoiRect::new(4, 4, 4, 9)).is_none());
    }

    #[test]
    fn test_area_resize_averages() {
        let img = GrayImage::from_fn(4, 4, |x, _| if x < 2 { image::Luma([0]) } else { image::Luma([200]) });
        let out = resize_area(&img, 2, 2);
        assert_eq!(out.get_pixel(0, 0)[0], 0);
        assert_eq!(out.get_pixel(1, 1)[0], 200);
        let half = resize_area(&img, 1, 1);
        assert_eq!(half.get_pixel(0, 0)[0], 100);
    }

    #[test]
    fn test_resize_to_square_picks_direction() {
        let small = GrayImage::from_pixel(10, 10, image::Luma([90]));
        assert_eq!(resize_to_square(&small, 32).dimensions(), (32, 32));
        let big = GrayImage::from_pixel(100, 80, image::Luma([90]));
        let out = resize_to_square(&big, 32);
        assert_eq!(out.dimensions(), (32, 32));
        assert_eq!(out.get_pixel(10, 10)[0], 90);
    }
}
