//! Linear filters and tone mapping.
//!
//! Row-parallel where the work is per-pixel and independent (rayon).

use image::GrayImage;
use rayon::prelude::*;

/// Variance of the 4-neighbour Laplacian over interior pixels.
///
/// High for crisp edges, collapses under defocus and motion blur.
pub fn laplacian_variance(img: &GrayImage) -> f32 {
    let (w, h) = (img.width() as usize, img.height() as usize);
    if w < 3 || h < 3 {
        return 0.0;
    }
    let src = img.as_raw();
    let (sum, sq, n) = (1..h - 1)
        .into_par_iter()
        .map(|y| {
            let mut s = 0f64;
            let mut q = 0f64;
            for x in 1..w - 1 {
                let c = src[y * w + x] as f64;
                let lap = src[(y - 1) * w + x] as f64
                    + src[(y + 1) * w + x] as f64
                    + src[y * w + x - 1] as f64
                    + src[y * w + x + 1] as f64
                    - 4.0 * c;
                s += lap;
                q += lap * lap;
            }
            (s, q, (w - 2) as f64)
        })
        .reduce(|| (0.0, 0.0, 0.0), |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2));
    let mean = sum / n;
    (sq / n - mean * mean).max(0.0) as f32
}

/// Sobel gradient magnitude per pixel, row-major. Borders replicate the
/// edge pixels.
pub fn sobel_magnitude(img: &GrayImage) -> Vec<f32> {
    imageproc::gradients::sobel_gradients(img)
        .into_raw()
        .into_iter()
        .map(f32::from)
        .collect()
}

/// Global histogram equalization
pub fn equalize_histogram(img: &GrayImage) -> GrayImage {
    imageproc::contrast::equalize_histogram(img)
}

/// Contrast-limited local equalization over a `tiles x tiles` grid with
/// bilinear blending between neighbouring tile mappings.
pub fn local_contrast_equalize(img: &GrayImage, tiles: usize, clip_limit: f32) -> GrayImage {
    let (w, h) = (img.width() as usize, img.height() as usize);
    if tiles == 0 || w < tiles || h < tiles {
        return equalize_histogram(img);
    }
    let tile_w = w / tiles;
    let tile_h = h / tiles;
    let src = img.as_raw();

    let mut maps = vec![[0u8; 256]; tiles * tiles];
    for ty in 0..tiles {
        for tx in 0..tiles {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = if tx == tiles - 1 { w } else { x0 + tile_w };
            let y1 = if ty == tiles - 1 { h } else { y0 + tile_h };
            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for &v in &src[y * w + x0..y * w + x1] {
                    hist[v as usize] += 1;
                }
            }
            let clip = ((clip_limit * ((x1 - x0) * (y1 - y0)) as f32 / 256.0) as u32).max(1);
            let mut excess = 0u32;
            for bin in hist.iter_mut() {
                if *bin > clip {
                    excess += *bin - clip;
                    *bin = clip;
                }
            }
            let per_bin = excess / 256;
            let remainder = (excess % 256) as usize;
            for (i, bin) in hist.iter_mut().enumerate() {
                *bin += per_bin + u32::from(i < remainder);
            }
            maps[ty * tiles + tx] = cdf_lut(&hist);
        }
    }

    let last = tiles as f32 - 1.0;
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        let v = src[y as usize * w + x as usize] as usize;
        let fx = ((x as f32 + 0.5) / tile_w as f32 - 0.5).clamp(0.0, last);
        let fy = ((y as f32 + 0.5) / tile_h as f32 - 0.5).clamp(0.0, last);
        let (tx0, ty0) = (fx.floor() as usize, fy.floor() as usize);
        let (tx1, ty1) = ((tx0 + 1).min(tiles - 1), (ty0 + 1).min(tiles - 1));
        let (ax, ay) = (fx - tx0 as f32, fy - ty0 as f32);
        let m = |tx: usize, ty: usize| maps[ty * tiles + tx][v] as f32;
        let top = m(tx0, ty0) * (1.0 - ax) + m(tx1, ty0) * ax;
        let bottom = m(tx0, ty1) * (1.0 - ax) + m(tx1, ty1) * ax;
        image::Luma([(top * (1.0 - ay) + bottom * ay).round().clamp(0.0, 255.0) as u8])
    })
}

fn cdf_lut(hist: &[u32; 256]) -> [u8; 256] {
    let mut lut = [0u8; 256];
    let total: u32 = hist.iter().sum();
    let cdf_min = hist.iter().copied().find(|&c| c > 0).unwrap_or(0);
    let denom = total.saturating_sub(cdf_min);
    let mut acc = 0u32;
    for (i, &c) in hist.iter().enumerate() {
        acc += c;
        lut[i] = if denom == 0 {
            i as u8
        } else {
            ((acc.saturating_sub(cdf_min) as f32 / denom as f32) * 255.0).round() as u8
        };
    }
    lut
}

/// Gaussian blur
pub fn gaussian_blur(img: &GrayImage, sigma: f32) -> GrayImage {
    image::imageops::blur(img, sigma)
}

/// Unsharp mask: boost the difference from a Gaussian-blurred copy
pub fn unsharp_mask(img: &GrayImage, sigma: f32, threshold: i32) -> GrayImage {
    image::imageops::unsharpen(img, sigma, threshold)
}
