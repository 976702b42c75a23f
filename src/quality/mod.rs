//! Patch quality scoring and the quality-ranked frame cache.

mod cache;

pub use cache::{CachedPatch, FrameCache, PatchSource, CACHE_CAPACITY};

use crate::utils::filters::laplacian_variance;
use image::GrayImage;
use rayon::prelude::*;
use std::cmp::Ordering;

/// Luma at or above this counts as saturated
pub const OVEREXPOSED_LUMA: u8 = 250;

/// Quality metrics of a normalized patch
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RoiQuality {
    /// Variance of the Laplacian response
    pub sharpness: f32,
    /// Fraction of near-saturated pixels
    pub overexposed_ratio: f32,
    /// Intensity standard deviation
    pub contrast: f32,
}

impl RoiQuality {
    /// Ranking order: sharper first, then less overexposed, then more contrast.
    /// `Ordering::Less` means `self` ranks ahead of `other`.
    pub fn rank_cmp(&self, other: &Self) -> Ordering {
        other
            .sharpness
            .total_cmp(&self.sharpness)
            .then_with(|| self.overexposed_ratio.total_cmp(&other.overexposed_ratio))
            .then_with(|| other.contrast.total_cmp(&self.contrast))
    }
}

/// Score a patch. Pure.
pub fn score(patch: &GrayImage) -> RoiQuality {
    let px = patch.as_raw();
    if px.is_empty() {
        return RoiQuality::default();
    }
    let (sum, sq, bright) = px
        .par_chunks(4096)
        .map(|chunk| {
            chunk.iter().fold((0u64, 0u64, 0u64), |(s, q, b), &v| {
                (s + v as u64, q + v as u64 * v as u64, b + u64::from(v >= OVEREXPOSED_LUMA))
            })
        })
        .reduce(|| (0, 0, 0), |a, b| (a.0 + b.0, a.1 + b.1, a.2 + b.2));
    let n = px.len() as f64;
    let mean = sum as f64 / n;
    let var = (sq as f64 / n - mean * mean).max(0.0);
    RoiQuality {
        sharpness: laplacian_variance(patch),
        overexposed_ratio: (bright as f64 / n) as f32,
        contrast: var.sqrt() as f32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::filters::gaussian_blur;

    fn bars(size: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, _| if (x / 4) % 2 == 0 { image::Luma([30]) } else { image::Luma([220]) })
    }

    #[test]
    fn test_score_sharp_vs_blurred() {
        let sharp = score(&bars(64));
        let soft = score(&gaussian_blur(&bars(64), 3.0));
        assert!(sharp.sharpness > soft.sharpness);
        assert!(sharp.contrast > soft.contrast);
        assert_eq!(sharp.overexposed_ratio, 0.0);
    }

    #[test]
    fn test_score_overexposure_and_flat() {
        let img = GrayImage::from_fn(10, 10, |x, _| if x < 3 { image::Luma([255]) } else { image::Luma([100]) });
        let q = score(&img);
        assert!((q.overexposed_ratio - 0.3).abs() < 1e-6);

        let flat = score(&GrayImage::from_pixel(8, 8, image::Luma([128])));
        assert_eq!(flat.sharpness, 0.0);
        assert_eq!(flat.contrast, 0.0);
    }

    #[test]
    fn test_rank_cmp_order() {
        let a = RoiQuality { sharpness: 10.0, overexposed_ratio: 0.5, contrast: 1.0 };
        let b = RoiQuality { sharpness: 5.0, overexposed_ratio: 0.0, contrast: 90.0 };
        assert_eq!(a.rank_cmp(&b), Ordering::Less);
        let c = RoiQuality { sharpness: 10.0, overexposed_ratio: 0.1, contrast: 1.0 };
        assert_eq!(c.rank_cmp(&a), Ordering::Less);
        let d = RoiQuality { sharpness: 10.0, overexposed_ratio: 0.1, contrast: 2.0 };
        assert_eq!(d.rank_cmp(&c), Ordering::Less);
    }
}
