//! Binarization primitives.
//!
//! Renderings handed to the decode primitive stay 8-bit (0 = dark,
//! 255 = light); the recovery engine works on [`crate::models::BitMatrix`].

use super::integral::IntegralImage;
use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology;

/// Otsu split of a histogram: threshold plus the two class means
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OtsuSplit {
    /// Values below this are dark
    pub threshold: u8,
    /// Mean of the dark class
    pub dark_mean: f32,
    /// Mean of the light class
    pub light_mean: f32,
}

impl OtsuSplit {
    /// Distance between the class means
    pub fn separation(&self) -> f32 {
        self.light_mean - self.dark_mean
    }
}

/// Compute Otsu's threshold and class means in one pass over the histogram
pub fn otsu_split(luma: &[u8]) -> OtsuSplit {
    let mut histogram = [0u64; 256];
    for &v in luma {
        histogram[v as usize] += 1;
    }

    let total: u64 = luma.len() as u64;
    let total_sum: u64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &c)| i as u64 * c)
        .sum();

    let mut best = OtsuSplit {
        threshold: 128,
        dark_mean: 0.0,
        light_mean: 255.0,
    };
    if total == 0 {
        return best;
    }

    let mut max_variance = -1.0f64;
    let mut dark_count = 0u64;
    let mut dark_sum = 0u64;
    for threshold in 1..=255usize {
        // Class 1 holds intensities strictly below `threshold`.
        dark_count += histogram[threshold - 1];
        dark_sum += (threshold as u64 - 1) * histogram[threshold - 1];
        let light_count = total - dark_count;
        if dark_count == 0 || light_count == 0 {
            continue;
        }
        let dark_mean = dark_sum as f64 / dark_count as f64;
        let light_mean = (total_sum - dark_sum) as f64 / light_count as f64;
        let w1 = dark_count as f64 / total as f64;
        let w2 = light_count as f64 / total as f64;
        let variance = w1 * w2 * (dark_mean - light_mean).powi(2);
        if variance > max_variance {
            max_variance = variance;
            best = OtsuSplit {
                threshold: threshold as u8,
                dark_mean: dark_mean as f32,
                light_mean: light_mean as f32,
            };
        }
    }

    best
}

/// Median of the dark class (`< threshold`) and of the light class.
///
/// Less sensitive than the class means to a minority of mid-grey pixels.
pub fn class_medians(luma: &[u8], threshold: u8) -> Option<(u8, u8)> {
    let mut histogram = [0u64; 256];
    for &v in luma {
        histogram[v as usize] += 1;
    }
    let t = threshold as usize;
    let dark: u64 = histogram[..t].iter().sum();
    let light: u64 = histogram[t..].iter().sum();
    if dark == 0 || light == 0 {
        return None;
    }
    let median_in = |lo: usize, hi: usize, count: u64| -> u8 {
        let half = count.div_ceil(2);
        let mut acc = 0u64;
        for v in lo..hi {
            acc += histogram[v];
            if acc >= half {
                return v as u8;
            }
        }
        (hi - 1) as u8
    };
    Some((median_in(0, t, dark), median_in(t, 256, light)))
}

/// Adaptive local-mean threshold: a pixel is dark when it is more than
/// `offset` below the mean of its `(2 * radius + 1)` square window.
pub fn adaptive_mean_threshold(img: &GrayImage, radius: u32, offset: i32) -> GrayImage {
    let (w, h) = img.dimensions();
    let integral = IntegralImage::new(img.as_raw(), w as usize, h as usize);
    let r = radius as usize;
    GrayImage::from_fn(w, h, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let mean = integral.window_mean(x, y, r);
        let v = img.as_raw()[y * w as usize + x] as f64;
        if v < mean - offset as f64 {
            image::Luma([0])
        } else {
            image::Luma([255])
        }
    })
}

/// Sauvola threshold: `T = m * (1 + k * (s / R - 1))` with `R = 128`.
///
/// Robust to uneven illumination where a single global cut fails.
pub fn sauvola_threshold(img: &GrayImage, window: u32, k: f32) -> GrayImage {
    const DYNAMIC_RANGE: f64 = 128.0;
    let (w, h) = img.dimensions();
    let integral = IntegralImage::new(img.as_raw(), w as usize, h as usize);
    let r = (window / 2).max(1) as usize;
    GrayImage::from_fn(w, h, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let (mean, std) = integral.window_mean_std(x, y, r);
        let t = mean * (1.0 + k as f64 * (std / DYNAMIC_RANGE - 1.0));
        let v = img.as_raw()[y * w as usize + x] as f64;
        if v <= t {
            image::Luma([0])
        } else {
            image::Luma([255])
        }
    })
}

/// Morphological close of the dark foreground of a binary rendering:
/// grow dark regions by `radius` (Chebyshev), then shrink them back. Fills
/// pinholes and hairline gaps inside modules.
///
/// imageproc treats non-zero pixels as foreground, so closing the dark
/// regions is an opening of the light ones.
pub fn close_dark(img: &GrayImage, radius: u8) -> GrayImage {
    morphology::open(img, Norm::LInf, radius)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_otsu_split() {
        let mut gray = vec![50u8; 50];
        gray.extend(vec![200u8; 50]);

        let split = otsu_split(&gray);
        assert!(split.threshold > 50 && split.threshold <= 200);
        assert!((split.dark_mean - 50.0).abs() < 1e-3);
        assert!((split.light_mean - 200.0).abs() < 1e-3);
    }

    #[test]
    fn test_class_medians_ignore_grey_minority() {
        let mut luma = vec![20u8; 40];
        luma.extend(vec![115u8; 10]);
        luma.extend(vec![140u8; 10]);
        luma.extend(vec![235u8; 40]);
        assert_eq!(class_medians(&luma, 128), Some((20, 235)));
        assert_eq!(class_medians(&luma, 10), None);
    }

    #[test]
    fn test_adaptive_handles_gradient() {
        // Dark square on a left-to-right illumination ramp.
        let img = GrayImage::from_fn(40, 40, |x, y| {
            let base = 100 + (x * 2) as u8;
            if (15..25).contains(&x) && (15..25).contains(&y) {
                image::Luma([base / 3])
            } else {
                image::Luma([base])
            }
        });
        let out = adaptive_mean_threshold(&img, 7, 10);
        assert_eq!(out.get_pixel(20, 20)[0], 0);
        assert_eq!(out.get_pixel(2, 2)[0], 255);
        assert_eq!(out.get_pixel(37, 37)[0], 255);
    }

    #[test]
    fn test_sauvola_separates_dark_square() {
        let img = GrayImage::from_fn(60, 60, |x, y| {
            if (20..40).contains(&x) && (20..40).contains(&y) {
                image::Luma([30])
            } else {
                image::Luma([220])
            }
        });
        let out = sauvola_threshold(&img, 25, 0.34);
        assert_eq!(out.get_pixel(30, 30)[0], 0);
        assert_eq!(out.get_pixel(21, 21)[0], 0);
        assert_eq!(out.get_pixel(5, 5)[0], 255);
    }

    #[test]
    fn test_close_fills_pinhole() {
        let mut img = GrayImage::from_pixel(9, 9, image::Luma([255]));
        for y in 2..7 {
            for x in 2..7 {
                img.put_pixel(x, y, image::Luma([0]));
            }
        }
        img.put_pixel(4, 4, image::Luma([255]));
        let closed = close_dark(&img, 1);
        assert_eq!(closed.get_pixel(4, 4)[0], 0);
        assert_eq!(closed.get_pixel(0, 0)[0], 255);
        // The square keeps its outline.
        assert_eq!(closed.get_pixel(2, 2)[0], 0);
        assert_eq!(closed.get_pixel(1, 4)[0], 255);
        assert_eq!(closed.get_pixel(7, 4)[0], 255);
    }
}
