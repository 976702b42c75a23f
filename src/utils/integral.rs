/// Summed-area tables for O(1) window statistics
pub struct IntegralImage {
    width: usize,
    height: usize,
    sum: Vec<u64>,
    sq_sum: Vec<u64>,
}

impl IntegralImage {
    /// Build sum and squared-sum tables over a row-major luma buffer
    pub fn new(luma: &[u8], width: usize, height: usize) -> Self {
        let iw = width + 1;
        let mut sum = vec![0u64; iw * (height + 1)];
        let mut sq_sum = vec![0u64; iw * (height + 1)];
        for y in 0..height {
            let mut row = 0u64;
            let mut row_sq = 0u64;
            for x in 0..width {
                let v = luma[y * width + x] as u64;
                row += v;
                row_sq += v * v;
                sum[(y + 1) * iw + x + 1] = sum[y * iw + x + 1] + row;
                sq_sum[(y + 1) * iw + x + 1] = sq_sum[y * iw + x + 1] + row_sq;
            }
        }
        Self {
            width,
            height,
            sum,
            sq_sum,
        }
    }

    /// Sum and squared sum over `[x0, x1) x [y0, y1)`, clipped to the image.
    /// Returns `(sum, sq_sum, pixel_count)`.
    pub fn rect_sums(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> (u64, u64, u64) {
        let x1 = x1.min(self.width);
        let y1 = y1.min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return (0, 0, 0);
        }
        let iw = self.width + 1;
        let at = |t: &[u64], x: usize, y: usize| t[y * iw + x];
        let s = at(&self.sum, x1, y1) + at(&self.sum, x0, y0) - at(&self.sum, x0, y1) - at(&self.sum, x1, y0);
        let q = at(&self.sq_sum, x1, y1) + at(&self.sq_sum, x0, y0)
            - at(&self.sq_sum, x0, y1)
            - at(&self.sq_sum, x1, y0);
        (s, q, ((x1 - x0) * (y1 - y0)) as u64)
    }

    /// Mean over `[x0, x1) x [y0, y1)`; `None` when the rect is empty
    pub fn rect_mean(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> Option<f64> {
        let (s, _, n) = self.rect_sums(x0, y0, x1, y1);
        (n > 0).then(|| s as f64 / n as f64)
    }

    /// Mean of the `(2r+1)` square window centered on `(x, y)`
    pub fn window_mean(&self, x: usize, y: usize, r: usize) -> f64 {
        let (s, _, n) = self.rect_sums(x.saturating_sub(r), y.saturating_sub(r), x + r + 1, y + r + 1);
        if n == 0 { 0.0 } else { s as f64 / n as f64 }
    }

    /// Mean and standard deviation of the `(2r+1)` window centered on `(x, y)`
    pub fn window_mean_std(&self, x: usize, y: usize, r: usize) -> (f64, f64) {
        let (s, q, n) = self.rect_sums(x.saturating_sub(r), y.saturating_sub(r), x + r + 1, y + r + 1);
        if n == 0 {
            return (0.0, 0.0);
        }
        let n = n as f64;
        let mean = s as f64 / n;
        let var = (q as f64 / n - mean * mean).max(0.0);
        (mean, var.sqrt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_sums_match_brute_force() {
        let luma: Vec<u8> = (0..35).map(|i| (i * 7 % 251) as u8).collect();
        let ii = IntegralImage::new(&luma, 7, 5);
        let (s, q, n) = ii.rect_sums(1, 1, 5, 4);
        let mut bs = 0u64;
        let mut bq = 0u64;
        for y in 1..4 {
            for x in 1..5 {
                let v = luma[y * 7 + x] as u64;
                bs += v;
                bq += v * v;
            }
        }
        assert_eq!((s, q, n), (bs, bq, 12));
    }

    #[test]
    fn test_window_clips_at_border() {
        let luma = vec![10u8; 16];
        let ii = IntegralImage::new(&luma, 4, 4);
        let (mean, std) = ii.window_mean_std(0, 0, 5);
        assert!((mean - 10.0).abs() < 1e-9);
        assert!(std.abs() < 1e-9);
        assert!(ii.rect_mean(3, 3, 3, 9).is_none());
    }
}
