//! Block-wise "best focus wins" fusion of rectified patches.

use crate::utils::filters::sobel_magnitude;
use image::GrayImage;
use rayon::prelude::*;

/// Side of a fusion block in pixels
pub const FUSION_BLOCK: u32 = 32;

/// A fused patch. Transient: never cached.
#[derive(Debug, Clone)]
pub struct Fused {
    /// Composite pixels
    pub patch: GrayImage,
    /// Source index chosen for each block, row-major over the block grid
    pub sources: Vec<usize>,
}

impl Fused {
    /// Number of distinct sources that contributed blocks
    pub fn contributors(&self) -> usize {
        let mut seen: Vec<usize> = self.sources.clone();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }
}

/// Fuse at least two same-size patches. For every 32x32 block, the source
/// with the highest mean Sobel magnitude is copied; ties keep the earlier
/// source.
pub fn fuse(patches: &[&GrayImage]) -> Option<Fused> {
    let first = patches.first()?;
    let (w, h) = first.dimensions();
    if patches.len() < 2 || w == 0 || h == 0 || patches.iter().any(|p| p.dimensions() != (w, h)) {
        return None;
    }

    let energies: Vec<Vec<f32>> = patches.par_iter().map(|p| sobel_magnitude(p)).collect();

    let bw = w.div_ceil(FUSION_BLOCK);
    let bh = h.div_ceil(FUSION_BLOCK);
    let sources: Vec<usize> = (0..bw * bh)
        .into_par_iter()
        .map(|b| {
            let (x0, y0) = ((b % bw) * FUSION_BLOCK, (b / bw) * FUSION_BLOCK);
            let (x1, y1) = ((x0 + FUSION_BLOCK).min(w), (y0 + FUSION_BLOCK).min(h));
            let mut best = 0usize;
            let mut best_energy = f64::NEG_INFINITY;
            for (i, e) in energies.iter().enumerate() {
                let mut sum = 0f64;
                for y in y0..y1 {
                    let row = (y * w) as usize;
                    sum += e[row + x0 as usize..row + x1 as usize].iter().map(|&v| v as f64).sum::<f64>();
                }
                if sum > best_energy {
                    best_energy = sum;
                    best = i;
                }
            }
            best
        })
        .collect();

    let mut out = GrayImage::new(w, h);
    let stride = w as usize;
    for (b, &src_idx) in sources.iter().enumerate() {
        let b = b as u32;
        let (x0, y0) = ((b % bw) * FUSION_BLOCK, (b / bw) * FUSION_BLOCK);
        let (x1, y1) = ((x0 + FUSION_BLOCK).min(w), (y0 + FUSION_BLOCK).min(h));
        let src = patches[src_idx].as_raw();
        let dst: &mut [u8] = &mut out;
        for y in y0 as usize..y1 as usize {
            let range = y * stride + x0 as usize..y * stride + x1 as usize;
            dst[range.clone()].copy_from_slice(&src[range]);
        }
    }

    Some(Fused { patch: out, sources })
}
