//! Module-count estimation from scanline transitions.

use crate::models::{BitMatrix, MAX_GRID_SIZE, MIN_GRID_SIZE};

/// Lines with fewer transitions carry too little pitch information
pub const MIN_TRANSITIONS: usize = 6;
/// Fewer qualifying lines than this yields no estimate
pub const MIN_LINES: usize = 3;
/// Scanlines sampled per axis
pub const SCANLINES_PER_AXIS: usize = 8;

/// Snap a raw module count to the nearest valid size `21 + 4k`
pub fn snap_grid_size(raw: f32) -> usize {
    if !raw.is_finite() {
        return MIN_GRID_SIZE;
    }
    let k = ((raw - MIN_GRID_SIZE as f32) / 4.0).round().max(0.0) as usize;
    (MIN_GRID_SIZE + 4 * k).min(MAX_GRID_SIZE)
}

fn run_lengths(line: &[bool]) -> Vec<usize> {
    let mut runs = Vec::new();
    let mut iter = line.iter();
    let Some(mut current) = iter.next().copied() else {
        return runs;
    };
    let mut len = 1usize;
    for &v in iter {
        if v == current {
            len += 1;
        } else {
            runs.push(len);
            current = v;
            len = 1;
        }
    }
    runs.push(len);
    runs
}

/// Module count implied by one line, `None` if it has too few transitions
fn line_estimate(line: &[bool]) -> Option<f32> {
    let runs = run_lengths(line);
    if runs.len() <= MIN_TRANSITIONS {
        return None;
    }
    let mut sorted = runs.clone();
    sorted.sort_unstable();
    let q1 = sorted[sorted.len() / 4] as f32;
    let (lo, hi) = (q1 * 0.5, q1 * 1.5);
    let unit: Vec<f32> = runs
        .iter()
        .map(|&r| r as f32)
        .filter(|&r| r >= lo && r <= hi)
        .collect();
    if unit.is_empty() {
        return None;
    }
    let pitch = unit.iter().sum::<f32>() / unit.len() as f32;
    (pitch > 0.0).then(|| line.len() as f32 / pitch)
}

/// Estimate the module count from scanlines spanning the code extent.
///
/// Each line with enough transitions yields `extent / pitch`, where pitch
/// is the mean of the runs near the lower-quartile run length. The median
/// over lines is snapped to `21 + 4k`. `None` when fewer than three lines
/// qualify.
pub fn estimate_from_scanlines(lines: &[Vec<bool>]) -> Option<usize> {
    let mut estimates: Vec<f32> = lines.iter().filter_map(|l| line_estimate(l)).collect();
    if estimates.len() < MIN_LINES {
        return None;
    }
    estimates.sort_by(|a, b| a.total_cmp(b));
    let mid = estimates.len() / 2;
    let median = if estimates.len() % 2 == 0 {
        (estimates[mid - 1] + estimates[mid]) / 2.0
    } else {
        estimates[mid]
    };
    Some(snap_grid_size(median))
}

/// Sample rows and columns evenly inside `bounds` and estimate the size
pub fn estimate_grid_size(bits: &BitMatrix, bounds: (usize, usize, usize, usize)) -> Option<usize> {
    let (x0, y0, x1, y1) = bounds;
    if x1 <= x0 + 1 || y1 <= y0 + 1 {
        return None;
    }
    let mut lines = Vec::with_capacity(SCANLINES_PER_AXIS * 2);
    for i in 0..SCANLINES_PER_AXIS {
        let t = (i as f32 + 0.5) / SCANLINES_PER_AXIS as f32;
        let y = y0 + ((y1 - y0) as f32 * t) as usize;
        let x = x0 + ((x1 - x0) as f32 * t) as usize;
        lines.push(bits.row_segment(y, x0, x1));
        lines.push(bits.col_segment(x, y0, y1));
    }
    estimate_from_scanlines(&lines)
}

/// Sizes to try, most likely first
pub fn candidate_sizes(estimate: Option<usize>, forced: bool, ladder_max: usize) -> Vec<usize> {
    match estimate {
        Some(n) => {
            let spread: &[i64] = if forced { &[0, -4, 4, -8, 8] } else { &[0, -4, 4] };
            spread
                .iter()
                .map(|d| n as i64 + d)
                .filter(|&s| s >= MIN_GRID_SIZE as i64 && s <= MAX_GRID_SIZE as i64)
                .map(|s| s as usize)
                .collect()
        }
        None => {
            let max = if forced { MAX_GRID_SIZE } else { ladder_max.clamp(MIN_GRID_SIZE, MAX_GRID_SIZE) };
            (MIN_GRID_SIZE..=max).step_by(4).collect()
        }
    }
}
