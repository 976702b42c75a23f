//! Structural priors: modules whose value is fixed by the code layout.

use crate::models::{ModuleCell, ModuleGrid, ModuleState};

/// Alignment pattern centers for a given version.
pub fn alignment_pattern_positions(version: usize) -> Vec<usize> {
    if !(2..=40).contains(&version) {
        return Vec::new();
    }
    let num_align = version / 7 + 2;
    let size = 17 + 4 * version;
    let step = if version == 32 {
        26
    } else {
        let numerator = version * 4 + num_align * 2 + 1;
        let denom = num_align * 2 - 2;
        numerator / denom * 2
    };

    let mut positions = vec![0usize; num_align];
    positions[0] = 6;
    let mut pos = size - 7;
    for i in (1..num_align).rev() {
        positions[i] = pos;
        pos = pos.saturating_sub(step);
    }
    positions
}

fn finder_value(dx: usize, dy: usize) -> bool {
    let ring = dx == 0 || dx == 6 || dy == 0 || dy == 6;
    let core = (2..=4).contains(&dx) && (2..=4).contains(&dy);
    ring || core
}

/// Fixed value of module `(x, y)` in a `size` grid, if the layout fixes it.
///
/// Covers finder patterns with separators, timing lines, alignment
/// patterns and the dark module. Format and version areas vary and are
/// not covered.
pub fn structural_value(size: usize, x: usize, y: usize) -> Option<bool> {
    if size < 21 {
        return None;
    }
    let centers = alignment_pattern_positions(ModuleGrid::version_for(size));
    value_with_centers(size, &centers, x, y)
}

fn value_with_centers(size: usize, centers: &[usize], x: usize, y: usize) -> Option<bool> {
    if x >= size || y >= size || size < 21 {
        return None;
    }
    // Finder + separator corners (8x8 each)
    for (ox, oy) in [(0usize, 0usize), (size - 7, 0), (0, size - 7)] {
        let sx = ox.saturating_sub(1);
        let sy = oy.saturating_sub(1);
        if (sx..ox + 8).contains(&x) && (sy..oy + 8).contains(&y) {
            let inside = (ox..ox + 7).contains(&x) && (oy..oy + 7).contains(&y);
            return Some(inside && finder_value(x - ox, y - oy));
        }
    }
    if x == 8 && y == size - 8 {
        return Some(true);
    }
    if y == 6 && (8..size - 8).contains(&x) {
        return Some(x % 2 == 0);
    }
    if x == 6 && (8..size - 8).contains(&y) {
        return Some(y % 2 == 0);
    }
    for &cy in centers {
        for &cx in centers {
            let in_tl = cx <= 8 && cy <= 8;
            let in_tr = cx >= size - 9 && cy <= 8;
            let in_bl = cx <= 8 && cy >= size - 9;
            if in_tl || in_tr || in_bl {
                continue;
            }
            let dx = x.abs_diff(cx);
            let dy = y.abs_diff(cy);
            if dx <= 2 && dy <= 2 {
                return Some(dx == 2 || dy == 2 || (dx == 0 && dy == 0));
            }
        }
    }
    None
}

/// Row-major [`structural_value`] for every cell of a `size` grid
pub fn structural_layout(size: usize) -> Vec<Option<bool>> {
    if size < 21 {
        return vec![None; size * size];
    }
    let centers = alignment_pattern_positions(ModuleGrid::version_for(size));
    (0..size * size)
        .map(|i| value_with_centers(size, &centers, i % size, i / size))
        .collect()
}

/// Pin every still-unknown cell whose value the layout fixes. Cells
/// already decided are left alone, so applying twice changes nothing.
/// Returns the number of cells pinned.
pub fn apply_priors(grid: &mut ModuleGrid) -> usize {
    let layout = structural_layout(grid.size());
    apply_layout(grid, &layout)
}

/// [`apply_priors`] with a precomputed [`structural_layout`]
pub fn apply_layout(grid: &mut ModuleGrid, layout: &[Option<bool>]) -> usize {
    let mut pinned = 0;
    for (cell, fixed) in grid.cells_mut().iter_mut().zip(layout) {
        if cell.state != ModuleState::Unknown {
            continue;
        }
        if let Some(black) = *fixed {
            *cell = ModuleCell {
                state: ModuleState::from_bit(black),
                p_black: if black { 1.0 } else { 0.0 },
            };
            pinned += 1;
        }
    }
    pinned
}

/// Decided cells that disagree with the layout
pub fn layout_conflicts(grid: &ModuleGrid, layout: &[Option<bool>]) -> usize {
    grid.cells()
        .iter()
        .zip(layout)
        .filter(|(cell, fixed)| match (cell.state.as_bit(), fixed) {
            (Some(bit), Some(want)) => bit != *want,
            _ => false,
        })
        .count()
}
