//! Geometric calibration of a module grid over a patch.
//!
//! For a candidate size the code extent is divided into `size` modules and
//! each module is sampled with a square window. Small phase and scale
//! offsets are searched with the narrowest window; the lattice with the
//! fewest conflicts against the fixed layout, then the fewest unknown
//! cells, then the widest margins wins. Cells the winner leaves ambiguous
//! are resampled one at a time with progressively wider windows.

use super::priors::{apply_layout, layout_conflicts, structural_layout};
use crate::deadline::Deadline;
use crate::error::RecoveryMiss;
use crate::models::{ModuleCell, ModuleGrid, ModuleState};
use crate::utils::integral::IntegralImage;
use std::cmp::Ordering;

/// Phase offsets in modules, nominal first
pub const PHASES: [f32; 3] = [0.0, -0.30, 0.30];
/// Pitch scales, nominal first
pub const SCALES: [f32; 3] = [1.0, 0.94, 1.06];
/// Sampling window side as a fraction of the module pitch, narrow to wide
pub const BANDS: [f32; 4] = [0.25, 0.40, 0.55, 0.70];

/// Code extent in patch pixels, exclusive end
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CodeBounds {
    /// Left edge
    pub x0: f32,
    /// Top edge
    pub y0: f32,
    /// Right edge
    pub x1: f32,
    /// Bottom edge
    pub y1: f32,
}

impl CodeBounds {
    fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.y0 + self.y1) / 2.0)
    }
}

/// Reference dark and light levels for probability mapping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Levels {
    /// Typical luma of a dark module
    pub dark: f32,
    /// Typical luma of a light module
    pub light: f32,
}

impl Levels {
    /// Probability the sampled mean `v` is a dark module
    pub fn p_black(&self, v: f32) -> f32 {
        let span = self.light - self.dark;
        if span <= f32::EPSILON {
            return 0.5;
        }
        ((self.light - v) / span).clamp(0.0, 1.0)
    }
}

/// Search parameters that produced a calibration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationParams {
    /// Horizontal phase offset in modules
    pub phase_x: f32,
    /// Vertical phase offset in modules
    pub phase_y: f32,
    /// Pitch scale
    pub scale: f32,
    /// Window side as a fraction of the pitch the lattice was chosen with
    pub band: f32,
}

/// Best grid found for one size
#[derive(Debug, Clone)]
pub struct Calibration {
    /// Sampled grid with priors applied
    pub grid: ModuleGrid,
    /// Unknown cells after priors
    pub unknowns: usize,
    /// Decided cells contradicting the fixed layout
    pub conflicts: usize,
    /// Mean confidence margin over all cells
    pub mean_margin: f32,
    /// Smallest confidence margin
    pub min_margin: f32,
    /// Winning parameters
    pub params: CalibrationParams,
}

impl Calibration {
    fn scored(grid: ModuleGrid, layout: &[Option<bool>], params: CalibrationParams) -> Self {
        let unknowns = grid.unknown_count();
        let conflicts = layout_conflicts(&grid, layout);
        let (mean_margin, min_margin) = margins(&grid);
        Self {
            grid,
            unknowns,
            conflicts,
            mean_margin,
            min_margin,
            params,
        }
    }

    /// Ordering used to pick the winner: fewer layout conflicts, then
    /// fewer unknown cells, then higher mean margin, then higher minimum
    /// margin. `Less` is better.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.conflicts
            .cmp(&other.conflicts)
            .then_with(|| self.unknowns.cmp(&other.unknowns))
            .then_with(|| other.mean_margin.total_cmp(&self.mean_margin))
            .then_with(|| other.min_margin.total_cmp(&self.min_margin))
    }
}

/// Module centres of one phase/scale choice
struct Lattice {
    cx: f32,
    cy: f32,
    pitch_x: f32,
    pitch_y: f32,
    n: f32,
}

impl Lattice {
    fn new(bounds: &CodeBounds, size: usize, params: &CalibrationParams) -> Self {
        let n = size as f32;
        let pitch_x = (bounds.x1 - bounds.x0) / n * params.scale;
        let pitch_y = (bounds.y1 - bounds.y0) / n * params.scale;
        let (cx, cy) = bounds.center();
        Self {
            cx: cx + params.phase_x * pitch_x,
            cy: cy + params.phase_y * pitch_y,
            pitch_x,
            pitch_y,
            n,
        }
    }

    /// Dark probability of module `(mx, my)` read through a `band` window
    fn p_black(&self, integral: &IntegralImage, levels: &Levels, band: f32, mx: usize, my: usize) -> f32 {
        let px = self.cx + (mx as f32 + 0.5 - self.n / 2.0) * self.pitch_x;
        let py = self.cy + (my as f32 + 0.5 - self.n / 2.0) * self.pitch_y;
        let half_x = (band * self.pitch_x / 2.0).max(0.5);
        let half_y = (band * self.pitch_y / 2.0).max(0.5);
        let wx0 = (px - half_x).floor().max(0.0) as usize;
        let wx1 = (px + half_x).ceil().max(0.0) as usize;
        let wy0 = (py - half_y).floor().max(0.0) as usize;
        let wy1 = (py + half_y).ceil().max(0.0) as usize;
        // Windows falling off the patch read as quiet zone.
        let v = integral.rect_mean(wx0, wy0, wx1, wy1).unwrap_or(levels.light as f64) as f32;
        levels.p_black(v)
    }
}

fn classify(p: f32, ambiguity_margin: f32) -> ModuleCell {
    ModuleCell {
        state: if (p - 0.5).abs() < ambiguity_margin {
            ModuleState::Unknown
        } else {
            ModuleState::from_bit(p > 0.5)
        },
        p_black: p,
    }
}

/// Sample one grid with fixed parameters
pub fn sample_grid(
    integral: &IntegralImage,
    bounds: &CodeBounds,
    size: usize,
    levels: &Levels,
    ambiguity_margin: f32,
    params: &CalibrationParams,
) -> ModuleGrid {
    let lattice = Lattice::new(bounds, size, params);
    let mut grid = ModuleGrid::new(size);
    for my in 0..size {
        for mx in 0..size {
            let p = lattice.p_black(integral, levels, params.band, mx, my);
            *grid.cell_mut(mx, my) = classify(p, ambiguity_margin);
        }
    }
    grid
}

fn margins(grid: &ModuleGrid) -> (f32, f32) {
    let cells = grid.cells();
    let mut sum = 0f32;
    let mut min = f32::INFINITY;
    for c in cells {
        let m = c.margin();
        sum += m;
        min = min.min(m);
    }
    (sum / cells.len().max(1) as f32, if min.is_finite() { min } else { 0.0 })
}

/// Resample each still-unknown cell with the wider bands until one decides
/// it. A cell no band decides keeps its narrow reading. Returns the number
/// of cells decided.
fn widen_unknowns(
    grid: &mut ModuleGrid,
    lattice: &Lattice,
    integral: &IntegralImage,
    levels: &Levels,
    ambiguity_margin: f32,
) -> usize {
    let size = grid.size();
    let mut decided = 0;
    for i in grid.unknown_indices() {
        let (mx, my) = (i % size, i / size);
        for &band in &BANDS[1..] {
            let cell = classify(lattice.p_black(integral, levels, band, mx, my), ambiguity_margin);
            if cell.state != ModuleState::Unknown {
                *grid.cell_mut(mx, my) = cell;
                decided += 1;
                break;
            }
        }
    }
    decided
}

/// Search the phase/scale combinations for `size`, then widen the
/// winner's ambiguous cells.
///
/// The deadline is checked before each combination.
pub fn calibrate(
    integral: &IntegralImage,
    bounds: &CodeBounds,
    size: usize,
    levels: &Levels,
    ambiguity_margin: f32,
    deadline: &Deadline,
) -> Result<Calibration, RecoveryMiss> {
    let layout = structural_layout(size);
    let mut best: Option<Calibration> = None;
    for &phase_y in &PHASES {
        for &phase_x in &PHASES {
            for &scale in &SCALES {
                if deadline.expired() {
                    return Err(RecoveryMiss::DeadlineExceeded);
                }
                let params = CalibrationParams {
                    phase_x,
                    phase_y,
                    scale,
                    band: BANDS[0],
                };
                let mut grid = sample_grid(integral, bounds, size, levels, ambiguity_margin, &params);
                apply_layout(&mut grid, &layout);
                let candidate = Calibration::scored(grid, &layout, params);
                // Ties keep the earlier, more nominal lattice.
                let better = match &best {
                    None => true,
                    Some(b) => candidate.rank_cmp(b) == Ordering::Less,
                };
                if better {
                    best = Some(candidate);
                }
            }
        }
    }
    let best = best.ok_or(RecoveryMiss::NoGridFit)?;
    if best.unknowns == 0 {
        return Ok(best);
    }
    let params = best.params;
    let mut grid = best.grid;
    let lattice = Lattice::new(bounds, size, &params);
    widen_unknowns(&mut grid, &lattice, integral, levels, ambiguity_margin);
    Ok(Calibration::scored(grid, &layout, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::priors::structural_value;
    use std::time::Duration;

    const N: usize = 21;
    const PX: usize = 20;
    const LEVELS: Levels = Levels { dark: 20.0, light: 235.0 };

    fn truth() -> Vec<bool> {
        let mut s = 42u32;
        (0..N * N)
            .map(|i| {
                structural_value(N, i % N, i / N).unwrap_or_else(|| {
                    s = s.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                    s >> 31 == 1
                })
            })
            .collect()
    }

    fn painted(bits: &[bool], grey: Option<usize>) -> IntegralImage {
        let side = N * PX;
        let luma: Vec<u8> = (0..side * side)
            .map(|i| {
                let m = (i / side / PX) * N + (i % side) / PX;
                match (Some(m) == grey, bits[m]) {
                    (true, _) => 128,
                    (false, true) => 20,
                    (false, false) => 235,
                }
            })
            .collect();
        IntegralImage::new(&luma, side, side)
    }

    fn full_bounds() -> CodeBounds {
        let side = (N * PX) as f32;
        CodeBounds { x0: 0.0, y0: 0.0, x1: side, y1: side }
    }

    #[test]
    fn test_p_black_maps_levels() {
        assert_eq!(LEVELS.p_black(20.0), 1.0);
        assert_eq!(LEVELS.p_black(235.0), 0.0);
        assert_eq!(LEVELS.p_black(255.0), 0.0);
        assert!((LEVELS.p_black(127.5) - 0.5).abs() < 1e-6);
        let flat = Levels { dark: 90.0, light: 90.0 };
        assert_eq!(flat.p_black(10.0), 0.5);
    }

    #[test]
    fn test_clean_grid_calibrates_exactly() {
        let bits = truth();
        let integral = painted(&bits, None);
        let cal = calibrate(&integral, &full_bounds(), N, &LEVELS, 0.12, &Deadline::after_ms(300)).unwrap();
        assert_eq!(cal.unknowns, 0);
        assert_eq!(cal.conflicts, 0);
        assert_eq!(cal.grid.to_bits(), bits);
        assert_eq!(cal.params.scale, 1.0);
    }

    #[test]
    fn test_grey_module_stays_unknown() {
        let bits = truth();
        let grey = (0..N * N)
            .find(|&i| structural_value(N, i % N, i / N).is_none() && i % N == 10)
            .unwrap();
        let integral = painted(&bits, Some(grey));
        let cal = calibrate(&integral, &full_bounds(), N, &LEVELS, 0.12, &Deadline::after_ms(300)).unwrap();
        assert_eq!(cal.unknowns, 1);
        assert_eq!(cal.grid.unknown_indices(), vec![grey]);
        for (i, cell) in cal.grid.cells().iter().enumerate() {
            if let Some(b) = cell.state.as_bit() {
                assert_eq!(b, bits[i], "cell {i}");
            }
        }
    }

    #[test]
    fn test_aligned_lattice_beats_wider_windows() {
        let bits = truth();
        let grey = (0..N * N)
            .find(|&i| structural_value(N, i % N, i / N).is_none() && i % N == 10)
            .unwrap();
        let integral = painted(&bits, Some(grey));
        let cal = calibrate(&integral, &full_bounds(), N, &LEVELS, 0.12, &Deadline::after_ms(300)).unwrap();
        assert_eq!(cal.conflicts, 0);
        assert_eq!((cal.params.phase_x, cal.params.phase_y, cal.params.scale), (0.0, 0.0, 1.0));
        assert_eq!(cal.params.band, BANDS[0]);
        // Every band reads the grey module as grey.
        assert_eq!(cal.grid.cell(grey % N, grey / N).state, ModuleState::Unknown);
    }

    #[test]
    fn test_offset_extent_finds_phase() {
        let bits = truth();
        let integral = painted(&bits, None);
        // Extent reported 0.45 modules left of the true code.
        let shift = 0.45 * PX as f32;
        let side = (N * PX) as f32;
        let bounds = CodeBounds { x0: -shift, y0: 0.0, x1: side - shift, y1: side };
        let cal = calibrate(&integral, &bounds, N, &LEVELS, 0.12, &Deadline::after_ms(300)).unwrap();
        assert_eq!(cal.params.phase_x, 0.30);
        assert_eq!(cal.params.phase_y, 0.0);
        assert_eq!(cal.unknowns, 0);
        assert_eq!(cal.grid.to_bits(), bits);
    }

    #[test]
    fn test_widening_decides_narrow_ambiguity() {
        let bits = truth();
        let target = (0..N * N)
            .find(|&i| structural_value(N, i % N, i / N).is_none() && bits[i])
            .unwrap();
        // Dark module with a grey core: the narrow window sees only the core.
        let side = N * PX;
        let luma: Vec<u8> = (0..side * side)
            .map(|i| {
                let (x, y) = (i % side, i / side);
                let m = (y / PX) * N + x / PX;
                let core = (7..13).contains(&(x % PX)) && (7..13).contains(&(y % PX));
                match (m == target && core, bits[m]) {
                    (true, _) => 128,
                    (false, true) => 20,
                    (false, false) => 235,
                }
            })
            .collect();
        let integral = IntegralImage::new(&luma, side, side);
        let params = CalibrationParams { phase_x: 0.0, phase_y: 0.0, scale: 1.0, band: BANDS[0] };
        let mut grid = sample_grid(&integral, &full_bounds(), N, &LEVELS, 0.12, &params);
        assert_eq!(grid.unknown_indices(), vec![target]);

        let lattice = Lattice::new(&full_bounds(), N, &params);
        assert_eq!(widen_unknowns(&mut grid, &lattice, &integral, &LEVELS, 0.12), 1);
        assert_eq!(grid.cells()[target].state, ModuleState::Black);

        let cal = calibrate(&integral, &full_bounds(), N, &LEVELS, 0.12, &Deadline::after_ms(300)).unwrap();
        assert_eq!(cal.unknowns, 0);
        assert_eq!(cal.grid.to_bits(), bits);
    }

    #[test]
    fn test_expired_deadline_aborts() {
        let integral = painted(&truth(), None);
        let err = calibrate(&integral, &full_bounds(), N, &LEVELS, 0.12, &Deadline::after(Duration::ZERO)).unwrap_err();
        assert_eq!(err, RecoveryMiss::DeadlineExceeded);
    }
}
