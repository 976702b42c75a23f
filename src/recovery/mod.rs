//! Module-level reconstruction of a code the decoder could not read.
//!
//! 1. Binarize the patch and find the code extent.
//! 2. Estimate the module count, or fall back to a ladder of sizes.
//! 3. Calibrate a grid per size and pin structural modules.
//! 4. Beam-search the remaining uncertain modules.
//! 5. Render each candidate cleanly and hand it to the decoder.
//!
//! Every loop checks the caller's [`Deadline`]; running out of time ends
//! the call with [`RecoveryMiss::DeadlineExceeded`].

pub mod beam;
pub mod calibrate;
pub mod grid_size;
pub mod priors;
pub mod render;


use crate::config::RecoveryConfig;
use crate::deadline::Deadline;
use crate::error::RecoveryMiss;
use crate::models::{BitMatrix, HitKind, ModuleGrid, RoiRect};
use crate::primitives::{DecodePrimitive, DecodeRequest, Effort};
use crate::utils::binarization::{class_medians, otsu_split};
use crate::utils::integral::IntegralImage;
use beam::{MAX_BEAM_CELLS, beam_search};
use calibrate::{CodeBounds, Levels, calibrate};
use grid_size::{candidate_sizes, estimate_grid_size};
use image::GrayImage;
use log::debug;
use render::{RENDER_SIDE, pad_and_rescale, render_grid};

/// Otsu class means closer than this mean there is no code to read
pub const MIN_SEPARATION: f32 = 16.0;
/// Rows/columns need this fraction of dark pixels to count toward the extent
const EXTENT_DARK_FRACTION: f32 = 0.03;
/// Modules narrower than this cannot be sampled
const MIN_MODULE_PX: f32 = 1.5;
/// Extra white margin for the last decode attempt, as a fraction of the side
const RESCUE_PAD: f32 = 0.12;

/// How much work a recovery call may do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryEffort {
    /// Normal, throttled background attempt
    Light,
    /// User- or auto-forced attempt
    Forced,
}

/// Limits resolved from [`RecoveryConfig`] for one effort level
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoveryPlan {
    /// Effort level
    pub effort: RecoveryEffort,
    /// Cells searched by the beam (excess pinned to maximum likelihood)
    pub max_unknown: usize,
    /// Beam width
    pub beam_width: usize,
    /// Candidates attempted after the search
    pub keep: usize,
    /// Wall-clock budget
    pub budget_ms: u64,
    /// Minimum gap between calls
    pub min_interval_ms: u64,
    /// Cells with |p - 0.5| below this are unknown
    pub ambiguity_margin: f32,
    /// Largest ladder size without an estimate (normal effort)
    pub ladder_max: usize,
    /// Quiet zone around rendered grids, in modules
    pub quiet_zone: usize,
}

impl RecoveryPlan {
    /// Resolve limits for `effort`
    pub fn new(config: &RecoveryConfig, effort: RecoveryEffort) -> Self {
        let forced = effort == RecoveryEffort::Forced;
        let beam_width = if forced { config.wide_beam_width } else { config.beam_width };
        Self {
            effort,
            max_unknown: if forced { config.forced_max_unknown } else { config.max_unknown }.min(MAX_BEAM_CELLS),
            beam_width,
            keep: if forced { beam_width + config.forced_tail } else { beam_width },
            budget_ms: if forced { config.forced_budget_ms } else { config.light_budget_ms },
            min_interval_ms: if forced { config.forced_min_interval_ms } else { config.min_interval_ms },
            ambiguity_margin: config.ambiguity_margin,
            ladder_max: config.default_ladder_max,
            quiet_zone: config.render_quiet_zone,
        }
    }

    fn forced(&self) -> bool {
        self.effort == RecoveryEffort::Forced
    }
}

/// A successful reconstruction
#[derive(Debug, Clone)]
pub struct Recovered {
    /// Decoded text (never a diagnostic)
    pub text: String,
    /// Module count of the grid that decoded
    pub grid_size: usize,
    /// Index of the decoding candidate in score order
    pub rank: usize,
    /// Cells set against their likely colour
    pub flips: u32,
    /// Code extent in patch coordinates
    pub bounds: RoiRect,
    /// The raster that decoded
    pub rendering: GrayImage,
}

/// Reconstruct and decode the code in `patch`.
pub fn recover(
    patch: &GrayImage,
    decoder: &mut dyn DecodePrimitive,
    plan: &RecoveryPlan,
    deadline: &Deadline,
) -> Result<Recovered, RecoveryMiss> {
    if deadline.expired() {
        return Err(RecoveryMiss::DeadlineExceeded);
    }
    let (w, h) = (patch.width() as usize, patch.height() as usize);
    let luma = patch.as_raw();

    let split = otsu_split(luma);
    if split.separation() < MIN_SEPARATION {
        return Err(RecoveryMiss::NoContrast);
    }
    let (dark, light) = class_medians(luma, split.threshold).ok_or(RecoveryMiss::NoContrast)?;
    let levels = Levels {
        dark: dark as f32,
        light: light as f32,
    };

    let bits = BitMatrix::from_threshold(luma, w, h, split.threshold);
    let (x0, y0, x1, y1) = bits.dark_bounds(EXTENT_DARK_FRACTION).ok_or(RecoveryMiss::NoCodeBounds)?;
    let bounds = CodeBounds {
        x0: x0 as f32,
        y0: y0 as f32,
        x1: x1 as f32,
        y1: y1 as f32,
    };
    let extent = (x1 - x0).min(y1 - y0) as f32;
    if extent < MIN_MODULE_PX * 21.0 {
        return Err(RecoveryMiss::NoCodeBounds);
    }

    let estimate = estimate_grid_size(&bits, (x0, y0, x1, y1));
    let sizes = candidate_sizes(estimate, plan.forced(), plan.ladder_max);
    debug!("recovery: extent {}x{} estimate {:?}, trying {} sizes", x1 - x0, y1 - y0, estimate, sizes.len());

    let integral = IntegralImage::new(luma, w, h);
    let code_rect = RoiRect::new(x0 as i32, y0 as i32, x1 as i32, y1 as i32);
    let mut miss = RecoveryMiss::NoGridFit;
    for size in sizes {
        if deadline.expired() {
            return Err(RecoveryMiss::DeadlineExceeded);
        }
        if extent / (size as f32) < MIN_MODULE_PX {
            continue;
        }
        let cal = calibrate(&integral, &bounds, size, &levels, plan.ambiguity_margin, deadline)?;
        if cal.unknowns > implausible_above(size, plan) {
            debug!("recovery: size {size} leaves {} unknowns, skipping", cal.unknowns);
            continue;
        }
        match search_and_decode(&cal.grid, decoder, plan, deadline) {
            Ok((text, rank, flips, rendering)) => {
                return Ok(Recovered {
                    text,
                    grid_size: size,
                    rank,
                    flips,
                    bounds: code_rect,
                    rendering,
                });
            }
            Err(RecoveryMiss::DeadlineExceeded) => return Err(RecoveryMiss::DeadlineExceeded),
            Err(other) => miss = other,
        }
    }
    Err(miss)
}

/// Calibrations leaving more unknowns than this are not this size
fn implausible_above(size: usize, plan: &RecoveryPlan) -> usize {
    (size * size / 4).max(plan.max_unknown * 4)
}

fn search_and_decode(
    grid: &ModuleGrid,
    decoder: &mut dyn DecodePrimitive,
    plan: &RecoveryPlan,
    deadline: &Deadline,
) -> Result<(String, usize, u32, GrayImage), RecoveryMiss> {
    let size = grid.size();
    let base = grid.to_bits();

    let mut unknown = grid.unknown_indices();
    if unknown.is_empty() {
        return render_and_decode(&base, size, decoder, plan, deadline)?
            .map(|(text, img)| (text, 0, 0, img))
            .ok_or(RecoveryMiss::Exhausted);
    }

    // Least confident first; cells beyond the cap keep their likely colour.
    let cells = grid.cells();
    unknown.sort_by(|&a, &b| cells[a].margin().total_cmp(&cells[b].margin()));
    unknown.truncate(plan.max_unknown);
    let probs: Vec<f32> = unknown.iter().map(|&i| cells[i].p_black).collect();

    let candidates = beam_search(&probs, plan.beam_width, plan.keep, deadline)?;
    debug!(
        "recovery: size {size}, {} searched cells, {} candidates",
        unknown.len(),
        candidates.len()
    );
    for (rank, candidate) in candidates.iter().enumerate() {
        let mut bits = base.clone();
        for (j, &idx) in unknown.iter().enumerate() {
            bits[idx] = candidate.is_black(j);
        }
        if let Some((text, img)) = render_and_decode(&bits, size, decoder, plan, deadline)? {
            return Ok((text, rank, candidate.flips, img));
        }
    }
    Err(RecoveryMiss::Exhausted)
}

/// Render the grid and decode at escalating effort: plain, boosted, then
/// boosted on a white-padded copy.
fn render_and_decode(
    bits: &[bool],
    size: usize,
    decoder: &mut dyn DecodePrimitive,
    plan: &RecoveryPlan,
    deadline: &Deadline,
) -> Result<Option<(String, GrayImage)>, RecoveryMiss> {
    let raster = render_grid(bits, size, plan.quiet_zone, RENDER_SIDE);
    for effort in [Effort::Base, Effort::Boosted] {
        if let Some(text) = try_decode(&raster, effort, decoder, deadline)? {
            return Ok(Some((text, raster)));
        }
    }
    let padded = pad_and_rescale(&raster, RESCUE_PAD);
    Ok(try_decode(&padded, Effort::Boosted, decoder, deadline)?.map(|text| (text, padded)))
}

fn try_decode(
    img: &GrayImage,
    effort: Effort,
    decoder: &mut dyn DecodePrimitive,
    deadline: &Deadline,
) -> Result<Option<String>, RecoveryMiss> {
    if deadline.expired() {
        return Err(RecoveryMiss::DeadlineExceeded);
    }
    match decoder.decode(&DecodeRequest::for_patch(img, effort)) {
        Ok(Some(hit)) => match hit.kind() {
            HitKind::Decoded(text) => Ok(Some(text.to_string())),
            _ => Ok(None),
        },
        Ok(None) => Ok(None),
        Err(e) => {
            debug!("recovery: decode attempt failed: {e}");
            Ok(None)
        }
    }
}
