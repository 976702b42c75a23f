//! Beam search over uncertain module bits.

use crate::deadline::Deadline;
use crate::error::RecoveryMiss;

/// Probabilities are clamped into `[P_CLAMP, 1 - P_CLAMP]` before taking logs
pub const P_CLAMP: f32 = 1e-3;

/// Most cells a single search can branch on (one bit per cell in a `u64`)
pub const MAX_BEAM_CELLS: usize = 64;

/// One assignment of the searched cells.
///
/// Bit `i` of `bits` is the colour chosen for searched cell `i` (1 = black).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamCandidate {
    /// Chosen colours, one bit per searched cell
    pub bits: u64,
    /// Cumulative negative log-likelihood
    pub score: f64,
    /// Cells set against their more likely colour
    pub flips: u32,
}

impl BeamCandidate {
    /// Colour chosen for searched cell `i`
    pub fn is_black(&self, i: usize) -> bool {
        self.bits >> i & 1 == 1
    }
}

fn cost(p_black: f32, black: bool) -> f64 {
    let p = p_black.clamp(P_CLAMP, 1.0 - P_CLAMP) as f64;
    if black { -p.ln() } else { -(1.0 - p).ln() }
}

/// Branch every candidate on each cell in turn, keeping the `width`
/// lowest-score candidates after every step. After the last step `keep`
/// candidates survive (normally `width`; the forced tail widens it).
///
/// Returns candidates in ascending score order.
pub fn beam_search(
    p_black: &[f32],
    width: usize,
    keep: usize,
    deadline: &Deadline,
) -> Result<Vec<BeamCandidate>, RecoveryMiss> {
    let cells = p_black.len().min(MAX_BEAM_CELLS);
    let width = width.max(1);
    let keep = keep.max(1);
    let mut beam = vec![BeamCandidate {
        bits: 0,
        score: 0.0,
        flips: 0,
    }];
    for (i, &p) in p_black.iter().take(cells).enumerate() {
        if deadline.expired() {
            return Err(RecoveryMiss::DeadlineExceeded);
        }
        let likely_black = p >= 0.5;
        let mut next = Vec::with_capacity(beam.len() * 2);
        for c in &beam {
            for black in [likely_black, !likely_black] {
                next.push(BeamCandidate {
                    bits: if black { c.bits | 1 << i } else { c.bits },
                    score: c.score + cost(p, black),
                    flips: c.flips + u32::from(black != likely_black),
                });
            }
        }
        next.sort_by(|a, b| a.score.total_cmp(&b.score));
        let limit = if i + 1 == cells { keep.max(width) } else { width };
        next.truncate(limit);
        beam = next;
    }
    beam.truncate(keep);
    Ok(beam)
}
