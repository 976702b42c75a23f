//! Timers and counters that decide how hard a frame is worked.

use crate::config::EscalationConfig;
use crate::deadline::elapsed_at_least;
use crate::models::{Quad, RoiRect, TierSet};

/// Box signature grid, in pixels
const SIGNATURE_CELL: i32 = 32;

/// An open warmup window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Warmup {
    pub started_ms: u64,
    pub collected: usize,
}

/// What `begin_frame` decided for a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FrameTick {
    pub index: u64,
    pub tiers: TierSet,
    /// An automatic forced window opened on this frame
    pub auto_forced: bool,
}

/// Coarse identity of a box; a change starts a new warmup
pub(crate) type BoxSignature = (i32, i32, i32);

pub(crate) fn box_signature(r: &RoiRect) -> BoxSignature {
    let c = r.center();
    (
        c.x as i32 / SIGNATURE_CELL,
        c.y as i32 / SIGNATURE_CELL,
        r.width().max(r.height()) / SIGNATURE_CELL,
    )
}

/// Per-pipeline escalation state. `Default` is the hard-reset state.
#[derive(Debug, Clone, Default)]
pub(crate) struct EscalationState {
    pub frame_index: u64,
    pub session_start_ms: Option<u64>,
    pub last_box_ms: Option<u64>,
    pub last_quad: Option<Quad>,
    pub last_decoded_ms: Option<u64>,
    pub last_diagnostic: Option<(String, u64)>,
    pub last_boosted_ms: Option<u64>,
    pub last_assisted_ms: Option<u64>,
    pub last_recovery_ms: Option<u64>,
    pub last_direct_recovery_ms: Option<u64>,
    pub last_heavy_ms: Option<u64>,
    pub last_auto_force_ms: Option<u64>,
    /// Frames left in the user's hard-effort window
    pub forced_frames: u32,
    /// Frames left in the automatic window; a decode closes it
    pub auto_forced_frames: u32,
    pub warmup: Option<Warmup>,
    pub warmup_signature: Option<BoxSignature>,
    pub warmup_requested: bool,
}

impl EscalationState {
    /// Advance the frame counter and work out the frame's tiers.
    ///
    /// Consumes one frame from each positive forced counter.
    pub(crate) fn begin_frame(&mut self, now_ms: u64, config: &EscalationConfig) -> FrameTick {
        let start = *self.session_start_ms.get_or_insert(now_ms);
        let index = self.frame_index;
        self.frame_index += 1;

        // A long stretch without any box opens one automatic forced window.
        let quiet_since = [self.last_box_ms, self.last_auto_force_ms]
            .into_iter()
            .flatten()
            .max()
            .unwrap_or(start);
        let mut auto_forced = false;
        if self.forced_frames == 0
            && self.auto_forced_frames == 0
            && config.auto_force_frames > 0
            && now_ms.saturating_sub(quiet_since) >= config.auto_force_after_ms
        {
            self.auto_forced_frames = config.auto_force_frames;
            self.last_auto_force_ms = Some(now_ms);
            self.warmup_requested = true;
            auto_forced = true;
        }

        let forced = self.forced_frames > 0 || self.auto_forced_frames > 0;
        self.forced_frames = self.forced_frames.saturating_sub(1);
        self.auto_forced_frames = self.auto_forced_frames.saturating_sub(1);
        let hot = self
            .last_box_ms
            .is_some_and(|t| now_ms >= t && now_ms - t <= config.hot_window_ms);
        let since_decode = now_ms.saturating_sub(self.last_decoded_ms.unwrap_or(start));
        let fast = now_ms.saturating_sub(start) < config.startup_ms || since_decode >= config.drought_ms;
        let every = if fast {
            config.explore_fast_every
        } else {
            config.explore_slow_every
        }
        .max(1);

        FrameTick {
            index,
            tiers: TierSet {
                forced,
                hot,
                explore: index % every == 0,
            },
            auto_forced,
        }
    }

    /// A box (decoded or not) was seen
    pub(crate) fn on_box(&mut self, now_ms: u64, quad: Option<Quad>) {
        self.last_box_ms = Some(now_ms);
        if quad.is_some() {
            self.last_quad = quad;
        }
    }

    /// A frame produced text. Ends an automatic forced window; the user's
    /// window runs its full length.
    pub(crate) fn on_decoded(&mut self, now_ms: u64) {
        self.last_decoded_ms = Some(now_ms);
        self.last_box_ms = Some(now_ms);
        self.auto_forced_frames = 0;
        self.last_auto_force_ms = None;
        self.warmup = None;
    }

    /// User asked for more effort on the next `frames` frames
    pub(crate) fn request_hard_effort(&mut self, frames: u32) {
        self.forced_frames = self.forced_frames.max(frames);
        self.warmup_requested = true;
        self.last_boosted_ms = None;
        self.last_assisted_ms = None;
        self.last_recovery_ms = None;
        self.last_direct_recovery_ms = None;
    }

    /// Time since the last decode (or the session start) has reached `ms`
    pub(crate) fn drought_at_least(&self, now_ms: u64, ms: u64) -> bool {
        elapsed_at_least(self.last_decoded_ms.or(self.session_start_ms), now_ms, ms)
    }

    /// Open a warmup if one of its triggers fired. Returns true when a
    /// warmup window is open afterwards.
    pub(crate) fn open_warmup(
        &mut self,
        now_ms: u64,
        signature: Option<BoxSignature>,
        config: &EscalationConfig,
    ) -> bool {
        if self.warmup.is_some() {
            return true;
        }
        let changed = signature.is_some() && signature != self.warmup_signature;
        let idle = elapsed_at_least(self.last_heavy_ms, now_ms, config.idle_rewarmup_ms);
        if !(changed || idle || self.warmup_requested) {
            return false;
        }
        self.warmup = Some(Warmup {
            started_ms: now_ms,
            collected: 0,
        });
        if signature.is_some() {
            self.warmup_signature = signature;
        }
        self.warmup_requested = false;
        true
    }

    /// True while the open warmup still wants patches
    pub(crate) fn warmup_collecting(&self, now_ms: u64, config: &EscalationConfig) -> bool {
        self.warmup.is_some_and(|w| {
            now_ms.saturating_sub(w.started_ms) < config.warmup_ms && w.collected < config.warmup_patches
        })
    }

    pub(crate) fn count_warmup_patch(&mut self) {
        if let Some(w) = self.warmup.as_mut() {
            w.collected += 1;
        }
    }

    /// Close the warmup and stamp the heavy run
    pub(crate) fn finish_warmup(&mut self, now_ms: u64) {
        self.warmup = None;
        self.last_heavy_ms = Some(now_ms);
    }
}
