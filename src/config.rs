//! Tuning knobs for the scan pipeline.
//!
//! Every constant the escalation engine uses lives here with its default.
//! Values can come from JSON (`ScanConfig::from_json`) and be overridden
//! from `QR_RESCUE_*` environment variables.

use crate::error::ScanError;
use serde::{Deserialize, Serialize};

/// ROI proposer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoiConfig {
    /// A decode this recent puts its box first
    pub decode_focus_ms: u64,
    /// An undecoded box this recent puts its box first
    pub box_focus_ms: u64,
    /// Padding around a focus box, as a fraction of its size per side
    pub focus_pad: f32,
    /// Side of the centered square as a fraction of the shorter frame side
    pub center_fraction: f32,
    /// Propose the full frame every this many frames
    pub full_frame_every: u64,
    /// Upper bound on proposals per frame
    pub max_rois: usize,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            decode_focus_ms: 1200,
            box_focus_ms: 900,
            focus_pad: 0.35,
            center_fraction: 0.72,
            full_frame_every: 10,
            max_rois: 5,
        }
    }
}

/// Per-frame escalation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// A box this recent makes the frame "hot"
    pub hot_window_ms: u64,
    /// Explore cadence during startup or a long decode drought
    pub explore_fast_every: u64,
    /// Explore cadence otherwise
    pub explore_slow_every: u64,
    /// Startup period using the fast cadence
    pub startup_ms: u64,
    /// Decode drought after which the fast cadence returns
    pub drought_ms: u64,
    /// Minimum gap between boosted passes
    pub boosted_cooldown_ms: u64,
    /// ROIs covering at least this fraction of the frame skip the boosted pass
    pub boosted_skip_coverage: f32,
    /// Decode drought before an opportunistic direct recovery
    pub direct_recovery_after_ms: u64,
    /// Minimum gap between direct recoveries
    pub direct_recovery_interval_ms: u64,
    /// Padding around the best box for direct recovery
    pub direct_recovery_pad: f32,
    /// Minimum gap between assisted-detection calls
    pub assisted_cooldown_ms: u64,
    /// Warmup window length
    pub warmup_ms: u64,
    /// Patches collected during warmup
    pub warmup_patches: usize,
    /// Without a heavy run for this long, a new warmup starts
    pub idle_rewarmup_ms: u64,
    /// Frames with no box at all before an automatic forced window
    pub auto_force_after_ms: u64,
    /// Length of the automatic forced window in frames
    pub auto_force_frames: u32,
    /// Outward expansion of a quad before rectifying it
    pub rectify_expand: f32,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            hot_window_ms: 1500,
            explore_fast_every: 15,
            explore_slow_every: 45,
            startup_ms: 4000,
            drought_ms: 8000,
            boosted_cooldown_ms: 180,
            boosted_skip_coverage: 0.92,
            direct_recovery_after_ms: 2500,
            direct_recovery_interval_ms: 600,
            direct_recovery_pad: 0.30,
            assisted_cooldown_ms: 260,
            warmup_ms: 320,
            warmup_patches: 4,
            idle_rewarmup_ms: 1500,
            auto_force_after_ms: 10_000,
            auto_force_frames: 30,
            rectify_expand: 0.12,
        }
    }
}

/// Module recovery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Wall-clock budget under light load
    pub light_budget_ms: u64,
    /// Wall-clock budget under forced effort
    pub forced_budget_ms: u64,
    /// Minimum gap between recoveries
    pub min_interval_ms: u64,
    /// Minimum gap between recoveries under forced effort
    pub forced_min_interval_ms: u64,
    /// Unknown cells searched by the beam
    pub max_unknown: usize,
    /// Unknown cells searched by the beam under forced effort
    pub forced_max_unknown: usize,
    /// Beam width
    pub beam_width: usize,
    /// Beam width under forced effort
    pub wide_beam_width: usize,
    /// Extra candidates kept for decode attempts under forced effort
    pub forced_tail: usize,
    /// Cells with |p - 0.5| below this are unknown
    pub ambiguity_margin: f32,
    /// Largest grid tried without an estimate, normal effort
    pub default_ladder_max: usize,
    /// Quiet zone added around rendered grids, in modules
    pub render_quiet_zone: usize,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            light_budget_ms: 300,
            forced_budget_ms: 2500,
            min_interval_ms: 900,
            forced_min_interval_ms: 220,
            max_unknown: 18,
            forced_max_unknown: 44,
            beam_width: 48,
            wide_beam_width: 96,
            forced_tail: 8,
            ambiguity_margin: 0.12,
            default_ladder_max: 73,
            render_quiet_zone: 4,
        }
    }
}

/// Side-channel settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Identical status strings are not repeated faster than this
    pub status_repeat_ms: u64,
    /// Minimum gap between debug frames
    pub debug_frame_interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            status_repeat_ms: 250,
            debug_frame_interval_ms: 400,
        }
    }
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// ROI proposer
    pub roi: RoiConfig,
    /// Escalation state machine
    pub escalation: EscalationConfig,
    /// Module recovery
    pub recovery: RecoveryConfig,
    /// Telemetry side channel
    pub telemetry: TelemetryConfig,
}

impl ScanConfig {
    /// Parse a (possibly partial) JSON document; missing fields keep defaults.
    pub fn from_json(json: &str) -> Result<Self, ScanError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Apply `QR_RESCUE_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup (the environment in production)
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let r = &mut self.recovery;
        r.light_budget_ms = parse_u64(&lookup, "QR_RESCUE_LIGHT_BUDGET_MS", r.light_budget_ms).clamp(20, 5_000);
        r.forced_budget_ms = parse_u64(&lookup, "QR_RESCUE_FORCED_BUDGET_MS", r.forced_budget_ms).clamp(50, 30_000);
        r.max_unknown = parse_usize(&lookup, "QR_RESCUE_MAX_UNKNOWN", r.max_unknown).clamp(1, 64);
        r.forced_max_unknown = parse_usize(&lookup, "QR_RESCUE_FORCED_MAX_UNKNOWN", r.forced_max_unknown).clamp(1, 64);
        r.beam_width = parse_usize(&lookup, "QR_RESCUE_BEAM_WIDTH", r.beam_width).clamp(1, 1024);
        r.wide_beam_width = parse_usize(&lookup, "QR_RESCUE_WIDE_BEAM_WIDTH", r.wide_beam_width).clamp(1, 1024);

        let e = &mut self.escalation;
        e.warmup_ms = parse_u64(&lookup, "QR_RESCUE_WARMUP_MS", e.warmup_ms);
        e.auto_force_after_ms = parse_u64(&lookup, "QR_RESCUE_AUTO_FORCE_AFTER_MS", e.auto_force_after_ms);
        e.auto_force_frames = parse_u64(&lookup, "QR_RESCUE_AUTO_FORCE_FRAMES", e.auto_force_frames as u64)
            .min(u32::MAX as u64) as u32;

        let t = &mut self.telemetry;
        t.status_repeat_ms = parse_u64(&lookup, "QR_RESCUE_STATUS_REPEAT_MS", t.status_repeat_ms);
        t.debug_frame_interval_ms =
            parse_u64(&lookup, "QR_RESCUE_DEBUG_FRAME_INTERVAL_MS", t.debug_frame_interval_ms);
        self
    }
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: u64) -> u64 {
    lookup(name)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: usize) -> usize {
    lookup(name)
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(default)
}
