//! The per-frame scan orchestrator.
//!
//! [`ScanPipeline::process_frame`] works one frame through escalating tiers
//! and stops at the first real decode:
//!
//! 1. Base decode over the proposed ROIs.
//! 2. Boosted decode when a tier warrants it (cooldown-gated).
//! 3. Direct module recovery after a decode drought.
//! 4. With an assisted detector: a short warmup collecting patches, then
//!    one heavy run (cached patch, rectified quad, enhancement ladder,
//!    multi-frame fusion, forced recovery).
//!
//! Collaborator failures are absorbed per attempt. The caller only ever
//! sees [`ScanError`] for a frame it handed in that cannot be read.

mod patch;
mod state;

#[cfg(test)]
mod tests;

pub use patch::PATCH_SIDE;

use crate::config::ScanConfig;
use crate::deadline::{Deadline, elapsed_at_least};
use crate::enhance::{EnhancementLadder, Rendering};
use crate::enhance::fusion::fuse;
use crate::error::{AssistError, ScanError};
use crate::models::{Frame, HitKind, Point, PrimitiveHit, Quad, RoiRect, ScanOutput, ScanStage, TierSet};
use crate::primitives::{AssistedDetector, DecodePrimitive, DecodeRequest, Effort};
use crate::quality::{self, CachedPatch, FrameCache, PatchSource};
use crate::recovery::{RecoveryEffort, RecoveryPlan, recover};
use crate::roi_proposer::RoiProposer;
use crate::telemetry::{DebugFrameSink, PipelineStats, StatusSink, Telemetry};
use image::GrayImage;
use log::{debug, info, warn};
use state::{EscalationState, box_signature};

/// Rectified patches considered for fusion
const FUSE_TOP: usize = 4;

/// A decode and where it came from
#[derive(Debug, Clone)]
struct Decoded {
    text: String,
    bbox: RoiRect,
    quad: Option<Quad>,
    stage: ScanStage,
}

/// Best non-decoding evidence seen while working one frame
#[derive(Debug, Default)]
struct FrameBest {
    bbox: Option<RoiRect>,
    quad: Option<Quad>,
    diagnostic: Option<String>,
}

impl FrameBest {
    /// A diagnostic hit replaces a box-only one; otherwise the first wins.
    fn offer(&mut self, bbox: RoiRect, quad: Option<Quad>, diagnostic: Option<&str>) {
        let upgrade = self.bbox.is_none() || (diagnostic.is_some() && self.diagnostic.is_none());
        if upgrade {
            self.bbox = Some(bbox);
            self.quad = quad;
        }
        if self.diagnostic.is_none() {
            self.diagnostic = diagnostic.map(str::to_string);
        }
    }
}

/// Stateful scan engine. One instance per camera session; frames are
/// processed strictly one at a time.
pub struct ScanPipeline {
    config: ScanConfig,
    decoder: Box<dyn DecodePrimitive + Send>,
    assisted: Option<Box<dyn AssistedDetector + Send>>,
    assisted_disabled: bool,
    proposer: RoiProposer,
    cache: FrameCache,
    state: EscalationState,
    telemetry: Telemetry,
    stats: PipelineStats,
}

impl ScanPipeline {
    /// Create a pipeline around a decode primitive
    pub fn new(config: ScanConfig, decoder: impl DecodePrimitive + Send + 'static) -> Self {
        Self {
            proposer: RoiProposer::new(config.roi.clone()),
            telemetry: Telemetry::new(config.telemetry.clone()),
            config,
            decoder: Box::new(decoder),
            assisted: None,
            assisted_disabled: false,
            cache: FrameCache::default(),
            state: EscalationState::default(),
            stats: PipelineStats::default(),
        }
    }

    /// Create a pipeline with default tuning
    pub fn with_defaults(decoder: impl DecodePrimitive + Send + 'static) -> Self {
        Self::new(ScanConfig::default(), decoder)
    }

    /// Attach an assisted detector, enabling warmup and the heavy tiers
    pub fn with_assisted(mut self, detector: impl AssistedDetector + Send + 'static) -> Self {
        self.assisted = Some(Box::new(detector));
        self.assisted_disabled = false;
        self
    }

    /// Receive short tier/stage status strings
    pub fn set_status_sink(&mut self, sink: impl StatusSink + Send + 'static) {
        self.telemetry.set_status_sink(Box::new(sink));
    }

    /// Receive rate-limited copies of intermediate patches
    pub fn set_debug_sink(&mut self, sink: impl DebugFrameSink + Send + 'static) {
        self.telemetry.set_debug_sink(Box::new(sink));
    }

    /// Active configuration
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Lifetime counters
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Patches currently cached for the heavy tiers
    pub fn cache(&self) -> &FrameCache {
        &self.cache
    }

    /// True while an assisted detector is attached and its link is alive
    pub fn assisted_available(&self) -> bool {
        self.assisted.is_some() && !self.assisted_disabled
    }

    /// Clear all temporal state: history, cooldowns, warmup, cache.
    ///
    /// Lifetime counters are kept, and a dead assisted link stays dead.
    pub fn reset(&mut self) {
        self.state = EscalationState::default();
        self.proposer.reset();
        self.cache.clear();
        self.telemetry.reset();
        debug!("scan pipeline reset");
    }

    /// Force heavy effort for the next `frames` frames, prime a warmup and
    /// clear the cooldowns. Work already running is not interrupted.
    pub fn request_hard_effort(&mut self, frames: u32) {
        self.state.request_hard_effort(frames);
        info!("hard effort requested for {frames} frames");
    }

    /// Run one frame through the tiers
    pub fn process_frame(&mut self, frame: &Frame) -> Result<ScanOutput, ScanError> {
        frame.validate()?;
        let now = frame.timestamp_ms;
        self.stats.frames += 1;

        let tick = self.state.begin_frame(now, &self.config.escalation);
        if tick.auto_forced {
            self.stats.auto_escalations += 1;
            info!(
                "no code seen for {}ms, forcing effort for {} frames",
                self.config.escalation.auto_force_after_ms, self.config.escalation.auto_force_frames
            );
        }

        let mut best = FrameBest::default();
        let decoded = self.run_tiers(frame, tick.tiers, tick.index, &mut best);
        let output = self.finish(frame, tick.tiers, decoded, best);
        let status = format!("{}:{}", output.tiers.label(), output.stage.label());
        self.telemetry.status(now, &status);
        Ok(output)
    }

    fn run_tiers(&mut self, frame: &Frame, tiers: TierSet, index: u64, best: &mut FrameBest) -> Option<Decoded> {
        let now = frame.timestamp_ms;
        let rois = self.proposer.propose(frame.width, frame.height, index, now);

        for roi in &rois {
            if let Some(d) = self.frame_attempt(frame, *roi, Effort::Base, best) {
                return Some(d);
            }
        }

        let esc = &self.config.escalation;
        if tiers.wants_boost() && elapsed_at_least(self.state.last_boosted_ms, now, esc.boosted_cooldown_ms) {
            self.state.last_boosted_ms = Some(now);
            let skip = esc.boosted_skip_coverage;
            let boosted: Vec<RoiRect> = rois
                .iter()
                .copied()
                .filter(|r| r.coverage(frame.width, frame.height) < skip)
                .collect();
            for roi in boosted {
                if let Some(d) = self.frame_attempt(frame, roi, Effort::Boosted, best) {
                    return Some(d);
                }
            }
        }

        if let Some(d) = self.direct_recovery(frame, tiers, best) {
            return Some(d);
        }

        let esc = &self.config.escalation;
        if !self.assisted_available()
            || !elapsed_at_least(self.state.last_assisted_ms, now, esc.assisted_cooldown_ms)
            || !tiers.wants_boost()
        {
            return None;
        }

        let signature = best.bbox.as_ref().map(box_signature);
        if !self.state.open_warmup(now, signature, &self.config.escalation) {
            return None;
        }
        if self.state.warmup_collecting(now, &self.config.escalation) {
            self.state.count_warmup_patch();
            return self.collect_warmup(frame, tiers, &rois, best);
        }
        self.state.finish_warmup(now);
        self.heavy_path(frame, tiers, &rois, best)
    }

    /// Decode a frame region directly
    fn frame_attempt(&mut self, frame: &Frame, roi: RoiRect, effort: Effort, best: &mut FrameBest) -> Option<Decoded> {
        let stage = match effort {
            Effort::Base => {
                self.stats.base_attempts += 1;
                ScanStage::Base
            }
            Effort::Boosted => {
                self.stats.boosted_attempts += 1;
                ScanStage::Boosted
            }
        };
        let req = DecodeRequest {
            pixels: &frame.luma[..frame.area()],
            width: frame.width,
            height: frame.height,
            rotation: frame.rotation,
            roi,
            effort,
        };
        let hit = self.call_decoder(&req)?;
        self.observe(hit, stage, frame.timestamp_ms, best)
    }

    /// Decode a normalized patch and map the hit into the frame
    fn patch_attempt(
        &mut self,
        patch: &GrayImage,
        to_frame: impl Fn(Point) -> Point,
        effort: Effort,
        stage: ScanStage,
        now: u64,
        best: &mut FrameBest,
    ) -> Option<Decoded> {
        let hit = self.call_decoder(&DecodeRequest::for_patch(patch, effort))?;
        self.observe(hit.remapped(to_frame), stage, now, best)
    }

    fn call_decoder(&mut self, req: &DecodeRequest<'_>) -> Option<PrimitiveHit> {
        match self.decoder.decode(req) {
            Ok(hit) => hit,
            Err(e) => {
                debug!("decode attempt failed: {e}");
                None
            }
        }
    }

    /// Classify a frame-space hit. Non-decodes feed the box history.
    fn observe(&mut self, hit: PrimitiveHit, stage: ScanStage, now: u64, best: &mut FrameBest) -> Option<Decoded> {
        match hit.kind() {
            HitKind::Decoded(text) => {
                return Some(Decoded {
                    text: text.to_string(),
                    bbox: hit.bbox,
                    quad: hit.quad,
                    stage,
                });
            }
            HitKind::Diagnostic(diag) => {
                debug!("{} stage: {diag}", stage.label());
                best.offer(hit.bbox, hit.quad, Some(diag));
                self.state.last_diagnostic = Some((diag.to_string(), now));
            }
            HitKind::DetectedOnly => best.offer(hit.bbox, hit.quad, None),
        }
        self.proposer.on_box(hit.bbox, now);
        self.state.on_box(now, hit.quad);
        None
    }

    fn direct_recovery(&mut self, frame: &Frame, tiers: TierSet, best: &FrameBest) -> Option<Decoded> {
        let now = frame.timestamp_ms;
        let esc = &self.config.escalation;
        if !self.state.drought_at_least(now, esc.direct_recovery_after_ms)
            || !elapsed_at_least(self.state.last_direct_recovery_ms, now, esc.direct_recovery_interval_ms)
        {
            return None;
        }
        self.state.last_direct_recovery_ms = Some(now);

        let region = match best.bbox {
            Some(b) => b.padded(esc.direct_recovery_pad),
            None => {
                let side = (frame.width.min(frame.height) as f32 * self.config.roi.center_fraction).round() as i32;
                RoiRect::square_around(Point::new(frame.width as f32 / 2.0, frame.height as f32 / 2.0), side)
            }
        };
        let (patch, source) = patch::crop_patch(frame, region)?;
        let effort = if tiers.forced {
            RecoveryEffort::Forced
        } else {
            RecoveryEffort::Light
        };
        self.run_recovery(&patch, &source, effort, ScanStage::DirectRecovery, now)
    }

    /// Module recovery on a patch, honouring the plan's budget
    fn run_recovery(
        &mut self,
        patch: &GrayImage,
        source: &PatchSource,
        effort: RecoveryEffort,
        stage: ScanStage,
        now: u64,
    ) -> Option<Decoded> {
        let plan = RecoveryPlan::new(&self.config.recovery, effort);
        let deadline = Deadline::after_ms(plan.budget_ms);
        self.stats.recovery_runs += 1;
        self.state.last_recovery_ms = Some(now);
        match recover(patch, self.decoder.as_mut(), &plan, &deadline) {
            Ok(r) => {
                debug!(
                    "recovered {}x{} grid at rank {} with {} flips",
                    r.grid_size, r.grid_size, r.rank, r.flips
                );
                self.telemetry.debug(now, "recovered", &r.rendering);
                let quad = patch::rect_to_frame(&r.bounds, source);
                Some(Decoded {
                    text: r.text,
                    bbox: RoiRect::bounding(&quad),
                    quad: Some(quad),
                    stage,
                })
            }
            Err(miss) => {
                debug!("{} recovery: {miss}", stage.label());
                None
            }
        }
    }

    fn recovery_allowed(&self, now: u64, effort: RecoveryEffort) -> bool {
        let plan = RecoveryPlan::new(&self.config.recovery, effort);
        elapsed_at_least(self.state.last_recovery_ms, now, plan.min_interval_ms)
    }

    /// One warmup frame: cache the sharpest ROI patch, ask the assisted
    /// detector about the frame, and under forced effort recover at once.
    fn collect_warmup(&mut self, frame: &Frame, tiers: TierSet, rois: &[RoiRect], best: &mut FrameBest) -> Option<Decoded> {
        let now = frame.timestamp_ms;
        let sharpest = rois
            .iter()
            .filter_map(|r| patch::crop_patch(frame, *r))
            .map(|(p, source)| {
                let q = quality::score(&p);
                (p, source, q)
            })
            .min_by(|a, b| a.2.rank_cmp(&b.2));
        if let Some((p, source, q)) = &sharpest {
            self.telemetry.debug(now, "warmup", p);
            self.cache.push(CachedPatch {
                patch: p.clone(),
                timestamp_ms: now,
                source: *source,
                quality: *q,
            });
        }

        if let Some(d) = self.assist(frame, best) {
            return Some(d);
        }

        if tiers.forced && self.recovery_allowed(now, RecoveryEffort::Forced) {
            if let Some((p, source, _)) = &sharpest {
                return self.run_recovery(p, source, RecoveryEffort::Forced, ScanStage::Warmup, now);
            }
        }
        None
    }

    /// Run the assisted detector over the whole frame and cache a
    /// rectification of whatever it finds
    fn assist(&mut self, frame: &Frame, best: &mut FrameBest) -> Option<Decoded> {
        let now = frame.timestamp_ms;
        let (patch, source) = patch::crop_patch(frame, RoiRect::full(frame.width, frame.height))?;
        self.state.last_assisted_ms = Some(now);
        let detector = self.assisted.as_mut()?;
        self.stats.assisted_calls += 1;
        let found = match detector.detect(&patch) {
            Ok(found) => found?,
            Err(AssistError::LinkFailure) => {
                warn!("assisted detection link failed, continuing with the decode primitive only");
                self.assisted_disabled = true;
                return None;
            }
            Err(e) => {
                debug!("{e}");
                return None;
            }
        };

        let quad = found.quad.map(|p| source.to_frame(p, PATCH_SIDE));
        let hit = PrimitiveHit {
            text: found.text,
            bbox: RoiRect::bounding(&quad),
            quad: Some(quad),
        };
        if let Some(d) = self.observe(hit, ScanStage::Warmup, now, best) {
            return Some(d);
        }
        if let Some((rectified, source)) = patch::rectify(frame, &quad, self.config.escalation.rectify_expand) {
            let quality = quality::score(&rectified);
            self.cache.push(CachedPatch {
                patch: rectified,
                timestamp_ms: now,
                source,
                quality,
            });
        }
        None
    }

    fn heavy_path(&mut self, frame: &Frame, tiers: TierSet, rois: &[RoiRect], best: &mut FrameBest) -> Option<Decoded> {
        let now = frame.timestamp_ms;
        debug!("heavy path over {} cached patches", self.cache.len());

        let top = self.cache.top_k(1).first().map(|e| (*e).clone());
        if let Some(entry) = &top {
            let source = entry.source;
            let map = |p| source.to_frame(p, PATCH_SIDE);
            for effort in [Effort::Base, Effort::Boosted] {
                if let Some(d) = self.patch_attempt(&entry.patch, map, effort, ScanStage::CachedPatch, now, best) {
                    return Some(d);
                }
            }
        }

        if let Some(quad) = best.quad.or(self.state.last_quad) {
            if let Some((rectified, source)) = patch::rectify(frame, &quad, self.config.escalation.rectify_expand) {
                self.telemetry.debug(now, "rectified", &rectified);
                let map = |p| source.to_frame(p, PATCH_SIDE);
                for effort in [Effort::Base, Effort::Boosted] {
                    if let Some(d) = self.patch_attempt(&rectified, map, effort, ScanStage::Rectified, now, best) {
                        return Some(d);
                    }
                }
            }
        }

        let crops: Vec<(GrayImage, PatchSource)> = rois
            .iter()
            .filter_map(|r| patch::crop_patch(frame, *r))
            .collect();
        if let Some(d) = self.enhanced_attempts(&crops, ScanStage::Enhanced, now, best) {
            return Some(d);
        }

        let rectified: Vec<CachedPatch> = self
            .cache
            .top_k_rectified(FUSE_TOP)
            .into_iter()
            .cloned()
            .collect();
        if rectified.len() >= 2 {
            let sources: Vec<&GrayImage> = rectified.iter().map(|e| &e.patch).collect();
            if let Some(fused) = fuse(&sources) {
                self.stats.fusions += 1;
                debug!("fused {} patches, {} contributed", rectified.len(), fused.contributors());
                self.telemetry.debug(now, "fused", &fused.patch);
                let source = rectified[0].source;
                let map = |p| source.to_frame(p, PATCH_SIDE);
                for effort in [Effort::Base, Effort::Boosted] {
                    if let Some(d) = self.patch_attempt(&fused.patch, map, effort, ScanStage::Fused, now, best) {
                        return Some(d);
                    }
                }
                let fused = [(fused.patch, source)];
                if let Some(d) = self.enhanced_attempts(&fused, ScanStage::Fused, now, best) {
                    return Some(d);
                }
                let effort = if tiers.forced {
                    RecoveryEffort::Forced
                } else {
                    RecoveryEffort::Light
                };
                if self.recovery_allowed(now, effort) {
                    if let Some(d) = self.run_recovery(&fused[0].0, &source, effort, ScanStage::Fused, now) {
                        return Some(d);
                    }
                }
            }
        }

        if tiers.forced && self.recovery_allowed(now, RecoveryEffort::Forced) {
            let target = rectified.first().cloned().or(top);
            if let Some(entry) = target {
                return self.run_recovery(&entry.patch, &entry.source, RecoveryEffort::Forced, ScanStage::CachedPatch, now);
            }
        }
        None
    }

    /// Every non-raw rendering of every patch at base effort, then the same
    /// renderings at boosted effort. Renderings are built lazily by the base
    /// pass and kept for the boosted one.
    fn enhanced_attempts(
        &mut self,
        patches: &[(GrayImage, PatchSource)],
        stage: ScanStage,
        now: u64,
        best: &mut FrameBest,
    ) -> Option<Decoded> {
        let mut rendered: Vec<(Rendering, PatchSource)> = Vec::new();
        for (patch, source) in patches {
            for r in EnhancementLadder::skip_raw(patch) {
                if let Some(d) = self.rendering_attempt(&r, source, Effort::Base, stage, now, best) {
                    return Some(d);
                }
                rendered.push((r, *source));
            }
        }
        for (r, source) in &rendered {
            if let Some(d) = self.rendering_attempt(r, source, Effort::Boosted, stage, now, best) {
                return Some(d);
            }
        }
        None
    }

    fn rendering_attempt(
        &mut self,
        r: &Rendering,
        source: &PatchSource,
        effort: Effort,
        stage: ScanStage,
        now: u64,
        best: &mut FrameBest,
    ) -> Option<Decoded> {
        self.stats.enhancement_attempts += 1;
        let map = |p| source.to_frame(r.to_patch(p), PATCH_SIDE);
        let d = self.patch_attempt(&r.image, map, effort, stage, now, best)?;
        debug!("decoded on {} rendering", r.kind.label());
        Some(d)
    }

    fn finish(&mut self, frame: &Frame, tiers: TierSet, decoded: Option<Decoded>, best: FrameBest) -> ScanOutput {
        let now = frame.timestamp_ms;
        let (w, h) = (frame.width, frame.height);
        let mut out = ScanOutput {
            frame_width: w,
            frame_height: h,
            rotation: frame.rotation,
            crop: frame.crop,
            tiers,
            ..ScanOutput::default()
        };
        match decoded {
            Some(d) => {
                let bbox = d.bbox.clamped(w, h);
                self.proposer.on_decoded(bbox, now);
                self.state.on_decoded(now);
                if let Some(q) = d.quad {
                    self.state.last_quad = Some(q);
                }
                self.stats.decodes += 1;
                info!("decoded {} bytes at {} stage", d.text.len(), d.stage.label());
                out.text = Some(d.text);
                out.bbox = Some(bbox);
                out.quad = d.quad;
                out.stage = d.stage;
                out.diagnostic = best.diagnostic;
            }
            None => {
                out.bbox = best.bbox.map(|b| b.clamped(w, h));
                out.quad = best.quad;
                let hot_ms = self.config.escalation.hot_window_ms;
                out.diagnostic = best.diagnostic.or_else(|| {
                    self.state
                        .last_diagnostic
                        .as_ref()
                        .filter(|(_, at)| !elapsed_at_least(Some(*at), now, hot_ms))
                        .map(|(d, _)| d.clone())
                });
            }
        }
        out
    }
}
