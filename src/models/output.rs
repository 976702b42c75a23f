use super::{Point, Quad, RoiRect, Rotation};

/// Prefix the decode primitive puts on checksum/format failure diagnostics.
pub const INVALID_PREFIX: &str = "INVALID(";

/// What the decode primitive (or assisted detector) reported for one attempt.
///
/// Coordinates are in the pixel space of the buffer that was decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimitiveHit {
    /// Decoded text, or a diagnostic string starting with [`INVALID_PREFIX`]
    pub text: Option<String>,
    /// Axis-aligned box of the detected code
    pub bbox: RoiRect,
    /// Corner outline when the primitive located one
    pub quad: Option<Quad>,
}

/// Classification of a [`PrimitiveHit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitKind<'a> {
    /// A real, user-facing decode
    Decoded(&'a str),
    /// Detected, but failed checksum/format validation
    Diagnostic(&'a str),
    /// Located without any text
    DetectedOnly,
}

impl PrimitiveHit {
    /// A box-only detection
    pub fn detected(bbox: RoiRect, quad: Option<Quad>) -> Self {
        Self {
            text: None,
            bbox,
            quad,
        }
    }

    /// A successful decode
    pub fn decoded(text: impl Into<String>, bbox: RoiRect, quad: Option<Quad>) -> Self {
        Self {
            text: Some(text.into()),
            bbox,
            quad,
        }
    }

    /// Classify the hit. Empty text counts as box-only.
    pub fn kind(&self) -> HitKind<'_> {
        match self.text.as_deref() {
            Some(t) if t.starts_with(INVALID_PREFIX) => HitKind::Diagnostic(t),
            Some(t) if !t.is_empty() => HitKind::Decoded(t),
            _ => HitKind::DetectedOnly,
        }
    }

    /// Remap box and quad through `f` (e.g. patch space to frame space)
    pub fn remapped(&self, f: impl Fn(Point) -> Point) -> Self {
        let quad = self.quad.map(|q| q.map(&f));
        let bbox = match &quad {
            Some(q) => RoiRect::bounding(q),
            None => {
                let q = Quad::new(
                    Point::new(self.bbox.left as f32, self.bbox.top as f32),
                    Point::new(self.bbox.right as f32, self.bbox.top as f32),
                    Point::new(self.bbox.right as f32, self.bbox.bottom as f32),
                    Point::new(self.bbox.left as f32, self.bbox.bottom as f32),
                )
                .map(&f);
                RoiRect::bounding(&q)
            }
        };
        Self {
            text: self.text.clone(),
            bbox,
            quad,
        }
    }
}

/// Effort tiers active for a frame. Not mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TierSet {
    /// User- or auto-forced effort
    pub forced: bool,
    /// A box was seen recently
    pub hot: bool,
    /// Periodic exploration frame
    pub explore: bool,
}

impl TierSet {
    /// True when no costlier tier is active
    pub fn is_plain(&self) -> bool {
        !(self.forced || self.hot || self.explore)
    }

    /// Any active tier warrants a boosted pass
    pub fn wants_boost(&self) -> bool {
        !self.is_plain()
    }

    /// Short label for status text
    pub fn label(&self) -> &'static str {
        if self.forced {
            "forced"
        } else if self.hot {
            "hot"
        } else if self.explore {
            "explore"
        } else {
            "plain"
        }
    }
}

/// Which stage produced the frame's result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanStage {
    /// No text this frame
    #[default]
    Searching,
    /// Decode primitive at base effort
    Base,
    /// Decode primitive at boosted effort
    Boosted,
    /// Opportunistic direct module recovery
    DirectRecovery,
    /// Warmup collection (assisted detection or forced recovery)
    Warmup,
    /// Best cached patch
    CachedPatch,
    /// Rectified full-frame quad
    Rectified,
    /// Enhancement ladder over ROIs
    Enhanced,
    /// Multi-frame fusion
    Fused,
}

impl ScanStage {
    /// Short label for status text
    pub fn label(self) -> &'static str {
        match self {
            ScanStage::Searching => "searching",
            ScanStage::Base => "base",
            ScanStage::Boosted => "boosted",
            ScanStage::DirectRecovery => "direct-recovery",
            ScanStage::Warmup => "warmup",
            ScanStage::CachedPatch => "cached",
            ScanStage::Rectified => "rectified",
            ScanStage::Enhanced => "enhanced",
            ScanStage::Fused => "fused",
        }
    }
}

/// Per-frame result handed to the caller.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScanOutput {
    /// Decoded text; never a diagnostic string
    pub text: Option<String>,
    /// Best box in frame coordinates
    pub bbox: Option<RoiRect>,
    /// Best quad in frame coordinates
    pub quad: Option<Quad>,
    /// Best diagnostic-invalid string seen, for logging only
    pub diagnostic: Option<String>,
    /// Frame width
    pub frame_width: usize,
    /// Frame height
    pub frame_height: usize,
    /// Frame rotation
    pub rotation: Rotation,
    /// Host crop rectangle, echoed from the input
    pub crop: Option<RoiRect>,
    /// Tiers that were active
    pub tiers: TierSet,
    /// Stage that produced the result
    pub stage: ScanStage,
}

impl ScanOutput {
    /// True when the output carries decoded text
    pub fn is_decoded(&self) -> bool {
        self.text.is_some()
    }

    /// Quad mapped into the upright (display-rotated) frame
    pub fn upright_quad(&self) -> Option<Quad> {
        let (w, h, rot) = (self.frame_width, self.frame_height, self.rotation);
        self.quad.map(|q| q.map(|p| rot.map_to_upright(p, w, h)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_kind() {
        let bbox = RoiRect::new(0, 0, 10, 10);
        assert_eq!(PrimitiveHit::decoded("hello", bbox, None).kind(), HitKind::Decoded("hello"));
        let diag = PrimitiveHit::decoded("INVALID(Checksum,I) fmt=QRCode", bbox, None);
        assert!(matches!(diag.kind(), HitKind::Diagnostic(_)));
        assert_eq!(PrimitiveHit::decoded("", bbox, None).kind(), HitKind::DetectedOnly);
        assert_eq!(PrimitiveHit::detected(bbox, None).kind(), HitKind::DetectedOnly);
    }

    #[test]
    fn test_remapped_box_without_quad() {
        let hit = PrimitiveHit::detected(RoiRect::new(0, 0, 10, 20), None);
        let moved = hit.remapped(|p| Point::new(p.x * 2.0 + 5.0, p.y + 1.0));
        assert_eq!(moved.bbox, RoiRect::new(5, 1, 25, 21));
    }

    #[test]
    fn test_tiers() {
        let t = TierSet::default();
        assert!(t.is_plain());
        assert!(!t.wants_boost());
        let t = TierSet {
            explore: true,
            ..TierSet::default()
        };
        assert!(t.wants_boost());
        assert_eq!(t.label(), "explore");
    }

    #[test]
    fn test_upright_quad_follows_rotation() {
        let square = Quad::new(
            Point::new(0.0, 0.0),
            Point::new(2.0, 0.0),
            Point::new(2.0, 1.0),
            Point::new(0.0, 1.0),
        );
        let out = ScanOutput {
            quad: Some(square),
            frame_width: 4,
            frame_height: 2,
            rotation: Rotation::R90,
            ..ScanOutput::default()
        };
        let q = out.upright_quad().unwrap();
        assert_eq!(q.corners[0], Point::new(1.0, 0.0));
        assert_eq!(q.corners[1], Point::new(1.0, 2.0));
        assert!(ScanOutput::default().upright_quad().is_none());
    }
}
