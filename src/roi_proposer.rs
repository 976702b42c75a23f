//! Region-of-interest proposals from temporal history.
//!
//! The proposer remembers the last decode box and the last detection box.
//! Each frame it returns 1 to 5 distinct rectangles, most promising first.

use crate::config::RoiConfig;
use crate::models::{Point, RoiRect};

#[derive(Debug, Clone, Copy)]
struct Sighting {
    roi: RoiRect,
    timestamp_ms: u64,
}

impl Sighting {
    fn within(&self, now_ms: u64, window_ms: u64) -> bool {
        now_ms >= self.timestamp_ms && now_ms - self.timestamp_ms <= window_ms
    }
}

/// Ordered ROI generator
#[derive(Debug, Clone)]
pub struct RoiProposer {
    config: RoiConfig,
    last_decoded: Option<Sighting>,
    last_box: Option<Sighting>,
}

impl RoiProposer {
    /// Proposer with no history
    pub fn new(config: RoiConfig) -> Self {
        Self {
            config,
            last_decoded: None,
            last_box: None,
        }
    }

    /// Record a successful decode at `roi`
    pub fn on_decoded(&mut self, roi: RoiRect, timestamp_ms: u64) {
        self.last_decoded = Some(Sighting { roi, timestamp_ms });
        self.last_box = Some(Sighting { roi, timestamp_ms });
    }

    /// Record a detection box (not decoded) at `roi`
    pub fn on_box(&mut self, roi: RoiRect, timestamp_ms: u64) {
        self.last_box = Some(Sighting { roi, timestamp_ms });
    }

    /// Forget all history
    pub fn reset(&mut self) {
        self.last_decoded = None;
        self.last_box = None;
    }

    /// The rectangle to focus on, if history is recent enough
    fn focus(&self, now_ms: u64) -> Option<RoiRect> {
        if let Some(s) = self.last_decoded.filter(|s| s.within(now_ms, self.config.decode_focus_ms)) {
            return Some(s.roi);
        }
        self.last_box
            .filter(|s| s.within(now_ms, self.config.box_focus_ms))
            .map(|s| s.roi)
    }

    /// Propose ROIs for one frame.
    ///
    /// Every returned rect is clamped to the frame, non-empty and unique.
    pub fn propose(&self, width: usize, height: usize, frame_index: u64, now_ms: u64) -> Vec<RoiRect> {
        let mut out: Vec<RoiRect> = Vec::with_capacity(self.config.max_rois);
        if width == 0 || height == 0 || self.config.max_rois == 0 {
            return out;
        }
        let mut push = |r: RoiRect| {
            if out.len() >= self.config.max_rois {
                return;
            }
            if let Some(r) = r.clamped_nonempty(width, height) {
                if !out.contains(&r) {
                    out.push(r);
                }
            }
        };

        let focus = self.focus(now_ms);
        if let Some(f) = focus {
            push(f.padded(self.config.focus_pad));
        }

        let every = self.config.full_frame_every.max(1);
        if frame_index % every == 0 {
            push(RoiRect::full(width, height));
        }

        let side = ((width.min(height) as f32) * self.config.center_fraction).round().max(1.0) as i32;
        let center = Point::new(width as f32 / 2.0, height as f32 / 2.0);
        let centered = RoiRect::square_around(center, side);
        push(centered);

        if focus.is_none() {
            let top = centered.top;
            push(RoiRect::new(0, top, side, top + side));
            push(RoiRect::new(width as i32 - side, top, width as i32, top + side));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposer() -> RoiProposer {
        RoiProposer::new(RoiConfig::default())
    }

    #[test]
    fn test_rects_in_bounds_for_many_sizes() {
        let mut p = proposer();
        p.on_box(RoiRect::new(-50, -50, 30, 30), 0);
        for &(w, h) in &[(1, 1), (2, 7), (21, 21), (640, 480), (480, 640), (1920, 1080), (3, 1000)] {
            for idx in 0..12 {
                for &now in &[0u64, 500, 5000] {
                    let rois = p.propose(w, h, idx, now);
                    assert!(!rois.is_empty() && rois.len() <= 5);
                    for r in &rois {
                        assert!(r.left >= 0 && r.top >= 0);
                        assert!(r.right <= w as i32 && r.bottom <= h as i32);
                        assert!(r.width() > 0 && r.height() > 0);
                    }
                    let mut uniq = rois.clone();
                    uniq.dedup();
                    assert_eq!(uniq.len(), rois.len());
                }
            }
        }
    }

    #[test]
    fn test_no_focus_order() {
        let rois = proposer().propose(640, 480, 0, 0);
        // full, centered, left, right
        assert_eq!(rois.len(), 4);
        assert_eq!(rois[0], RoiRect::full(640, 480));
        assert_eq!(rois[1], RoiRect::new(147, 67, 493, 413));
        assert_eq!(rois[2].left, 0);
        assert_eq!(rois[3].right, 640);

        let rois = proposer().propose(640, 480, 3, 0);
        assert_eq!(rois.len(), 3);
        assert_eq!(rois[0], RoiRect::new(147, 67, 493, 413));
    }

    #[test]
    fn test_decode_focus_first_then_expires() {
        let mut p = proposer();
        let code = RoiRect::new(100, 100, 200, 200);
        p.on_decoded(code, 1000);
        let rois = p.propose(640, 480, 1, 2000);
        assert_eq!(rois[0], RoiRect::new(65, 65, 235, 235));
        assert_eq!(rois.len(), 2);

        // Past 1.2s: decode focus gone, box focus (0.9s) also gone.
        let rois = p.propose(640, 480, 1, 2300);
        assert_eq!(rois.len(), 3);
    }

    #[test]
    fn test_box_focus_window() {
        let mut p = proposer();
        p.on_box(RoiRect::new(10, 10, 50, 50), 0);
        assert_eq!(p.propose(640, 480, 1, 900)[0], RoiRect::new(0, 0, 64, 64));
        assert_eq!(p.propose(640, 480, 1, 901).len(), 3);
        p.reset();
        assert_eq!(p.propose(640, 480, 1, 0).len(), 3);
    }
}
