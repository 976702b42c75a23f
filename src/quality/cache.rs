use super::RoiQuality;
use crate::models::{Point, Quad, RoiRect};
use crate::utils::geometry::PerspectiveTransform;
use image::GrayImage;
use std::collections::VecDeque;

/// Entries held by a [`FrameCache`]
pub const CACHE_CAPACITY: usize = 16;

/// Where a patch was taken from in its frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PatchSource {
    /// Axis-aligned crop, scaled to the patch
    Crop(RoiRect),
    /// Perspective rectification of a quad
    Warp(Quad),
}

impl PatchSource {
    /// Bounding rect in frame coordinates
    pub fn roi(&self) -> RoiRect {
        match self {
            PatchSource::Crop(r) => *r,
            PatchSource::Warp(q) => RoiRect::bounding(q),
        }
    }

    /// Map a point of a `side x side` patch back into the frame
    pub fn to_frame(&self, p: Point, side: u32) -> Point {
        let side = side.max(1) as f32;
        match self {
            PatchSource::Crop(r) => Point::new(
                r.left as f32 + p.x * r.width() as f32 / side,
                r.top as f32 + p.y * r.height() as f32 / side,
            ),
            PatchSource::Warp(q) => PerspectiveTransform::square_to_quad(side, q)
                .and_then(|t| t.transform(&p))
                .unwrap_or_else(|| q.center()),
        }
    }
}

/// A normalized patch kept for the heavy tiers
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPatch {
    /// Owned pixels
    pub patch: GrayImage,
    /// Frame timestamp
    pub timestamp_ms: u64,
    /// Origin in the frame
    pub source: PatchSource,
    /// Quality at insertion
    pub quality: RoiQuality,
}

impl CachedPatch {
    /// Built from a perspective rectification (eligible for fusion)
    pub fn is_rectified(&self) -> bool {
        matches!(self.source, PatchSource::Warp(_))
    }
}

/// Fixed-capacity patch store.
///
/// Insertion evicts the oldest entry (FIFO) regardless of quality;
/// retrieval is by quality rank regardless of age.
#[derive(Debug, Clone)]
pub struct FrameCache {
    entries: VecDeque<CachedPatch>,
    capacity: usize,
}

impl Default for FrameCache {
    fn default() -> Self {
        Self::with_capacity(CACHE_CAPACITY)
    }
}

impl FrameCache {
    /// Empty cache holding at most `capacity` patches
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert, evicting the oldest entry when full
    pub fn push(&mut self, entry: CachedPatch) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Best `k` entries by quality rank, without mutating the cache
    pub fn top_k(&self, k: usize) -> Vec<&CachedPatch> {
        let mut ranked: Vec<&CachedPatch> = self.entries.iter().collect();
        ranked.sort_by(|a, b| a.quality.rank_cmp(&b.quality));
        ranked.truncate(k);
        ranked
    }

    /// Best `k` rectified entries
    pub fn top_k_rectified(&self, k: usize) -> Vec<&CachedPatch> {
        let mut ranked: Vec<&CachedPatch> = self.entries.iter().filter(|e| e.is_rectified()).collect();
        ranked.sort_by(|a, b| a.quality.rank_cmp(&b.quality));
        ranked.truncate(k);
        ranked
    }

    /// Drop every patch
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Owned copies, oldest first, for debug consumers
    pub fn snapshot(&self) -> Vec<CachedPatch> {
        self.entries.iter().cloned().collect()
    }
}
