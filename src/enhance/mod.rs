//! Alternate renderings of a patch for the decode primitive.
//!
//! No single global binarization survives uneven light plus glare, so a
//! patch is offered to the decoder as a sequence of renderings. The
//! sequence is lazy: each rendering is computed only when the previous one
//! failed to decode.

pub mod fusion;

use crate::models::Point;
use crate::utils::binarization::{adaptive_mean_threshold, close_dark, sauvola_threshold};
use crate::utils::filters::{local_contrast_equalize, unsharp_mask};
use crate::utils::margins::{measure_white_margins, repair_quiet_zone};
use crate::utils::resize::resize_to_square;
use image::GrayImage;

const LOCAL_CONTRAST_TILES: usize = 8;
const LOCAL_CONTRAST_CLIP: f32 = 2.5;
const ADAPTIVE_RADIUS: u32 = 15;
const ADAPTIVE_OFFSET: i32 = 7;
const SAUVOLA_WINDOW: u32 = 25;
const SAUVOLA_K: f32 = 0.34;
const CLOSE_RADIUS: u8 = 1;
const UNSHARP_SIGMA: f32 = 1.6;
const UNSHARP_THRESHOLD: i32 = 2;

/// Renderings in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Enhancement {
    /// The patch as captured
    Raw,
    /// Contrast-limited local equalization
    LocalContrast,
    /// Adaptive local-mean binarization
    AdaptiveMean,
    /// Adaptive local-mean, morphologically closed
    AdaptiveMeanClosed,
    /// Sauvola binarization
    Sauvola,
    /// Sauvola, morphologically closed
    SauvolaClosed,
    /// Unsharp-masked
    Unsharp,
    /// White border added where the quiet zone is missing
    QuietZonePadded,
}

impl Enhancement {
    /// Full ladder order
    pub const LADDER: [Enhancement; 8] = [
        Enhancement::Raw,
        Enhancement::LocalContrast,
        Enhancement::AdaptiveMean,
        Enhancement::AdaptiveMeanClosed,
        Enhancement::Sauvola,
        Enhancement::SauvolaClosed,
        Enhancement::Unsharp,
        Enhancement::QuietZonePadded,
    ];

    /// Short label for logs and debug frames
    pub fn label(self) -> &'static str {
        match self {
            Enhancement::Raw => "raw",
            Enhancement::LocalContrast => "local-contrast",
            Enhancement::AdaptiveMean => "adaptive",
            Enhancement::AdaptiveMeanClosed => "adaptive-closed",
            Enhancement::Sauvola => "sauvola",
            Enhancement::SauvolaClosed => "sauvola-closed",
            Enhancement::Unsharp => "unsharp",
            Enhancement::QuietZonePadded => "quiet-zone",
        }
    }
}

/// One rendering plus the mapping back to the source patch
#[derive(Debug, Clone)]
pub struct Rendering {
    /// Which enhancement produced it
    pub kind: Enhancement,
    /// Pixels, same size as the source patch
    pub image: GrayImage,
    /// Source-patch offset of the rendering origin
    offset: Point,
    /// Source-patch pixels per rendering pixel
    scale: f32,
}

impl Rendering {
    fn same_frame(kind: Enhancement, image: GrayImage) -> Self {
        Self {
            kind,
            image,
            offset: Point::new(0.0, 0.0),
            scale: 1.0,
        }
    }

    /// Map a rendering point to source-patch coordinates
    pub fn to_patch(&self, p: Point) -> Point {
        Point::new(self.offset.x + p.x * self.scale, self.offset.y + p.y * self.scale)
    }
}

/// Lazy iterator over [`Enhancement::LADDER`] for one patch
pub struct EnhancementLadder<'a> {
    patch: &'a GrayImage,
    next: usize,
    adaptive: Option<GrayImage>,
    sauvola: Option<GrayImage>,
}

impl<'a> EnhancementLadder<'a> {
    /// Start at the raw rendering
    pub fn new(patch: &'a GrayImage) -> Self {
        Self {
            patch,
            next: 0,
            adaptive: None,
            sauvola: None,
        }
    }

    /// Start after the raw rendering (the caller already tried it)
    pub fn skip_raw(patch: &'a GrayImage) -> Self {
        let mut ladder = Self::new(patch);
        ladder.next = 1;
        ladder
    }

    fn render(&mut self, kind: Enhancement) -> Option<Rendering> {
        let patch = self.patch;
        let image = match kind {
            Enhancement::Raw => patch.clone(),
            Enhancement::LocalContrast => local_contrast_equalize(patch, LOCAL_CONTRAST_TILES, LOCAL_CONTRAST_CLIP),
            Enhancement::AdaptiveMean => {
                let img = adaptive_mean_threshold(patch, ADAPTIVE_RADIUS, ADAPTIVE_OFFSET);
                self.adaptive = Some(img.clone());
                img
            }
            Enhancement::AdaptiveMeanClosed => {
                let base = match self.adaptive.take() {
                    Some(img) => img,
                    None => adaptive_mean_threshold(patch, ADAPTIVE_RADIUS, ADAPTIVE_OFFSET),
                };
                close_dark(&base, CLOSE_RADIUS)
            }
            Enhancement::Sauvola => {
                let img = sauvola_threshold(patch, SAUVOLA_WINDOW, SAUVOLA_K);
                self.sauvola = Some(img.clone());
                img
            }
            Enhancement::SauvolaClosed => {
                let base = match self.sauvola.take() {
                    Some(img) => img,
                    None => sauvola_threshold(patch, SAUVOLA_WINDOW, SAUVOLA_K),
                };
                close_dark(&base, CLOSE_RADIUS)
            }
            Enhancement::Unsharp => unsharp_mask(patch, UNSHARP_SIGMA, UNSHARP_THRESHOLD),
            Enhancement::QuietZonePadded => return quiet_zone_rendering(patch),
        };
        Some(Rendering::same_frame(kind, image))
    }
}

impl Iterator for EnhancementLadder<'_> {
    type Item = Rendering;

    fn next(&mut self) -> Option<Rendering> {
        while self.next < Enhancement::LADDER.len() {
            let kind = Enhancement::LADDER[self.next];
            self.next += 1;
            if let Some(r) = self.render(kind) {
                return Some(r);
            }
        }
        None
    }
}

/// Pad the missing quiet zone and scale back to the patch size.
/// `None` when every side already has more than 2px of white.
fn quiet_zone_rendering(patch: &GrayImage) -> Option<Rendering> {
    let m = measure_white_margins(patch);
    if !m.any_at_most(2) {
        return None;
    }
    let repair = repair_quiet_zone(patch, &m);
    let side = patch.width().max(patch.height());
    let scale = repair.image.width().max(repair.image.height()) as f32 / side as f32;
    Some(Rendering {
        kind: Enhancement::QuietZonePadded,
        image: resize_to_square(&repair.image, side),
        offset: Point::new(-(repair.left as f32), -(repair.top as f32)),
        scale,
    })
}
