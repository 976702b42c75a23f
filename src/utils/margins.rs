//! Quiet-zone measurement and repair.
//!
//! Codes cropped tight against their modules fail detection because the
//! finder scan needs a light margin. These helpers measure how much white
//! border a patch already has and pad each side up to a target.

use image::GrayImage;

/// Pixels darker than this count as dark when testing a line
const DARK_LUMA: u8 = 180;

/// Width of the mostly-white border on each side, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Margins {
    /// Rows above the code
    pub top: u32,
    /// Rows below the code
    pub bottom: u32,
    /// Columns left of the code
    pub left: u32,
    /// Columns right of the code
    pub right: u32,
}

impl Margins {
    /// Some side has at most `px` of white border
    pub fn any_at_most(&self, px: u32) -> bool {
        self.top <= px || self.bottom <= px || self.left <= px || self.right <= px
    }

    /// No side has any white border
    pub fn all_zero(&self) -> bool {
        self.top == 0 && self.bottom == 0 && self.left == 0 && self.right == 0
    }
}

/// Bright, flat and nearly free of dark pixels, sampled every 2nd pixel.
fn is_mostly_white(values: impl Iterator<Item = u8>) -> bool {
    let mut n = 0u64;
    let mut sum = 0u64;
    let mut sq = 0u64;
    let mut dark = 0u64;
    for v in values.step_by(2) {
        n += 1;
        sum += v as u64;
        sq += v as u64 * v as u64;
        if v < DARK_LUMA {
            dark += 1;
        }
    }
    let n = n.max(1) as f64;
    let mean = sum as f64 / n;
    let std = (sq as f64 / n - mean * mean).max(0.0).sqrt();
    let dark_ratio = dark as f64 / n;
    (mean >= 205.0 && std <= 22.0 && dark_ratio <= 0.10)
        || (mean >= 195.0 && std <= 32.0 && dark_ratio <= 0.12)
        || (mean >= 185.0 && std <= 42.0 && dark_ratio <= 0.08)
}

/// Count leading mostly-white rows and columns from each edge.
///
/// Columns are stepped two at a time, so left/right are even.
pub fn measure_white_margins(img: &GrayImage) -> Margins {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let src = img.as_raw();
    let row_white = |y: usize| is_mostly_white(src[y * w..(y + 1) * w].iter().copied());
    let col_white = |x: usize| is_mostly_white((0..h).map(|y| src[y * w + x]));

    let mut m = Margins::default();
    if w == 0 || h == 0 {
        return m;
    }
    m.top = (0..h).take_while(|&y| row_white(y)).count() as u32;
    m.bottom = (0..h).rev().take_while(|&y| row_white(y)).count() as u32;
    m.left = ((0..w).step_by(2).take_while(|&x| col_white(x)).count() as u32 * 2).min(w as u32);
    m.right = ((0..w).rev().step_by(2).take_while(|&x| col_white(x)).count() as u32 * 2).min(w as u32);
    m
}

/// Add a white border with an independent width per side
pub fn pad_white_per_side(img: &GrayImage, left: u32, top: u32, right: u32, bottom: u32) -> GrayImage {
    let (w, h) = img.dimensions();
    let mut out = GrayImage::from_pixel(w + left + right, h + top + bottom, image::Luma([255]));
    image::imageops::replace(&mut out, img, left as i64, top as i64);
    out
}

/// Desired quiet-zone width for a patch given its measured margins.
/// Missing margins ask for more.
fn target_quiet_zone(min_dim: u32, margins: &Margins) -> u32 {
    let suspect = margins.any_at_most(2);
    let zero = margins.all_zero();
    let mut base = min_dim / 10;
    if suspect {
        base = base.max(min_dim / 8);
    }
    if zero {
        base = base.max(min_dim / 5);
    }
    let max = match (zero, suspect) {
        (true, _) => 160,
        (false, true) => 96,
        (false, false) => 64,
    };
    base.clamp(14, max)
}

/// A patch padded out to its target quiet zone
#[derive(Debug, Clone)]
pub struct QuietZoneRepair {
    /// Padded pixels
    pub image: GrayImage,
    /// Columns added on the left
    pub left: u32,
    /// Rows added on top
    pub top: u32,
}

/// Pad each side of `img` (already measured as `margins`) up to the
/// target quiet zone
pub fn repair_quiet_zone(img: &GrayImage, margins: &Margins) -> QuietZoneRepair {
    let target = target_quiet_zone(img.width().min(img.height()).max(1), margins);
    let left = target.saturating_sub(margins.left);
    let top = target.saturating_sub(margins.top);
    let image = pad_white_per_side(
        img,
        left,
        top,
        target.saturating_sub(margins.right),
        target.saturating_sub(margins.bottom),
    );
    QuietZoneRepair { image, left, top }
}
