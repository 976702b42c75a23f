#![allow(dead_code)]

use rust_qr_rescue::models::BitMatrix;
use rust_qr_rescue::recovery::priors::structural_value;
use rust_qr_rescue::{AssistError, AssistHit, AssistedDetector, DecodeError, DecodePrimitive, DecodeRequest};
use rust_qr_rescue::{Frame, PrimitiveHit, Quad, RoiRect, Rotation};
use rust_qr_rescue::models::Point;
use image::GrayImage;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const DARK: u8 = 20;
pub const LIGHT: u8 = 235;

/// A plausible `n x n` module grid: fixed patterns plus pseudo-random data
pub fn truth(n: usize, seed: u32) -> Vec<bool> {
    let mut s = seed;
    (0..n * n)
        .map(|i| {
            structural_value(n, i % n, i / n).unwrap_or_else(|| {
                s = s.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                s >> 31 == 1
            })
        })
        .collect()
}

/// Where a code sits in a raster
#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub n: usize,
    pub left: usize,
    pub top: usize,
    pub module_px: usize,
}

impl Placement {
    pub fn side(&self) -> usize {
        self.n * self.module_px
    }

    pub fn rect(&self) -> RoiRect {
        RoiRect::new(
            self.left as i32,
            self.top as i32,
            (self.left + self.side()) as i32,
            (self.top + self.side()) as i32,
        )
    }
}

/// Paint a white `w x h` raster with the code at `at`.
///
/// `shade(x, y, module_index, black)` gives each code pixel's luma.
pub fn paint(
    w: usize,
    h: usize,
    bits: &[bool],
    at: Placement,
    shade: impl Fn(usize, usize, usize, bool) -> u8,
) -> Vec<u8> {
    let mut luma = vec![255u8; w * h];
    for y in at.top..(at.top + at.side()).min(h) {
        for x in at.left..(at.left + at.side()).min(w) {
            let mx = (x - at.left) / at.module_px;
            let my = (y - at.top) / at.module_px;
            let i = my * at.n + mx;
            luma[y * w + x] = shade(x, y, i, bits[i]);
        }
    }
    luma
}

pub fn crisp(_x: usize, _y: usize, _i: usize, black: bool) -> u8 {
    if black { DARK } else { LIGHT }
}

pub fn frame(w: usize, h: usize, ts: u64, luma: Vec<u8>) -> Frame {
    Frame::new(w, h, Rotation::R0, ts, luma)
}

pub fn image(w: usize, luma: Vec<u8>) -> GrayImage {
    let h = luma.len() / w;
    GrayImage::from_raw(w as u32, h as u32, luma).expect("raster size")
}

/// Stand-in for a real decoder.
///
/// Finds the dark extent of the ROI, samples `n x n` module centres and
/// decodes only on an exact match. A code touching the ROI edge is not
/// located. With a strict band, any sample inside it fails the read.
pub struct Oracle {
    pub n: usize,
    pub expected: Vec<bool>,
    pub text: String,
    pub strict_band: Option<(u8, u8)>,
    pub calls: Arc<AtomicUsize>,
}

impl Oracle {
    pub fn new(n: usize, expected: Vec<bool>, text: &str) -> Self {
        Self {
            n,
            expected,
            text: text.to_string(),
            strict_band: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn strict(mut self, lo: u8, hi: u8) -> Self {
        self.strict_band = Some((lo, hi));
        self
    }
}

impl DecodePrimitive for Oracle {
    fn decode(&mut self, req: &DecodeRequest<'_>) -> Result<Option<PrimitiveHit>, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let roi = req.roi;
        let (w, h) = (roi.width() as usize, roi.height() as usize);
        let mut crop = Vec::with_capacity(w * h);
        for y in roi.top as usize..roi.bottom as usize {
            let start = y * req.width + roi.left as usize;
            crop.extend_from_slice(&req.pixels[start..start + w]);
        }
        let bits = BitMatrix::from_threshold(&crop, w, h, 128);
        let Some((x0, y0, x1, y1)) = bits.dark_bounds(0.0) else {
            return Ok(None);
        };
        if x0 == 0 || y0 == 0 || x1 == w || y1 == h {
            return Ok(None);
        }
        let n = self.n;
        let px = (x1 - x0) as f32 / n as f32;
        let py = (y1 - y0) as f32 / n as f32;
        let mut ok = true;
        for i in 0..n * n {
            let x = (x0 as f32 + ((i % n) as f32 + 0.5) * px) as usize;
            let y = (y0 as f32 + ((i / n) as f32 + 0.5) * py) as usize;
            let v = crop[y * w + x];
            if let Some((lo, hi)) = self.strict_band {
                if v > lo && v < hi {
                    ok = false;
                    break;
                }
            }
            if (v < 128) != self.expected[i] {
                ok = false;
                break;
            }
        }
        let bbox = RoiRect::new(
            roi.left + x0 as i32,
            roi.top + y0 as i32,
            roi.left + x1 as i32,
            roi.top + y1 as i32,
        );
        let text = if ok { self.text.clone() } else { "INVALID(Checksum)".to_string() };
        Ok(Some(PrimitiveHit::decoded(text, bbox, None)))
    }
}

/// Never finds anything; counts calls
#[derive(Clone, Default)]
pub struct NullDecoder {
    pub calls: Arc<AtomicUsize>,
}

impl DecodePrimitive for NullDecoder {
    fn decode(&mut self, _req: &DecodeRequest<'_>) -> Result<Option<PrimitiveHit>, DecodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

/// Assisted detector stand-in: outlines everything that is not paper white
#[derive(Clone, Default)]
pub struct ContentOutliner {
    pub calls: Arc<AtomicUsize>,
}

impl AssistedDetector for ContentOutliner {
    fn detect(&mut self, patch: &GrayImage) -> Result<Option<AssistHit>, AssistError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (w, h) = patch.dimensions();
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, p) in patch.enumerate_pixels() {
            if p[0] < 250 {
                bounds = Some(match bounds {
                    None => (x, y, x + 1, y + 1),
                    Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x + 1), y1.max(y + 1)),
                });
            }
        }
        let Some((x0, y0, x1, y1)) = bounds else {
            return Ok(None);
        };
        if x1 - x0 == w && y1 - y0 == h {
            return Ok(None);
        }
        let (x0, y0, x1, y1) = (x0 as f32, y0 as f32, x1 as f32, y1 as f32);
        Ok(Some(AssistHit {
            quad: Quad::new(Point::new(x0, y0), Point::new(x1, y0), Point::new(x1, y1), Point::new(x0, y1)),
            text: None,
        }))
    }
}
