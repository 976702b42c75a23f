//! Collaborator contracts the pipeline consumes.
//!
//! The decode primitive and the assisted detector are supplied by the host.
//! Both are called synchronously from the frame worker; neither is ever
//! called concurrently with itself.

use crate::error::{AssistError, DecodeError};
use crate::models::{PrimitiveHit, Quad, RoiRect, Rotation};
use image::GrayImage;

/// How hard the decode primitive should try
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effort {
    /// Fast single pass
    Base,
    /// Slower search (more binarizers, rotations, inverted codes)
    Boosted,
}

/// One decode attempt over a pixel buffer.
///
/// `roi` is always non-empty and lies inside `width x height`.
#[derive(Debug, Clone, Copy)]
pub struct DecodeRequest<'a> {
    /// Row-major 8-bit luma
    pub pixels: &'a [u8],
    /// Buffer width
    pub width: usize,
    /// Buffer height
    pub height: usize,
    /// Sensor rotation of the buffer
    pub rotation: Rotation,
    /// Region to search
    pub roi: RoiRect,
    /// Effort flag
    pub effort: Effort,
}

impl<'a> DecodeRequest<'a> {
    /// Request over a whole normalized patch (already upright)
    pub fn for_patch(patch: &'a GrayImage, effort: Effort) -> Self {
        let (w, h) = (patch.width() as usize, patch.height() as usize);
        Self {
            pixels: patch.as_raw(),
            width: w,
            height: h,
            rotation: Rotation::R0,
            roi: RoiRect::full(w, h),
            effort,
        }
    }
}

/// The opaque matrix-barcode decoder.
///
/// Returns `Ok(None)` when nothing was located, a hit with decoded text,
/// a hit whose text starts with [`INVALID_PREFIX`](crate::models::INVALID_PREFIX)
/// for checksum/format failures, or a box-only hit. Coordinates are in the
/// request's buffer space.
pub trait DecodePrimitive {
    /// Run one attempt
    fn decode(&mut self, req: &DecodeRequest<'_>) -> Result<Option<PrimitiveHit>, DecodeError>;
}

impl<F> DecodePrimitive for F
where
    F: FnMut(&DecodeRequest<'_>) -> Result<Option<PrimitiveHit>, DecodeError>,
{
    fn decode(&mut self, req: &DecodeRequest<'_>) -> Result<Option<PrimitiveHit>, DecodeError> {
        self(req)
    }
}

/// Result of an assisted detection on a normalized patch
#[derive(Debug, Clone, PartialEq)]
pub struct AssistHit {
    /// Code outline in patch coordinates
    pub quad: Quad,
    /// Text, when the detector also decoded it
    pub text: Option<String>,
}

/// An optional heavier detector (e.g. a learned model behind an IPC link).
///
/// Returning [`AssistError::LinkFailure`] disables the detector for the
/// rest of the session.
pub trait AssistedDetector {
    /// Locate (and possibly decode) a code in a patch
    fn detect(&mut self, patch: &GrayImage) -> Result<Option<AssistHit>, AssistError>;
}
