use super::{Point, RoiRect};
use crate::error::ScanError;

/// Sensor-to-display rotation reported by the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum Rotation {
    /// No rotation
    #[default]
    R0,
    /// 90 degrees clockwise
    R90,
    /// 180 degrees
    R180,
    /// 270 degrees clockwise
    R270,
}

impl Rotation {
    /// Normalize any degree value (negative allowed) to a quarter turn.
    ///
    /// Returns `None` for values that are not a multiple of 90.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees.rem_euclid(360) {
            0 => Some(Self::R0),
            90 => Some(Self::R90),
            180 => Some(Self::R180),
            270 => Some(Self::R270),
            _ => None,
        }
    }

    /// Rotation in degrees
    pub fn degrees(self) -> i32 {
        match self {
            Self::R0 => 0,
            Self::R90 => 90,
            Self::R180 => 180,
            Self::R270 => 270,
        }
    }

    /// Map a point from the sensor frame (`width` x `height`) into the
    /// upright frame the user sees.
    pub fn map_to_upright(self, p: Point, width: usize, height: usize) -> Point {
        let (w, h) = (width as f32, height as f32);
        match self {
            Self::R0 => p,
            Self::R90 => Point::new(h - 1.0 - p.y, p.x),
            Self::R180 => Point::new(w - 1.0 - p.x, h - 1.0 - p.y),
            Self::R270 => Point::new(p.y, w - 1.0 - p.x),
        }
    }
}

/// One camera frame: single-channel row-major luma
#[derive(Debug, Clone)]
pub struct Frame {
    /// Width in pixels
    pub width: usize,
    /// Height in pixels
    pub height: usize,
    /// Sensor rotation
    pub rotation: Rotation,
    /// Monotonic capture time in milliseconds
    pub timestamp_ms: u64,
    /// Luma plane, at least `width * height` bytes
    pub luma: Vec<u8>,
    /// Stable crop rectangle the host applied, echoed back in the output
    pub crop: Option<RoiRect>,
}

impl Frame {
    /// Create a frame with no crop metadata
    pub fn new(width: usize, height: usize, rotation: Rotation, timestamp_ms: u64, luma: Vec<u8>) -> Self {
        Self {
            width,
            height,
            rotation,
            timestamp_ms,
            luma,
            crop: None,
        }
    }

    /// Attach the host's crop rectangle
    pub fn with_crop(mut self, crop: RoiRect) -> Self {
        self.crop = Some(crop);
        self
    }

    /// Reject frames the pipeline cannot read
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.width == 0 || self.height == 0 {
            return Err(ScanError::UnusableInput {
                reason: format!("zero-sized frame {}x{}", self.width, self.height),
            });
        }
        let expected = self.width.checked_mul(self.height).ok_or_else(|| ScanError::UnusableInput {
            reason: "frame dimensions overflow".to_string(),
        })?;
        if self.luma.len() < expected {
            return Err(ScanError::UnusableInput {
                reason: format!("luma buffer has {} bytes, expected {}", self.luma.len(), expected),
            });
        }
        Ok(())
    }

    /// Frame area in pixels
    pub fn area(&self) -> usize {
        self.width * self.height
    }
}
