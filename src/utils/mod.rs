//! Pure image primitives used by the scan pipeline
//!
//! - Binarization (Otsu, adaptive local mean, Sauvola, morphological close)
//! - Filters (Laplacian, Sobel, blur/unsharp, equalization)
//! - Geometry (4-point perspective transform and warp)
//! - Integral images for windowed statistics
//! - Quiet-zone margins and white padding
//! - Resizing into the normalized patch

pub mod binarization;
pub mod filters;
pub mod geometry;
pub mod integral;
pub mod margins;
pub mod resize;
