//! RustQR Rescue - recovery-oriented QR scanning for live camera frames
//!
//! Wraps an opaque matrix-barcode decoder in a per-frame escalation engine:
//! ROI proposals from temporal history, quality-ranked patch caching,
//! image enhancement and multi-frame fusion, and module-level recovery
//! with beam search when nothing else reads the code.
//!
//! ```no_run
//! use rust_qr_rescue::{DecodeError, DecodeRequest, Frame, PrimitiveHit, Rotation, ScanPipeline};
//!
//! // Plug in a real decoder here; this one never finds anything.
//! let decoder = |_req: &DecodeRequest<'_>| -> Result<Option<PrimitiveHit>, DecodeError> { Ok(None) };
//! let mut pipeline = ScanPipeline::with_defaults(decoder);
//! let frame = Frame::new(640, 480, Rotation::R0, 0, vec![255; 640 * 480]);
//! let out = pipeline.process_frame(&frame).unwrap();
//! assert!(out.text.is_none());
//! ```

#![warn(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

/// Tuning knobs (JSON and environment overrides)
pub mod config;
/// Cooperative wall-clock deadlines
pub mod deadline;
/// Enhancement ladder and multi-frame fusion
pub mod enhance;
/// Error types
pub mod error;
/// Core data structures (frames, ROIs, grids, outputs)
pub mod models;
/// The per-frame scan orchestrator
pub mod pipeline;
/// Contracts for the host-supplied decoder and assisted detector
pub mod primitives;
/// Patch quality scoring and the frame cache
pub mod quality;
/// Module-level recovery with beam search
pub mod recovery;
/// ROI proposals from temporal history
pub mod roi_proposer;
/// Status and debug-frame side channels
pub mod telemetry;
/// Utility functions (binarization, filters, geometry, resizing)
pub mod utils;

pub use config::ScanConfig;
pub use error::{AssistError, DecodeError, RecoveryMiss, ScanError};
pub use models::{Frame, PrimitiveHit, Quad, RoiRect, Rotation, ScanOutput, ScanStage, TierSet};
pub use pipeline::ScanPipeline;
pub use primitives::{AssistHit, AssistedDetector, DecodePrimitive, DecodeRequest, Effort};
pub use telemetry::PipelineStats;
