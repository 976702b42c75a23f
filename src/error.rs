use thiserror::Error;

/// Errors returned to the caller of the scan pipeline
#[derive(Debug, Error)]
pub enum ScanError {
    /// The frame cannot be read at all
    #[error("unusable input frame: {reason}")]
    UnusableInput {
        /// What was wrong with the frame
        reason: String,
    },
    /// A JSON configuration could not be parsed
    #[error("invalid scan configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Failure reported by a decode primitive implementation.
///
/// Always absorbed per attempt; never reaches the caller.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The request could not be serviced (bad ROI, buffer mismatch, ...)
    #[error("decode request rejected: {0}")]
    Rejected(String),
    /// The primitive failed internally
    #[error("decoder failure: {0}")]
    Internal(String),
}

/// Failure reported by the assisted-detection collaborator
#[derive(Debug, Error)]
pub enum AssistError {
    /// The detector link is gone for the rest of the session
    #[error("assisted detection link failed")]
    LinkFailure,
    /// A one-off failure; the next call may succeed
    #[error("assisted detection failed: {0}")]
    Transient(String),
}

/// Why module recovery produced nothing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecoveryMiss {
    /// The wall-clock budget ran out
    #[error("recovery deadline exceeded")]
    DeadlineExceeded,
    /// The patch has no usable dark/light separation
    #[error("patch contrast too low")]
    NoContrast,
    /// No code extent could be located in the patch
    #[error("no code bounds in patch")]
    NoCodeBounds,
    /// No candidate grid size calibrated plausibly
    #[error("no grid size fits the patch")]
    NoGridFit,
    /// Every candidate was rendered and none decoded
    #[error("all recovery candidates exhausted")]
    Exhausted,
}
