//! Debug side channel: status strings, debug frames and counters.
//!
//! Everything here is copy-on-emit. Sinks receive owned values and the
//! channel sink never blocks the frame worker; if the consumer lags,
//! frames are dropped.

use crate::config::TelemetryConfig;
use crate::deadline::elapsed_at_least;
use image::GrayImage;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

/// An owned copy of an intermediate image
#[derive(Debug, Clone, PartialEq)]
pub struct DebugFrame {
    /// What the image shows (e.g. `"fused"`, `"recovered-21"`)
    pub label: String,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
    /// Row-major luma
    pub pixels: Vec<u8>,
}

impl DebugFrame {
    /// Copy a patch
    pub fn from_patch(label: impl Into<String>, patch: &GrayImage) -> Self {
        Self {
            label: label.into(),
            width: patch.width(),
            height: patch.height(),
            pixels: patch.as_raw().clone(),
        }
    }
}

/// Receives debug frames
pub trait DebugFrameSink {
    /// Take one frame; must not block
    fn emit(&mut self, frame: DebugFrame);
}

/// Receives short tier/stage strings
pub trait StatusSink {
    /// Take one status line
    fn status(&mut self, text: &str);
}

impl<F: FnMut(&str)> StatusSink for F {
    fn status(&mut self, text: &str) {
        self(text)
    }
}

/// Bounded, non-blocking channel sink
pub struct ChannelDebugSink {
    tx: SyncSender<DebugFrame>,
    dropped: u64,
}

impl ChannelDebugSink {
    /// Frames dropped because the consumer was behind
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl DebugFrameSink for ChannelDebugSink {
    fn emit(&mut self, frame: DebugFrame) {
        match self.tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => self.dropped += 1,
        }
    }
}

/// A sink/receiver pair holding at most `capacity` undelivered frames.
pub fn debug_channel(capacity: usize) -> (ChannelDebugSink, Receiver<DebugFrame>) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    (ChannelDebugSink { tx, dropped: 0 }, rx)
}

/// Counters over the life of a pipeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames processed
    pub frames: u64,
    /// Decode primitive calls at base effort
    pub base_attempts: u64,
    /// Decode primitive calls at boosted effort
    pub boosted_attempts: u64,
    /// Decode primitive calls on enhanced renderings
    pub enhancement_attempts: u64,
    /// Module recovery runs
    pub recovery_runs: u64,
    /// Fusions performed
    pub fusions: u64,
    /// Assisted detector calls
    pub assisted_calls: u64,
    /// Automatic forced-effort windows started
    pub auto_escalations: u64,
    /// Frames that produced decoded text
    pub decodes: u64,
}

/// Rate-limited fan-out to the optional sinks
pub(crate) struct Telemetry {
    config: TelemetryConfig,
    status_sink: Option<Box<dyn StatusSink + Send>>,
    debug_sink: Option<Box<dyn DebugFrameSink + Send>>,
    last_status: Option<(String, u64)>,
    last_debug_ms: Option<u64>,
}

impl Telemetry {
    pub(crate) fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            status_sink: None,
            debug_sink: None,
            last_status: None,
            last_debug_ms: None,
        }
    }

    pub(crate) fn set_status_sink(&mut self, sink: Box<dyn StatusSink + Send>) {
        self.status_sink = Some(sink);
    }

    pub(crate) fn set_debug_sink(&mut self, sink: Box<dyn DebugFrameSink + Send>) {
        self.debug_sink = Some(sink);
    }

    /// Forward `text` unless it repeats the previous line too soon
    pub(crate) fn status(&mut self, now_ms: u64, text: &str) {
        let Some(sink) = self.status_sink.as_mut() else {
            return;
        };
        if let Some((last, at)) = &self.last_status {
            if last == text && !elapsed_at_least(Some(*at), now_ms, self.config.status_repeat_ms) {
                return;
            }
        }
        sink.status(text);
        self.last_status = Some((text.to_string(), now_ms));
    }

    /// True when a debug frame would be accepted now
    pub(crate) fn wants_debug(&self, now_ms: u64) -> bool {
        self.debug_sink.is_some()
            && elapsed_at_least(self.last_debug_ms, now_ms, self.config.debug_frame_interval_ms)
    }

    /// Copy `patch` to the debug sink if the rate limit allows
    pub(crate) fn debug(&mut self, now_ms: u64, label: &str, patch: &GrayImage) {
        if !self.wants_debug(now_ms) {
            return;
        }
        if let Some(sink) = self.debug_sink.as_mut() {
            sink.emit(DebugFrame::from_patch(label, patch));
            self.last_debug_ms = Some(now_ms);
        }
    }

    pub(crate) fn reset(&mut self) {
        self.last_status = None;
        self.last_debug_ms = None;
    }
}
