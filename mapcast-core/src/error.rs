//! Domain-specific error types for the mapcast core.
//!
//! Session-level operations return `Result<T, MapcastError>`. Work done on
//! a single frame or audio chunk inside a pipeline step returns
//! `Result<(), StepError>`; those errors are reported to an
//! [`ErrorHandler`] and never stop playback.

use std::sync::Arc;

use thiserror::Error;

/// The canonical error type for the mapcast core.
#[derive(Debug, Error)]
pub enum MapcastError {
    // ── Source Errors ────────────────────────────────────────────
    /// The decoder could not open the requested resource.
    #[error("failed to open source {resource}: {reason}")]
    SourceOpen { resource: String, reason: String },

    /// The decoder failed while pulling the next unit.
    #[error("decode error: {0}")]
    Decode(String),

    /// Fatal playback failure surfaced once per session.
    #[error("playback failed: {0}")]
    Playback(String),

    // ── Configuration Errors ─────────────────────────────────────
    /// A configuration value was rejected at construction time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A palette was empty or had more entries than a byte can index.
    #[error("invalid palette: {0}")]
    InvalidPalette(String),

    /// A pixel buffer did not have the length its dimensions imply.
    #[error("buffer size mismatch: expected {expected} pixels, got {actual}")]
    BufferMismatch { expected: usize, actual: usize },

    /// Width or height was zero, or the buffer is not a whole number of rows.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),

    // ── Collaborator Errors ──────────────────────────────────────
    /// The audio output sink rejected an operation.
    #[error("audio sink error: {0}")]
    Sink(String),

    /// The output transport rejected a patch batch.
    #[error("transport error: {0}")]
    Transport(String),

    /// A worker queue was closed while submitting.
    #[error("channel closed")]
    ChannelClosed,

    /// An OS thread could not be spawned.
    #[error("thread spawn failed: {0}")]
    Spawn(#[from] std::io::Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── StepError ────────────────────────────────────────────────────

/// Error raised by a pipeline step while processing one unit.
///
/// Recovered at the worker level: the unit is dropped and the worker moves
/// on to the next one.
#[derive(Debug, Error)]
pub enum StepError {
    /// Generic step failure with a human-readable message.
    #[error("step failed: {0}")]
    Failed(String),

    /// Quantization or tile diffing rejected the frame.
    #[error("quantize error: {0}")]
    Quantize(#[from] MapcastError),

    /// The transport refused a patch batch for this frame.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Callback receiving every per-unit error swallowed by a worker.
///
/// The first argument names the chain ("video" or "audio").
pub type ErrorHandler = Arc<dyn Fn(&str, &StepError) + Send + Sync>;

/// Callback receiving the single fatal failure of a session.
pub type FailureHandler = Arc<dyn Fn(&MapcastError) + Send + Sync>;

/// Handler that logs swallowed step errors at `warn`.
pub fn logging_error_handler() -> ErrorHandler {
    Arc::new(|chain, err| {
        tracing::warn!(chain, "dropped unit: {err}");
    })
}

/// Handler that logs the fatal session failure at `error`.
pub fn logging_failure_handler() -> FailureHandler {
    Arc::new(|err| {
        tracing::error!("playback session failed: {err}");
    })
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for MapcastError {
    fn from(s: String) -> Self {
        MapcastError::Other(s)
    }
}

impl From<&str> for MapcastError {
    fn from(s: &str) -> Self {
        MapcastError::Other(s.to_string())
    }
}

impl From<&str> for StepError {
    fn from(s: &str) -> Self {
        StepError::Failed(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let e = MapcastError::BufferMismatch {
            expected: 16384,
            actual: 100,
        };
        assert!(e.to_string().contains("16384"));
        assert!(e.to_string().contains("100"));

        let e = MapcastError::SourceOpen {
            resource: "test://bars".into(),
            reason: "no such stream".into(),
        };
        assert!(e.to_string().contains("test://bars"));
    }

    #[test]
    fn from_string() {
        let e: MapcastError = "something broke".into();
        assert!(matches!(e, MapcastError::Other(_)));
    }

    #[test]
    fn step_error_wraps_core_error() {
        let e: StepError = MapcastError::InvalidDimensions("zero width".into()).into();
        assert!(matches!(e, StepError::Quantize(_)));
        assert!(e.to_string().contains("zero width"));
    }
}
