//! Contracts for the external collaborators the core drives.
//!
//! - [`MediaSource`]: a decoder yielding frames and audio chunks
//! - [`SourceFactory`]: creates fresh sources so a session can reopen
//! - [`AudioSink`]: the audio device and master clock
//! - [`PatchTransport`]: delivers patch batches to targets

use std::sync::Arc;

use crate::error::MapcastError;
use crate::media::{AudioMetadata, MediaUnit, StreamMetadata};
use crate::tiles::{DEFAULT_MAX_PATCHES_PER_BATCH, Patch, PatchBatch};

// ── Sources ──────────────────────────────────────────────────────

/// Options passed to [`MediaSource::open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOptions {
    /// Request the smallest practical read-ahead and buffering.
    pub low_latency: bool,
    /// Position to start from, in milliseconds.
    pub start_offset_ms: u64,
    /// Deliver video frames.
    pub video: bool,
    /// Deliver audio chunks.
    pub audio: bool,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            low_latency: true,
            start_offset_ms: 0,
            video: true,
            audio: true,
        }
    }
}

/// A decoder that yields units one at a time.
///
/// Units are expected in presentation order within each kind.
pub trait MediaSource: Send {
    /// Open `resource`, returning its stream properties.
    fn open(
        &mut self,
        resource: &str,
        options: &SourceOptions,
    ) -> Result<StreamMetadata, MapcastError>;

    /// Next unit, or `None` at end of stream. May block.
    ///
    /// Timestamps are stream positions, so a source opened at an offset
    /// starts near that offset. A negative frame timestamp means unknown.
    fn grab(&mut self) -> Result<Option<MediaUnit>, MapcastError>;

    /// Metadata of the open stream, if any.
    fn metadata(&self) -> Option<StreamMetadata>;

    /// Release decoder resources. Closing twice is a no-op.
    fn close(&mut self);
}

/// Creates a new [`MediaSource`] for every (re)open.
pub trait SourceFactory: Send + Sync {
    fn create(&self) -> Box<dyn MediaSource>;
}

impl<F> SourceFactory for F
where
    F: Fn() -> Box<dyn MediaSource> + Send + Sync,
{
    fn create(&self) -> Box<dyn MediaSource> {
        self()
    }
}

/// A factory plus the resource it opens.
#[derive(Clone)]
pub struct SourceSpec {
    pub factory: Arc<dyn SourceFactory>,
    pub resource: String,
}

impl SourceSpec {
    pub fn new(factory: Arc<dyn SourceFactory>, resource: impl Into<String>) -> Self {
        Self {
            factory,
            resource: resource.into(),
        }
    }

    /// Create a source and open it with `options`.
    pub fn open(
        &self,
        options: &SourceOptions,
    ) -> Result<(Box<dyn MediaSource>, StreamMetadata), MapcastError> {
        let mut source = self.factory.create();
        let metadata = source.open(&self.resource, options)?;
        Ok((source, metadata))
    }
}

impl std::fmt::Debug for SourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSpec")
            .field("resource", &self.resource)
            .finish_non_exhaustive()
    }
}

// ── AudioSink ────────────────────────────────────────────────────

/// Audio output whose play position is the session's master clock.
///
/// Written from the audio worker and queried from the video worker, so
/// implementations synchronize internally.
pub trait AudioSink: Send + Sync {
    /// Prepare the device for `format`. Reopening resets the clock.
    fn open(&self, format: AudioMetadata) -> Result<(), MapcastError>;

    /// Queue interleaved 16-bit little-endian PCM. May block while the
    /// device buffer is full.
    fn write(&self, samples: &[u8]) -> Result<(), MapcastError>;

    /// Microseconds of audio played since `open`, `None` before playback
    /// starts.
    fn position_us(&self) -> Option<i64>;

    /// Discard buffered audio and stop the clock.
    fn stop(&self);

    /// Release the device. Closing twice is a no-op.
    fn close(&self);
}

// ── PatchTransport ───────────────────────────────────────────────

/// Delivers patches to output targets.
pub trait PatchTransport: Send + Sync {
    /// Send one batch. Batches never exceed [`max_patches_per_message`].
    ///
    /// [`max_patches_per_message`]: PatchTransport::max_patches_per_message
    fn send_batch(&self, batch: &PatchBatch) -> Result<(), MapcastError>;

    /// Blank a target by sending a full-surface zero patch.
    fn clear_target(&self, target_id: u32) -> Result<(), MapcastError> {
        self.send_batch(&PatchBatch {
            target_id,
            patches: vec![Patch::clear(target_id)],
        })
    }

    /// Upper bound on patches per batch this transport accepts.
    fn max_patches_per_message(&self) -> usize {
        DEFAULT_MAX_PATCHES_PER_BATCH
    }
}
