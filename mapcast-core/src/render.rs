//! The terminal video step: quantize, diff and send patches.

use std::sync::Arc;

use crate::config::TileConfig;
use crate::dither::Quantizer;
use crate::error::{MapcastError, StepError};
use crate::media::{Frame, StreamMetadata};
use crate::source::PatchTransport;
use crate::sync::{PlaybackCounters, VideoStep};
use crate::tiles::{TileDelta, TileDiffEncoder, WallLayout};

/// Turns each frame into patches for the targets of one wall.
///
/// Owns the tile state of those targets; it lives on the video worker.
pub struct TileRenderStep {
    quantizer: Quantizer,
    encoder: TileDiffEncoder,
    transport: Arc<dyn PatchTransport>,
    counters: Option<Arc<PlaybackCounters>>,
}

impl TileRenderStep {
    /// Build from a tile configuration.
    ///
    /// The batch size is the smaller of the configured one and what the
    /// transport accepts.
    pub fn new(
        quantizer: Quantizer,
        config: &TileConfig,
        transport: Arc<dyn PatchTransport>,
    ) -> Result<Self, MapcastError> {
        config.validate()?;
        let layout = WallLayout::from_config(config)?;
        let batch = config
            .max_patches_per_batch
            .min(transport.max_patches_per_message());
        Ok(Self {
            quantizer,
            encoder: TileDiffEncoder::new(layout, batch)?,
            transport,
            counters: None,
        })
    }

    /// Count emitted patches into `counters`.
    pub fn with_counters(mut self, counters: Arc<PlaybackCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    pub fn encoder(&self) -> &TileDiffEncoder {
        &self.encoder
    }

    pub fn quantizer(&self) -> &Quantizer {
        &self.quantizer
    }

    /// Diff and send one frame, returning what was sent.
    pub fn render(&mut self, frame: &Frame) -> Result<TileDelta, StepError> {
        let delta = self.encoder.encode_frame(frame, &self.quantizer)?;
        if delta.fallback {
            tracing::debug!(
                width = frame.width(),
                height = frame.height(),
                "frame size differs from configured video; sending in full"
            );
        }
        for batch in &delta.batches {
            self.transport
                .send_batch(batch)
                .map_err(|e| StepError::Transport(e.to_string()))?;
            if let Some(c) = &self.counters {
                c.record_patches(batch.len());
            }
        }
        Ok(delta)
    }
}

impl VideoStep for TileRenderStep {
    fn process(&mut self, frame: &mut Frame, _metadata: &StreamMetadata) -> Result<(), StepError> {
        self.render(frame).map(|_| ())
    }

    /// Blank every target on the wall and forget all tile state.
    fn release(&mut self) -> Result<(), MapcastError> {
        let mut first = Ok(());
        for id in self.encoder.layout().target_ids() {
            if let Err(e) = self.transport.clear_target(id) {
                tracing::warn!(target_id = id, "failed to clear target: {e}");
                if first.is_ok() {
                    first = Err(e);
                }
            }
        }
        let dropped = self.encoder.release();
        tracing::debug!(targets = dropped.len(), "tile state released");
        first
    }
}
