//! # mapcast-core
//!
//! Plays a decoded video/audio stream onto surfaces that can only show a
//! small fixed palette and only accept rate-limited partial updates.
//!
//! This crate contains:
//! - **Palette**: `Palette` with exact and table-backed nearest-colour lookup
//! - **Dither**: `Quantizer` over the `Dither` family (error diffusion, ordered, random)
//! - **Tiles**: `TileDiffEncoder` hashing 16x16 tiles and emitting only changed ones
//! - **Sync**: `SyncEngine` pulling units onto drop-oldest queues, paced by the audio clock
//! - **Session**: `PlaybackSession` serializing start/pause/resume/seek/release
//! - **Render**: `TileRenderStep`, the quantize-diff-send video step
//! - **Synthetic**: in-process source, audio sink and transport
//! - **Error**: `MapcastError` and per-unit `StepError`

pub mod config;
pub mod dither;
pub mod error;
pub mod media;
pub mod palette;
pub mod render;
pub mod session;
pub mod source;
pub mod sync;
pub mod synthetic;
pub mod tiles;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use config::{DriftConfig, SyncConfig, TileConfig};
pub use dither::{Dither, ErrorDiffusion, Kernel, Quantizer, RandomThreshold, ThresholdMatrix};
pub use error::{ErrorHandler, FailureHandler, MapcastError, StepError};
pub use media::{AudioChunk, AudioMetadata, Frame, MediaUnit, StreamMetadata, VideoMetadata};
pub use palette::Palette;
pub use render::TileRenderStep;
pub use session::{PlaybackSession, PlaybackSessionBuilder, SessionState};
pub use source::{AudioSink, MediaSource, PatchTransport, SourceFactory, SourceOptions, SourceSpec};
pub use sync::{
    AudioChain, Chains, DriftController, DriftSampler, SessionStats, SyncEngine, VideoChain,
};
pub use tiles::{Patch, PatchBatch, TileDiffEncoder, WallLayout};
