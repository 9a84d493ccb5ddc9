//! Tile-level change detection for palette-indexed targets.
//!
//! - [`layout`]: placement of a frame on a wall of targets
//! - [`diff`]: per-target hash state and dirty-patch emission
//! - [`patch`]: patch and batch types handed to the transport

pub mod diff;
pub mod layout;
pub mod patch;

pub use diff::{TileDelta, TileDiffEncoder, TileDiffState};
pub use layout::{Placement, WallLayout};
pub use patch::{Patch, PatchBatch};

/// Side length of one target surface in pixels.
pub const TARGET_SIZE: u32 = 128;
/// Side length of one tile in pixels.
pub const TILE_SIZE: u32 = 16;
/// Tiles along each side of a target.
pub const TILES_PER_SIDE: usize = (TARGET_SIZE / TILE_SIZE) as usize;
/// Tiles per target; one bit each in a dirty mask.
pub const TILES_PER_TARGET: usize = TILES_PER_SIDE * TILES_PER_SIDE;
/// Pixels in one target surface.
pub const TARGET_PIXELS: usize = (TARGET_SIZE * TARGET_SIZE) as usize;
/// RGB bytes hashed per tile.
pub const TILE_BYTES: usize = (TILE_SIZE * TILE_SIZE) as usize * 3;

/// Default upper bound on patches per transport message.
pub const DEFAULT_MAX_PATCHES_PER_BATCH: usize = 256;
