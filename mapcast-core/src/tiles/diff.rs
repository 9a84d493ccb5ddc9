//! Per-target tile hashing and dirty-patch emission.
//!
//! Each 128×128 target is divided into an 8×8 grid of 16×16 tiles. For
//! every frame the RGB bytes of each tile are hashed and compared with the
//! hash stored for that tile; tiles whose hash changed are marked dirty
//! and only those are quantized into patches. A frame with no dirty tile
//! costs nothing beyond hashing.

use std::collections::HashMap;

use crate::dither::Quantizer;
use crate::error::MapcastError;
use crate::media::{Frame, unpack_rgb};

use super::layout::{Placement, WallLayout};
use super::patch::{Patch, PatchBatch};
use super::{TARGET_PIXELS, TARGET_SIZE, TILE_BYTES, TILE_SIZE, TILES_PER_SIDE, TILES_PER_TARGET};

/// 64-bit content hash of a tile's RGB bytes.
#[inline]
fn tile_hash(bytes: &[u8]) -> u64 {
    let digest = blake3::hash(bytes);
    let mut word = [0u8; 8];
    word.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(word)
}

// ── TileDiffState ────────────────────────────────────────────────

/// Stored tile hashes for one target.
#[derive(Debug, Clone)]
pub struct TileDiffState {
    hashes: [u64; TILES_PER_TARGET],
    /// Dirty bits computed for the most recent frame only.
    dirty: u64,
    /// `false` until the first frame has been hashed.
    initialized: bool,
}

impl Default for TileDiffState {
    fn default() -> Self {
        Self {
            hashes: [0; TILES_PER_TARGET],
            dirty: 0,
            initialized: false,
        }
    }
}

impl TileDiffState {
    pub fn dirty(&self) -> u64 {
        self.dirty
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn hashes(&self) -> &[u64; TILES_PER_TARGET] {
        &self.hashes
    }

    /// Rehash all tiles, updating stored hashes in place.
    ///
    /// `fill` writes the RGB bytes of the given tile into the scratch
    /// buffer. On the first call every tile is dirty.
    fn update(&mut self, scratch: &mut [u8; TILE_BYTES], mut fill: impl FnMut(usize, &mut [u8])) {
        let mut dirty = 0u64;
        for tile in 0..TILES_PER_TARGET {
            fill(tile, scratch.as_mut_slice());
            let h = tile_hash(scratch.as_slice());
            if !self.initialized || self.hashes[tile] != h {
                self.hashes[tile] = h;
                dirty |= 1 << tile;
            }
        }
        self.initialized = true;
        self.dirty = dirty;
    }
}

// ── TileDelta ────────────────────────────────────────────────────

/// Output of one [`TileDiffEncoder::encode_frame`] call.
#[derive(Debug, Clone, Default)]
pub struct TileDelta {
    /// Patch batches grouped by target, targets ascending.
    pub batches: Vec<PatchBatch>,
    /// `true` when the frame did not match the configured resolution and
    /// every tile was sent without diffing.
    pub fallback: bool,
}

impl TileDelta {
    /// Total patches across all batches.
    pub fn patch_count(&self) -> usize {
        self.batches.iter().map(PatchBatch::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

// ── TileDiffEncoder ──────────────────────────────────────────────

/// Owns the tile hash state of every target on one wall.
///
/// State is created lazily per target and is only ever touched by the
/// thread that owns the encoder.
pub struct TileDiffEncoder {
    layout: WallLayout,
    max_patches_per_batch: usize,
    states: HashMap<u32, TileDiffState>,
    scratch: Box<[u8; TILE_BYTES]>,
}

impl TileDiffEncoder {
    pub fn new(layout: WallLayout, max_patches_per_batch: usize) -> Result<Self, MapcastError> {
        if max_patches_per_batch == 0 {
            return Err(MapcastError::InvalidConfig(
                "max_patches_per_batch must be > 0".into(),
            ));
        }
        Ok(Self {
            layout,
            max_patches_per_batch,
            states: HashMap::new(),
            scratch: Box::new([0; TILE_BYTES]),
        })
    }

    pub fn layout(&self) -> &WallLayout {
        &self.layout
    }

    /// Number of targets that currently hold state.
    pub fn tracked_targets(&self) -> usize {
        self.states.len()
    }

    /// Dirty mask computed for `target_id` on the most recent frame.
    pub fn dirty_mask(&self, target_id: u32) -> Option<u64> {
        self.states.get(&target_id).map(TileDiffState::dirty)
    }

    /// Diff a raw 128×128 target buffer against the stored hashes.
    ///
    /// Returns the 64-bit dirty mask; bit `i` is tile `i` in row-major
    /// tile order.
    pub fn compute_dirty_tiles(
        &mut self,
        target_id: u32,
        pixels: &[u32],
    ) -> Result<u64, MapcastError> {
        if pixels.len() != TARGET_PIXELS {
            return Err(MapcastError::BufferMismatch {
                expected: TARGET_PIXELS,
                actual: pixels.len(),
            });
        }
        let state = self.states.entry(target_id).or_default();
        state.update(&mut self.scratch, |tile, buf| {
            let (x0, y0) = Placement::tile_origin(0, 0, tile);
            let mut i = 0;
            for y in y0..y0 + TILE_SIZE {
                let row = y as usize * TARGET_SIZE as usize;
                for x in x0..x0 + TILE_SIZE {
                    let (r, g, b) = unpack_rgb(pixels[row + x as usize]);
                    buf[i] = r;
                    buf[i + 1] = g;
                    buf[i + 2] = b;
                    i += 3;
                }
            }
        });
        Ok(state.dirty)
    }

    /// Diff `frame` against every target on the wall and build patches for
    /// the tiles that changed.
    ///
    /// The frame is quantized at most once and only if some tile is dirty.
    /// A frame whose size differs from the configured resolution is
    /// centred as-is and sent in full.
    pub fn encode_frame(
        &mut self,
        frame: &Frame,
        quantizer: &Quantizer,
    ) -> Result<TileDelta, MapcastError> {
        let fallback = !self.layout.matches(frame);
        let placement = self.layout.placement(frame.width(), frame.height());
        let pixels = frame.pixels();

        let mut masks = Vec::with_capacity(self.layout.target_count());
        let mut any_dirty = false;
        for ty in 0..self.layout.targets_high() {
            for tx in 0..self.layout.targets_wide() {
                let id = self.layout.target_id(tx, ty);
                let state = self.states.entry(id).or_default();
                state.update(&mut self.scratch, |tile, buf| {
                    let (x0, y0) = Placement::tile_origin(tx, ty, tile);
                    let mut i = 0;
                    for y in y0..y0 + TILE_SIZE {
                        for x in x0..x0 + TILE_SIZE {
                            let rgb = placement.frame_index(x, y).map_or(0, |j| pixels[j]);
                            let (r, g, b) = unpack_rgb(rgb);
                            buf[i] = r;
                            buf[i + 1] = g;
                            buf[i + 2] = b;
                            i += 3;
                        }
                    }
                });
                let mask = if fallback { u64::MAX } else { state.dirty };
                any_dirty |= mask != 0;
                masks.push((id, tx, ty, mask));
            }
        }

        if !any_dirty {
            return Ok(TileDelta {
                batches: Vec::new(),
                fallback,
            });
        }

        let indices = quantizer.quantize_frame(frame)?;
        let black = quantizer.palette().nearest(0, 0, 0);

        let mut batches = Vec::new();
        for (id, tx, ty, mask) in masks {
            if mask == 0 {
                continue;
            }
            let mut patches = Vec::with_capacity(mask.count_ones() as usize);
            for tile in (0..TILES_PER_TARGET).filter(|&t| mask & (1 << t) != 0) {
                let (x0, y0) = Placement::tile_origin(tx, ty, tile);
                let mut payload = Vec::with_capacity((TILE_SIZE * TILE_SIZE) as usize);
                for y in y0..y0 + TILE_SIZE {
                    for x in x0..x0 + TILE_SIZE {
                        payload.push(placement.frame_index(x, y).map_or(black, |j| indices[j]));
                    }
                }
                patches.push(Patch {
                    target_id: id,
                    x: (tile % TILES_PER_SIDE) as u32 * TILE_SIZE,
                    y: (tile / TILES_PER_SIDE) as u32 * TILE_SIZE,
                    width: TILE_SIZE,
                    height: TILE_SIZE,
                    payload,
                });
            }
            batches.extend(PatchBatch::split(id, patches, self.max_patches_per_batch));
        }

        Ok(TileDelta { batches, fallback })
    }

    /// Drop the stored state of one target. Returns whether it existed.
    pub fn release_target(&mut self, target_id: u32) -> bool {
        self.states.remove(&target_id).is_some()
    }

    /// Drop all stored state, returning the ids that held any, ascending.
    pub fn release(&mut self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.states.drain().map(|(id, _)| id).collect();
        ids.sort_unstable();
        ids
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::palette::Palette;

    fn quantizer() -> Quantizer {
        Quantizer::nearest(Arc::new(Palette::grayscale(4).unwrap()))
    }

    #[test]
    fn first_frame_is_fully_dirty_even_when_black() {
        let mut enc = TileDiffEncoder::new(WallLayout::single(0), 256).unwrap();
        let black = vec![0u32; TARGET_PIXELS];
        assert_eq!(enc.compute_dirty_tiles(0, &black).unwrap(), u64::MAX);
    }

    #[test]
    fn unchanged_frame_is_clean() {
        let mut enc = TileDiffEncoder::new(WallLayout::single(0), 256).unwrap();
        let pixels: Vec<u32> = (0..TARGET_PIXELS as u32).collect();
        enc.compute_dirty_tiles(0, &pixels).unwrap();
        assert_eq!(enc.compute_dirty_tiles(0, &pixels).unwrap(), 0);
        assert_eq!(enc.dirty_mask(0), Some(0));
    }

    #[test]
    fn single_pixel_change_marks_one_tile() {
        let mut enc = TileDiffEncoder::new(WallLayout::single(0), 256).unwrap();
        let mut pixels = vec![0u32; TARGET_PIXELS];
        enc.compute_dirty_tiles(0, &pixels).unwrap();
        // (40, 20) is in tile column 2, row 1.
        pixels[20 * 128 + 40] = 0xFFFFFF;
        assert_eq!(enc.compute_dirty_tiles(0, &pixels).unwrap(), 1 << 10);
    }

    #[test]
    fn targets_are_independent() {
        let mut enc = TileDiffEncoder::new(WallLayout::single(0), 256).unwrap();
        let pixels = vec![0u32; TARGET_PIXELS];
        enc.compute_dirty_tiles(1, &pixels).unwrap();
        assert_eq!(enc.compute_dirty_tiles(2, &pixels).unwrap(), u64::MAX);
        assert_eq!(enc.tracked_targets(), 2);
    }

    #[test]
    fn rejects_wrong_target_buffer() {
        let mut enc = TileDiffEncoder::new(WallLayout::single(0), 256).unwrap();
        assert!(matches!(
            enc.compute_dirty_tiles(0, &[0; 100]),
            Err(MapcastError::BufferMismatch { .. })
        ));
    }

    #[test]
    fn release_resets_state() {
        let mut enc = TileDiffEncoder::new(WallLayout::single(0), 256).unwrap();
        let pixels = vec![0u32; TARGET_PIXELS];
        enc.compute_dirty_tiles(0, &pixels).unwrap();
        assert!(enc.release_target(0));
        assert!(!enc.release_target(0));
        assert_eq!(enc.compute_dirty_tiles(0, &pixels).unwrap(), u64::MAX);
        assert_eq!(enc.release(), vec![0]);
        assert_eq!(enc.tracked_targets(), 0);
    }

    #[test]
    fn encode_skips_static_frames() {
        let mut enc = TileDiffEncoder::new(WallLayout::single(7), 256).unwrap();
        let q = quantizer();
        let frame = Frame::solid(128, 128, 0xFFFFFF, 0);
        let first = enc.encode_frame(&frame, &q).unwrap();
        assert_eq!(first.patch_count(), 64);
        assert!(first.batches.iter().all(|b| b.target_id == 7));
        assert!(first.batches[0].patches[0].payload.iter().all(|&i| i == 3));
        assert!(enc.encode_frame(&frame, &q).unwrap().is_empty());
    }

    #[test]
    fn patches_ascend_and_respect_batch_size() {
        let mut enc = TileDiffEncoder::new(WallLayout::single(0), 10).unwrap();
        let delta = enc.encode_frame(&Frame::solid(128, 128, 0, 0), &quantizer()).unwrap();
        assert_eq!(delta.batches.len(), 7);
        assert!(delta.batches.iter().all(|b| b.len() <= 10));
        let origins: Vec<(u32, u32)> = delta
            .batches
            .iter()
            .flat_map(|b| b.patches.iter().map(|p| (p.y, p.x)))
            .collect();
        let mut sorted = origins.clone();
        sorted.sort();
        assert_eq!(origins, sorted);
    }

    #[test]
    fn wall_frame_is_split_across_targets() {
        let layout = WallLayout::new(2, 1, 100, 256, 128).unwrap();
        let mut enc = TileDiffEncoder::new(layout, 256).unwrap();
        let q = quantizer();
        let mut frame = Frame::solid(256, 128, 0, 0);
        enc.encode_frame(&frame, &q).unwrap();

        // Right half, first tile of target 101.
        frame.fill_rect(128, 0, 16, 16, 0xFFFFFF);
        let delta = enc.encode_frame(&frame, &q).unwrap();
        assert_eq!(delta.patch_count(), 1);
        let patch = &delta.batches[0].patches[0];
        assert_eq!((patch.target_id, patch.x, patch.y), (101, 0, 0));
    }

    #[test]
    fn centred_video_pads_with_black() {
        let layout = WallLayout::new(1, 1, 0, 96, 96).unwrap();
        let mut enc = TileDiffEncoder::new(layout, 256).unwrap();
        let delta = enc
            .encode_frame(&Frame::solid(96, 96, 0xFFFFFF, 0), &quantizer())
            .unwrap();
        // Offset is 16 on both axes, so tile 0 is entirely padding.
        let first = &delta.batches[0].patches[0];
        assert!(first.payload.iter().all(|&i| i == 0));
        let inner = &delta.batches[0].patches[9];
        assert!(inner.payload.iter().all(|&i| i == 3));
    }

    #[test]
    fn mismatched_frame_takes_fallback() {
        let mut enc = TileDiffEncoder::new(WallLayout::single(0), 256).unwrap();
        let q = quantizer();
        let small = Frame::solid(64, 64, 0, 0);
        let first = enc.encode_frame(&small, &q).unwrap();
        assert!(first.fallback);
        assert_eq!(first.patch_count(), 64);
        // Still sent in full even though nothing changed.
        assert_eq!(enc.encode_frame(&small, &q).unwrap().patch_count(), 64);
    }
}
