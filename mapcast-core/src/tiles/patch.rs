//! Patches and size-bounded patch batches.

use super::TARGET_SIZE;

/// A rectangular region of quantized indices for one target.
///
/// Origin is relative to the target's top-left corner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub target_id: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Row-major palette indices, `width * height` bytes.
    pub payload: Vec<u8>,
}

impl Patch {
    /// A full-surface patch of index 0 that blanks `target_id`.
    pub fn clear(target_id: u32) -> Self {
        Self {
            target_id,
            x: 0,
            y: 0,
            width: TARGET_SIZE,
            height: TARGET_SIZE,
            payload: vec![0; (TARGET_SIZE * TARGET_SIZE) as usize],
        }
    }

    /// Number of pixels covered.
    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Patches for a single target, at most `max_patches_per_batch` long.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchBatch {
    pub target_id: u32,
    pub patches: Vec<Patch>,
}

impl PatchBatch {
    /// Split `patches` into consecutive batches of at most `max` entries.
    ///
    /// Order is preserved. `max` of zero is treated as one.
    pub fn split(target_id: u32, patches: Vec<Patch>, max: usize) -> Vec<PatchBatch> {
        let max = max.max(1);
        if patches.len() <= max {
            if patches.is_empty() {
                return Vec::new();
            }
            return vec![PatchBatch { target_id, patches }];
        }
        let mut out = Vec::with_capacity(patches.len().div_ceil(max));
        let mut iter = patches.into_iter().peekable();
        while iter.peek().is_some() {
            out.push(PatchBatch {
                target_id,
                patches: iter.by_ref().take(max).collect(),
            });
        }
        out
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}
