//! Placement of a video frame on a grid of fixed-size targets.

use crate::config::TileConfig;
use crate::error::MapcastError;
use crate::media::Frame;

use super::{TARGET_SIZE, TILE_SIZE, TILES_PER_SIDE};

/// A `targets_wide × targets_high` wall of 128×128 targets.
///
/// Target ids are assigned row-major starting at `first_target_id`. The
/// configured video resolution is centred on the wall; pixels of the wall
/// not covered by the frame read as black.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallLayout {
    targets_wide: u32,
    targets_high: u32,
    first_target_id: u32,
    video_width: u32,
    video_height: u32,
}

impl WallLayout {
    pub fn new(
        targets_wide: u32,
        targets_high: u32,
        first_target_id: u32,
        video_width: u32,
        video_height: u32,
    ) -> Result<Self, MapcastError> {
        if targets_wide == 0 || targets_high == 0 {
            return Err(MapcastError::InvalidConfig(format!(
                "target grid must be non-empty, got {targets_wide}x{targets_high}"
            )));
        }
        if video_width == 0 || video_height == 0 {
            return Err(MapcastError::InvalidConfig(format!(
                "video resolution must be non-empty, got {video_width}x{video_height}"
            )));
        }
        let (wall_w, wall_h) = (targets_wide * TARGET_SIZE, targets_high * TARGET_SIZE);
        if video_width > wall_w || video_height > wall_h {
            return Err(MapcastError::InvalidConfig(format!(
                "video {video_width}x{video_height} does not fit a {wall_w}x{wall_h} wall"
            )));
        }
        first_target_id
            .checked_add(targets_wide * targets_high - 1)
            .ok_or_else(|| MapcastError::InvalidConfig("target ids overflow u32".into()))?;
        Ok(Self {
            targets_wide,
            targets_high,
            first_target_id,
            video_width,
            video_height,
        })
    }

    /// A single target showing a 128×128 video.
    pub fn single(target_id: u32) -> Self {
        Self {
            targets_wide: 1,
            targets_high: 1,
            first_target_id: target_id,
            video_width: TARGET_SIZE,
            video_height: TARGET_SIZE,
        }
    }

    pub fn from_config(config: &TileConfig) -> Result<Self, MapcastError> {
        Self::new(
            config.targets_wide,
            config.targets_high,
            config.first_target_id,
            config.video_width,
            config.video_height,
        )
    }

    pub fn targets_wide(&self) -> u32 {
        self.targets_wide
    }

    pub fn targets_high(&self) -> u32 {
        self.targets_high
    }

    pub fn target_count(&self) -> usize {
        (self.targets_wide * self.targets_high) as usize
    }

    pub fn video_width(&self) -> u32 {
        self.video_width
    }

    pub fn video_height(&self) -> u32 {
        self.video_height
    }

    pub fn wall_width(&self) -> u32 {
        self.targets_wide * TARGET_SIZE
    }

    pub fn wall_height(&self) -> u32 {
        self.targets_high * TARGET_SIZE
    }

    /// Whether `frame` has exactly the configured video resolution.
    pub fn matches(&self, frame: &Frame) -> bool {
        frame.width() == self.video_width && frame.height() == self.video_height
    }

    /// Id of the target at grid column `tx`, row `ty`.
    pub fn target_id(&self, tx: u32, ty: u32) -> u32 {
        self.first_target_id + ty * self.targets_wide + tx
    }

    /// Grid position of `target_id`, or `None` if it is not on this wall.
    pub fn position_of(&self, target_id: u32) -> Option<(u32, u32)> {
        let rel = target_id.checked_sub(self.first_target_id)?;
        if rel as usize >= self.target_count() {
            return None;
        }
        Some((rel % self.targets_wide, rel / self.targets_wide))
    }

    /// All target ids in ascending order.
    pub fn target_ids(&self) -> impl Iterator<Item = u32> + use<> {
        let first = self.first_target_id;
        (0..self.targets_wide * self.targets_high).map(move |i| first + i)
    }

    /// Placement of a `width × height` frame centred on the wall.
    pub fn placement(&self, width: u32, height: u32) -> Placement {
        Placement {
            x_offset: (self.wall_width() as i64 - width as i64) / 2,
            y_offset: (self.wall_height() as i64 - height as i64) / 2,
            width,
            height,
        }
    }
}

// ── Placement ────────────────────────────────────────────────────

/// Where a frame's top-left corner lands in wall coordinates.
///
/// Offsets are negative when the frame is larger than the wall, in which
/// case its edges are cropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x_offset: i64,
    pub y_offset: i64,
    pub width: u32,
    pub height: u32,
}

impl Placement {
    /// Frame-buffer index of wall pixel `(wx, wy)`, or `None` if off-frame.
    #[inline]
    pub fn frame_index(&self, wx: u32, wy: u32) -> Option<usize> {
        let fx = wx as i64 - self.x_offset;
        let fy = wy as i64 - self.y_offset;
        if fx < 0 || fy < 0 || fx >= self.width as i64 || fy >= self.height as i64 {
            return None;
        }
        Some(fy as usize * self.width as usize + fx as usize)
    }

    /// Wall-space origin of tile `tile` of the target at grid `(tx, ty)`.
    pub fn tile_origin(tx: u32, ty: u32, tile: usize) -> (u32, u32) {
        let col = (tile % TILES_PER_SIDE) as u32;
        let row = (tile / TILES_PER_SIDE) as u32;
        (
            tx * TARGET_SIZE + col * TILE_SIZE,
            ty * TARGET_SIZE + row * TILE_SIZE,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_video_larger_than_wall() {
        assert!(WallLayout::new(1, 1, 0, 129, 128).is_err());
        assert!(WallLayout::new(2, 1, 0, 256, 128).is_ok());
        assert!(WallLayout::new(0, 1, 0, 1, 1).is_err());
    }

    #[test]
    fn ids_are_row_major() {
        let wall = WallLayout::new(3, 2, 10, 384, 256).unwrap();
        assert_eq!(wall.target_id(0, 0), 10);
        assert_eq!(wall.target_id(2, 0), 12);
        assert_eq!(wall.target_id(0, 1), 13);
        assert_eq!(wall.position_of(14), Some((1, 1)));
        assert_eq!(wall.position_of(16), None);
        assert_eq!(wall.position_of(9), None);
        assert_eq!(wall.target_ids().collect::<Vec<_>>(), vec![10, 11, 12, 13, 14, 15]);
    }

    #[test]
    fn smaller_frame_is_centred() {
        let wall = WallLayout::new(2, 1, 0, 200, 100).unwrap();
        let p = wall.placement(200, 100);
        assert_eq!((p.x_offset, p.y_offset), (28, 14));
        assert_eq!(p.frame_index(27, 50), None);
        assert_eq!(p.frame_index(28, 14), Some(0));
        assert_eq!(p.frame_index(227, 113), Some(200 * 100 - 1));
        assert_eq!(p.frame_index(228, 113), None);
    }

    #[test]
    fn tile_origins() {
        assert_eq!(Placement::tile_origin(0, 0, 0), (0, 0));
        assert_eq!(Placement::tile_origin(0, 0, 9), (16, 16));
        assert_eq!(Placement::tile_origin(1, 1, 63), (128 + 112, 128 + 112));
    }
}
