//! Tunables for the synchronization engine and tile encoder.
//!
//! Every struct derives serde with `#[serde(default)]`, so a partial TOML
//! table fills the rest from [`Default`]. Call `validate` before use; the
//! engine and encoder constructors do so themselves.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MapcastError;
use crate::tiles::DEFAULT_MAX_PATCHES_PER_BATCH;

/// Pull loop, worker queue and A/V pacing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Pending video frames kept before the oldest is dropped.
    pub video_queue_depth: usize,
    /// Pending audio chunks kept before the oldest is dropped.
    pub audio_queue_depth: usize,
    /// Upper bound on how long a video frame may wait for the audio clock.
    pub max_desync_ms: u64,
    /// Frame rate assumed when the source reports none.
    pub fallback_fps: f32,
    /// Drop frames that arrive too late when pacing against wall time.
    pub drop_late_frames: bool,
    /// Lateness after which a frame is dropped.
    pub late_threshold_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            video_queue_depth: 2,
            audio_queue_depth: 2,
            max_desync_ms: 10,
            fallback_fps: 30.0,
            drop_late_frames: true,
            late_threshold_ms: 100,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), MapcastError> {
        if self.video_queue_depth == 0 || self.audio_queue_depth == 0 {
            return Err(MapcastError::InvalidConfig(
                "queue depths must be at least 1".into(),
            ));
        }
        if !(self.fallback_fps.is_finite() && self.fallback_fps > 0.0) {
            return Err(MapcastError::InvalidConfig(format!(
                "fallback_fps must be positive, got {}",
                self.fallback_fps
            )));
        }
        if self.late_threshold_ms == 0 {
            return Err(MapcastError::InvalidConfig(
                "late_threshold_ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn max_desync(&self) -> Duration {
        Duration::from_millis(self.max_desync_ms)
    }

    pub fn late_threshold(&self) -> Duration {
        Duration::from_millis(self.late_threshold_ms)
    }
}

/// Periodic drift correction between two independent playback engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Sampling period.
    pub interval_ms: u64,
    /// Drift above which the video rate is nudged.
    pub soft_threshold_ms: i64,
    /// Drift above which video is force-seeked to the audio position.
    pub hard_threshold_ms: i64,
    /// Fractional rate change applied while drifting (0.03 = ±3%).
    pub rate_nudge: f64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            interval_ms: 50,
            soft_threshold_ms: 100,
            hard_threshold_ms: 2000,
            rate_nudge: 0.03,
        }
    }
}

impl DriftConfig {
    pub fn validate(&self) -> Result<(), MapcastError> {
        if self.interval_ms == 0 {
            return Err(MapcastError::InvalidConfig("interval_ms must be > 0".into()));
        }
        if self.soft_threshold_ms < 0 || self.soft_threshold_ms >= self.hard_threshold_ms {
            return Err(MapcastError::InvalidConfig(format!(
                "need 0 <= soft_threshold_ms < hard_threshold_ms, got {} / {}",
                self.soft_threshold_ms, self.hard_threshold_ms
            )));
        }
        if !(self.rate_nudge > 0.0 && self.rate_nudge < 1.0) {
            return Err(MapcastError::InvalidConfig(format!(
                "rate_nudge must be in (0, 1), got {}",
                self.rate_nudge
            )));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Output wall geometry and patch batching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileConfig {
    /// Targets per wall row.
    pub targets_wide: u32,
    /// Targets per wall column.
    pub targets_high: u32,
    /// Id of the top-left target; the rest follow row-major.
    pub first_target_id: u32,
    /// Expected frame width.
    pub video_width: u32,
    /// Expected frame height.
    pub video_height: u32,
    /// Largest patch group handed to the transport at once.
    pub max_patches_per_batch: usize,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            targets_wide: 1,
            targets_high: 1,
            first_target_id: 0,
            video_width: 128,
            video_height: 128,
            max_patches_per_batch: DEFAULT_MAX_PATCHES_PER_BATCH,
        }
    }
}

impl TileConfig {
    /// Checks geometry by building the layout it describes.
    pub fn validate(&self) -> Result<(), MapcastError> {
        crate::tiles::WallLayout::from_config(self)?;
        if self.max_patches_per_batch == 0 {
            return Err(MapcastError::InvalidConfig(
                "max_patches_per_batch must be > 0".into(),
            ));
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SyncConfig::default().validate().unwrap();
        DriftConfig::default().validate().unwrap();
        TileConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_table_fills_defaults() {
        let cfg: SyncConfig = toml::from_str("video_queue_depth = 1").unwrap();
        assert_eq!(cfg.video_queue_depth, 1);
        assert_eq!(cfg.max_desync_ms, 10);
    }

    #[test]
    fn rejects_bad_values() {
        let sync = SyncConfig {
            audio_queue_depth: 0,
            ..SyncConfig::default()
        };
        assert!(sync.validate().is_err());

        let drift = DriftConfig {
            soft_threshold_ms: 2000,
            ..DriftConfig::default()
        };
        assert!(drift.validate().is_err());

        let drift = DriftConfig {
            rate_nudge: 1.5,
            ..DriftConfig::default()
        };
        assert!(drift.validate().is_err());

        let tiles = TileConfig {
            video_width: 300,
            ..TileConfig::default()
        };
        assert!(matches!(tiles.validate(), Err(MapcastError::InvalidConfig(_))));
    }
}
