//! Lock-free playback counters shared between threads.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

/// Counters updated by the pull loop, the workers and the render step.
#[derive(Debug)]
pub struct PlaybackCounters {
    frames_processed: AtomicU64,
    audio_processed: AtomicU64,
    video_backpressure_drops: AtomicU64,
    audio_backpressure_drops: AtomicU64,
    late_drops: AtomicU64,
    patches_emitted: AtomicU64,
    /// Timestamp of the most recently presented video frame.
    last_video_us: AtomicI64,
}

impl Default for PlaybackCounters {
    fn default() -> Self {
        Self {
            frames_processed: AtomicU64::new(0),
            audio_processed: AtomicU64::new(0),
            video_backpressure_drops: AtomicU64::new(0),
            audio_backpressure_drops: AtomicU64::new(0),
            late_drops: AtomicU64::new(0),
            patches_emitted: AtomicU64::new(0),
            last_video_us: AtomicI64::new(-1),
        }
    }
}

impl PlaybackCounters {
    pub fn record_frame(&self, timestamp_us: i64) {
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.last_video_us.store(timestamp_us, Ordering::Relaxed);
    }

    pub fn record_audio(&self) {
        self.audio_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_video_eviction(&self) {
        self.video_backpressure_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_audio_eviction(&self) {
        self.audio_backpressure_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_late_drop(&self) {
        self.late_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_patches(&self, n: usize) {
        self.patches_emitted.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Timestamp of the last presented frame, if any.
    pub fn last_video_us(&self) -> Option<i64> {
        let ts = self.last_video_us.load(Ordering::Relaxed);
        (ts >= 0).then_some(ts)
    }

    /// Forget the last presented frame, so a new run starts with none.
    pub fn clear_position(&self) {
        self.last_video_us.store(-1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> SessionStats {
        SessionStats {
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            audio_processed: self.audio_processed.load(Ordering::Relaxed),
            video_backpressure_drops: self.video_backpressure_drops.load(Ordering::Relaxed),
            audio_backpressure_drops: self.audio_backpressure_drops.load(Ordering::Relaxed),
            late_drops: self.late_drops.load(Ordering::Relaxed),
            patches_emitted: self.patches_emitted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PlaybackCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames_processed: u64,
    pub audio_processed: u64,
    pub video_backpressure_drops: u64,
    pub audio_backpressure_drops: u64,
    pub late_drops: u64,
    pub patches_emitted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_updates() {
        let c = PlaybackCounters::default();
        assert_eq!(c.last_video_us(), None);
        c.record_frame(40_000);
        c.record_frame(80_000);
        c.record_patches(64);
        c.record_video_eviction();
        let s = c.snapshot();
        assert_eq!(s.frames_processed, 2);
        assert_eq!(s.patches_emitted, 64);
        assert_eq!(s.video_backpressure_drops, 1);
        assert_eq!(c.last_video_us(), Some(80_000));
    }

    #[test]
    fn clear_position_keeps_totals() {
        let c = PlaybackCounters::default();
        c.record_frame(40_000);
        c.clear_position();
        assert_eq!(c.last_video_us(), None);
        assert_eq!(c.snapshot().frames_processed, 1);
    }
}
