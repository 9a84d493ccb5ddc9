//! Video presentation pacing.
//!
//! With an audio sink the sink's play position is the master clock: a
//! frame ahead of it waits, but never longer than `max_desync`, so a
//! timestamp discontinuity cannot stall the video worker. Without a
//! running audio clock, media time is anchored to wall time at the first
//! frame and re-anchored periodically.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::SyncConfig;
use crate::source::AudioSink;

/// Anchor age after which wall-clock pacing re-anchors.
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(5);
/// A frame this far ahead of the wall clock forces a re-anchor.
pub const RESYNC_LEAD: Duration = Duration::from_millis(100);
/// Consecutive late drops after which the anchor is reset.
pub const MAX_CONSECUTIVE_DROPS: u32 = 10;

/// Portion of a wait spent spinning rather than sleeping.
const SPIN_WINDOW: Duration = Duration::from_millis(1);

/// What to do with a frame after pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pace {
    Present,
    Drop,
}

#[derive(Debug, Clone, Copy)]
struct Anchor {
    media_us: i64,
    wall: Instant,
}

impl Anchor {
    /// Microseconds until `media_us` is due; negative when late.
    fn delay_us(&self, media_us: i64, now: Instant) -> i64 {
        let due = media_us - self.media_us;
        let elapsed = now.saturating_duration_since(self.wall).as_micros() as i64;
        due - elapsed
    }
}

/// Decides when, and whether, each video frame is presented.
///
/// Owned by the video worker.
pub struct VideoPacer {
    clock: Option<Arc<dyn AudioSink>>,
    /// Stream position at which the audio clock read zero.
    origin_us: i64,
    max_desync: Duration,
    drop_late: bool,
    late_threshold_us: i64,
    anchor: Option<Anchor>,
    consecutive_drops: u32,
}

impl VideoPacer {
    pub fn new(config: &SyncConfig, clock: Option<Arc<dyn AudioSink>>) -> Self {
        Self {
            clock,
            origin_us: 0,
            max_desync: config.max_desync(),
            drop_late: config.drop_late_frames,
            late_threshold_us: config.late_threshold().as_micros() as i64,
            anchor: None,
            consecutive_drops: 0,
        }
    }

    /// Treat the audio clock as starting at stream position `origin_us`.
    pub fn starting_at(mut self, origin_us: i64) -> Self {
        self.origin_us = origin_us;
        self
    }

    /// Forget the wall-clock anchor.
    pub fn reset(&mut self) {
        self.anchor = None;
        self.consecutive_drops = 0;
    }

    /// Block until the frame at `timestamp_us` is due, or decide to drop it.
    pub fn pace(&mut self, timestamp_us: i64) -> Pace {
        if let Some(position) = self.clock.as_ref().and_then(|c| c.position_us()) {
            let delay_us = timestamp_us - (self.origin_us + position);
            if delay_us > 0 {
                wait_for(Duration::from_micros(delay_us as u64).min(self.max_desync));
            }
            return Pace::Present;
        }
        self.pace_wall_clock(timestamp_us)
    }

    fn pace_wall_clock(&mut self, timestamp_us: i64) -> Pace {
        let now = Instant::now();
        let anchor = *self.anchor.get_or_insert(Anchor {
            media_us: timestamp_us,
            wall: now,
        });

        let mut delay_us = anchor.delay_us(timestamp_us, now);
        if now.saturating_duration_since(anchor.wall) > RESYNC_INTERVAL
            || delay_us > RESYNC_LEAD.as_micros() as i64
        {
            self.reanchor(timestamp_us, now);
            delay_us = 0;
        }

        if self.drop_late && delay_us < -self.late_threshold_us {
            self.consecutive_drops += 1;
            if self.consecutive_drops < MAX_CONSECUTIVE_DROPS {
                return Pace::Drop;
            }
            tracing::debug!(
                drops = self.consecutive_drops,
                "video fell behind; re-anchoring"
            );
            self.reanchor(timestamp_us, now);
            return Pace::Present;
        }
        self.consecutive_drops = 0;

        if delay_us > 0 {
            wait_for(Duration::from_micros(delay_us as u64));
        }
        Pace::Present
    }

    fn reanchor(&mut self, media_us: i64, now: Instant) {
        self.anchor = Some(Anchor {
            media_us,
            wall: now,
        });
        self.consecutive_drops = 0;
    }
}

/// Sleep for most of `duration`, then yield-spin until it has elapsed.
pub fn wait_for(duration: Duration) {
    let deadline = Instant::now() + duration;
    if duration > SPIN_WINDOW {
        thread::sleep(duration - SPIN_WINDOW);
    }
    while Instant::now() < deadline {
        thread::yield_now();
    }
}

// ── Tests ────────────────────────────────────────────────────────
