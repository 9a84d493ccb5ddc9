//! Drift correction between independently clocked video and audio engines.
//!
//! A sampler thread reads both engines' positions every interval and
//! applies a three-tier bang-bang correction to the video engine: force
//! seek on large drift, a small rate nudge on moderate drift, normal rate
//! otherwise.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::DriftConfig;
use crate::error::MapcastError;

/// Playback rate of an engine running at normal speed.
pub const NORMAL_RATE: f64 = 1.0;

/// An independently clocked playback engine.
pub trait PlaybackEngine: Send + Sync {
    /// Current position in milliseconds, `None` if not playing.
    fn position_ms(&self) -> Option<i64>;

    fn set_rate(&self, rate: f64);

    fn seek(&self, position_ms: i64);
}

/// Correction chosen for one drift sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriftAction {
    /// Seek video to the audio position and restore normal rate.
    ForceSeek { to_ms: i64 },
    /// Run video at this rate until the next sample.
    SetRate(f64),
    /// Drift within tolerance; run at normal rate.
    Normal,
}

impl DriftAction {
    /// Video rate in effect after this action.
    pub fn rate(&self) -> f64 {
        match self {
            DriftAction::SetRate(r) => *r,
            DriftAction::ForceSeek { .. } | DriftAction::Normal => NORMAL_RATE,
        }
    }
}

// ── DriftController ──────────────────────────────────────────────

/// Pure decision function over a pair of positions.
#[derive(Debug, Clone)]
pub struct DriftController {
    config: DriftConfig,
}

impl DriftController {
    pub fn new(config: DriftConfig) -> Result<Self, MapcastError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DriftConfig {
        &self.config
    }

    /// `drift = video - audio`; positive means video leads.
    pub fn evaluate(&self, video_ms: i64, audio_ms: i64) -> DriftAction {
        let drift = video_ms - audio_ms;
        let magnitude = drift.abs();
        if magnitude > self.config.hard_threshold_ms {
            DriftAction::ForceSeek { to_ms: audio_ms }
        } else if magnitude > self.config.soft_threshold_ms {
            if drift > 0 {
                DriftAction::SetRate(NORMAL_RATE - self.config.rate_nudge)
            } else {
                DriftAction::SetRate(NORMAL_RATE + self.config.rate_nudge)
            }
        } else {
            DriftAction::Normal
        }
    }
}

// ── DriftSampler ─────────────────────────────────────────────────

/// Applies [`DriftController`] decisions to a video engine.
pub struct DriftSampler {
    controller: DriftController,
    video: Arc<dyn PlaybackEngine>,
    audio: Arc<dyn PlaybackEngine>,
    current_rate: f64,
}

impl DriftSampler {
    pub fn new(
        controller: DriftController,
        video: Arc<dyn PlaybackEngine>,
        audio: Arc<dyn PlaybackEngine>,
    ) -> Self {
        Self {
            controller,
            video,
            audio,
            current_rate: NORMAL_RATE,
        }
    }

    /// Take one sample and apply the resulting correction.
    ///
    /// Returns `None` when either engine has no position yet.
    pub fn tick(&mut self) -> Option<DriftAction> {
        let video = self.video.position_ms()?;
        let audio = self.audio.position_ms()?;
        let action = self.controller.evaluate(video, audio);
        match action {
            DriftAction::ForceSeek { to_ms } => {
                tracing::warn!(drift_ms = video - audio, "drift past hard limit; seeking video");
                self.video.seek(to_ms);
                self.video.set_rate(NORMAL_RATE);
                self.current_rate = NORMAL_RATE;
            }
            DriftAction::SetRate(_) | DriftAction::Normal => {
                let rate = action.rate();
                if rate != self.current_rate {
                    tracing::debug!(drift_ms = video - audio, rate, "adjusting video rate");
                    self.video.set_rate(rate);
                    self.current_rate = rate;
                }
            }
        }
        Some(action)
    }

    /// Run [`tick`](Self::tick) every configured interval on a new thread.
    pub fn spawn(mut self) -> Result<DriftHandle, MapcastError> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let interval = self.controller.config().interval();
        let handle = thread::Builder::new()
            .name("mapcast-drift".into())
            .spawn(move || {
                let mut next = Instant::now() + interval;
                while flag.load(Ordering::SeqCst) {
                    let now = Instant::now();
                    if now < next {
                        thread::sleep((next - now).min(Duration::from_millis(10)));
                        continue;
                    }
                    self.tick();
                    next += interval;
                }
            })?;
        Ok(DriftHandle {
            running,
            handle: Some(handle),
        })
    }
}

/// Stops the sampler thread on [`stop`](DriftHandle::stop) or drop.
pub struct DriftHandle {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DriftHandle {
    /// Stop and join the sampler. Returns `false` if it had panicked.
    pub fn stop(&mut self) -> bool {
        self.running.store(false, Ordering::SeqCst);
        let Some(h) = self.handle.take() else {
            return true;
        };
        if h.join().is_err() {
            tracing::error!(thread = "drift", "thread panicked");
            return false;
        }
        true
    }
}

impl Drop for DriftHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Tests ────────────────────────────────────────────────────────
