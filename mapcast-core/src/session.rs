//! Playback session: the lifecycle around a [`SyncEngine`].
//!
//! Every transition takes the same lock, so `start`, `pause`, `resume`,
//! `seek` and `release` never overlap. Pause tears the engine down
//! completely and remembers the source; resume reopens it at the last
//! presented position.
//!
//! ```text
//!   Idle ──start──▶ Playing ──pause──▶ Paused
//!                     ▲  │               │
//!                     │  └──seek──┐      │
//!                     └──resume───┴──────┘
//!   any ──release──▶ Released
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::SyncConfig;
use crate::error::{ErrorHandler, FailureHandler, MapcastError};
use crate::error::{logging_error_handler, logging_failure_handler};
use crate::source::{AudioSink, SourceSpec};
use crate::sync::{Chains, PlaybackCounters, SessionStats, SyncEngine};

/// Lifecycle state of a [`PlaybackSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Playing,
    Paused,
    Released,
}

#[derive(Debug, Clone)]
struct Media {
    video: SourceSpec,
    audio: Option<SourceSpec>,
}

struct SessionInner {
    engine: SyncEngine,
    media: Option<Media>,
    offset_ms: u64,
    state: SessionState,
}

// ── Builder ──────────────────────────────────────────────────────

/// Configures a [`PlaybackSession`]. Invalid settings fail in
/// [`build`](Self::build), never during playback.
#[derive(Default)]
pub struct PlaybackSessionBuilder {
    sync: Option<SyncConfig>,
    sink: Option<Arc<dyn AudioSink>>,
    error_handler: Option<ErrorHandler>,
    failure_handler: Option<FailureHandler>,
    counters: Option<Arc<PlaybackCounters>>,
}

impl PlaybackSessionBuilder {
    pub fn sync_config(mut self, config: SyncConfig) -> Self {
        self.sync = Some(config);
        self
    }

    /// Audio output; its position becomes the master clock.
    pub fn audio_sink(mut self, sink: Arc<dyn AudioSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = Some(handler);
        self
    }

    pub fn failure_handler(mut self, handler: FailureHandler) -> Self {
        self.failure_handler = Some(handler);
        self
    }

    /// Share counters with a render step built beforehand.
    pub fn counters(mut self, counters: Arc<PlaybackCounters>) -> Self {
        self.counters = Some(counters);
        self
    }

    pub fn build(self) -> Result<PlaybackSession, MapcastError> {
        let sync = self.sync.unwrap_or_default();
        let counters = self.counters.unwrap_or_default();
        let failed = Arc::new(AtomicBool::new(false));

        // Several pull threads may fail in the same run; report only the first.
        let failure_handler = {
            let inner = self.failure_handler.unwrap_or_else(logging_failure_handler);
            let failed = Arc::clone(&failed);
            let handler: FailureHandler = Arc::new(move |err: &MapcastError| {
                if !failed.swap(true, Ordering::SeqCst) {
                    inner(err);
                }
            });
            handler
        };

        let engine = SyncEngine::new(sync, self.sink)?
            .with_counters(Arc::clone(&counters))
            .with_error_handler(self.error_handler.unwrap_or_else(logging_error_handler))
            .with_failure_handler(failure_handler);

        Ok(PlaybackSession {
            inner: Mutex::new(SessionInner {
                engine,
                media: None,
                offset_ms: 0,
                state: SessionState::Idle,
            }),
            counters,
            failed,
        })
    }
}

// ── PlaybackSession ──────────────────────────────────────────────

/// One playback of one source onto one set of chains.
pub struct PlaybackSession {
    inner: Mutex<SessionInner>,
    counters: Arc<PlaybackCounters>,
    failed: Arc<AtomicBool>,
}

impl PlaybackSession {
    pub fn builder() -> PlaybackSessionBuilder {
        PlaybackSessionBuilder::default()
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install `chains` and play `source` from the beginning.
    pub fn start(&self, chains: Chains, source: SourceSpec) -> Result<(), MapcastError> {
        self.begin(
            chains,
            Media {
                video: source,
                audio: None,
            },
        )
    }

    /// Like [`start`](Self::start) with audio pulled from its own source.
    pub fn start_separate(
        &self,
        chains: Chains,
        video: SourceSpec,
        audio: SourceSpec,
    ) -> Result<(), MapcastError> {
        self.begin(
            chains,
            Media {
                video,
                audio: Some(audio),
            },
        )
    }

    fn begin(&self, chains: Chains, media: Media) -> Result<(), MapcastError> {
        let mut inner = self.lock();
        match inner.state {
            SessionState::Released => {
                return Err(MapcastError::Playback("session has been released".into()));
            }
            SessionState::Playing if !inner.engine.is_finished() => {
                return Err(MapcastError::Playback("session is already playing".into()));
            }
            _ => {}
        }
        inner.engine.stop();
        inner.engine.install(chains);
        inner.offset_ms = 0;
        tracing::info!(resource = %media.video.resource, "starting session");
        self.open(&mut inner, media)
    }

    /// Open `media` at the stored offset and enter `Playing`.
    ///
    /// On failure the session is left `Idle` with no source.
    fn open(&self, inner: &mut SessionInner, media: Media) -> Result<(), MapcastError> {
        self.failed.store(false, Ordering::SeqCst);
        self.counters.clear_position();
        let offset = inner.offset_ms;
        let result = match &media.audio {
            Some(audio) => inner.engine.start_separate(&media.video, audio, offset),
            None => inner.engine.start(&media.video, offset),
        };
        match result {
            Ok(()) => {
                inner.media = Some(media);
                inner.state = SessionState::Playing;
                Ok(())
            }
            Err(e) => {
                inner.media = None;
                inner.state = SessionState::Idle;
                Err(e)
            }
        }
    }

    /// Tear playback down, keeping the source for [`resume`](Self::resume).
    ///
    /// No-op unless playing.
    pub fn pause(&self) {
        let mut inner = self.lock();
        if inner.state != SessionState::Playing {
            return;
        }
        Self::halt(&mut inner, &self.counters);
        inner.state = SessionState::Paused;
        tracing::info!(offset_ms = inner.offset_ms, "session paused");
    }

    /// Reopen the remembered source at the paused position.
    pub fn resume(&self) -> Result<(), MapcastError> {
        let mut inner = self.lock();
        match inner.state {
            SessionState::Paused => {}
            SessionState::Playing => return Ok(()),
            SessionState::Idle | SessionState::Released => {
                return Err(MapcastError::Playback("nothing to resume".into()));
            }
        }
        let Some(media) = inner.media.clone() else {
            return Err(MapcastError::Playback("nothing to resume".into()));
        };
        tracing::info!(offset_ms = inner.offset_ms, "session resumed");
        self.open(&mut inner, media)
    }

    /// Restart playback at `position_ms`.
    ///
    /// Seeking a paused session moves the resume point without playing.
    pub fn seek(&self, position_ms: u64) -> Result<(), MapcastError> {
        let mut inner = self.lock();
        let Some(media) = inner.media.clone() else {
            return Err(MapcastError::Playback("no source to seek".into()));
        };
        tracing::info!(position_ms, "session seek");
        match inner.state {
            SessionState::Paused => {
                inner.offset_ms = position_ms;
                Ok(())
            }
            SessionState::Playing => {
                inner.engine.stop();
                inner.offset_ms = position_ms;
                self.open(&mut inner, media)
            }
            SessionState::Idle | SessionState::Released => {
                Err(MapcastError::Playback("no source to seek".into()))
            }
        }
    }

    /// Stop playback, close the audio sink, release every step and forget
    /// the source.
    ///
    /// Releasing twice is a no-op.
    pub fn release(&self) -> Result<(), MapcastError> {
        let mut inner = self.lock();
        if inner.state == SessionState::Released {
            return Ok(());
        }
        inner.engine.shutdown();
        inner.media = None;
        inner.state = SessionState::Released;
        let result = inner.engine.release_chains();
        tracing::info!(stats = ?self.counters.snapshot(), "session released");
        result
    }

    fn halt(inner: &mut SessionInner, counters: &PlaybackCounters) {
        if let Some(ts) = counters.last_video_us() {
            inner.offset_ms = (ts / 1_000) as u64;
        }
        inner.engine.stop();
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Whether the current run ended on its own, through end of stream or
    /// a fatal source failure.
    pub fn is_finished(&self) -> bool {
        let inner = self.lock();
        inner.state == SessionState::Playing && inner.engine.is_finished()
    }

    /// Whether the current run reported a fatal failure.
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Position playback resumes or restarts from.
    pub fn offset_ms(&self) -> u64 {
        self.lock().offset_ms
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot()
    }

    pub fn counters(&self) -> &Arc<PlaybackCounters> {
        &self.counters
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("release on drop failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_sync_config_fails_build() {
        let config = SyncConfig {
            video_queue_depth: 0,
            ..SyncConfig::default()
        };
        let result = PlaybackSession::builder().sync_config(config).build();
        assert!(matches!(result, Err(MapcastError::InvalidConfig(_))));
    }

    #[test]
    fn fresh_session_is_idle() {
        let session = PlaybackSession::builder().build().unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_finished());
        assert!(session.resume().is_err());
        assert!(session.seek(1_000).is_err());
        session.pause();
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn release_is_idempotent() {
        let session = PlaybackSession::builder().build().unwrap();
        session.release().unwrap();
        session.release().unwrap();
        assert_eq!(session.state(), SessionState::Released);
    }
}
