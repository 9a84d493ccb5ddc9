//! The frame/audio synchronization engine.
//!
//! One pull thread per source grabs units and pushes them onto two
//! drop-oldest queues; one worker per kind drains its queue through the
//! installed chain. Audio chunks are written to the [`AudioSink`], whose
//! play position paces the video worker.
//!
//! ```text
//!  source ──grab──▶ pull thread ──push──▶ [video queue] ──▶ video worker ──▶ VideoChain
//!                                  └────▶ [audio queue] ──▶ audio worker ──▶ AudioChain ──▶ sink
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::SyncConfig;
use crate::error::{ErrorHandler, FailureHandler, MapcastError, StepError};
use crate::error::{logging_error_handler, logging_failure_handler};
use crate::media::{AudioChunk, Frame, MediaUnit, StreamMetadata};
use crate::source::{AudioSink, MediaSource, SourceOptions, SourceSpec};

use super::pacer::{Pace, VideoPacer};
use super::pipeline::{AudioChain, Chains, VideoChain};
use super::queue::{Admission, DropOldestQueue};
use super::stats::PlaybackCounters;
use super::worker::{self, Worker};

/// How long `stop` waits for each thread before abandoning it.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

/// Interval of the `debug!` statistics line.
const STATS_INTERVAL: Duration = Duration::from_secs(1);

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Active run ───────────────────────────────────────────────────

/// Threads and queues of one start..stop interval.
struct ActiveRun {
    running: Arc<AtomicBool>,
    video_queue: Arc<DropOldestQueue<Frame>>,
    audio_queue: Arc<DropOldestQueue<AudioChunk>>,
    pullers: Vec<(String, JoinHandle<()>)>,
    video_worker: Worker,
    audio_worker: Worker,
}

impl ActiveRun {
    fn is_finished(&self) -> bool {
        self.pullers.iter().all(|(_, h)| h.is_finished())
            && self.video_worker.is_finished()
            && self.audio_worker.is_finished()
    }
}

// ── SyncEngine ───────────────────────────────────────────────────

/// Pulls units off a source and keeps video aligned to the audio clock.
pub struct SyncEngine {
    config: SyncConfig,
    counters: Arc<PlaybackCounters>,
    sink: Option<Arc<dyn AudioSink>>,
    error_handler: ErrorHandler,
    failure_handler: FailureHandler,
    video_chain: Arc<Mutex<VideoChain>>,
    audio_chain: Arc<Mutex<AudioChain>>,
    active: Option<ActiveRun>,
}

impl SyncEngine {
    pub fn new(config: SyncConfig, sink: Option<Arc<dyn AudioSink>>) -> Result<Self, MapcastError> {
        config.validate()?;
        Ok(Self {
            config,
            counters: Arc::new(PlaybackCounters::default()),
            sink,
            error_handler: logging_error_handler(),
            failure_handler: logging_failure_handler(),
            video_chain: Arc::new(Mutex::new(VideoChain::new())),
            audio_chain: Arc::new(Mutex::new(AudioChain::new())),
            active: None,
        })
    }

    /// Receive every per-unit error swallowed by a worker.
    pub fn with_error_handler(mut self, handler: ErrorHandler) -> Self {
        self.error_handler = handler;
        self
    }

    /// Receive the fatal failure of a run.
    pub fn with_failure_handler(mut self, handler: FailureHandler) -> Self {
        self.failure_handler = handler;
        self
    }

    /// Share counters with other components, e.g. a render step.
    pub fn with_counters(mut self, counters: Arc<PlaybackCounters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn counters(&self) -> &Arc<PlaybackCounters> {
        &self.counters
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Replace the chains run by the workers. Takes effect on next start.
    pub fn install(&mut self, chains: Chains) {
        *lock(&self.video_chain) = chains.video;
        *lock(&self.audio_chain) = chains.audio;
    }

    /// Release every installed step.
    pub fn release_chains(&mut self) -> Result<(), MapcastError> {
        let video = lock(&self.video_chain).release();
        let audio = lock(&self.audio_chain).release();
        video.and(audio)
    }

    /// Whether a run has been started and not yet stopped.
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// Whether the active run is still pulling and not failed.
    pub fn is_running(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|r| r.running.load(Ordering::SeqCst) && !r.is_finished())
    }

    /// Whether the active run has ended on its own (end of stream or
    /// failure) and all its threads have exited.
    pub fn is_finished(&self) -> bool {
        self.active.as_ref().is_some_and(ActiveRun::is_finished)
    }

    /// Open `source` from `offset_ms` and start pulling.
    pub fn start(&mut self, source: &SourceSpec, offset_ms: u64) -> Result<(), MapcastError> {
        self.ensure_idle()?;
        let options = SourceOptions {
            start_offset_ms: offset_ms,
            ..SourceOptions::default()
        };
        let (primary, metadata) = source.open(&options).inspect_err(|e| {
            tracing::error!(resource = %source.resource, "failed to open source: {e}");
        })?;
        self.launch(vec![(primary, true, true)], metadata, offset_ms)
    }

    /// Start with video and audio taken from independent sources.
    ///
    /// If the audio source cannot be opened the error handler is notified
    /// and audio is taken from the video source instead.
    pub fn start_separate(
        &mut self,
        video: &SourceSpec,
        audio: &SourceSpec,
        offset_ms: u64,
    ) -> Result<(), MapcastError> {
        self.ensure_idle()?;
        let audio_options = SourceOptions {
            start_offset_ms: offset_ms,
            video: false,
            ..SourceOptions::default()
        };
        let audio_source = match audio.open(&audio_options) {
            Ok(opened) => Some(opened),
            Err(e) => {
                tracing::warn!(resource = %audio.resource, "audio source unavailable, using combined: {e}");
                (self.error_handler)(
                    "audio",
                    &StepError::Failed(format!("separate audio source unavailable: {e}")),
                );
                None
            }
        };

        let video_options = SourceOptions {
            start_offset_ms: offset_ms,
            audio: audio_source.is_none(),
            ..SourceOptions::default()
        };
        let (primary, mut metadata) = match video.open(&video_options) {
            Ok(opened) => opened,
            Err(e) => {
                tracing::error!(resource = %video.resource, "failed to open source: {e}");
                if let Some((mut source, _)) = audio_source {
                    source.close();
                }
                return Err(e);
            }
        };

        let mut sources = vec![(primary, true, audio_source.is_none())];
        if let Some((source, audio_meta)) = audio_source {
            metadata.audio = audio_meta.audio;
            sources.push((source, false, true));
        }
        self.launch(sources, metadata, offset_ms)
    }

    fn ensure_idle(&mut self) -> Result<(), MapcastError> {
        if self.is_finished() {
            self.stop();
        }
        if self.active.is_some() {
            return Err(MapcastError::Playback("engine is already running".into()));
        }
        Ok(())
    }

    fn launch(
        &mut self,
        sources: Vec<(Box<dyn MediaSource>, bool, bool)>,
        metadata: StreamMetadata,
        offset_ms: u64,
    ) -> Result<(), MapcastError> {
        let origin_us = offset_ms as i64 * 1_000;
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.open(metadata.audio) {
                close_all(sources);
                return Err(e);
            }
        }

        let running = Arc::new(AtomicBool::new(true));
        let video_queue = Arc::new(DropOldestQueue::new(self.config.video_queue_depth));
        let audio_queue = Arc::new(DropOldestQueue::new(self.config.audio_queue_depth));

        let video_worker = {
            let chain = Arc::clone(&self.video_chain);
            let counters = Arc::clone(&self.counters);
            let on_error = Arc::clone(&self.error_handler);
            let mut pacer = VideoPacer::new(&self.config, self.sink.clone()).starting_at(origin_us);
            let mut report = StatsReport::new();
            let spawned = Worker::spawn("video", Arc::clone(&video_queue), move |mut frame: Frame| {
                if pacer.pace(frame.timestamp_us) == Pace::Drop {
                    counters.record_late_drop();
                    return;
                }
                let ts = frame.timestamp_us;
                if let Err(e) = lock(&chain).process(&mut frame, &metadata) {
                    on_error("video", &e);
                }
                counters.record_frame(ts);
                report.maybe_log(&counters);
            });
            match spawned {
                Ok(w) => w,
                Err(e) => {
                    close_all(sources);
                    return Err(e);
                }
            }
        };

        let audio_worker = {
            let chain = Arc::clone(&self.audio_chain);
            let counters = Arc::clone(&self.counters);
            let on_error = Arc::clone(&self.error_handler);
            let sink = self.sink.clone();
            let spawned = Worker::spawn("audio", Arc::clone(&audio_queue), move |mut chunk: AudioChunk| {
                let result = lock(&chain).process(&mut chunk, &metadata).and_then(|()| {
                    match &sink {
                        Some(sink) => sink
                            .write(&chunk.data)
                            .map_err(|e| StepError::Failed(e.to_string())),
                        None => Ok(()),
                    }
                });
                match result {
                    Ok(()) => counters.record_audio(),
                    Err(e) => on_error("audio", &e),
                }
            });
            match spawned {
                Ok(w) => w,
                Err(e) => {
                    video_queue.abort();
                    video_worker.join_within(SHUTDOWN_GRACE);
                    close_all(sources);
                    return Err(e);
                }
            }
        };

        let frame_us = {
            let fps = if metadata.video.frame_rate > 0.0 {
                metadata.video.frame_rate
            } else {
                self.config.fallback_fps
            };
            (1_000_000.0 / fps as f64) as i64
        };

        let mut run = ActiveRun {
            running: Arc::clone(&running),
            video_queue: Arc::clone(&video_queue),
            audio_queue: Arc::clone(&audio_queue),
            pullers: Vec::new(),
            video_worker,
            audio_worker,
        };

        for (index, (source, takes_video, takes_audio)) in sources.into_iter().enumerate() {
            let name = if index == 0 { "pull" } else { "pull-audio" };
            let puller = Puller {
                source,
                video: takes_video.then(|| Arc::clone(&video_queue)),
                audio: takes_audio.then(|| Arc::clone(&audio_queue)),
                running: Arc::clone(&running),
                counters: Arc::clone(&self.counters),
                on_failure: Arc::clone(&self.failure_handler),
                origin_us,
                frame_us,
            };
            match thread::Builder::new()
                .name(format!("mapcast-{name}"))
                .spawn(move || puller.run())
            {
                Ok(handle) => run.pullers.push((name.to_string(), handle)),
                Err(e) => {
                    self.active = Some(run);
                    self.stop();
                    return Err(e.into());
                }
            }
        }

        tracing::info!(
            width = metadata.video.width,
            height = metadata.video.height,
            fps = metadata.video.frame_rate,
            sample_rate = metadata.audio.sample_rate,
            sources = run.pullers.len(),
            "playback started"
        );
        self.active = Some(run);
        Ok(())
    }

    /// Stop pulling and abandon in-flight work.
    ///
    /// Queued units are discarded. Threads get a short grace period to
    /// exit before they are detached. No-op when not running.
    pub fn stop(&mut self) {
        let Some(run) = self.active.take() else {
            return;
        };
        run.running.store(false, Ordering::SeqCst);
        let discarded = run.video_queue.abort() + run.audio_queue.abort();
        if let Some(sink) = &self.sink {
            sink.stop();
        }
        for (name, handle) in run.pullers {
            worker::join_within(&name, handle, SHUTDOWN_GRACE);
        }
        run.video_worker.join_within(SHUTDOWN_GRACE);
        run.audio_worker.join_within(SHUTDOWN_GRACE);
        tracing::info!(discarded, "playback stopped");
    }

    /// Stop and close the audio device. Later runs play without audio.
    pub fn shutdown(&mut self) {
        self.stop();
        if let Some(sink) = self.sink.take() {
            sink.close();
            tracing::debug!("audio sink closed");
        }
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn close_all(sources: Vec<(Box<dyn MediaSource>, bool, bool)>) {
    for (mut source, _, _) in sources {
        source.close();
    }
}

// ── Pull loop ────────────────────────────────────────────────────

struct Puller {
    source: Box<dyn MediaSource>,
    video: Option<Arc<DropOldestQueue<Frame>>>,
    audio: Option<Arc<DropOldestQueue<AudioChunk>>>,
    running: Arc<AtomicBool>,
    counters: Arc<PlaybackCounters>,
    on_failure: FailureHandler,
    /// Stream position the source was opened at.
    origin_us: i64,
    /// Frame duration used to stamp frames without a timestamp.
    frame_us: i64,
}

impl Puller {
    fn run(mut self) {
        let mut frames: i64 = 0;
        while self.running.load(Ordering::SeqCst) {
            match self.source.grab() {
                Ok(Some(MediaUnit::Video(mut frame))) => {
                    let Some(queue) = &self.video else { continue };
                    if frame.timestamp_us < 0 {
                        frame.timestamp_us = self.origin_us + frames * self.frame_us;
                    }
                    frames += 1;
                    match queue.push(frame) {
                        Admission::Queued => {}
                        Admission::Evicted(_) => self.counters.record_video_eviction(),
                        Admission::Closed(_) => break,
                    }
                }
                Ok(Some(MediaUnit::Audio(chunk))) => {
                    let Some(queue) = &self.audio else { continue };
                    match queue.push(chunk) {
                        Admission::Queued => {}
                        Admission::Evicted(_) => self.counters.record_audio_eviction(),
                        Admission::Closed(_) => break,
                    }
                }
                Ok(None) => {
                    tracing::info!(frames, "end of stream");
                    self.close_queues();
                    break;
                }
                Err(e) => {
                    tracing::error!("decode failed: {e}");
                    self.running.store(false, Ordering::SeqCst);
                    if let Some(q) = &self.video {
                        q.abort();
                    }
                    if let Some(q) = &self.audio {
                        q.abort();
                    }
                    (self.on_failure)(&MapcastError::Playback(e.to_string()));
                    break;
                }
            }
        }
        self.source.close();
    }

    fn close_queues(&self) {
        if let Some(q) = &self.video {
            q.close();
        }
        if let Some(q) = &self.audio {
            q.close();
        }
    }
}

// ── Statistics ───────────────────────────────────────────────────

struct StatsReport {
    last: Instant,
}

impl StatsReport {
    fn new() -> Self {
        Self {
            last: Instant::now(),
        }
    }

    fn maybe_log(&mut self, counters: &PlaybackCounters) {
        if self.last.elapsed() < STATS_INTERVAL {
            return;
        }
        self.last = Instant::now();
        let s = counters.snapshot();
        tracing::debug!(
            frames = s.frames_processed,
            audio = s.audio_processed,
            dropped = s.video_backpressure_drops,
            late = s.late_drops,
            patches = s.patches_emitted,
            "playback stats"
        );
    }
}
