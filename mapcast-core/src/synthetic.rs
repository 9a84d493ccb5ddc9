//! In-process collaborators: a test-pattern source, a scripted source, a
//! wall-clock audio sink and a recording transport.
//!
//! These drive the full pipeline without a decoder, an audio device or a
//! display, and are what the player binary and the integration tests run.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;

use crate::error::MapcastError;
use crate::media::{
    AudioChunk, AudioMetadata, Frame, MediaUnit, StreamMetadata, VideoMetadata, pack_rgb,
};
use crate::source::{AudioSink, MediaSource, PatchTransport, SourceFactory, SourceOptions, SourceSpec};
use crate::tiles::{DEFAULT_MAX_PATCHES_PER_BATCH, Patch, PatchBatch};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── TestPattern ──────────────────────────────────────────────────

/// Colour bars with a white block sweeping across them.
const BARS: [u32; 8] = [
    pack_rgb(255, 255, 255),
    pack_rgb(255, 255, 0),
    pack_rgb(0, 255, 255),
    pack_rgb(0, 255, 0),
    pack_rgb(255, 0, 255),
    pack_rgb(255, 0, 0),
    pack_rgb(0, 0, 255),
    pack_rgb(0, 0, 0),
];

/// Pixels the block moves per frame.
const BLOCK_STEP: u32 = 4;

/// Description of a synthetic stream. Also the [`SourceFactory`] for it.
#[derive(Debug, Clone)]
pub struct TestPattern {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f32,
    /// Total frames in the stream, `None` for endless.
    pub frames: Option<u64>,
    /// Audio format, `None` for a silent stream.
    pub audio: Option<AudioMetadata>,
    /// Deliver units no faster than their timestamps.
    pub realtime: bool,
    /// Make `open` fail.
    pub fail_open: bool,
    /// Make `grab` fail once this many frames have been delivered.
    pub fail_after: Option<u64>,
}

impl Default for TestPattern {
    fn default() -> Self {
        Self {
            width: 128,
            height: 128,
            frame_rate: 30.0,
            frames: None,
            audio: Some(AudioMetadata::default()),
            realtime: false,
            fail_open: false,
            fail_after: None,
        }
    }
}

impl TestPattern {
    pub fn frames(mut self, frames: u64) -> Self {
        self.frames = Some(frames);
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn silent(mut self) -> Self {
        self.audio = None;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn failing_after(mut self, frames: u64) -> Self {
        self.fail_after = Some(frames);
        self
    }

    /// A [`SourceSpec`] that opens this pattern under `resource`.
    pub fn spec(self, resource: &str) -> SourceSpec {
        SourceSpec::new(Arc::new(self), resource)
    }

    fn frame_us(&self) -> i64 {
        (1_000_000.0 / self.frame_rate.max(1.0) as f64) as i64
    }

    /// Render frame number `index`.
    pub fn render(&self, index: u64) -> Frame {
        let bar_width = (self.width / BARS.len() as u32).max(1);
        let mut pixels = Vec::with_capacity(self.width as usize * self.height as usize);
        for _ in 0..self.height {
            for x in 0..self.width {
                let bar = ((x / bar_width) as usize).min(BARS.len() - 1);
                pixels.push(BARS[bar]);
            }
        }
        let mut frame = Frame::solid(self.width, self.height, 0, index as i64 * self.frame_us());
        frame.pixels_mut().copy_from_slice(&pixels);
        let side = (self.height / 4).max(1);
        let x = (index as u32).wrapping_mul(BLOCK_STEP) % self.width.max(1);
        let y = (self.height - side) / 2;
        frame.fill_rect(x, y, side, side, pack_rgb(255, 255, 255));
        frame
    }
}

impl SourceFactory for TestPattern {
    fn create(&self) -> Box<dyn MediaSource> {
        Box::new(TestPatternSource::new(self.clone()))
    }
}

/// A [`MediaSource`] generating [`TestPattern`] frames and a tone.
pub struct TestPatternSource {
    pattern: TestPattern,
    metadata: Option<StreamMetadata>,
    options: SourceOptions,
    next_frame: u64,
    delivered: u64,
    pending_audio: Option<AudioChunk>,
    opened_at: Instant,
    origin_us: i64,
}

impl TestPatternSource {
    pub fn new(pattern: TestPattern) -> Self {
        Self {
            pattern,
            metadata: None,
            options: SourceOptions::default(),
            next_frame: 0,
            delivered: 0,
            pending_audio: None,
            opened_at: Instant::now(),
            origin_us: 0,
        }
    }

    /// One frame's worth of a 440 Hz square wave at `timestamp_us`.
    fn tone(&self, format: AudioMetadata, timestamp_us: i64) -> AudioChunk {
        let samples = (format.sample_rate as f32 / self.pattern.frame_rate.max(1.0)) as usize;
        let period = (format.sample_rate / 440).max(2) as usize;
        let start = (timestamp_us.max(0) as u64 * format.sample_rate as u64 / 1_000_000) as usize;
        let mut data = Vec::with_capacity(samples * format.channels as usize * 2);
        for i in 0..samples {
            let level: i16 = if (start + i) % period < period / 2 { 4_000 } else { -4_000 };
            for _ in 0..format.channels {
                data.extend_from_slice(&level.to_le_bytes());
            }
        }
        AudioChunk {
            data: Bytes::from(data),
            channels: format.channels,
            sample_rate: format.sample_rate,
            timestamp_us,
        }
    }

    /// Sleep until `timestamp_us` is due relative to open time.
    fn pace(&self, timestamp_us: i64) {
        if !self.pattern.realtime {
            return;
        }
        let due = Duration::from_micros((timestamp_us - self.origin_us).max(0) as u64);
        let elapsed = self.opened_at.elapsed();
        if due > elapsed {
            thread::sleep(due - elapsed);
        }
    }
}

impl MediaSource for TestPatternSource {
    fn open(
        &mut self,
        resource: &str,
        options: &SourceOptions,
    ) -> Result<StreamMetadata, MapcastError> {
        if self.pattern.fail_open {
            return Err(MapcastError::SourceOpen {
                resource: resource.to_string(),
                reason: "test pattern configured to fail".into(),
            });
        }
        let metadata = StreamMetadata {
            video: VideoMetadata {
                width: self.pattern.width,
                height: self.pattern.height,
                frame_rate: self.pattern.frame_rate,
            },
            audio: self.pattern.audio.unwrap_or_default(),
        };
        let frame_us = self.pattern.frame_us();
        // First frame at or after the offset.
        self.next_frame = (options.start_offset_ms * 1_000).div_ceil(frame_us.max(1) as u64);
        self.origin_us = options.start_offset_ms as i64 * 1_000;
        self.options = options.clone();
        self.delivered = 0;
        self.pending_audio = None;
        self.opened_at = Instant::now();
        self.metadata = Some(metadata);
        Ok(metadata)
    }

    fn grab(&mut self) -> Result<Option<MediaUnit>, MapcastError> {
        if self.metadata.is_none() {
            return Err(MapcastError::Decode("source is not open".into()));
        }
        if let Some(chunk) = self.pending_audio.take() {
            return Ok(Some(MediaUnit::Audio(chunk)));
        }
        if self.pattern.frames.is_some_and(|n| self.next_frame >= n) {
            return Ok(None);
        }
        if self.pattern.fail_after.is_some_and(|n| self.delivered >= n) {
            return Err(MapcastError::Decode("test pattern configured to fail".into()));
        }

        let index = self.next_frame;
        self.next_frame += 1;
        self.delivered += 1;
        let timestamp_us = index as i64 * self.pattern.frame_us();
        self.pace(timestamp_us);

        let audio = match self.pattern.audio {
            Some(format) if self.options.audio => Some(self.tone(format, timestamp_us)),
            _ => None,
        };
        if self.options.video {
            self.pending_audio = audio;
            Ok(Some(MediaUnit::Video(self.pattern.render(index))))
        } else {
            // Nothing requested that this stream carries.
            Ok(audio.map(MediaUnit::Audio))
        }
    }

    fn metadata(&self) -> Option<StreamMetadata> {
        self.metadata
    }

    fn close(&mut self) {
        self.metadata = None;
        self.pending_audio = None;
    }
}

// ── ScriptedSource ───────────────────────────────────────────────

/// Replays a fixed list of units, then ends the stream.
pub struct ScriptedSource {
    script: Arc<Vec<MediaUnit>>,
    metadata: StreamMetadata,
    pending: VecDeque<MediaUnit>,
    open: bool,
}

impl ScriptedSource {
    /// A [`SourceSpec`] replaying `units` on every open.
    pub fn spec(units: Vec<MediaUnit>, metadata: StreamMetadata) -> SourceSpec {
        let script = Arc::new(units);
        let factory = move || -> Box<dyn MediaSource> {
            Box::new(ScriptedSource {
                script: Arc::clone(&script),
                metadata,
                pending: VecDeque::new(),
                open: false,
            })
        };
        SourceSpec::new(Arc::new(factory), "script")
    }
}

impl MediaSource for ScriptedSource {
    fn open(&mut self, _: &str, options: &SourceOptions) -> Result<StreamMetadata, MapcastError> {
        let from_us = options.start_offset_ms as i64 * 1_000;
        self.pending = self
            .script
            .iter()
            .filter(|u| u.timestamp_us() >= from_us || u.timestamp_us() < 0)
            .filter(|u| match u {
                MediaUnit::Video(_) => options.video,
                MediaUnit::Audio(_) => options.audio,
            })
            .cloned()
            .collect();
        self.open = true;
        Ok(self.metadata)
    }

    fn grab(&mut self) -> Result<Option<MediaUnit>, MapcastError> {
        if !self.open {
            return Err(MapcastError::Decode("source is not open".into()));
        }
        Ok(self.pending.pop_front())
    }

    fn metadata(&self) -> Option<StreamMetadata> {
        self.open.then_some(self.metadata)
    }

    fn close(&mut self) {
        self.open = false;
        self.pending.clear();
    }
}

// ── ClockedAudioSink ─────────────────────────────────────────────

/// How far written audio may run ahead of the clock by default.
const DEFAULT_BUFFER: Duration = Duration::from_millis(200);

#[derive(Debug, Default)]
struct SinkState {
    format: Option<AudioMetadata>,
    written_us: i64,
    started: Option<Instant>,
    stopped: bool,
}

impl SinkState {
    fn played_us(&self) -> Option<i64> {
        let started = self.started?;
        Some((started.elapsed().as_micros() as i64).min(self.written_us))
    }
}

/// An audio sink that plays silently in real time.
///
/// The clock starts on the first write and advances with wall time but
/// never past the audio written so far. Writes block while more than the
/// buffer length is queued.
pub struct ClockedAudioSink {
    state: Mutex<SinkState>,
    drained: Condvar,
    buffer: Duration,
}

impl Default for ClockedAudioSink {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER)
    }
}

impl ClockedAudioSink {
    pub fn new(buffer: Duration) -> Self {
        Self {
            state: Mutex::new(SinkState::default()),
            drained: Condvar::new(),
            buffer,
        }
    }

    /// Microseconds of audio accepted since `open`.
    pub fn written_us(&self) -> i64 {
        lock(&self.state).written_us
    }

    fn halt(&self, state: &mut SinkState) {
        state.stopped = true;
        state.started = None;
        state.written_us = 0;
        self.drained.notify_all();
    }
}

impl AudioSink for ClockedAudioSink {
    fn open(&self, format: AudioMetadata) -> Result<(), MapcastError> {
        if format.sample_rate == 0 || format.channels == 0 {
            return Err(MapcastError::Sink(format!(
                "unsupported format {} Hz x {}",
                format.sample_rate, format.channels
            )));
        }
        *lock(&self.state) = SinkState {
            format: Some(format),
            ..SinkState::default()
        };
        Ok(())
    }

    fn write(&self, samples: &[u8]) -> Result<(), MapcastError> {
        let mut state = lock(&self.state);
        let Some(format) = state.format else {
            return Err(MapcastError::Sink("sink is not open".into()));
        };
        if state.stopped {
            return Ok(());
        }
        let frame_bytes = format.channels as i64 * 2;
        let duration_us = samples.len() as i64 / frame_bytes * 1_000_000 / format.sample_rate as i64;
        if state.started.is_none() {
            state.started = Some(Instant::now());
        }

        let limit = self.buffer.as_micros() as i64;
        loop {
            if state.stopped {
                return Ok(());
            }
            let ahead = state.written_us - state.played_us().unwrap_or(0);
            if ahead <= limit {
                break;
            }
            let wait = Duration::from_micros((ahead - limit) as u64);
            state = self
                .drained
                .wait_timeout(state, wait)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        state.written_us += duration_us;
        Ok(())
    }

    fn position_us(&self) -> Option<i64> {
        lock(&self.state).played_us()
    }

    fn stop(&self) {
        let mut state = lock(&self.state);
        self.halt(&mut state);
    }

    fn close(&self) {
        let mut state = lock(&self.state);
        self.halt(&mut state);
        state.format = None;
    }
}

// ── RecordingTransport ───────────────────────────────────────────

/// A transport that keeps every batch it is given.
pub struct RecordingTransport {
    batches: Mutex<Vec<PatchBatch>>,
    cleared: Mutex<Vec<u32>>,
    failures: AtomicUsize,
    max_patches: usize,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::with_max_patches(DEFAULT_MAX_PATCHES_PER_BATCH)
    }

    pub fn with_max_patches(max_patches: usize) -> Self {
        Self {
            batches: Mutex::new(Vec::new()),
            cleared: Mutex::new(Vec::new()),
            failures: AtomicUsize::new(0),
            max_patches,
        }
    }

    /// Reject the next `n` batches.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<PatchBatch> {
        lock(&self.batches).clone()
    }

    pub fn patch_count(&self) -> usize {
        lock(&self.batches).iter().map(PatchBatch::len).sum()
    }

    /// Targets blanked so far, in order.
    pub fn cleared(&self) -> Vec<u32> {
        lock(&self.cleared).clone()
    }

    /// Forget recorded batches.
    pub fn take(&self) -> Vec<PatchBatch> {
        std::mem::take(&mut *lock(&self.batches))
    }
}

impl PatchTransport for RecordingTransport {
    fn send_batch(&self, batch: &PatchBatch) -> Result<(), MapcastError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(MapcastError::Transport("recording transport set to fail".into()));
        }
        if batch.len() > self.max_patches {
            return Err(MapcastError::Transport(format!(
                "batch of {} exceeds {} patches",
                batch.len(),
                self.max_patches
            )));
        }
        lock(&self.batches).push(batch.clone());
        Ok(())
    }

    fn clear_target(&self, target_id: u32) -> Result<(), MapcastError> {
        lock(&self.cleared).push(target_id);
        self.send_batch(&PatchBatch {
            target_id,
            patches: vec![Patch::clear(target_id)],
        })
    }

    fn max_patches_per_message(&self) -> usize {
        self.max_patches
    }
}

// ── Tests ────────────────────────────────────────────────────────
