//! Integration tests: full sessions over the synthetic collaborators,
//! covering patch output, lifecycle transitions, backpressure and failures.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use mapcast_core::synthetic::{ClockedAudioSink, RecordingTransport, ScriptedSource, TestPattern};
use mapcast_core::{
    AudioChain, AudioMetadata, AudioSink, Chains, Frame, MapcastError, MediaUnit, Palette, PlaybackSession,
    Quantizer, SessionState, StepError, StreamMetadata, SyncConfig, TileConfig, TileRenderStep,
    VideoChain, VideoMetadata,
};

// ── Helpers ──────────────────────────────────────────────────────

fn render_chains(transport: &Arc<RecordingTransport>, session: &PlaybackSession) -> Chains {
    let quantizer = Quantizer::nearest(Arc::new(Palette::grayscale(4).unwrap()));
    let step = TileRenderStep::new(quantizer, &TileConfig::default(), transport.clone())
        .unwrap()
        .with_counters(Arc::clone(session.counters()));
    Chains::new(VideoChain::new().then(step), AudioChain::new())
}

/// Poll until the session's run has ended on its own.
fn wait_finished(session: &PlaybackSession) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !session.is_finished() {
        assert!(Instant::now() < deadline, "session did not finish");
        thread::sleep(Duration::from_millis(5));
    }
}

fn metadata() -> StreamMetadata {
    StreamMetadata {
        video: VideoMetadata {
            width: 128,
            height: 128,
            frame_rate: 30.0,
        },
        audio: AudioMetadata::default(),
    }
}

/// Sink that accepts everything and counts lifecycle calls.
#[derive(Default)]
struct CountingSink {
    stops: AtomicUsize,
    closes: AtomicUsize,
}

impl AudioSink for CountingSink {
    fn open(&self, _: AudioMetadata) -> Result<(), MapcastError> {
        Ok(())
    }
    fn write(&self, _: &[u8]) -> Result<(), MapcastError> {
        Ok(())
    }
    fn position_us(&self) -> Option<i64> {
        None
    }
    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn roomy_config() -> SyncConfig {
    SyncConfig {
        video_queue_depth: 8,
        ..SyncConfig::default()
    }
}

// ── End-to-end patches ───────────────────────────────────────────

#[test]
fn test_black_black_white_tile() {
    let session = PlaybackSession::builder()
        .sync_config(roomy_config())
        .build()
        .unwrap();
    let transport = Arc::new(RecordingTransport::new());

    let mut third = Frame::solid(128, 128, 0x000000, 66_666);
    third.fill_rect(0, 0, 16, 16, 0xFFFFFF);
    let script = vec![
        MediaUnit::Video(Frame::solid(128, 128, 0x000000, 0)),
        MediaUnit::Video(Frame::solid(128, 128, 0x000000, 33_333)),
        MediaUnit::Video(third),
    ];

    session
        .start(
            render_chains(&transport, &session),
            ScriptedSource::spec(script, metadata()),
        )
        .unwrap();
    wait_finished(&session);

    let batches = transport.take();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].target_id, 0);
    assert_eq!(batches[0].len(), 64);

    let patch = &batches[1].patches[0];
    assert_eq!(batches[1].len(), 1);
    assert_eq!((patch.x, patch.y, patch.width, patch.height), (0, 0, 16, 16));
    assert!(patch.payload.iter().all(|&i| i == 3));

    let stats = session.stats();
    assert_eq!(stats.frames_processed, 3);
    assert_eq!(stats.patches_emitted, 65);
}

#[test]
fn test_wall_of_four_targets() {
    let session = PlaybackSession::builder()
        .sync_config(roomy_config())
        .build()
        .unwrap();
    let transport = Arc::new(RecordingTransport::new());
    let tiles = TileConfig {
        targets_wide: 2,
        targets_high: 2,
        first_target_id: 10,
        video_width: 256,
        video_height: 256,
        ..TileConfig::default()
    };
    let quantizer = Quantizer::nearest(Arc::new(Palette::grayscale(4).unwrap()));
    let step = TileRenderStep::new(quantizer, &tiles, transport.clone()).unwrap();
    let chains = Chains::new(VideoChain::new().then(step), AudioChain::new());

    let script = vec![MediaUnit::Video(Frame::solid(256, 256, 0x808080, 0))];
    session
        .start(chains, ScriptedSource::spec(script, metadata()))
        .unwrap();
    wait_finished(&session);

    let mut targets: Vec<u32> = transport.batches().iter().map(|b| b.target_id).collect();
    targets.sort_unstable();
    assert_eq!(targets, vec![10, 11, 12, 13]);
    assert_eq!(transport.patch_count(), 4 * 64);

    session.release().unwrap();
    let mut cleared = transport.cleared();
    cleared.sort_unstable();
    assert_eq!(cleared, vec![10, 11, 12, 13]);
}

// ── Session lifecycle ────────────────────────────────────────────

#[test]
fn test_pause_resume_seek_release() {
    let sink = Arc::new(ClockedAudioSink::default());
    let session = PlaybackSession::builder()
        .audio_sink(sink)
        .build()
        .unwrap();
    let transport = Arc::new(RecordingTransport::new());
    let source = TestPattern::default().realtime(true).spec("test://bars");

    session
        .start(render_chains(&transport, &session), source)
        .unwrap();
    assert_eq!(session.state(), SessionState::Playing);
    thread::sleep(Duration::from_millis(300));

    session.pause();
    assert_eq!(session.state(), SessionState::Paused);
    let frames = session.stats().frames_processed;
    assert!(frames > 0);
    assert!(session.offset_ms() > 0);

    // Paused sessions do no work.
    thread::sleep(Duration::from_millis(100));
    assert_eq!(session.stats().frames_processed, frames);

    session.resume().unwrap();
    assert_eq!(session.state(), SessionState::Playing);
    thread::sleep(Duration::from_millis(100));
    assert!(session.stats().frames_processed > frames);

    session.seek(5_000).unwrap();
    assert_eq!(session.offset_ms(), 5_000);
    thread::sleep(Duration::from_millis(200));
    let last = session.counters().last_video_us().unwrap();
    assert!(last >= 5_000_000, "last frame at {last} us");

    session.release().unwrap();
    assert_eq!(session.state(), SessionState::Released);
    assert_eq!(transport.cleared(), vec![0]);

    // Releasing again and using a released session.
    session.release().unwrap();
    assert_eq!(transport.cleared(), vec![0]);
    assert!(session.resume().is_err());
    let again = TestPattern::default().spec("test://bars");
    assert!(session.start(Chains::default(), again).is_err());
}

#[test]
fn test_start_while_playing_is_rejected() {
    let session = PlaybackSession::builder().build().unwrap();
    let source = TestPattern::default().silent().realtime(true).spec("test://bars");
    session.start(Chains::default(), source.clone()).unwrap();
    assert!(matches!(
        session.start(Chains::default(), source),
        Err(MapcastError::Playback(_))
    ));
    session.release().unwrap();
}

#[test]
fn test_seek_while_paused_moves_resume_point() {
    let session = PlaybackSession::builder().build().unwrap();
    let source = TestPattern::default().silent().realtime(true).spec("test://bars");
    session.start(Chains::default(), source).unwrap();
    thread::sleep(Duration::from_millis(50));
    session.pause();

    session.seek(2_000).unwrap();
    assert_eq!(session.state(), SessionState::Paused);
    session.resume().unwrap();
    thread::sleep(Duration::from_millis(150));
    assert!(session.counters().last_video_us().unwrap() >= 2_000_000);
    session.release().unwrap();
}

#[test]
fn test_pause_right_after_seek_keeps_seek_target() {
    let session = PlaybackSession::builder().build().unwrap();
    let source = TestPattern::default().silent().realtime(true).spec("test://bars");
    session.start(Chains::default(), source).unwrap();
    thread::sleep(Duration::from_millis(300));

    session.seek(5_000).unwrap();
    session.pause();
    let offset = session.offset_ms();
    assert!(offset >= 5_000, "resume point {offset} ms");
    session.release().unwrap();
}

#[test]
fn test_release_closes_sink_once() {
    let sink = Arc::new(CountingSink::default());
    let session = PlaybackSession::builder()
        .audio_sink(sink.clone())
        .build()
        .unwrap();
    let source = TestPattern::default().realtime(true).spec("test://bars");
    session.start(Chains::default(), source).unwrap();
    thread::sleep(Duration::from_millis(100));

    session.pause();
    assert_eq!(sink.closes.load(Ordering::SeqCst), 0);
    session.release().unwrap();
    session.release().unwrap();
    drop(session);
    assert!(sink.stops.load(Ordering::SeqCst) >= 1);
    assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_dropping_session_closes_sink() {
    let sink = Arc::new(CountingSink::default());
    let session = PlaybackSession::builder()
        .audio_sink(sink.clone())
        .build()
        .unwrap();
    session
        .start(Chains::default(), TestPattern::default().realtime(true).spec("test://bars"))
        .unwrap();
    drop(session);
    assert_eq!(sink.closes.load(Ordering::SeqCst), 1);
}

// ── Backpressure ─────────────────────────────────────────────────

#[test]
fn test_slow_video_drops_oldest_frames() {
    let config = SyncConfig {
        video_queue_depth: 2,
        drop_late_frames: false,
        ..SyncConfig::default()
    };
    let session = PlaybackSession::builder().sync_config(config).build().unwrap();
    let slow = |_: &mut Frame, _: &StreamMetadata| -> Result<(), StepError> {
        thread::sleep(Duration::from_millis(40));
        Ok(())
    };
    let chains = Chains::new(VideoChain::new().then(slow), AudioChain::new());
    let source = TestPattern::default().silent().frames(20).spec("test://bars");

    session.start(chains, source).unwrap();
    wait_finished(&session);

    let stats = session.stats();
    assert!(stats.video_backpressure_drops > 0);
    assert_eq!(stats.frames_processed + stats.video_backpressure_drops, 20);
    // The newest frame always survives.
    assert_eq!(session.counters().last_video_us(), Some(19 * 33_333));
}

// ── Failures ─────────────────────────────────────────────────────

#[test]
fn test_source_open_failure() {
    let failures = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&failures);
    let session = PlaybackSession::builder()
        .failure_handler(Arc::new(move |e: &MapcastError| {
            seen.lock().unwrap().push(e.to_string());
        }))
        .build()
        .unwrap();

    let source = TestPattern::default().failing_open().spec("test://broken");
    let err = session.start(Chains::default(), source).unwrap_err();
    assert!(matches!(err, MapcastError::SourceOpen { .. }));
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.resume().is_err());
    assert!(failures.lock().unwrap().is_empty());
}

#[test]
fn test_decode_failure_reported_once() {
    let failures = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&failures);
    let session = PlaybackSession::builder()
        .failure_handler(Arc::new(move |e: &MapcastError| {
            seen.lock().unwrap().push(e.to_string());
        }))
        .build()
        .unwrap();

    let source = TestPattern::default().failing_after(3).spec("test://flaky");
    session.start(Chains::default(), source).unwrap();
    wait_finished(&session);

    assert!(session.has_failed());
    let failures = failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("test pattern configured to fail"));
}

#[test]
fn test_step_errors_do_not_stop_playback() {
    let errors = Arc::new(Mutex::new(0usize));
    let counted = Arc::clone(&errors);
    let session = PlaybackSession::builder()
        .sync_config(roomy_config())
        .error_handler(Arc::new(move |chain: &str, _: &StepError| {
            assert_eq!(chain, "video");
            *counted.lock().unwrap() += 1;
        }))
        .build()
        .unwrap();

    let mut n = 0;
    let flaky = move |_: &mut Frame, _: &StreamMetadata| -> Result<(), StepError> {
        n += 1;
        if n % 2 == 0 { Err("bad frame".into()) } else { Ok(()) }
    };
    let script = (0..6)
        .map(|i| MediaUnit::Video(Frame::solid(16, 16, 0, i * 33_333)))
        .collect();
    session
        .start(
            Chains::new(VideoChain::new().then(flaky), AudioChain::new()),
            ScriptedSource::spec(script, metadata()),
        )
        .unwrap();
    wait_finished(&session);

    assert_eq!(*errors.lock().unwrap(), 3);
    assert_eq!(session.stats().frames_processed, 6);
    assert!(!session.has_failed());
}

#[test]
fn test_separate_audio_falls_back_to_primary() {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&errors);
    let session = PlaybackSession::builder()
        .error_handler(Arc::new(move |chain: &str, _: &StepError| {
            seen.lock().unwrap().push(chain.to_string());
        }))
        .build()
        .unwrap();

    let video = TestPattern::default().frames(10).spec("test://bars");
    let audio = TestPattern::default().failing_open().spec("test://missing-audio");
    session
        .start_separate(Chains::default(), video, audio)
        .unwrap();
    wait_finished(&session);

    assert_eq!(*errors.lock().unwrap(), vec!["audio".to_string()]);
    assert!(session.stats().audio_processed > 0);
}

#[test]
fn test_separate_audio_source() {
    let session = PlaybackSession::builder().build().unwrap();
    let video = TestPattern::default().silent().frames(10).spec("test://bars");
    let audio = TestPattern::default().frames(10).spec("test://tone");
    session
        .start_separate(Chains::default(), video, audio)
        .unwrap();
    wait_finished(&session);

    let stats = session.stats();
    assert!(stats.frames_processed > 0);
    assert!(stats.audio_processed > 0);
}
