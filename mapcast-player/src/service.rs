//! Player core: builds the pipeline from config and drives one session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::info;

use mapcast_core::synthetic::ClockedAudioSink;
use mapcast_core::{
    AudioChain, AudioSink, Chains, MapcastError, PlaybackSession, SessionStats, TileRenderStep,
    VideoChain,
};

use crate::config::PlayerConfig;
use crate::transport::LoggingTransport;

/// How often `run` checks for end of stream.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct Player {
    config: PlayerConfig,
    session: PlaybackSession,
    transport: Arc<LoggingTransport>,
    running: Arc<AtomicBool>,
}

impl Player {
    /// Validate `config` and build an idle session for it.
    pub fn new(config: PlayerConfig) -> Result<Self, MapcastError> {
        config.validate()?;
        let mut builder = PlaybackSession::builder().sync_config(config.sync.clone());
        if config.source.audio {
            let sink: Arc<dyn AudioSink> = Arc::new(ClockedAudioSink::default());
            builder = builder.audio_sink(sink);
        }
        Ok(Self {
            session: builder.build()?,
            config,
            transport: Arc::new(LoggingTransport::new()),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Handle that stops [`run`](Self::run) when cleared.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn transport(&self) -> &Arc<LoggingTransport> {
        &self.transport
    }

    /// Start playback of the configured test pattern.
    pub fn start(&self) -> Result<(), MapcastError> {
        let quantizer = self.config.dither.to_quantizer()?;
        info!(
            dither = quantizer.dither().name(),
            colors = quantizer.palette().len(),
            "quantizer ready"
        );
        let transport: Arc<dyn mapcast_core::PatchTransport> = self.transport.clone();
        let render = TileRenderStep::new(quantizer, &self.config.tiles, transport)?
            .with_counters(Arc::clone(self.session.counters()));
        let chains = Chains::new(VideoChain::new().then(render), AudioChain::new());
        let source = self.config.test_pattern().spec("test://pattern");
        self.session.start(chains, source)
    }

    /// Wait until the stream ends or the stop handle is cleared, then
    /// release the session.
    pub async fn run(&self) -> Result<SessionStats, MapcastError> {
        self.start()?;
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        while self.running.load(Ordering::SeqCst) && !self.session.is_finished() {
            ticker.tick().await;
        }
        if self.session.has_failed() {
            tracing::warn!("playback ended after a source failure");
        }
        self.session.release()?;
        let stats = self.session.stats();
        info!(
            frames = stats.frames_processed,
            dropped = stats.video_backpressure_drops + stats.late_drops,
            patches = self.transport.patches(),
            bytes = self.transport.bytes(),
            "playback finished"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;

    fn config(frames: u64) -> PlayerConfig {
        PlayerConfig {
            source: SourceConfig {
                frames,
                audio: false,
                realtime: false,
                ..SourceConfig::default()
            },
            ..PlayerConfig::default()
        }
    }

    #[tokio::test]
    async fn plays_to_end_of_stream() {
        let player = Player::new(config(5)).unwrap();
        let stats = player.run().await.unwrap();
        assert!(stats.frames_processed > 0);
        assert!(player.transport().patches() >= 64);
        // The release blanked the single target.
        assert!(player.transport().batches() >= 2);
    }

    #[tokio::test]
    async fn stop_handle_ends_endless_stream() {
        let mut cfg = config(0);
        cfg.source.realtime = true;
        let player = Player::new(cfg).unwrap();
        let stop = player.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            stop.store(false, Ordering::SeqCst);
        });
        let stats = player.run().await.unwrap();
        assert!(stats.frames_processed > 0);
    }

    #[test]
    fn invalid_dither_fails_at_construction() {
        let mut cfg = config(1);
        cfg.dither.algorithm = "nope".into();
        assert!(matches!(Player::new(cfg), Err(MapcastError::InvalidConfig(_))));
    }
}
