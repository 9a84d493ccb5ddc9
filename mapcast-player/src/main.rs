//! mapcast-player: entry point.
//!
//! ```text
//! mapcast-player                  Play the test pattern until Ctrl-C
//! mapcast-player --frames 300     Stop after 300 frames
//! mapcast-player --config <path>  Load a custom config TOML
//! mapcast-player --gen-config     Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mapcast_player::config::PlayerConfig;
use mapcast_player::service::Player;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mapcast-player", about = "Play a test pattern onto indexed-color targets")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "mapcast.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Number of frames to play, overriding the config.
    #[arg(long)]
    frames: Option<u64>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = PlayerConfig::default().to_toml()?;
        println!("{text}");
        return Ok(());
    }

    let mut config = PlayerConfig::load(&cli.config);
    if let Some(frames) = cli.frames {
        config.source.frames = frames;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("mapcast-player v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "wall: {}x{} targets from id {}",
        config.tiles.targets_wide, config.tiles.targets_high, config.tiles.first_target_id
    );
    info!("dither: {} on {}", config.dither.algorithm, config.dither.palette);

    let player = Player::new(config)?;

    let stop = player.stop_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received; shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    player.run().await?;
    Ok(())
}
