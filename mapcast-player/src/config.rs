//! Configuration for the player.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use mapcast_core::dither::{Pattern, RandomThreshold, ThresholdMatrix};
use mapcast_core::synthetic::TestPattern;
use mapcast_core::{
    AudioMetadata, Dither, ErrorDiffusion, Kernel, MapcastError, Palette, Quantizer, SyncConfig,
    TileConfig,
};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Synthetic stream settings.
    pub source: SourceConfig,
    /// Queue depths and A/V pacing.
    pub sync: SyncConfig,
    /// Target wall geometry.
    pub tiles: TileConfig,
    /// Palette and dithering.
    pub dither: DitherConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// The test-pattern stream played by the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f32,
    /// Frames to play; 0 plays until interrupted.
    pub frames: u64,
    /// Generate a tone and pace video against it.
    pub audio: bool,
    /// Deliver frames at their presentation rate.
    pub realtime: bool,
}

/// Palette and dither selection by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DitherConfig {
    /// "nearest", an error-diffusion kernel name ("floyd-steinberg",
    /// "atkinson", ...), an ordered pattern ("bayer-4x4", "spiral-5x5",
    /// ...) or "random".
    pub algorithm: String,
    /// Ordered-dither strength, 0.0 to 2.0.
    pub strength: f32,
    /// Random-dither weight, 0 to 128.
    pub weight: u8,
    /// Alternate scan direction per row for error diffusion.
    pub serpentine: bool,
    /// Fixed random-dither seed.
    pub seed: Option<u64>,
    /// "grayscale4" or "rgb64".
    pub palette: String,
    /// Precompute the nearest-colour table.
    pub lookup_table: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 128,
            frame_rate: 30.0,
            frames: 0,
            audio: true,
            realtime: true,
        }
    }
}

impl Default for DitherConfig {
    fn default() -> Self {
        Self {
            algorithm: "floyd-steinberg".into(),
            strength: 1.0,
            weight: 64,
            serpentine: false,
            seed: None,
            palette: "rgb64".into(),
            lookup_table: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl PlayerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Render this configuration as TOML.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Reject settings that cannot be played.
    pub fn validate(&self) -> Result<(), MapcastError> {
        self.sync.validate()?;
        self.tiles.validate()?;
        self.dither.to_quantizer()?;
        if self.source.width == 0 || self.source.height == 0 {
            return Err(MapcastError::InvalidConfig("source size must be non-zero".into()));
        }
        if !(self.source.frame_rate > 0.0) {
            return Err(MapcastError::InvalidConfig("source frame_rate must be positive".into()));
        }
        Ok(())
    }

    /// The synthetic stream described by `[source]`.
    pub fn test_pattern(&self) -> TestPattern {
        TestPattern {
            width: self.source.width,
            height: self.source.height,
            frame_rate: self.source.frame_rate,
            frames: (self.source.frames > 0).then_some(self.source.frames),
            audio: self.source.audio.then(AudioMetadata::default),
            realtime: self.source.realtime,
            ..TestPattern::default()
        }
    }
}

impl DitherConfig {
    pub fn palette(&self) -> Result<Palette, MapcastError> {
        let palette = match self.palette.as_str() {
            "grayscale4" => Palette::grayscale(4)?,
            "rgb64" => Palette::rgb_cube(4)?,
            other => {
                return Err(MapcastError::InvalidConfig(format!("unknown palette {other:?}")));
            }
        };
        Ok(if self.lookup_table {
            palette.with_lookup_table()
        } else {
            palette
        })
    }

    pub fn dither(&self) -> Result<Dither, MapcastError> {
        let name = self.algorithm.as_str();
        if name == "nearest" {
            return Ok(Dither::Nearest);
        }
        if name == "random" {
            let random = RandomThreshold::new(self.weight)?;
            return Ok(Dither::Random(match self.seed {
                Some(seed) => random.with_seed(seed),
                None => random,
            }));
        }
        if let Some(kernel) = Kernel::ALL.into_iter().find(|k| k.name() == name) {
            return Ok(Dither::ErrorDiffusion(
                ErrorDiffusion::new(kernel).serpentine(self.serpentine),
            ));
        }
        let pattern = match name {
            "bayer-2x2" => Pattern::BAYER_2X2,
            "bayer-4x4" => Pattern::BAYER_4X4,
            "bayer-8x8" => Pattern::BAYER_8X8,
            "clustered-dot-6x6" => Pattern::CLUSTERED_DOT_6X6,
            "clustered-dot-diagonal-6x6" => Pattern::CLUSTERED_DOT_DIAGONAL_6X6,
            "clustered-dot-diagonal-8x8" => Pattern::CLUSTERED_DOT_DIAGONAL_8X8,
            "spiral-5x5" => Pattern::SPIRAL_5X5,
            "vertical-5x3" => Pattern::VERTICAL_5X3,
            "horizontal-3x5" => Pattern::HORIZONTAL_3X5,
            other => {
                return Err(MapcastError::InvalidConfig(format!(
                    "unknown dither algorithm {other:?}"
                )));
            }
        };
        Ok(Dither::Ordered(ThresholdMatrix::from_pattern(pattern, self.strength)?))
    }

    pub fn to_quantizer(&self) -> Result<Quantizer, MapcastError> {
        Ok(Quantizer::new(Arc::new(self.palette()?), self.dither()?))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_roundtrips() {
        let text = PlayerConfig::default().to_toml().unwrap();
        assert!(text.contains("max_desync_ms"));
        assert!(text.contains("floyd-steinberg"));
        let parsed: PlayerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.tiles.video_width, 128);
        assert_eq!(parsed.dither.palette, "rgb64");
        parsed.validate().unwrap();
    }

    #[test]
    fn partial_file_uses_defaults() {
        let cfg: PlayerConfig = toml::from_str(
            "[dither]\nalgorithm = \"bayer-4x4\"\n[tiles]\ntargets_wide = 2\nvideo_width = 256\n",
        )
        .unwrap();
        assert_eq!(cfg.tiles.targets_wide, 2);
        assert_eq!(cfg.sync.video_queue_depth, 2);
        assert!(matches!(cfg.dither.dither().unwrap(), Dither::Ordered(_)));
        cfg.validate().unwrap();
    }

    #[test]
    fn every_named_algorithm_resolves() {
        let names = [
            "nearest",
            "floyd-steinberg",
            "atkinson",
            "burkes",
            "stucki",
            "jarvis-judice-ninke",
            "sierra-lite",
            "stevenson-arce",
            "bayer-2x2",
            "bayer-4x4",
            "bayer-8x8",
            "spiral-5x5",
            "random",
        ];
        for name in names {
            let cfg = DitherConfig {
                algorithm: name.into(),
                ..DitherConfig::default()
            };
            assert!(cfg.to_quantizer().is_ok(), "{name}");
        }
    }

    #[test]
    fn unknown_names_are_rejected() {
        let cfg = DitherConfig {
            algorithm: "blur".into(),
            ..DitherConfig::default()
        };
        assert!(cfg.dither().is_err());
        let cfg = DitherConfig {
            palette: "cga".into(),
            ..DitherConfig::default()
        };
        assert!(cfg.palette().is_err());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let cfg = DitherConfig {
            algorithm: "bayer-2x2".into(),
            strength: 3.0,
            ..DitherConfig::default()
        };
        assert!(cfg.dither().is_err());
        let cfg = DitherConfig {
            algorithm: "random".into(),
            weight: 200,
            ..DitherConfig::default()
        };
        assert!(cfg.dither().is_err());
    }

    #[test]
    fn missing_file_falls_back() {
        let cfg = PlayerConfig::load(Path::new("/nonexistent/mapcast.toml"));
        assert_eq!(cfg.source.frame_rate, 30.0);
    }
}
