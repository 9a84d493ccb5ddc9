//! Shared media types used between pipeline stages.
//!
//! A [`Frame`] or [`AudioChunk`] is owned by exactly one stage at a time:
//! the pull loop hands it to a worker queue by value, the worker moves it
//! through its chain, and it is dropped once the last step returns.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::MapcastError;

// ── Pixel helpers ────────────────────────────────────────────────

/// Packs 8-bit channels into a `0x00RRGGBB` word.
#[inline]
pub const fn pack_rgb(r: u8, g: u8, b: u8) -> u32 {
    ((r as u32) << 16) | ((g as u32) << 8) | b as u32
}

/// Splits a packed `0x??RRGGBB` word into its colour channels.
#[inline]
pub const fn unpack_rgb(rgb: u32) -> (u8, u8, u8) {
    ((rgb >> 16) as u8, (rgb >> 8) as u8, rgb as u8)
}

// ── Frame ────────────────────────────────────────────────────────

/// A decoded video frame in packed 32-bit RGB layout.
///
/// Invariant: `pixels.len() == width * height`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Vec<u32>,
    /// Presentation timestamp in microseconds.
    pub timestamp_us: i64,
}

impl Frame {
    /// Wrap a pixel buffer, checking it matches the declared dimensions.
    pub fn new(
        width: u32,
        height: u32,
        pixels: Vec<u32>,
        timestamp_us: i64,
    ) -> Result<Self, MapcastError> {
        if width == 0 || height == 0 {
            return Err(MapcastError::InvalidDimensions(format!(
                "frame must be non-empty, got {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(MapcastError::BufferMismatch {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
            timestamp_us,
        })
    }

    /// A frame filled with a single colour.
    pub fn solid(width: u32, height: u32, rgb: u32, timestamp_us: i64) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            pixels: vec![rgb; width.max(1) as usize * height.max(1) as usize],
            timestamp_us,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }

    /// Consume the frame, returning its pixel buffer.
    pub fn into_pixels(self) -> Vec<u32> {
        self.pixels
    }

    /// Returns a row slice.
    pub fn row(&self, y: u32) -> &[u32] {
        let start = y as usize * self.width as usize;
        &self.pixels[start..start + self.width as usize]
    }

    /// Returns the packed pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> u32 {
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    /// Overwrite the rectangle at `(x, y)` of size `w × h` with one colour,
    /// clipped to the frame.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, rgb: u32) {
        let x = x.min(self.width);
        let y = y.min(self.height);
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);
        for yy in y..y_end {
            let start = yy as usize * self.width as usize;
            self.pixels[start + x as usize..start + x_end as usize].fill(rgb);
        }
    }
}

// ── AudioChunk ───────────────────────────────────────────────────

/// A block of interleaved PCM audio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Raw little-endian PCM bytes.
    pub data: Bytes,
    pub channels: u16,
    pub sample_rate: u32,
    /// Presentation timestamp in microseconds.
    pub timestamp_us: i64,
}

impl AudioChunk {
    /// Duration of this chunk in microseconds, assuming 16-bit samples.
    pub fn duration_us(&self) -> i64 {
        let frame_bytes = self.channels.max(1) as i64 * 2;
        let frames = self.data.len() as i64 / frame_bytes;
        frames * 1_000_000 / self.sample_rate.max(1) as i64
    }
}

// ── MediaUnit ────────────────────────────────────────────────────

/// One unit pulled off a decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaUnit {
    Video(Frame),
    Audio(AudioChunk),
}

impl MediaUnit {
    pub fn timestamp_us(&self) -> i64 {
        match self {
            MediaUnit::Video(f) => f.timestamp_us,
            MediaUnit::Audio(a) => a.timestamp_us,
        }
    }
}

// ── Metadata ─────────────────────────────────────────────────────

/// Read-only video stream properties reported by a source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub width: u32,
    pub height: u32,
    /// Frames per second; `0.0` when the source does not know.
    pub frame_rate: f32,
}

/// Read-only audio stream properties reported by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioMetadata {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for AudioMetadata {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
        }
    }
}

/// Immutable metadata handed to every pipeline step alongside its unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StreamMetadata {
    pub video: VideoMetadata,
    pub audio: AudioMetadata,
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_mismatched_buffer() {
        let err = Frame::new(4, 4, vec![0; 15], 0).unwrap_err();
        assert!(matches!(
            err,
            MapcastError::BufferMismatch {
                expected: 16,
                actual: 15
            }
        ));
    }

    #[test]
    fn frame_rejects_zero_dimensions() {
        assert!(Frame::new(0, 4, vec![], 0).is_err());
    }

    #[test]
    fn pack_unpack() {
        let rgb = pack_rgb(0x12, 0x34, 0x56);
        assert_eq!(rgb, 0x123456);
        assert_eq!(unpack_rgb(0xFF12_3456), (0x12, 0x34, 0x56));
    }

    #[test]
    fn fill_rect_clips() {
        let mut f = Frame::solid(8, 8, 0, 0);
        f.fill_rect(6, 6, 4, 4, 0xFFFFFF);
        assert_eq!(f.pixel(7, 7), 0xFFFFFF);
        assert_eq!(f.pixel(5, 5), 0);
        assert_eq!(f.row(6)[6..], [0xFFFFFF, 0xFFFFFF]);

        // Entirely outside, or large enough to overflow.
        let mut g = Frame::solid(8, 8, 0, 0);
        g.fill_rect(10, 0, 2, 2, 0xFFFFFF);
        g.fill_rect(0, 9, 2, 2, 0xFFFFFF);
        assert!(g.pixels().iter().all(|&p| p == 0));
        g.fill_rect(4, 4, u32::MAX, u32::MAX, 0xFFFFFF);
        assert_eq!(g.pixel(7, 7), 0xFFFFFF);
        assert_eq!(g.pixel(3, 3), 0);
    }

    #[test]
    fn audio_duration() {
        let chunk = AudioChunk {
            data: Bytes::from(vec![0u8; 48_000 * 2 * 2 / 100]),
            channels: 2,
            sample_rate: 48_000,
            timestamp_us: 0,
        };
        assert_eq!(chunk.duration_us(), 10_000);
    }
}
