//! Ordered (threshold-matrix) dithering.
//!
//! Every pixel is offset by a value read from a small tiled matrix before
//! nearest-colour matching. Output for a pixel depends only on its own
//! value and position, so frames may be split across threads freely.

use crate::error::MapcastError;
use crate::media::unpack_rgb;
use crate::palette::Palette;

/// Strength that disables perturbation entirely.
pub const MIN_STRENGTH: f32 = 0.0;
/// Default strength.
pub const NORMAL_STRENGTH: f32 = 1.0;
/// Strongest supported perturbation.
pub const MAX_STRENGTH: f32 = 2.0;

// ── Pattern ──────────────────────────────────────────────────────

/// A threshold pattern: rows of rank values plus the maximum rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pattern {
    pub rows: &'static [&'static [u32]],
    pub max: u32,
}

impl Pattern {
    pub const BAYER_2X2: Pattern = Pattern {
        rows: &[&[1, 3], &[4, 2]],
        max: 4,
    };

    pub const BAYER_4X4: Pattern = Pattern {
        rows: &[
            &[1, 9, 3, 11],
            &[13, 5, 15, 7],
            &[4, 12, 2, 10],
            &[16, 8, 14, 6],
        ],
        max: 16,
    };

    pub const BAYER_8X8: Pattern = Pattern {
        rows: &[
            &[1, 49, 13, 61, 4, 52, 16, 64],
            &[33, 17, 45, 29, 36, 20, 48, 32],
            &[9, 57, 5, 53, 12, 60, 8, 56],
            &[41, 25, 37, 21, 44, 28, 40, 24],
            &[3, 51, 15, 63, 2, 50, 14, 62],
            &[35, 19, 47, 31, 34, 18, 46, 30],
            &[11, 59, 7, 55, 10, 58, 6, 54],
            &[43, 27, 39, 23, 42, 26, 38, 22],
        ],
        max: 64,
    };

    /// 45-degree clustered dots, newspaper halftone look.
    pub const CLUSTERED_DOT_DIAGONAL_8X8: Pattern = Pattern {
        rows: &[
            &[24, 10, 12, 26, 35, 47, 49, 37],
            &[8, 0, 2, 14, 45, 59, 61, 51],
            &[22, 6, 4, 16, 43, 57, 63, 53],
            &[30, 20, 18, 28, 33, 41, 55, 39],
            &[34, 46, 48, 36, 25, 11, 13, 27],
            &[44, 58, 60, 50, 9, 1, 3, 15],
            &[42, 56, 62, 52, 23, 7, 5, 17],
            &[32, 40, 54, 38, 31, 21, 19, 29],
        ],
        max: 64,
    };

    pub const CLUSTERED_DOT_DIAGONAL_6X6: Pattern = Pattern {
        rows: &[
            &[8, 6, 7, 9, 11, 10],
            &[5, 0, 1, 12, 17, 16],
            &[4, 3, 2, 13, 14, 15],
            &[9, 11, 10, 8, 6, 8],
            &[12, 17, 16, 5, 0, 1],
            &[13, 14, 15, 4, 3, 2],
        ],
        max: 18,
    };

    pub const CLUSTERED_DOT_6X6: Pattern = Pattern {
        rows: &[
            &[34, 29, 17, 21, 30, 35],
            &[28, 14, 9, 16, 20, 31],
            &[13, 8, 4, 5, 15, 19],
            &[12, 3, 0, 1, 10, 18],
            &[27, 7, 2, 6, 23, 24],
            &[33, 26, 11, 22, 25, 32],
        ],
        max: 36,
    };

    /// Dots grow outward from the centre in a spiral.
    pub const SPIRAL_5X5: Pattern = Pattern {
        rows: &[
            &[20, 21, 22, 23, 24],
            &[19, 6, 7, 8, 9],
            &[18, 5, 0, 1, 10],
            &[17, 4, 3, 2, 11],
            &[16, 15, 14, 13, 12],
        ],
        max: 25,
    };

    /// Produces vertical line artifacts.
    pub const VERTICAL_5X3: Pattern = Pattern {
        rows: &[&[9, 3, 0, 6, 12], &[10, 4, 1, 7, 13], &[11, 5, 2, 8, 14]],
        max: 15,
    };

    pub const HORIZONTAL_3X5: Pattern = Pattern {
        rows: &[&[9, 10, 11], &[3, 4, 5], &[0, 1, 2], &[6, 7, 8], &[12, 13, 14]],
        max: 15,
    };
}

// ── ThresholdMatrix ──────────────────────────────────────────────

/// A precomputed matrix of signed 8-bit offsets, tiled over the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdMatrix {
    width: usize,
    height: usize,
    offsets: Box<[i32]>,
}

impl ThresholdMatrix {
    /// Build from a static pattern at the given strength.
    pub fn from_pattern(pattern: Pattern, strength: f32) -> Result<Self, MapcastError> {
        let rows: Vec<Vec<u32>> = pattern.rows.iter().map(|r| r.to_vec()).collect();
        Self::new(&rows, pattern.max, strength)
    }

    /// Build from rank values `v` in `0..=max`.
    ///
    /// Each offset is `65535 * strength * ((v + 1) / max - 0.5)` in 16-bit
    /// channel units, rescaled to 8-bit channels.
    ///
    /// The offsets are not zero-mean. For tables holding every rank in
    /// `1..=max` the mean lift is `255 * strength * 1.5 / max`, about +96 for
    /// a 2×2 Bayer table at normal strength, so small tables brighten the
    /// output noticeably.
    pub fn new(rows: &[Vec<u32>], max: u32, strength: f32) -> Result<Self, MapcastError> {
        if rows.is_empty() || rows[0].is_empty() {
            return Err(MapcastError::InvalidConfig("threshold matrix is empty".into()));
        }
        let width = rows[0].len();
        if rows.iter().any(|r| r.len() != width) {
            return Err(MapcastError::InvalidConfig(
                "threshold matrix rows differ in length".into(),
            ));
        }
        if max == 0 {
            return Err(MapcastError::InvalidConfig("threshold matrix max is zero".into()));
        }
        if !(MIN_STRENGTH..=MAX_STRENGTH).contains(&strength) {
            return Err(MapcastError::InvalidConfig(format!(
                "ordered strength {strength} outside {MIN_STRENGTH}..={MAX_STRENGTH}"
            )));
        }

        let scale = 65535.0 * strength as f64;
        let offsets = rows
            .iter()
            .flatten()
            .map(|&v| {
                let wide = scale * ((v as f64 + 1.0) / max as f64 - 0.5);
                (wide / 257.0).round() as i32
            })
            .collect();

        Ok(Self {
            width,
            height: rows.len(),
            offsets,
        })
    }

    /// Recursive Bayer matrix of side `size` (a power of two, at least 2).
    pub fn bayer(size: usize, strength: f32) -> Result<Self, MapcastError> {
        if size < 2 || !size.is_power_of_two() {
            return Err(MapcastError::InvalidConfig(format!(
                "bayer size must be a power of two >= 2, got {size}"
            )));
        }
        let mut m = vec![vec![0u32]];
        while m.len() < size {
            let n = m.len();
            let mut next = vec![vec![0u32; n * 2]; n * 2];
            for y in 0..n {
                for x in 0..n {
                    let v = 4 * m[y][x];
                    next[y][x] = v;
                    next[y][x + n] = v + 2;
                    next[y + n][x] = v + 3;
                    next[y + n][x + n] = v + 1;
                }
            }
            m = next;
        }
        // Ranks run 1..=size², matching the static tables.
        let ranks: Vec<Vec<u32>> = m
            .into_iter()
            .map(|row| row.into_iter().map(|v| v + 1).collect())
            .collect();
        Self::new(&ranks, (size * size) as u32, strength)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Offset applied at frame position `(x, y)`.
    #[inline]
    pub fn offset(&self, x: usize, y: usize) -> i32 {
        self.offsets[(y % self.height) * self.width + x % self.width]
    }

    pub(crate) fn quantize(&self, palette: &Palette, pixels: &[u32], width: usize, out: &mut [u8]) {
        for (y, (row, dst)) in pixels
            .chunks_exact(width)
            .zip(out.chunks_exact_mut(width))
            .enumerate()
        {
            for (x, (&p, o)) in row.iter().zip(dst.iter_mut()).enumerate() {
                let t = self.offset(x, y);
                let (r, g, b) = unpack_rgb(p);
                *o = palette.nearest(
                    (r as i32 + t).clamp(0, 255) as u8,
                    (g as i32 + t).clamp(0, 255) as u8,
                    (b as i32 + t).clamp(0, 255) as u8,
                );
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
