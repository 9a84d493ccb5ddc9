//! Fixed colour palettes and nearest-colour matching.
//!
//! [`Palette::nearest`] is the single matching primitive every dither
//! variant calls into. It is total and deterministic: each RGB triple maps
//! to exactly one index, ties going to the lowest index.

use crate::error::MapcastError;
use crate::media::unpack_rgb;

/// Number of entries addressable by a byte-sized colour index.
pub const MAX_PALETTE_ENTRIES: usize = 256;

/// Side of the 7-bit-per-channel lookup cube.
const LUT_SIDE: usize = 128;

// ── Palette ──────────────────────────────────────────────────────

/// Ordered, immutable list of representable colours.
#[derive(Debug, Clone)]
pub struct Palette {
    /// Colours as `0x00RRGGBB`.
    colors: Vec<u32>,
    /// Optional `128³` table of precomputed nearest indices.
    lookup: Option<Box<[u8]>>,
}

impl Palette {
    /// Build a palette from packed RGB colours (alpha is ignored).
    pub fn from_rgb(colors: &[u32]) -> Result<Self, MapcastError> {
        if colors.is_empty() {
            return Err(MapcastError::InvalidPalette("palette is empty".into()));
        }
        if colors.len() > MAX_PALETTE_ENTRIES {
            return Err(MapcastError::InvalidPalette(format!(
                "{} entries exceed the byte index range ({MAX_PALETTE_ENTRIES})",
                colors.len()
            )));
        }
        Ok(Self {
            colors: colors.iter().map(|c| c & 0x00FF_FFFF).collect(),
            lookup: None,
        })
    }

    /// `levels` evenly spaced greys from black to white.
    pub fn grayscale(levels: usize) -> Result<Self, MapcastError> {
        if !(2..=MAX_PALETTE_ENTRIES).contains(&levels) {
            return Err(MapcastError::InvalidPalette(format!(
                "grayscale needs 2..=256 levels, got {levels}"
            )));
        }
        let colors: Vec<u32> = (0..levels)
            .map(|i| {
                let v = (i * 255 / (levels - 1)) as u32;
                (v << 16) | (v << 8) | v
            })
            .collect();
        Self::from_rgb(&colors)
    }

    /// Uniform RGB cube with `levels` steps per channel (`levels³` entries).
    ///
    /// `rgb_cube(4)` is the common 64-colour palette.
    pub fn rgb_cube(levels: usize) -> Result<Self, MapcastError> {
        if !(2..=6).contains(&levels) {
            return Err(MapcastError::InvalidPalette(format!(
                "rgb cube needs 2..=6 levels per channel, got {levels}"
            )));
        }
        let step = |i: usize| (i * 255 / (levels - 1)) as u32;
        let mut colors = Vec::with_capacity(levels * levels * levels);
        for r in 0..levels {
            for g in 0..levels {
                for b in 0..levels {
                    colors.push((step(r) << 16) | (step(g) << 8) | step(b));
                }
            }
        }
        Self::from_rgb(&colors)
    }

    /// Precompute a 7-bit-per-channel nearest-index table.
    ///
    /// Lookups become O(1) at the cost of ignoring the lowest bit of each
    /// channel. Construction visits all `128³` cells once.
    pub fn with_lookup_table(mut self) -> Self {
        let mut table = vec![0u8; LUT_SIDE * LUT_SIDE * LUT_SIDE].into_boxed_slice();
        for r in 0..LUT_SIDE {
            for g in 0..LUT_SIDE {
                let base = (r << 14) | (g << 7);
                for b in 0..LUT_SIDE {
                    table[base | b] =
                        self.nearest_exact((r << 1) as u8, (g << 1) as u8, (b << 1) as u8);
                }
            }
        }
        self.lookup = Some(table);
        self
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    /// Always `false`; construction rejects empty palettes.
    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// All colours in index order.
    pub fn colors(&self) -> &[u32] {
        &self.colors
    }

    /// Colour at `index`, or black for an index past the end.
    #[inline]
    pub fn color(&self, index: u8) -> u32 {
        self.colors.get(index as usize).copied().unwrap_or(0)
    }

    /// Whether lookups go through the precomputed table.
    pub fn has_lookup_table(&self) -> bool {
        self.lookup.is_some()
    }

    /// Index of the palette entry nearest to `(r, g, b)`.
    #[inline]
    pub fn nearest(&self, r: u8, g: u8, b: u8) -> u8 {
        match &self.lookup {
            Some(table) => {
                table[((r as usize >> 1) << 14) | ((g as usize >> 1) << 7) | (b as usize >> 1)]
            }
            None => self.nearest_exact(r, g, b),
        }
    }

    /// Nearest entry by full-precision squared Euclidean distance.
    pub fn nearest_exact(&self, r: u8, g: u8, b: u8) -> u8 {
        let mut best = 0usize;
        let mut best_dist = u32::MAX;
        for (i, &c) in self.colors.iter().enumerate() {
            let (pr, pg, pb) = unpack_rgb(c);
            let dr = r as i32 - pr as i32;
            let dg = g as i32 - pg as i32;
            let db = b as i32 - pb as i32;
            let dist = (dr * dr + dg * dg + db * db) as u32;
            // Strict comparison keeps the first index on ties.
            if dist < best_dist {
                best_dist = dist;
                best = i;
                if dist == 0 {
                    break;
                }
            }
        }
        best as u8
    }

    /// Packed colour of the entry nearest to `(r, g, b)`.
    #[inline]
    pub fn nearest_color(&self, r: u8, g: u8, b: u8) -> u32 {
        self.colors[self.nearest(r, g, b) as usize]
    }

    /// Map every pixel to its nearest index without any perturbation.
    pub fn simplify(&self, pixels: &[u32]) -> Vec<u8> {
        pixels
            .iter()
            .map(|&p| {
                let (r, g, b) = unpack_rgb(p);
                self.nearest(r, g, b)
            })
            .collect()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(Palette::from_rgb(&[]).is_err());
        let too_many: Vec<u32> = (0..257).collect();
        assert!(Palette::from_rgb(&too_many).is_err());
    }

    #[test]
    fn builtin_sizes() {
        assert_eq!(Palette::grayscale(4).unwrap().len(), 4);
        assert_eq!(Palette::rgb_cube(4).unwrap().len(), 64);
        assert!(Palette::rgb_cube(7).is_err());
    }

    #[test]
    fn grayscale_levels() {
        let p = Palette::grayscale(4).unwrap();
        assert_eq!(p.colors(), &[0x000000, 0x555555, 0xAAAAAA, 0xFFFFFF]);
    }

    #[test]
    fn nearest_is_deterministic() {
        let p = Palette::rgb_cube(4).unwrap();
        for rgb in [0x000000u32, 0x123456, 0x7F7F7F, 0xFFFFFF, 0xC0FFEE] {
            let (r, g, b) = unpack_rgb(rgb);
            assert_eq!(p.nearest(r, g, b), p.nearest(r, g, b));
        }
    }

    #[test]
    fn exact_entries_map_to_themselves() {
        let p = Palette::rgb_cube(4).unwrap();
        for (i, &c) in p.colors().iter().enumerate() {
            let (r, g, b) = unpack_rgb(c);
            assert_eq!(p.nearest(r, g, b) as usize, i);
        }
    }

    #[test]
    fn ties_go_to_first_index() {
        // (1, 1, 1) is equidistant from both entries.
        let p = Palette::from_rgb(&[0x000000, 0x020202]).unwrap();
        assert_eq!(p.nearest(1, 1, 1), 0);

        let p = Palette::from_rgb(&[0x020202, 0x000000]).unwrap();
        assert_eq!(p.nearest(1, 1, 1), 0);
    }

    #[test]
    fn duplicate_entries_resolve_to_first() {
        let p = Palette::from_rgb(&[0xFF0000, 0x00FF00, 0xFF0000]).unwrap();
        assert_eq!(p.nearest(250, 0, 0), 0);
    }

    #[test]
    fn lookup_table_agrees_on_even_channels() {
        let p = Palette::grayscale(4).unwrap();
        let exact = p.clone();
        let p = p.with_lookup_table();
        assert!(p.has_lookup_table());
        for v in (0..=254u8).step_by(2) {
            assert_eq!(p.nearest(v, v, v), exact.nearest_exact(v, v, v));
        }
    }

    #[test]
    fn simplify_maps_each_pixel() {
        let p = Palette::grayscale(2).unwrap();
        assert_eq!(p.simplify(&[0x101010, 0xF0F0F0]), vec![0, 1]);
    }
}
