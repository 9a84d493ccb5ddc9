//! Error-diffusion dithering with named kernels.
//!
//! Pixels are visited in raster order (optionally serpentine). After a
//! pixel is matched to its nearest palette entry, the per-channel residual
//! is spread over not-yet-visited neighbours according to the kernel's
//! weight table. Accumulated error lives in a small ring of row buffers
//! sized to the kernel's vertical reach; nothing is allocated per pixel.

use crate::media::unpack_rgb;
use crate::palette::Palette;

// ── Kernel ───────────────────────────────────────────────────────

/// One error-propagation target relative to the current pixel.
///
/// `dx` is mirrored on right-to-left rows of a serpentine scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tap {
    pub dx: i8,
    pub dy: u8,
    pub weight: u16,
}

const fn tap(dx: i8, dy: u8, weight: u16) -> Tap {
    Tap { dx, dy, weight }
}

/// A named, fixed error-propagation weight table.
///
/// Each tap receives `error * weight / divisor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Kernel {
    name: &'static str,
    divisor: i32,
    taps: &'static [Tap],
}

impl Kernel {
    pub const FLOYD_STEINBERG: Kernel = Kernel {
        name: "floyd-steinberg",
        divisor: 16,
        taps: &[tap(1, 0, 7), tap(-1, 1, 3), tap(0, 1, 5), tap(1, 1, 1)],
    };

    /// Propagates only 6/8 of the error, trading accuracy for contrast.
    pub const ATKINSON: Kernel = Kernel {
        name: "atkinson",
        divisor: 8,
        taps: &[
            tap(1, 0, 1),
            tap(2, 0, 1),
            tap(-1, 1, 1),
            tap(0, 1, 1),
            tap(1, 1, 1),
            tap(0, 2, 1),
        ],
    };

    pub const BURKES: Kernel = Kernel {
        name: "burkes",
        divisor: 32,
        taps: &[
            tap(1, 0, 8),
            tap(2, 0, 4),
            tap(-2, 1, 2),
            tap(-1, 1, 4),
            tap(0, 1, 8),
            tap(1, 1, 4),
            tap(2, 1, 2),
        ],
    };

    pub const STUCKI: Kernel = Kernel {
        name: "stucki",
        divisor: 42,
        taps: &[
            tap(1, 0, 8),
            tap(2, 0, 4),
            tap(-2, 1, 2),
            tap(-1, 1, 4),
            tap(0, 1, 8),
            tap(1, 1, 4),
            tap(2, 1, 2),
            tap(-2, 2, 1),
            tap(-1, 2, 2),
            tap(0, 2, 4),
            tap(1, 2, 2),
            tap(2, 2, 1),
        ],
    };

    pub const JARVIS_JUDICE_NINKE: Kernel = Kernel {
        name: "jarvis-judice-ninke",
        divisor: 48,
        taps: &[
            tap(1, 0, 7),
            tap(2, 0, 5),
            tap(-2, 1, 3),
            tap(-1, 1, 5),
            tap(0, 1, 7),
            tap(1, 1, 5),
            tap(2, 1, 3),
            tap(-2, 2, 1),
            tap(-1, 2, 3),
            tap(0, 2, 5),
            tap(1, 2, 3),
            tap(2, 2, 1),
        ],
    };

    /// Sierra Lite, sometimes called "filter lite".
    pub const SIERRA_LITE: Kernel = Kernel {
        name: "sierra-lite",
        divisor: 4,
        taps: &[tap(1, 0, 2), tap(-1, 1, 1), tap(0, 1, 1)],
    };

    pub const STEVENSON_ARCE: Kernel = Kernel {
        name: "stevenson-arce",
        divisor: 200,
        taps: &[
            tap(2, 0, 32),
            tap(-3, 1, 12),
            tap(-1, 1, 26),
            tap(1, 1, 30),
            tap(3, 1, 16),
            tap(-2, 2, 12),
            tap(0, 2, 26),
            tap(2, 2, 12),
            tap(-3, 3, 5),
            tap(-1, 3, 12),
            tap(1, 3, 12),
            tap(3, 3, 5),
        ],
    };

    /// Every built-in kernel.
    pub const ALL: [Kernel; 7] = [
        Kernel::FLOYD_STEINBERG,
        Kernel::ATKINSON,
        Kernel::BURKES,
        Kernel::STUCKI,
        Kernel::JARVIS_JUDICE_NINKE,
        Kernel::SIERRA_LITE,
        Kernel::STEVENSON_ARCE,
    ];

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn divisor(&self) -> i32 {
        self.divisor
    }

    pub fn taps(&self) -> &'static [Tap] {
        self.taps
    }

    /// Largest horizontal distance any tap reaches.
    pub fn horizontal_reach(&self) -> usize {
        self.taps
            .iter()
            .map(|t| t.dx.unsigned_abs() as usize)
            .max()
            .unwrap_or(0)
    }

    /// Number of rows below the current one that receive error.
    pub fn vertical_reach(&self) -> usize {
        self.taps.iter().map(|t| t.dy as usize).max().unwrap_or(0)
    }
}

// ── ErrorDiffusion ───────────────────────────────────────────────

/// Error-diffusion quantizer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorDiffusion {
    kernel: Kernel,
    serpentine: bool,
}

impl ErrorDiffusion {
    /// Raster-order diffusion with `kernel`.
    pub fn new(kernel: Kernel) -> Self {
        Self {
            kernel,
            serpentine: false,
        }
    }

    /// Alternate scan direction on every other row.
    pub fn serpentine(mut self, serpentine: bool) -> Self {
        self.serpentine = serpentine;
        self
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    pub fn is_serpentine(&self) -> bool {
        self.serpentine
    }

    /// Quantize `pixels` (`width × height`) into palette indices.
    ///
    /// Callers guarantee `pixels.len() == out.len() == width * height`.
    pub(crate) fn quantize(
        &self,
        palette: &Palette,
        pixels: &[u32],
        width: usize,
        height: usize,
        out: &mut [u8],
    ) {
        let kernel = &self.kernel;
        let pad = kernel.horizontal_reach();
        let rows = kernel.vertical_reach() + 1;
        let stride = (width + 2 * pad) * 3;
        let divisor = kernel.divisor;

        // errors[(y + dy) % rows] accumulates weighted residuals for row y + dy.
        let mut errors = vec![vec![0i32; stride]; rows];

        for y in 0..height {
            let cur = y % rows;
            let reverse = self.serpentine && y & 1 == 1;

            for step in 0..width {
                let x = if reverse { width - 1 - step } else { step };
                let index = y * width + x;
                let col = (x + pad) * 3;

                let (r, g, b) = unpack_rgb(pixels[index]);
                let acc = &errors[cur];
                let red = (r as i32 + acc[col] / divisor).clamp(0, 255);
                let green = (g as i32 + acc[col + 1] / divisor).clamp(0, 255);
                let blue = (b as i32 + acc[col + 2] / divisor).clamp(0, 255);

                let chosen = palette.nearest(red as u8, green as u8, blue as u8);
                out[index] = chosen;

                let (pr, pg, pb) = unpack_rgb(palette.color(chosen));
                let delta = [red - pr as i32, green - pg as i32, blue - pb as i32];
                if delta == [0, 0, 0] {
                    continue;
                }

                for t in kernel.taps {
                    let ty = y + t.dy as usize;
                    if ty >= height {
                        continue;
                    }
                    let dx = if reverse { -(t.dx as isize) } else { t.dx as isize };
                    // Padding columns absorb taps that fall off either edge.
                    let target = ((x + pad) as isize + dx) as usize * 3;
                    let row = &mut errors[ty % rows];
                    let w = t.weight as i32;
                    row[target] += delta[0] * w;
                    row[target + 1] += delta[1] * w;
                    row[target + 2] += delta[2] * w;
                }
            }

            errors[cur].fill(0);
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_weights_stay_within_divisor() {
        for k in Kernel::ALL {
            let total: i32 = k.taps().iter().map(|t| t.weight as i32).sum();
            assert!(total <= k.divisor(), "{} spreads more than 100%", k.name());
            assert!(
                k.taps().iter().all(|t| t.dy > 0 || t.dx > 0),
                "{} pushes error backwards",
                k.name()
            );
        }
    }

    #[test]
    fn reach() {
        assert_eq!(Kernel::FLOYD_STEINBERG.horizontal_reach(), 1);
        assert_eq!(Kernel::FLOYD_STEINBERG.vertical_reach(), 1);
        assert_eq!(Kernel::STEVENSON_ARCE.horizontal_reach(), 3);
        assert_eq!(Kernel::STEVENSON_ARCE.vertical_reach(), 3);
        assert_eq!(Kernel::ATKINSON.vertical_reach(), 2);
    }

    #[test]
    fn exact_palette_colors_pass_through() {
        let palette = Palette::grayscale(4).unwrap();
        let pixels = vec![0x000000, 0x555555, 0xAAAAAA, 0xFFFFFF];
        let mut out = vec![0u8; 4];
        ErrorDiffusion::new(Kernel::FLOYD_STEINBERG).quantize(&palette, &pixels, 2, 2, &mut out);
        assert_eq!(out, vec![0, 1, 2, 3]);
    }

    #[test]
    fn single_column_image() {
        let palette = Palette::grayscale(2).unwrap();
        let pixels = vec![0x808080; 9];
        let mut out = vec![0u8; 9];
        ErrorDiffusion::new(Kernel::STEVENSON_ARCE)
            .serpentine(true)
            .quantize(&palette, &pixels, 1, 9, &mut out);
        assert!(out.iter().all(|&i| i <= 1));
    }
}
