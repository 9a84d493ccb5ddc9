//! Palette quantization with optional dithering.
//!
//! A [`Quantizer`] pairs a shared [`Palette`] with one [`Dither`] variant.
//! The variant is fixed at construction and dispatched once per frame, so
//! the per-pixel loops stay monomorphic.

pub mod diffusion;
pub mod ordered;
pub mod random;

use std::sync::Arc;

use crate::error::MapcastError;
use crate::media::Frame;
use crate::palette::Palette;

pub use diffusion::{ErrorDiffusion, Kernel, Tap};
pub use ordered::{Pattern, ThresholdMatrix};
pub use random::RandomThreshold;

/// How residual quantization error is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dither {
    /// Plain nearest-colour matching.
    Nearest,
    /// Propagate error to neighbours; rows depend on earlier rows.
    ErrorDiffusion(ErrorDiffusion),
    /// Position-dependent threshold offsets.
    Ordered(ThresholdMatrix),
    /// Uniform per-channel noise.
    Random(RandomThreshold),
}

impl Dither {
    /// Whether each output index depends only on its own input pixel.
    ///
    /// Such variants can quantize disjoint regions of a frame independently.
    pub fn is_pointwise(&self) -> bool {
        !matches!(self, Dither::ErrorDiffusion(_))
    }

    /// Short human-readable name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Dither::Nearest => "nearest",
            Dither::ErrorDiffusion(d) => d.kernel().name(),
            Dither::Ordered(_) => "ordered",
            Dither::Random(_) => "random",
        }
    }
}

// ── Quantizer ────────────────────────────────────────────────────

/// Maps packed RGB pixels to palette indices.
#[derive(Debug, Clone)]
pub struct Quantizer {
    palette: Arc<Palette>,
    dither: Dither,
}

impl Quantizer {
    pub fn new(palette: Arc<Palette>, dither: Dither) -> Self {
        Self { palette, dither }
    }

    /// Nearest-colour matching with no dithering.
    pub fn nearest(palette: Arc<Palette>) -> Self {
        Self::new(palette, Dither::Nearest)
    }

    pub fn palette(&self) -> &Arc<Palette> {
        &self.palette
    }

    pub fn dither(&self) -> &Dither {
        &self.dither
    }

    /// Quantize a row-major buffer of the given width.
    ///
    /// Output has one index per input pixel.
    pub fn quantize(&self, pixels: &[u32], width: usize) -> Result<Vec<u8>, MapcastError> {
        let mut out = vec![0u8; pixels.len()];
        self.quantize_into(pixels, width, &mut out)?;
        Ok(out)
    }

    /// Quantize a whole frame.
    pub fn quantize_frame(&self, frame: &Frame) -> Result<Vec<u8>, MapcastError> {
        self.quantize(frame.pixels(), frame.width() as usize)
    }

    /// Quantize into a caller-provided index buffer of the same length.
    pub fn quantize_into(
        &self,
        pixels: &[u32],
        width: usize,
        out: &mut [u8],
    ) -> Result<(), MapcastError> {
        let height = check_dimensions(pixels.len(), width)?;
        if out.len() != pixels.len() {
            return Err(MapcastError::BufferMismatch {
                expected: pixels.len(),
                actual: out.len(),
            });
        }
        if pixels.is_empty() {
            return Ok(());
        }

        let palette = self.palette.as_ref();
        match &self.dither {
            Dither::Nearest => {
                for (&p, o) in pixels.iter().zip(out.iter_mut()) {
                    let (r, g, b) = crate::media::unpack_rgb(p);
                    *o = palette.nearest(r, g, b);
                }
            }
            Dither::ErrorDiffusion(d) => d.quantize(palette, pixels, width, height, out),
            Dither::Ordered(m) => m.quantize(palette, pixels, width, out),
            Dither::Random(r) => r.quantize(palette, pixels, out),
        }
        Ok(())
    }

    /// Replace every pixel with the palette colour it quantizes to.
    pub fn quantize_in_place(&self, pixels: &mut [u32], width: usize) -> Result<(), MapcastError> {
        let indices = self.quantize(pixels, width)?;
        for (p, i) in pixels.iter_mut().zip(indices) {
            *p = self.palette.color(i);
        }
        Ok(())
    }
}

/// Returns the row count for a `len`-pixel buffer `width` pixels wide.
fn check_dimensions(len: usize, width: usize) -> Result<usize, MapcastError> {
    if width == 0 {
        return Err(MapcastError::InvalidDimensions("width is zero".into()));
    }
    if len % width != 0 {
        return Err(MapcastError::InvalidDimensions(format!(
            "{len} pixels is not a whole number of {width}-pixel rows"
        )));
    }
    Ok(len / width)
}

// ── Tests ────────────────────────────────────────────────────────
