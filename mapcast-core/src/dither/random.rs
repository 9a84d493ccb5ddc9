//! Random-threshold dithering.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::MapcastError;
use crate::media::unpack_rgb;
use crate::palette::Palette;

/// No noise; equivalent to plain nearest-colour matching.
pub const MIN_WEIGHT: u8 = 0;
/// Default noise amplitude.
pub const NORMAL_WEIGHT: u8 = 64;
/// Largest supported noise amplitude.
pub const MAX_WEIGHT: u8 = 128;

/// Adds uniform noise in `[-weight, weight]` to each channel before
/// matching.
///
/// With a fixed `seed` every frame receives the same noise field, so a
/// static picture stays static. Without one, noise is drawn fresh from
/// the thread-local generator on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RandomThreshold {
    weight: u8,
    seed: Option<u64>,
}

impl RandomThreshold {
    pub fn new(weight: u8) -> Result<Self, MapcastError> {
        if weight > MAX_WEIGHT {
            return Err(MapcastError::InvalidConfig(format!(
                "random weight {weight} exceeds {MAX_WEIGHT}"
            )));
        }
        Ok(Self { weight, seed: None })
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn weight(&self) -> u8 {
        self.weight
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub(crate) fn quantize(&self, palette: &Palette, pixels: &[u32], out: &mut [u8]) {
        match self.seed {
            Some(seed) => self.run(&mut SmallRng::seed_from_u64(seed), palette, pixels, out),
            None => self.run(&mut rand::rng(), palette, pixels, out),
        }
    }

    fn run<R: Rng>(&self, rng: &mut R, palette: &Palette, pixels: &[u32], out: &mut [u8]) {
        let w = self.weight as i32;
        if w == 0 {
            for (&p, o) in pixels.iter().zip(out.iter_mut()) {
                let (r, g, b) = unpack_rgb(p);
                *o = palette.nearest(r, g, b);
            }
            return;
        }
        let mut jitter = |c: u8| (c as i32 + rng.random_range(-w..=w)).clamp(0, 255) as u8;
        for (&p, o) in pixels.iter().zip(out.iter_mut()) {
            let (r, g, b) = unpack_rgb(p);
            let (r, g, b) = (jitter(r), jitter(g), jitter(b));
            *o = palette.nearest(r, g, b);
        }
    }
}
