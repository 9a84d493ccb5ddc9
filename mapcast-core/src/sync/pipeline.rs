//! Ordered chains of per-unit processing steps.
//!
//! A chain is built once before playback and moved into the worker that
//! runs it; its step list is never modified while playing. Each unit is
//! passed through the steps in order by mutable reference and dropped by
//! the worker afterwards.

use crate::error::{MapcastError, StepError};
use crate::media::{AudioChunk, Frame, StreamMetadata};

/// One stage of the video chain.
pub trait VideoStep: Send {
    fn process(&mut self, frame: &mut Frame, metadata: &StreamMetadata) -> Result<(), StepError>;

    /// Called once when the owning session is released.
    fn release(&mut self) -> Result<(), MapcastError> {
        Ok(())
    }
}

/// One stage of the audio chain.
pub trait AudioStep: Send {
    fn process(&mut self, chunk: &mut AudioChunk, metadata: &StreamMetadata)
    -> Result<(), StepError>;

    fn release(&mut self) -> Result<(), MapcastError> {
        Ok(())
    }
}

impl<F> VideoStep for F
where
    F: FnMut(&mut Frame, &StreamMetadata) -> Result<(), StepError> + Send,
{
    fn process(&mut self, frame: &mut Frame, metadata: &StreamMetadata) -> Result<(), StepError> {
        self(frame, metadata)
    }
}

impl<F> AudioStep for F
where
    F: FnMut(&mut AudioChunk, &StreamMetadata) -> Result<(), StepError> + Send,
{
    fn process(
        &mut self,
        chunk: &mut AudioChunk,
        metadata: &StreamMetadata,
    ) -> Result<(), StepError> {
        self(chunk, metadata)
    }
}

// ── Chains ───────────────────────────────────────────────────────

/// Video steps run in insertion order.
#[derive(Default)]
pub struct VideoChain {
    steps: Vec<Box<dyn VideoStep>>,
}

impl VideoChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a step.
    pub fn then(mut self, step: impl VideoStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run `frame` through every step, stopping at the first error.
    pub fn process(&mut self, frame: &mut Frame, metadata: &StreamMetadata) -> Result<(), StepError> {
        for step in &mut self.steps {
            step.process(frame, metadata)?;
        }
        Ok(())
    }

    /// Release every step, returning the first error.
    pub fn release(&mut self) -> Result<(), MapcastError> {
        let mut first = Ok(());
        for step in &mut self.steps {
            if let Err(e) = step.release() {
                if first.is_ok() {
                    first = Err(e);
                }
            }
        }
        first
    }
}

/// Audio steps run in insertion order.
#[derive(Default)]
pub struct AudioChain {
    steps: Vec<Box<dyn AudioStep>>,
}

impl AudioChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(mut self, step: impl AudioStep + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn process(
        &mut self,
        chunk: &mut AudioChunk,
        metadata: &StreamMetadata,
    ) -> Result<(), StepError> {
        for step in &mut self.steps {
            step.process(chunk, metadata)?;
        }
        Ok(())
    }

    pub fn release(&mut self) -> Result<(), MapcastError> {
        let mut first = Ok(());
        for step in &mut self.steps {
            if let Err(e) = step.release() {
                if first.is_ok() {
                    first = Err(e);
                }
            }
        }
        first
    }
}

/// The video and audio chains of one session.
#[derive(Default)]
pub struct Chains {
    pub video: VideoChain,
    pub audio: AudioChain,
}

impl Chains {
    pub fn new(video: VideoChain, audio: AudioChain) -> Self {
        Self { video, audio }
    }
}
