//! Frame/audio acquisition and A/V synchronization.
//!
//! - [`queue`]: drop-oldest bounded queue (backpressure)
//! - [`worker`]: single-thread queue consumers
//! - [`pipeline`]: video and audio step chains
//! - [`pacer`]: per-frame presentation timing against the audio clock
//! - [`drift`]: drift correction between two independent engines
//! - [`stats`]: shared playback counters
//! - [`engine`]: the pull loop tying it together

pub mod drift;
pub mod engine;
pub mod pacer;
pub mod pipeline;
pub mod queue;
pub mod stats;
pub mod worker;

pub use drift::{DriftAction, DriftController, DriftHandle, DriftSampler, PlaybackEngine};
pub use engine::SyncEngine;
pub use pacer::{Pace, VideoPacer};
pub use pipeline::{AudioChain, AudioStep, Chains, VideoChain, VideoStep};
pub use queue::{Admission, DropOldestQueue};
pub use stats::{PlaybackCounters, SessionStats};
pub use worker::Worker;
