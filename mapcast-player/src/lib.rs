//! # mapcast-player: test-pattern player
//!
//! Loads a TOML configuration, builds a palette quantizer and a tile
//! render step from it, and plays a synthetic stream through a full
//! playback session into a logging transport.

pub mod config;
pub mod service;
pub mod transport;
