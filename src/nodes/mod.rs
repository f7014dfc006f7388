//! Built-in audio nodes.
//!
//! ## Sources ([`source`])
//!
//! - [`LoopPlayer`] - Plays a click once per loop window, the beat itself
//!
//! ## Sinks ([`sink`])
//!
//! - [`CpalSink`] - Output to a system audio device (requires `cpal_sink` feature)
//! - [`RtrbSink`] - Write interleaved audio to a ring buffer (tests, offline rendering)
//!
//! # Message Types
//!
//! - [`LoopMessage`] - Bind a buffer to and start a [`LoopPlayer`]
//!
//! Sinks take no messages and use `()`.

pub mod source;
pub mod sink;

pub use source::{LoopMessage, LoopMonitor, LoopPlayer};
pub use sink::RtrbSink;

#[cfg(feature = "cpal_sink")]
pub use sink::CpalSink;
