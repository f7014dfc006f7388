//! Tactus - a practice metronome whose clicks are timed by the audio clock
//!
//! Design principles:
//! - The audible beat is a looping node in an audio graph; its loop window in
//!   frames is the beat period, so no timer decides when a click sounds
//! - Start/stop suspend and resume the whole context, freezing the phase
//! - Tempo is a live loop-length property, latched at the next loop boundary
//! - A background ticker thread supplies display pulses and a liveness check
//! - Tempo presets persist as one JSON record

extern crate alloc;

mod node;
mod graph;
mod clock;
mod context;
mod device;
pub mod nodes;

pub mod asset;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod store;
pub mod tempo;
pub mod ticker;

pub use node::{AudioNode, ProcessContext, NodeId};
pub use graph::BLOCK_FRAMES;
pub use clock::{RenderClock, DeviceClock, WallClock, ManualClock, ManualClockDriver};
pub use context::{ContextBuilder, AudioContext, Handle};
pub use device::CpalDevice;

pub use asset::{ClickSample, PendingClick};
pub use config::MetronomeConfig;
pub use controller::{Metronome, MetronomeEvent};
pub use engine::BeatEngine;
pub use error::{AssetError, EngineError, StoreError};
pub use store::{FileStore, KeyValueStore, MemoryStore, PersistedData, PresetStore};
pub use tempo::{effective_bpm, normalize_bpm, TempoPreset, MAX_BPM, MIN_BPM};
pub use ticker::{BackgroundTicker, Pulse, TickerCommand, TickerHandle, TickerState};
