//! Metronome configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Settings for a [`Metronome`](crate::Metronome).
///
/// Every field has a default, so a config file only needs the fields it
/// changes:
///
/// ```
/// use tactus::MetronomeConfig;
///
/// let config: MetronomeConfig = serde_json::from_str(r#"{ "initial_bpm": 90 }"#).unwrap();
/// assert_eq!(config.initial_bpm, 90.0);
/// assert_eq!(config.stall_pulses, 3);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    /// Location of the click sample: path, `file://` or `http(s)://` URL
    pub sound: String,
    /// Tempo until a preset or explicit tempo is chosen
    pub initial_bpm: f64,
    /// Directory for the preset record
    pub storage_dir: PathBuf,
    /// Frames the render thread stays ahead of the device
    pub lead_frames: u64,
    /// Consecutive pulses without audio progress before reporting a stall
    pub stall_pulses: u32,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            sound: "click.wav".to_string(),
            initial_bpm: 120.0,
            storage_dir: PathBuf::from(".tactus"),
            lead_frames: 2048,
            stall_pulses: 3,
        }
    }
}

impl MetronomeConfig {
    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|source| StoreError::Parse {
            key: path.display().to_string(),
            source,
        })
    }

    /// Set the click sample location (builder pattern).
    pub fn with_sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = sound.into();
        self
    }

    /// Set the starting tempo (builder pattern).
    pub fn with_initial_bpm(mut self, bpm: f64) -> Self {
        self.initial_bpm = bpm;
        self
    }

    /// Set the preset storage directory (builder pattern).
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = dir.into();
        self
    }

    /// Set the stall threshold in pulses (builder pattern).
    pub fn with_stall_pulses(mut self, pulses: u32) -> Self {
        self.stall_pulses = pulses.max(1);
        self
    }
}
