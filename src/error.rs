//! Error types.
//!
//! Nothing in this crate retries. Each failure is reported once to the caller
//! of the operation that hit it. Out-of-range tempos are not errors at all:
//! they are clamped by [`normalize_bpm`](crate::normalize_bpm).

use std::io;

use thiserror::Error;

/// Failure to fetch or decode the click sound.
#[derive(Debug, Error)]
pub enum AssetError {
    /// The asset location could not be read.
    #[error("failed to fetch click sound from {location}")]
    Fetch {
        location: String,
        #[source]
        source: io::Error,
    },

    #[cfg(feature = "http")]
    #[error("failed to fetch click sound from {location}")]
    Http {
        location: String,
        #[source]
        source: reqwest::Error,
    },

    /// The asset location uses a scheme this build cannot fetch.
    #[error("unsupported asset location `{0}`")]
    UnsupportedScheme(String),

    /// The fetched bytes are not a decodable audio sample.
    #[error("failed to decode click sound")]
    Decode(#[from] hound::Error),

    /// The sample decoded fine but holds no frames.
    #[error("click sound contains no samples")]
    Empty,
}

/// Failure reading or writing the persisted preset record.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed")]
    Io(#[from] io::Error),

    /// No record is stored under `key`.
    #[error("no persisted record under `{key}`")]
    Missing { key: String },

    /// A record exists under `key` but is not valid serialized data.
    #[error("persisted record `{key}` is malformed")]
    Parse {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize persisted record")]
    Serialize(#[source] serde_json::Error),
}

/// Failure setting up or loading the beat engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// The loader thread went away without reporting a result.
    #[error("click loader stopped before finishing")]
    LoaderDisconnected,

    #[error("no audio output device available")]
    NoOutputDevice,

    #[error("failed to spawn audio thread")]
    Spawn(#[source] io::Error),

    #[cfg(feature = "cpal_sink")]
    #[error("failed to build output stream")]
    BuildStream(#[source] cpal::BuildStreamError),

    #[cfg(feature = "cpal_sink")]
    #[error("failed to start output stream")]
    PlayStream(#[source] cpal::PlayStreamError),
}
