//! Click sound loading: fetch bytes, decode WAV, match the graph's rate.

use std::io::Cursor;
use std::path::Path;
use std::thread;

use crossbeam_channel::{bounded, Receiver, TryRecvError};
use tracing::debug;

use crate::error::{AssetError, EngineError};

/// A decoded mono click at a known sample rate.
#[derive(Clone, Debug, PartialEq)]
pub struct ClickSample {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl ClickSample {
    /// Wrap already-decoded mono samples.
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Resample to `target_rate` with linear interpolation.
    pub fn resampled(self, target_rate: u32) -> Self {
        if self.sample_rate == target_rate || self.samples.is_empty() {
            return self;
        }

        let ratio = self.sample_rate as f64 / target_rate as f64;
        let new_len = ((self.samples.len() as f64 / ratio) as usize).max(1);
        let src = &self.samples;
        let samples = (0..new_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let idx = pos as usize;
                let frac = (pos - idx as f64) as f32;
                let s0 = src.get(idx).copied().unwrap_or(0.0);
                let s1 = src.get(idx + 1).copied().unwrap_or(s0);
                s0 + (s1 - s0) * frac
            })
            .collect();

        Self {
            samples,
            sample_rate: target_rate,
        }
    }

    pub(crate) fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}

/// Read the raw bytes behind `location`.
///
/// Accepts a filesystem path or a `file://` URL, and `http(s)://` URLs when
/// built with the `http` feature.
pub fn fetch(location: &str) -> Result<Vec<u8>, AssetError> {
    if let Some(path) = location.strip_prefix("file://") {
        return read_file(location, Path::new(path));
    }

    if location.starts_with("http://") || location.starts_with("https://") {
        return fetch_http(location);
    }

    if location.contains("://") {
        return Err(AssetError::UnsupportedScheme(location.to_string()));
    }

    read_file(location, Path::new(location))
}

fn read_file(location: &str, path: &Path) -> Result<Vec<u8>, AssetError> {
    std::fs::read(path).map_err(|source| AssetError::Fetch {
        location: location.to_string(),
        source,
    })
}

#[cfg(feature = "http")]
fn fetch_http(location: &str) -> Result<Vec<u8>, AssetError> {
    let wrap = |source| AssetError::Http {
        location: location.to_string(),
        source,
    };
    let response = reqwest::blocking::get(location)
        .and_then(|r| r.error_for_status())
        .map_err(wrap)?;
    let bytes = response.bytes().map_err(wrap)?;
    Ok(bytes.to_vec())
}

#[cfg(not(feature = "http"))]
fn fetch_http(location: &str) -> Result<Vec<u8>, AssetError> {
    Err(AssetError::UnsupportedScheme(location.to_string()))
}

/// Decode WAV bytes to a mono sample at `target_rate`.
///
/// Multi-channel input is averaged down to mono.
pub fn decode(bytes: &[u8], target_rate: u32) -> Result<ClickSample, AssetError> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => {
            let max_val = (1u64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f32 / max_val))
                .collect::<Result<_, _>>()?
        }
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
    };

    if interleaved.is_empty() {
        return Err(AssetError::Empty);
    }

    let mono = if channels > 1 {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        interleaved
    };

    Ok(ClickSample::from_samples(mono, spec.sample_rate).resampled(target_rate))
}

/// Fetch and decode the click at `location` for a graph running at `target_rate`.
pub fn load_click(location: &str, target_rate: u32) -> Result<ClickSample, AssetError> {
    let bytes = fetch(location)?;
    debug!(location, bytes = bytes.len(), "fetched click sound");
    let click = decode(&bytes, target_rate)?;
    debug!(frames = click.samples().len(), target_rate, "decoded click sound");
    Ok(click)
}

/// A click load running on its own thread.
///
/// Created by [`BeatEngine::begin_initialize`](crate::BeatEngine::begin_initialize).
/// Cannot be cancelled: the loader runs to completion or fails.
pub struct PendingClick {
    rx: Receiver<Result<ClickSample, AssetError>>,
}

impl PendingClick {
    pub(crate) fn spawn(location: String, target_rate: u32) -> Result<Self, EngineError> {
        let (tx, rx) = bounded(1);
        thread::Builder::new()
            .name("tactus-loader".into())
            .spawn(move || {
                let _ = tx.send(load_click(&location, target_rate));
            })
            .map_err(EngineError::Spawn)?;
        Ok(Self { rx })
    }

    /// The load result, if the loader has finished.
    pub fn try_take(&self) -> Option<Result<ClickSample, EngineError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result.map_err(EngineError::from)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(EngineError::LoaderDisconnected)),
        }
    }

    /// Block until the loader finishes.
    pub fn wait(self) -> Result<ClickSample, EngineError> {
        self.rx
            .recv()
            .map_err(|_| EngineError::LoaderDisconnected)?
            .map_err(EngineError::from)
    }
}
