//! CPAL device discovery and sink creation.
//!
//! This module provides [`CpalDevice`] for discovering and selecting the
//! output device the metronome clicks on.
//!
//! # Example: List and Select a Device
//!
//! ```no_run
//! use tactus::CpalDevice;
//!
//! for (i, device) in CpalDevice::list_outputs().iter().enumerate() {
//!     println!("[{}] {} ({} Hz, {} ch)",
//!         i, device.name(), device.sample_rate(), device.channels());
//! }
//! ```

use alloc::string::String;
use alloc::vec::Vec;

#[cfg(feature = "cpal_sink")]
use cpal::traits::{DeviceTrait, HostTrait};

#[cfg(feature = "cpal_sink")]
use crate::clock::DeviceClock;
#[cfg(feature = "cpal_sink")]
use crate::context::ContextBuilder;
#[cfg(feature = "cpal_sink")]
use crate::error::EngineError;

/// A discovered audio output device.
///
/// Use [`CpalDevice::default_output`] to get the system default, or
/// [`CpalDevice::list_outputs`] to enumerate all available devices.
pub struct CpalDevice {
    #[cfg(feature = "cpal_sink")]
    device: cpal::Device,
    #[cfg(feature = "cpal_sink")]
    config: cpal::SupportedStreamConfig,

    name: String,
    sample_rate: u32,
    channels: u16,
}

impl CpalDevice {
    /// Get the system's default output device.
    ///
    /// Returns `None` if no audio device is available.
    #[cfg(feature = "cpal_sink")]
    pub fn default_output() -> Option<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device()?;
        Self::from_device(device)
    }

    #[cfg(not(feature = "cpal_sink"))]
    pub fn default_output() -> Option<Self> {
        None
    }

    /// List all available audio output devices.
    ///
    /// Returns an empty list if no devices are found or if enumeration fails.
    #[cfg(feature = "cpal_sink")]
    pub fn list_outputs() -> Vec<Self> {
        let host = cpal::default_host();
        host.output_devices()
            .map(|devices| devices.filter_map(Self::from_device).collect())
            .unwrap_or_default()
    }

    #[cfg(not(feature = "cpal_sink"))]
    pub fn list_outputs() -> Vec<Self> {
        Vec::new()
    }

    #[cfg(feature = "cpal_sink")]
    fn from_device(device: cpal::Device) -> Option<Self> {
        let config = device.default_output_config().ok()?;
        let name = device.name().unwrap_or_else(|_| "Unknown".into());
        Some(Self {
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
            name,
            device,
            config,
        })
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the device's sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the number of output channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Create a sink node that outputs audio to this device.
    #[cfg(feature = "cpal_sink")]
    pub fn create_sink(&self) -> Result<crate::nodes::CpalSink, EngineError> {
        crate::nodes::CpalSink::new(&self.device, &self.config)
    }

    /// Build a context wired to this device, plus the clock that follows it.
    ///
    /// The context is paced by the device's own consumption (staying
    /// `lead_frames` ahead) and its suspend gate silences the device without
    /// dropping queued frames.
    #[cfg(feature = "cpal_sink")]
    pub fn context_builder(&self, lead_frames: u64) -> Result<(ContextBuilder, DeviceClock), EngineError> {
        let sink = self.create_sink()?;
        let clock = DeviceClock::new(sink.consumed_counter(), sink.channels(), lead_frames);
        let gate = sink.suspend_gate();
        let builder = ContextBuilder::new(self.sample_rate)
            .with_output(sink)
            .with_output_gate(gate);
        Ok((builder, clock))
    }
}
