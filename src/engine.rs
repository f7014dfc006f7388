//! The beat engine: a suspendable audio context driving one looping click.
//!
//! Inter-beat spacing is the player's loop window counted in frames of the
//! audio clock, so neither the ticker nor any other timer ever decides when a
//! click sounds. Start and stop only resume or suspend the context; the player
//! itself keeps "playing" the whole time and simply has no frames pulled from
//! it while suspended.

use tracing::{debug, warn};

use crate::asset::{self, ClickSample, PendingClick};
use crate::clock::RenderClock;
use crate::context::{AudioContext, ContextBuilder, Handle};
use crate::error::EngineError;
use crate::nodes::{LoopMessage, LoopMonitor, LoopPlayer};
use crate::tempo::{beat_seconds, normalize_bpm};

/// Produces audible clicks at the current tempo from the audio clock.
pub struct BeatEngine {
    context: AudioContext,
    player: Handle<LoopMessage>,
    monitor: LoopMonitor,
    current_bpm: u32,
    attached: bool,
}

impl BeatEngine {
    /// Add the click player to `builder`, route it to the output and launch
    /// the render thread. The context starts suspended.
    pub fn new<C: RenderClock>(mut builder: ContextBuilder, clock: C) -> Result<Self, EngineError> {
        let (player, monitor) = LoopPlayer::new();
        let player = builder.add(player);
        builder.output(&player);

        let context = builder.launch(clock).map_err(EngineError::Spawn)?;

        Ok(Self {
            context,
            player,
            monitor,
            current_bpm: crate::tempo::MIN_BPM,
            attached: false,
        })
    }

    /// Engine on the default output device, paced by the device's clock.
    #[cfg(feature = "cpal_sink")]
    pub fn default_output(lead_frames: u64) -> Result<Self, EngineError> {
        let device = crate::device::CpalDevice::default_output().ok_or(EngineError::NoOutputDevice)?;
        let (builder, clock) = device.context_builder(lead_frames)?;
        Self::new(builder, clock)
    }

    /// Fetch and decode the click at `location`, then bind it at `initial_bpm`.
    ///
    /// Blocks the calling thread for the fetch and decode. Use
    /// [`begin_initialize`](Self::begin_initialize) to keep the caller free.
    pub fn initialize(&mut self, location: &str, initial_bpm: f64) -> Result<(), EngineError> {
        let click = asset::load_click(location, self.context.sample_rate())?;
        self.attach(click, initial_bpm);
        Ok(())
    }

    /// Start fetching and decoding the click on a loader thread.
    ///
    /// Hand the finished [`ClickSample`] to [`attach`](Self::attach).
    pub fn begin_initialize(&self, location: &str) -> Result<PendingClick, EngineError> {
        PendingClick::spawn(location.to_string(), self.context.sample_rate())
    }

    /// Bind a decoded click to the player and start its loop.
    ///
    /// The context is normally still suspended at this point, so nothing is
    /// audible until [`start`](Self::start). Attaching again replaces the
    /// sample and keeps the loop phase.
    pub fn attach(&mut self, click: ClickSample, bpm: f64) {
        let click = click.resampled(self.context.sample_rate());
        let bpm = normalize_bpm(bpm);
        self.current_bpm = bpm;
        self.monitor.set_loop_end(beat_seconds(bpm));

        self.send(LoopMessage::SetBuffer(click.into_samples()));
        self.send(LoopMessage::Start);
        self.attached = true;
        debug!(bpm, "click attached");
    }

    /// Make the clicks audible by resuming the audio context.
    pub fn start(&self) {
        self.context.resume();
    }

    /// Silence the clicks by suspending the audio context.
    ///
    /// The player's phase is frozen, not reset: the next `start` continues
    /// mid-beat exactly where this one left off.
    pub fn stop(&self) {
        self.context.suspend();
    }

    /// Change the tempo of the live loop.
    ///
    /// The beat in progress completes at the old tempo; the value set last
    /// before the next boundary is the one that takes effect there.
    /// Returns the normalized bpm actually applied.
    pub fn set_tempo(&mut self, bpm: f64) -> u32 {
        let bpm = normalize_bpm(bpm);
        self.current_bpm = bpm;
        self.monitor.set_loop_end(beat_seconds(bpm));
        bpm
    }

    /// Clamp and floor a tempo into the supported domain.
    pub fn normalize_bpm(&self, bpm: f64) -> u32 {
        normalize_bpm(bpm)
    }

    /// The tempo most recently set.
    pub fn current_bpm(&self) -> u32 {
        self.current_bpm
    }

    /// `true` once a click has been attached.
    pub fn is_ready(&self) -> bool {
        self.attached
    }

    /// `true` while the context is resumed.
    pub fn is_running(&self) -> bool {
        self.context.is_running()
    }

    /// The audio context this engine owns.
    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    /// Live view of the click player's loop and clock.
    pub fn monitor(&self) -> &LoopMonitor {
        &self.monitor
    }

    fn send(&mut self, msg: LoopMessage) {
        if self.player.send(msg).is_err() {
            warn!("click player message queue full, message dropped");
        }
    }
}
