//! The metronome controller.
//!
//! [`Metronome`] owns a [`BeatEngine`] and a [`TickerHandle`] and keeps the two
//! in step with what the caller asked for. Sound timing belongs to the engine
//! alone; the ticker's pulses are surfaced as [`MetronomeEvent::Pulse`] for
//! display and double as the heartbeat of a stall watchdog.
//!
//! Nothing here blocks. The click loads on a background thread and the
//! caller drives progress by calling [`Metronome::poll`] from its own loop.

use tracing::{debug, info, warn};

use crate::asset::PendingClick;
use crate::config::MetronomeConfig;
use crate::engine::BeatEngine;
use crate::error::EngineError;
use crate::tempo::{ms_per_beat, normalize_bpm, TempoPreset};
use crate::ticker::{Pulse, TickerHandle};

/// Something the caller may want to react to, returned by [`Metronome::poll`].
#[derive(Debug)]
pub enum MetronomeEvent {
    /// The click finished loading and is bound to the engine.
    Ready { bpm: u32 },
    /// The click could not be fetched or decoded. Not retried.
    LoadFailed(EngineError),
    /// A ticker pulse.
    Pulse(Pulse),
    /// The audio clock has not advanced across the configured number of
    /// pulses while the metronome should be sounding.
    Stalled { frames: u64 },
}

/// Counts pulses that arrive without the audio frame clock moving.
#[derive(Clone, Debug)]
struct StallWatchdog {
    threshold: u32,
    last_frames: u64,
    quiet_pulses: u32,
    reported: bool,
}

impl StallWatchdog {
    fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            last_frames: 0,
            quiet_pulses: 0,
            reported: false,
        }
    }

    fn reset(&mut self, frames: u64) {
        self.last_frames = frames;
        self.quiet_pulses = 0;
        self.reported = false;
    }

    /// Feed the frame count seen at a pulse. `true` once per stall.
    fn observe(&mut self, frames: u64) -> bool {
        if frames != self.last_frames {
            self.reset(frames);
            return false;
        }

        self.quiet_pulses += 1;
        if self.quiet_pulses >= self.threshold && !self.reported {
            self.reported = true;
            return true;
        }
        false
    }
}

/// Start/stop/tempo control over a beat engine and its background ticker.
pub struct Metronome {
    engine: BeatEngine,
    ticker: TickerHandle,
    config: MetronomeConfig,
    pending: Option<PendingClick>,
    bpm: u32,
    /// What the caller last asked for
    wants_running: bool,
    /// What the engine and ticker are actually doing
    running: bool,
    watchdog: StallWatchdog,
}

impl Metronome {
    /// Start loading `config.sound` in the background.
    ///
    /// The engine stays silent until the load completes and
    /// [`start`](Self::start) has been requested.
    pub fn new(engine: BeatEngine, ticker: TickerHandle, config: MetronomeConfig) -> Result<Self, EngineError> {
        let pending = engine.begin_initialize(&config.sound)?;
        let bpm = normalize_bpm(config.initial_bpm);
        let watchdog = StallWatchdog::new(config.stall_pulses);

        debug!(sound = %config.sound, bpm, "metronome created, loading click");

        Ok(Self {
            engine,
            ticker,
            config,
            pending: Some(pending),
            bpm,
            wants_running: false,
            running: false,
            watchdog,
        })
    }

    /// Make the clicks audible. Queued if the click is still loading.
    pub fn start(&mut self) {
        self.wants_running = true;
        self.sync_run_state();
    }

    /// Silence the clicks. Idempotent.
    pub fn stop(&mut self) {
        self.wants_running = false;
        self.sync_run_state();
    }

    /// Stop if started, start if stopped.
    pub fn toggle(&mut self) {
        if self.wants_running {
            self.stop();
        } else {
            self.start();
        }
    }

    /// Change the tempo of the engine and the ticker.
    ///
    /// Returns the normalized bpm. Before the click has loaded the value is
    /// kept and applied when it attaches.
    pub fn set_tempo(&mut self, bpm: f64) -> u32 {
        self.bpm = normalize_bpm(bpm);
        if self.engine.is_ready() {
            self.engine.set_tempo(self.bpm as f64);
        }
        if self.running {
            self.ticker.tempo_change(ms_per_beat(self.bpm));
        }
        self.bpm
    }

    /// Play at the preset's effective tempo.
    pub fn select_preset(&mut self, preset: &TempoPreset) -> u32 {
        debug!(name = %preset.name, bpm = preset.bpm, goal = preset.goal_bpm, "preset selected");
        self.set_tempo(preset.bpm as f64)
    }

    /// Advance the controller: finish a pending click load, drain ticker
    /// pulses and check that the audio clock is moving.
    pub fn poll(&mut self) -> Vec<MetronomeEvent> {
        let mut events = Vec::new();

        if let Some(outcome) = self.pending.as_ref().and_then(PendingClick::try_take) {
            self.pending = None;
            match outcome {
                Ok(click) => {
                    self.engine.attach(click, self.bpm as f64);
                    info!(bpm = self.bpm, "click loaded");
                    events.push(MetronomeEvent::Ready { bpm: self.bpm });
                    self.sync_run_state();
                }
                Err(err) => {
                    warn!(sound = %self.config.sound, error = %err, "click failed to load");
                    self.wants_running = false;
                    events.push(MetronomeEvent::LoadFailed(err));
                }
            }
        }

        let pulses: Vec<Pulse> = self.ticker.try_pulses().collect();
        for pulse in pulses {
            events.push(MetronomeEvent::Pulse(pulse));
            if !self.running {
                continue;
            }

            let frames = self.engine.context().frames_rendered();
            if self.watchdog.observe(frames) {
                warn!(
                    frames,
                    pulses = self.watchdog.threshold,
                    "audio clock has not advanced, output may be stalled"
                );
                events.push(MetronomeEvent::Stalled { frames });
            }
        }

        events
    }

    fn sync_run_state(&mut self) {
        if !self.engine.is_ready() || self.wants_running == self.running {
            return;
        }

        let period = ms_per_beat(self.bpm);
        if self.wants_running {
            self.watchdog.reset(self.engine.context().frames_rendered());
            self.engine.start();
        } else {
            self.engine.stop();
        }
        self.ticker.toggle_start_stop(period);
        self.running = self.wants_running;
        debug!(running = self.running, bpm = self.bpm, "metronome run state changed");
    }

    /// The tempo currently in effect, normalized.
    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    /// `true` while the clicks are audible.
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// `true` if a start was requested and is waiting on the click load.
    pub fn start_pending(&self) -> bool {
        self.wants_running && !self.running
    }

    /// `true` while the click is still loading.
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn engine(&self) -> &BeatEngine {
        &self.engine
    }
}
