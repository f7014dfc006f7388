//! Background ticker: UI pulses from a thread of its own.
//!
//! The ticker never influences when a click sounds. It exists so the caller
//! gets a steady visual pulse (and a liveness signal) even when its own thread
//! is too busy or throttled to keep time.
//!
//! [`TickerState`] is the whole timing state machine and takes `now` as an
//! argument, so its behaviour does not depend on a real clock.
//! [`BackgroundTicker::spawn`] runs it on a dedicated thread fed by
//! [`TickerCommand`]s.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryIter};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Shortest period a command may carry.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Commands accepted by the ticker thread.
///
/// Serializes to the JSON protocol
/// `{"action":"toggleStartStop","msPerBeat":500}` and
/// `{"action":"tempoChange","msPerBeat":250}`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum TickerCommand {
    /// Start at the given period if stopped, stop if running.
    #[serde(rename_all = "camelCase")]
    ToggleStartStop { ms_per_beat: f64 },
    /// Retune if running, ignored if stopped.
    #[serde(rename_all = "camelCase")]
    TempoChange { ms_per_beat: f64 },
    /// Exit the thread.
    #[serde(skip)]
    Shutdown,
}

impl TickerCommand {
    /// Parse one protocol message.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Encode as a protocol message.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Convert a protocol period to a [`Duration`], clamped to at least 1 ms.
pub fn period_from_ms(ms_per_beat: f64) -> Duration {
    if ms_per_beat.is_finite() && ms_per_beat > MIN_PERIOD.as_secs_f64() * 1000.0 {
        Duration::from_secs_f64(ms_per_beat / 1000.0)
    } else {
        MIN_PERIOD
    }
}

/// One pulse from the ticker thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pulse {
    /// 0 for the pulse sent when the thread comes up, then counting up
    pub seq: u64,
    pub at: Instant,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Stopped,
    Running { period: Duration, next_due: Instant },
}

/// The ticker's timing state machine: `Stopped` or `Running`.
#[derive(Clone, Debug)]
pub struct TickerState {
    configured: Duration,
    phase: Phase,
}

impl TickerState {
    /// A stopped ticker with the given configured period.
    pub fn new(period: Duration) -> Self {
        Self {
            configured: period.max(MIN_PERIOD),
            phase: Phase::Stopped,
        }
    }

    /// Set the period used by the next [`start`](Self::start).
    pub fn configure(&mut self, period: Duration) {
        self.configured = period.max(MIN_PERIOD);
    }

    /// Begin ticking at the configured period.
    ///
    /// Returns `true` when an immediate pulse must be emitted; `false` if
    /// already running (no-op).
    pub fn start(&mut self, now: Instant) -> bool {
        match self.phase {
            Phase::Running { .. } => false,
            Phase::Stopped => {
                self.phase = Phase::Running {
                    period: self.configured,
                    next_due: now + self.configured,
                };
                true
            }
        }
    }

    /// Cancel the schedule. Idempotent.
    pub fn stop(&mut self) {
        self.phase = Phase::Stopped;
    }

    /// Replace the schedule while running; the first pulse at the new period
    /// lands one full `period` after `now`. Ignored while stopped.
    pub fn retune(&mut self, period: Duration, now: Instant) {
        let period = period.max(MIN_PERIOD);
        if let Phase::Running { .. } = self.phase {
            self.configured = period;
            self.phase = Phase::Running {
                period,
                next_due: now + period,
            };
        }
    }

    /// Apply a protocol command. Returns `true` when an immediate pulse must
    /// be emitted.
    pub fn apply(&mut self, command: TickerCommand, now: Instant) -> bool {
        match command {
            TickerCommand::ToggleStartStop { ms_per_beat } => {
                if self.is_running() {
                    self.stop();
                    false
                } else {
                    self.configure(period_from_ms(ms_per_beat));
                    self.start(now)
                }
            }
            TickerCommand::TempoChange { ms_per_beat } => {
                self.retune(period_from_ms(ms_per_beat), now);
                false
            }
            TickerCommand::Shutdown => {
                self.stop();
                false
            }
        }
    }

    /// `true` if a pulse is due at `now`.
    ///
    /// Deadlines advance in whole periods from the previous deadline, so
    /// late wake-ups don't accumulate drift. Deadlines missed entirely are
    /// skipped rather than fired in a burst.
    pub fn poll(&mut self, now: Instant) -> bool {
        let Phase::Running { period, next_due } = &mut self.phase else {
            return false;
        };
        if now < *next_due {
            return false;
        }

        *next_due += *period;
        if *next_due <= now {
            let behind = now.duration_since(*next_due).as_nanos() / period.as_nanos();
            *next_due += *period * (behind as u32 + 1);
        }
        true
    }

    /// When the next pulse is due, if running.
    pub fn next_due(&self) -> Option<Instant> {
        match self.phase {
            Phase::Running { next_due, .. } => Some(next_due),
            Phase::Stopped => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.phase, Phase::Running { .. })
    }

    /// Period of the running schedule, or the configured one while stopped.
    pub fn period(&self) -> Duration {
        match self.phase {
            Phase::Running { period, .. } => period,
            Phase::Stopped => self.configured,
        }
    }
}

/// Spawns the ticker thread.
pub struct BackgroundTicker;

impl BackgroundTicker {
    /// Start the ticker thread, stopped, with a 500 ms configured period.
    ///
    /// The thread sends one pulse as soon as it is up.
    pub fn spawn() -> std::io::Result<TickerHandle> {
        let (cmd_tx, cmd_rx) = unbounded();
        let (pulse_tx, pulse_rx) = unbounded();

        let thread = thread::Builder::new()
            .name("tactus-ticker".into())
            .spawn(move || run(cmd_rx, pulse_tx))?;

        Ok(TickerHandle {
            commands: cmd_tx,
            pulses: pulse_rx,
            thread: Some(thread),
        })
    }
}

fn run(commands: Receiver<TickerCommand>, pulses: Sender<Pulse>) {
    let mut state = TickerState::new(Duration::from_millis(500));
    let mut seq = 0u64;
    let mut emit = |at: Instant| {
        let sent = pulses.send(Pulse { seq, at }).is_ok();
        seq += 1;
        sent
    };

    if !emit(Instant::now()) {
        return;
    }
    debug!("ticker thread up");

    loop {
        let received = match state.next_due() {
            Some(deadline) => commands.recv_deadline(deadline),
            None => commands.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        let now = Instant::now();
        let pulse = match received {
            Ok(TickerCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Ok(command) => {
                trace!(?command, "ticker command");
                state.apply(command, now)
            }
            Err(RecvTimeoutError::Timeout) => state.poll(now),
        };

        if pulse && !emit(now) {
            break;
        }
    }

    debug!("ticker thread exiting");
}

/// Owner side of the ticker thread. Dropping it stops and joins the thread.
pub struct TickerHandle {
    commands: Sender<TickerCommand>,
    pulses: Receiver<Pulse>,
    thread: Option<JoinHandle<()>>,
}

impl TickerHandle {
    /// Send a command; fire-and-forget.
    pub fn send(&self, command: TickerCommand) {
        let _ = self.commands.send(command);
    }

    /// Start if stopped (at `ms_per_beat`), stop if running.
    pub fn toggle_start_stop(&self, ms_per_beat: f64) {
        self.send(TickerCommand::ToggleStartStop { ms_per_beat });
    }

    /// Retune if running.
    pub fn tempo_change(&self, ms_per_beat: f64) {
        self.send(TickerCommand::TempoChange { ms_per_beat });
    }

    /// Pulses received so far, without blocking.
    pub fn try_pulses(&self) -> TryIter<'_, Pulse> {
        self.pulses.try_iter()
    }

    /// The pulse receiver, for `select!` or blocking receives.
    pub fn pulses(&self) -> &Receiver<Pulse> {
        &self.pulses
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(TickerCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
