//! Looping click player.

use alloc::vec::Vec;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dasp_graph::{Buffer, Input};

use crate::node::{AudioNode, ProcessContext};

/// Messages to control a [`LoopPlayer`].
///
/// Send these via [`Handle::send`](crate::Handle::send). The loop length is
/// not a message: it is a property written through [`LoopMonitor::set_loop_end`].
#[derive(Clone, Debug)]
pub enum LoopMessage {
    /// Bind a decoded mono sample at the graph's sample rate.
    SetBuffer(Vec<f32>),
    /// Start looping from frame 0. Ignored if already playing.
    ///
    /// There is no stop: a player is silenced by suspending its context,
    /// which keeps the loop phase.
    Start,
}

/// State the player publishes to (and reads from) other threads.
struct LoopShared {
    /// Requested loop length in seconds, stored as `f64` bits
    loop_end_bits: AtomicU64,
    playing: AtomicBool,
    position: AtomicU64,
    loops_completed: AtomicU64,
    loop_frames: AtomicU64,
}

/// Shared view of a [`LoopPlayer`]: the live loop-end property plus its clock.
///
/// All readings are published at the end of each rendered block, so they lag
/// the audio thread by at most one block and freeze while the context is
/// suspended.
#[derive(Clone)]
pub struct LoopMonitor {
    shared: Arc<LoopShared>,
}

impl LoopMonitor {
    /// Set the loop window length in seconds.
    ///
    /// Takes effect at the next loop boundary; the iteration in progress
    /// finishes at its old length. If this is written several times before a
    /// boundary, only the last value is ever used.
    pub fn set_loop_end(&self, secs: f64) {
        self.shared.loop_end_bits.store(secs.to_bits(), Ordering::Release);
    }

    /// The most recently requested loop length in seconds.
    pub fn loop_end(&self) -> f64 {
        f64::from_bits(self.shared.loop_end_bits.load(Ordering::Acquire))
    }

    /// Whether the player has been started.
    pub fn is_playing(&self) -> bool {
        self.shared.playing.load(Ordering::Acquire)
    }

    /// Current frame within the loop window.
    pub fn position(&self) -> u64 {
        self.shared.position.load(Ordering::Acquire)
    }

    /// Number of loop boundaries crossed since start.
    pub fn loops_completed(&self) -> u64 {
        self.shared.loops_completed.load(Ordering::Acquire)
    }

    /// Length in frames of the loop iteration currently playing.
    pub fn loop_frames(&self) -> u64 {
        self.shared.loop_frames.load(Ordering::Acquire)
    }

    /// Total frames played since start: the node's own clock.
    pub fn frames_played(&self) -> u64 {
        // Only exact while the loop length has not changed since start
        self.loops_completed() * self.loop_frames() + self.position()
    }
}

/// Plays a short sample once per loop window, forever.
///
/// The window is measured in frames of the graph's sample rate, so beat
/// spacing comes from the audio clock alone. Frames of the window beyond the
/// end of the sample are silence; a sample longer than the window is cut off
/// at the boundary.
///
/// # Example
///
/// ```
/// use tactus::nodes::{LoopMessage, LoopPlayer};
/// use tactus::{AudioNode, ProcessContext};
/// use dasp_graph::Buffer;
///
/// let (mut player, monitor) = LoopPlayer::new();
/// monitor.set_loop_end(0.5);
///
/// let ctx = ProcessContext { sample_rate: 256, buffer_size: 64 };
/// let messages = vec![LoopMessage::SetBuffer(vec![1.0; 4]), LoopMessage::Start];
/// let mut out = [Buffer::default()];
/// player.process(&ctx, messages.into_iter(), &[], &mut out);
///
/// assert_eq!(out[0][0], 1.0);
/// assert_eq!(out[0][4], 0.0);
/// assert_eq!(monitor.loop_frames(), 128);
/// ```
pub struct LoopPlayer {
    samples: Vec<f32>,
    playing: bool,
    position: u64,
    loop_frames: u64,
    loops_completed: u64,
    shared: Arc<LoopShared>,
}

impl LoopPlayer {
    /// Create an unbound, stopped player and its monitor.
    ///
    /// The loop length defaults to one second until set.
    pub fn new() -> (Self, LoopMonitor) {
        let shared = Arc::new(LoopShared {
            loop_end_bits: AtomicU64::new(1.0f64.to_bits()),
            playing: AtomicBool::new(false),
            position: AtomicU64::new(0),
            loops_completed: AtomicU64::new(0),
            loop_frames: AtomicU64::new(0),
        });

        let player = Self {
            samples: Vec::new(),
            playing: false,
            position: 0,
            loop_frames: 0,
            loops_completed: 0,
            shared: shared.clone(),
        };

        (player, LoopMonitor { shared })
    }

    #[inline]
    fn requested_frames(&self, ctx: &ProcessContext) -> u64 {
        ctx.frames_for(f64::from_bits(self.shared.loop_end_bits.load(Ordering::Acquire)))
    }

    fn publish(&self) {
        self.shared.playing.store(self.playing, Ordering::Release);
        self.shared.position.store(self.position, Ordering::Release);
        self.shared.loops_completed.store(self.loops_completed, Ordering::Release);
        self.shared.loop_frames.store(self.loop_frames, Ordering::Release);
    }
}

impl AudioNode for LoopPlayer {
    type Message = LoopMessage;

    fn process(
        &mut self,
        ctx: &ProcessContext,
        messages: impl Iterator<Item = LoopMessage>,
        _inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        for msg in messages {
            match msg {
                LoopMessage::SetBuffer(samples) => self.samples = samples,
                LoopMessage::Start => {
                    if !self.playing {
                        self.playing = true;
                        self.position = 0;
                        self.loops_completed = 0;
                        self.loop_frames = self.requested_frames(ctx);
                    }
                }
            }
        }

        if outputs.is_empty() {
            return;
        }

        if !self.playing {
            for buffer in outputs.iter_mut() {
                buffer.iter_mut().for_each(|s| *s = 0.0);
            }
            self.publish();
            return;
        }

        let buffer_len = outputs[0].len();
        for i in 0..buffer_len {
            if self.position >= self.loop_frames {
                // Boundary: latch whatever loop length was written last
                self.position = 0;
                self.loops_completed += 1;
                self.loop_frames = self.requested_frames(ctx);
            }

            let sample = self
                .samples
                .get(self.position as usize)
                .copied()
                .unwrap_or(0.0);
            for buffer in outputs.iter_mut() {
                buffer[i] = sample;
            }

            self.position += 1;
        }

        self.publish();
    }

    #[inline]
    fn num_inputs(&self) -> usize { 0 }

    #[inline]
    fn num_outputs(&self) -> usize { 1 }
}
