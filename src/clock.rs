//! Render pacing for [`AudioContext`](crate::AudioContext).
//!
//! The render thread never decides on its own how fast to run. It asks a
//! [`RenderClock`] how many blocks are due and renders exactly that many, so
//! the pacing source is whatever the clock measures: the device's consumed
//! frames, the wall clock, or an explicit budget.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::graph::BLOCK_FRAMES;

/// Decides how many blocks the render thread should produce right now.
pub trait RenderClock: Send + 'static {
    /// Number of blocks to render now, given how many were rendered so far.
    fn blocks_due(&mut self, rendered_blocks: u64) -> u64;

    /// Called when the context resumes after being suspended.
    ///
    /// Clocks that measure elapsed time must discard the time spent suspended
    /// here, otherwise the render thread would try to catch up on it.
    fn on_resume(&mut self, _rendered_blocks: u64) {}

    /// Hand back blocks returned by [`blocks_due`](Self::blocks_due) that were
    /// not rendered because the context was suspended mid-batch.
    fn refund(&mut self, _blocks: u64) {}
}

/// Paced by frames an output device has consumed.
///
/// This is the hardware clock: the device pulls frames at its own sample
/// rate and the render thread stays `lead_frames` ahead of it.
pub struct DeviceClock {
    consumed_samples: Arc<AtomicUsize>,
    channels: usize,
    lead_frames: u64,
}

impl DeviceClock {
    /// Create a clock from a shared "samples consumed" counter, such as
    /// [`CpalSink::consumed_counter`](crate::nodes::CpalSink::consumed_counter).
    pub fn new(consumed_samples: Arc<AtomicUsize>, channels: usize, lead_frames: u64) -> Self {
        Self {
            consumed_samples,
            channels: channels.max(1),
            lead_frames,
        }
    }
}

impl RenderClock for DeviceClock {
    fn blocks_due(&mut self, rendered_blocks: u64) -> u64 {
        let consumed_frames = (self.consumed_samples.load(Ordering::Relaxed) / self.channels) as u64;
        let target = (consumed_frames + self.lead_frames) / BLOCK_FRAMES as u64;
        target.saturating_sub(rendered_blocks)
    }
}

/// Paced by [`Instant`], for hosts without a device callback to follow.
///
/// Re-anchors on every resume so suspended time is never rendered.
pub struct WallClock {
    sample_rate: f64,
    lead_blocks: u64,
    anchor: Instant,
    anchor_blocks: u64,
}

impl WallClock {
    pub fn new(sample_rate: u32, lead_blocks: u64) -> Self {
        Self {
            sample_rate: sample_rate as f64,
            lead_blocks,
            anchor: Instant::now(),
            anchor_blocks: 0,
        }
    }
}

impl RenderClock for WallClock {
    fn blocks_due(&mut self, rendered_blocks: u64) -> u64 {
        let elapsed = self.anchor.elapsed().as_secs_f64();
        let target = self.anchor_blocks
            + (elapsed * self.sample_rate / BLOCK_FRAMES as f64) as u64
            + self.lead_blocks;
        target.saturating_sub(rendered_blocks)
    }

    fn on_resume(&mut self, rendered_blocks: u64) {
        self.anchor = Instant::now();
        self.anchor_blocks = rendered_blocks;
    }
}

/// Renders only the blocks granted through its [`ManualClockDriver`].
///
/// Grants made while the context is suspended are kept and rendered after
/// the next resume.
pub struct ManualClock {
    budget: Arc<AtomicU64>,
}

/// Grants block budget to a [`ManualClock`] from any thread.
#[derive(Clone)]
pub struct ManualClockDriver {
    budget: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> (Self, ManualClockDriver) {
        let budget = Arc::new(AtomicU64::new(0));
        (
            Self { budget: budget.clone() },
            ManualClockDriver { budget },
        )
    }
}

impl ManualClockDriver {
    /// Allow `blocks` more blocks to be rendered.
    pub fn advance(&self, blocks: u64) {
        self.budget.fetch_add(blocks, Ordering::AcqRel);
    }

    /// Blocks granted but not rendered yet.
    pub fn pending(&self) -> u64 {
        self.budget.load(Ordering::Acquire)
    }
}

impl RenderClock for ManualClock {
    fn blocks_due(&mut self, _rendered_blocks: u64) -> u64 {
        self.budget.swap(0, Ordering::AcqRel)
    }

    fn refund(&mut self, blocks: u64) {
        self.budget.fetch_add(blocks, Ordering::AcqRel);
    }
}
