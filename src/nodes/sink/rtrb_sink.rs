//! Ring buffer sink for offline rendering and tests

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dasp_graph::{Buffer, Input};
use rtrb::Producer;

use crate::node::{AudioNode, ProcessContext};

/// A sink that pushes audio into an rtrb ring buffer
///
/// Useful for:
/// - Inspecting rendered clicks from another thread
/// - Feeding a custom output backend
///
/// Blocks that don't fit are dropped whole and counted, see
/// [`dropped_counter`](Self::dropped_counter).
pub struct RtrbSink {
    producer: Producer<f32>,
    channels: usize,
    dropped_blocks: Arc<AtomicU64>,
}

impl RtrbSink {
    /// Create a sink that writes interleaved samples to the given producer
    pub fn new(producer: Producer<f32>, channels: usize) -> Self {
        Self {
            producer,
            channels: channels.max(1),
            dropped_blocks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a sink for mono audio
    pub fn mono(producer: Producer<f32>) -> Self {
        Self::new(producer, 1)
    }

    /// Create a sink for stereo audio
    pub fn stereo(producer: Producer<f32>) -> Self {
        Self::new(producer, 2)
    }

    /// Shared count of blocks dropped because the ring buffer was full
    pub fn dropped_counter(&self) -> Arc<AtomicU64> {
        self.dropped_blocks.clone()
    }
}

impl AudioNode for RtrbSink {
    type Message = ();

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        inputs: &[Input],
        _outputs: &mut [Buffer],
    ) {
        let Some(input) = inputs.first() else {
            return;
        };
        let buffers = input.buffers();
        if buffers.is_empty() {
            return;
        }

        let buffer_len = buffers[0].len();
        if self.producer.slots() < buffer_len * self.channels {
            self.dropped_blocks.fetch_add(1, Ordering::Relaxed);
            return;
        }

        // Interleave channels, duplicating mono input across outputs
        for i in 0..buffer_len {
            for ch in 0..self.channels {
                let src_ch = ch.min(buffers.len() - 1);
                let _ = self.producer.push(buffers[src_ch][i]);
            }
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize { 1 }

    #[inline]
    fn num_outputs(&self) -> usize { 0 }
}
