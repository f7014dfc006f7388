//! CPAL audio output sink

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, SupportedStreamConfig};
use dasp_graph::{Buffer, Input};
use rtrb::{Consumer, Producer, RingBuffer};
use crossbeam_channel::Sender;
use tracing::{debug, error};

use crate::error::EngineError;
use crate::node::{AudioNode, ProcessContext};

/// A sink that outputs audio to a CPAL device.
///
/// The CPAL stream runs on its own thread; this node feeds samples into a
/// ring buffer that the stream consumes. The stream also publishes how many
/// samples it has consumed, which is what [`DeviceClock`](crate::DeviceClock)
/// paces rendering against.
///
/// While the gate returned by [`suspend_gate`](Self::suspend_gate) is set, the
/// stream plays silence and leaves queued audio in place, so nothing already
/// rendered is lost or skipped across a suspend.
///
/// Dropping the sink closes the stream and joins its thread, releasing the
/// device. The sink lives in the graph, so this happens when the owning
/// [`AudioContext`](crate::AudioContext) is dropped.
pub struct CpalSink {
    buffer: Producer<f32>,
    channels: usize,
    samples_consumed: Arc<AtomicUsize>,
    suspended: Arc<AtomicBool>,
    /// Dropped to tell the stream thread to close the stream
    shutdown: Option<Sender<()>>,
    stream_thread: Option<JoinHandle<()>>,
}

impl CpalSink {
    /// Open an output stream on `device` and return the sink feeding it.
    pub fn new(device: &cpal::Device, config: &SupportedStreamConfig) -> Result<Self, EngineError> {
        let channels = config.channels() as usize;
        let sample_format = config.sample_format();
        let stream_config = config.config();
        let sample_rate = stream_config.sample_rate.0;

        // Ring buffer sized for ~100ms of audio to absorb scheduling jitter
        let buffer_samples = ((sample_rate as f32 * 0.1) as usize) * channels;
        let buffer_size = buffer_samples.next_power_of_two().max(8192);
        let (producer, consumer) = RingBuffer::<f32>::new(buffer_size);

        let samples_consumed = Arc::new(AtomicUsize::new(0));
        let suspended = Arc::new(AtomicBool::new(true));

        let taps = StreamTaps {
            samples_consumed: samples_consumed.clone(),
            suspended: suspended.clone(),
        };

        // The stream is not Send on every host, so it lives on its own thread
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let device = device.clone();
        let stream_thread = std::thread::Builder::new()
            .name("tactus-cpal".into())
            .spawn(move || {
                let stream = match build_stream(&device, sample_format, &stream_config, consumer, taps) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(EngineError::BuildStream(e)));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(EngineError::PlayStream(e)));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Stream lives until the sink drops its sender
                let _ = shutdown_rx.recv();
                drop(stream);
                debug!("cpal stream closed");
            })
            .map_err(EngineError::Spawn)?;

        ready_rx.recv().map_err(|_| EngineError::NoOutputDevice)??;

        Ok(Self {
            buffer: producer,
            channels,
            samples_consumed,
            suspended,
            shutdown: Some(shutdown_tx),
            stream_thread: Some(stream_thread),
        })
    }

    /// Shared count of samples (not frames) the device has consumed.
    pub fn consumed_counter(&self) -> Arc<AtomicUsize> {
        self.samples_consumed.clone()
    }

    /// Gate that silences the stream without draining it. Starts set.
    pub fn suspend_gate(&self) -> Arc<AtomicBool> {
        self.suspended.clone()
    }

    /// Number of interleaved output channels.
    pub fn channels(&self) -> usize {
        self.channels
    }
}

struct StreamTaps {
    samples_consumed: Arc<AtomicUsize>,
    suspended: Arc<AtomicBool>,
}

impl StreamTaps {
    /// Fill `data` from the ring buffer, converting each sample with `convert`.
    fn fill<T>(&self, data: &mut [T], consumer: &mut Consumer<f32>, convert: impl Fn(f32) -> T) {
        if self.suspended.load(Ordering::Acquire) {
            data.iter_mut().for_each(|s| *s = convert(0.0));
            return;
        }

        // Underruns play as silence
        for sample in data.iter_mut() {
            *sample = convert(consumer.pop().unwrap_or(0.0));
        }
        self.samples_consumed.fetch_add(data.len(), Ordering::Relaxed);
    }
}

fn build_stream(
    device: &cpal::Device,
    sample_format: SampleFormat,
    stream_config: &cpal::StreamConfig,
    mut consumer: Consumer<f32>,
    taps: StreamTaps,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    let on_error = |err: cpal::StreamError| error!("cpal stream error: {:?}", err);

    match sample_format {
        SampleFormat::F32 => device.build_output_stream(
            stream_config,
            move |data: &mut [f32], _| taps.fill(data, &mut consumer, |s| s),
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_output_stream(
            stream_config,
            move |data: &mut [i16], _| {
                taps.fill(data, &mut consumer, |s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)
            },
            on_error,
            None,
        ),
        SampleFormat::U16 => device.build_output_stream(
            stream_config,
            move |data: &mut [u16], _| {
                taps.fill(data, &mut consumer, |s| {
                    ((s.clamp(-1.0, 1.0) + 1.0) * 0.5 * u16::MAX as f32) as u16
                })
            },
            on_error,
            None,
        ),
        _ => Err(cpal::BuildStreamError::StreamConfigNotSupported),
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.suspended.store(true, Ordering::Release);
        self.shutdown.take();
        if let Some(thread) = self.stream_thread.take() {
            let _ = thread.join();
        }
    }
}

impl AudioNode for CpalSink {
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

        // Generating faster than consuming: skip rather than partially write
        if self.buffer.slots() < buffer_len * self.channels {
            return;
        }

        for i in 0..buffer_len {
            for ch in 0..self.channels {
                // Duplicate mono to every device channel
                let src_ch = ch.min(buffers.len() - 1);
                let _ = self.buffer.push(buffers[src_ch][i]);
            }
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize { 1 }

    #[inline]
    fn num_outputs(&self) -> usize { 0 }
}
