#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, Instant};

use rtrb::{Consumer, RingBuffer};
use tactus::nodes::RtrbSink;
use tactus::{BeatEngine, ClickSample, ContextBuilder, ManualClock, ManualClockDriver, BLOCK_FRAMES};

/// Low rate so a beat is a handful of blocks: 120 bpm is 1600 frames, 25 blocks.
pub const TEST_RATE: u32 = 3200;

pub struct Rig {
    pub engine: BeatEngine,
    pub driver: ManualClockDriver,
    pub output: Consumer<f32>,
}

/// An engine rendering into a ring buffer, paced by hand.
pub fn rig() -> Rig {
    let (producer, output) = RingBuffer::<f32>::new(1 << 17);
    let builder = ContextBuilder::new(TEST_RATE).with_output(RtrbSink::mono(producer));
    let (clock, driver) = ManualClock::new();
    let engine = BeatEngine::new(builder, clock).expect("launch engine");
    Rig { engine, driver, output }
}

/// Eight full-scale frames, then silence.
pub fn click() -> ClickSample {
    ClickSample::from_samples(vec![1.0; 8], TEST_RATE)
}

pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        sleep(Duration::from_millis(1));
    }
    cond()
}

/// Grant `blocks` blocks and wait until the render thread has produced them.
pub fn render(rig: &Rig, blocks: u64) {
    assert!(rig.engine.is_running(), "render() needs a running context");
    let target = rig.engine.context().frames_rendered() + blocks * BLOCK_FRAMES as u64;
    rig.driver.advance(blocks);
    assert!(
        wait_until(Duration::from_secs(5), || rig.engine.context().frames_rendered() >= target),
        "render thread did not reach {} frames",
        target
    );
}

/// Drain everything rendered so far.
pub fn drain(output: &mut Consumer<f32>) -> Vec<f32> {
    let mut samples = Vec::with_capacity(output.slots());
    while let Ok(s) = output.pop() {
        samples.push(s);
    }
    samples
}

/// Frame indices where a click starts (silence followed by sound).
pub fn onsets(samples: &[f32]) -> Vec<usize> {
    let mut onsets = Vec::new();
    let mut previous = 0.0f32;
    for (i, &s) in samples.iter().enumerate() {
        if s.abs() > 0.5 && previous.abs() <= 0.5 {
            onsets.push(i);
        }
        previous = s;
    }
    onsets
}

/// Write a 16-bit mono WAV holding `frames` full-scale frames.
pub fn write_click_wav(dir: &Path, name: &str, sample_rate: u32, frames: usize) -> PathBuf {
    let path = dir.join(name);
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
    for _ in 0..frames {
        writer.write_sample(i16::MAX).expect("write sample");
    }
    writer.finalize().expect("finalize wav");
    path
}
