mod common;

use std::thread::sleep;
use std::time::Duration;

use common::*;
use rtrb::RingBuffer;
use tactus::nodes::{LoopPlayer, RtrbSink};
use tactus::{AssetError, ContextBuilder, EngineError, ManualClock};

#[test]
fn context_starts_suspended_and_renders_nothing() {
    let rig = rig();
    assert!(!rig.engine.is_running());

    rig.driver.advance(10);
    sleep(Duration::from_millis(30));

    assert_eq!(rig.engine.context().frames_rendered(), 0);
    assert_eq!(rig.driver.pending(), 10);
    assert_eq!(rig.engine.context().current_time(), 0.0);
}

#[test]
fn clicks_are_one_loop_window_apart() {
    let mut rig = rig();
    rig.engine.attach(click(), 120.0);
    rig.engine.start();

    // 4 beats of 1600 frames
    render(&rig, 100);

    let out = drain(&mut rig.output);
    assert_eq!(out.len(), 6400);
    assert_eq!(onsets(&out), vec![0, 1600, 3200, 4800]);
    assert_eq!(rig.engine.monitor().loops_completed(), 3);
    assert_eq!(rig.engine.context().current_time(), 2.0);
}

#[test]
fn clicks_follow_the_loop_window_not_the_sample_length() {
    let mut rig = rig();
    // Longer than a 300 bpm window (640 frames): cut off at the boundary
    let long = tactus::ClickSample::from_samples(vec![1.0; 1000], TEST_RATE);
    rig.engine.attach(long, 300.0);
    rig.engine.start();
    render(&rig, 20);

    let out = drain(&mut rig.output);
    assert_eq!(out[639], 1.0);
    assert_eq!(out[640], 1.0);
    assert_eq!(rig.engine.monitor().loops_completed(), 1);
    assert_eq!(rig.engine.monitor().loop_frames(), 640);
}

#[test]
fn last_tempo_before_boundary_wins() {
    let mut rig = rig();
    rig.engine.attach(click(), 120.0);
    rig.engine.start();
    render(&rig, 5);

    assert_eq!(rig.engine.set_tempo(60.0), 60);
    assert_eq!(rig.engine.set_tempo(300.0), 300);
    assert_eq!(rig.engine.current_bpm(), 300);

    // The beat in progress keeps its 1600 frames
    assert_eq!(rig.engine.monitor().loop_frames(), 1600);
    render(&rig, 20);
    assert_eq!(rig.engine.monitor().loops_completed(), 0);
    assert_eq!(rig.engine.monitor().loop_frames(), 1600);

    // Boundary crossed: 300 bpm latched, 60 bpm never used
    render(&rig, 1);
    assert_eq!(rig.engine.monitor().loops_completed(), 1);
    assert_eq!(rig.engine.monitor().loop_frames(), 640);

    render(&rig, 10);
    let out = drain(&mut rig.output);
    assert_eq!(onsets(&out), vec![0, 1600, 2240]);
}

#[test]
fn stop_then_start_keeps_phase() {
    let mut rig = rig();
    rig.engine.attach(click(), 120.0);
    rig.engine.start();
    render(&rig, 10);

    rig.engine.stop();
    assert!(!rig.engine.is_running());
    let position = rig.engine.monitor().position();
    assert_eq!(position, 640);

    // Budget granted while suspended is held, not rendered
    rig.driver.advance(5);
    sleep(Duration::from_millis(30));
    assert_eq!(rig.engine.context().frames_rendered(), 640);
    assert_eq!(rig.engine.monitor().position(), position);

    rig.engine.start();
    assert!(wait_until(Duration::from_secs(5), || {
        rig.engine.context().frames_rendered() >= 960
    }));
    assert_eq!(rig.engine.monitor().position(), 960);
    assert_eq!(rig.engine.monitor().loops_completed(), 0);

    render(&rig, 11);
    let out = drain(&mut rig.output);
    // No re-trigger at the resume point
    assert_eq!(onsets(&out), vec![0, 1600]);
}

#[test]
fn stop_is_idempotent() {
    let rig = rig();
    rig.engine.stop();
    rig.engine.stop();
    rig.engine.start();
    rig.engine.start();
    assert!(rig.engine.is_running());
    rig.engine.stop();
    rig.engine.stop();
    assert!(!rig.engine.is_running());
}

#[test]
fn tempo_is_clamped_and_floored() {
    let mut rig = rig();
    assert_eq!(rig.engine.set_tempo(999.9), 300);
    assert_eq!(rig.engine.set_tempo(f64::NAN), 30);
    assert_eq!(rig.engine.set_tempo(87.9), 87);
    assert_eq!(rig.engine.set_tempo(-5.0), 30);
    assert_eq!(rig.engine.normalize_bpm(45.5), 45);
    assert_eq!(rig.engine.current_bpm(), 30);
}

#[test]
fn initialize_loads_wav_and_resamples() {
    let dir = tempfile::tempdir().unwrap();
    // Twice the graph rate, so 16 frames become 8
    let wav = write_click_wav(dir.path(), "click.wav", TEST_RATE * 2, 16);

    let mut rig = rig();
    assert!(!rig.engine.is_ready());
    rig.engine.initialize(wav.to_str().unwrap(), 120.0).unwrap();
    assert!(rig.engine.is_ready());
    assert_eq!(rig.engine.current_bpm(), 120);

    rig.engine.start();
    render(&rig, 50);
    let out = drain(&mut rig.output);
    assert_eq!(onsets(&out), vec![0, 1600]);
    assert!(out[7] > 0.5);
    assert!(out[8].abs() < 0.5);
}

#[test]
fn initialize_accepts_file_urls() {
    let dir = tempfile::tempdir().unwrap();
    let wav = write_click_wav(dir.path(), "click.wav", TEST_RATE, 8);
    let url = format!("file://{}", wav.display());

    let mut rig = rig();
    rig.engine.initialize(&url, 90.0).unwrap();
    assert_eq!(rig.engine.current_bpm(), 90);
}

#[test]
fn initialize_reports_missing_asset() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.wav");

    let mut rig = rig();
    let err = rig.engine.initialize(missing.to_str().unwrap(), 120.0).unwrap_err();
    assert!(matches!(err, EngineError::Asset(AssetError::Fetch { .. })));
    assert!(!rig.engine.is_ready());
}

#[test]
fn initialize_reports_undecodable_asset() {
    let dir = tempfile::tempdir().unwrap();
    let junk = dir.path().join("junk.wav");
    std::fs::write(&junk, b"definitely not a riff header").unwrap();

    let mut rig = rig();
    let err = rig.engine.initialize(junk.to_str().unwrap(), 120.0).unwrap_err();
    assert!(matches!(err, EngineError::Asset(AssetError::Decode(_))));
}

#[test]
fn initialize_rejects_unknown_scheme() {
    let mut rig = rig();
    let err = rig.engine.initialize("ftp://example.com/click.wav", 120.0).unwrap_err();
    assert!(matches!(err, EngineError::Asset(AssetError::UnsupportedScheme(_))));
}

#[test]
fn background_initialize_then_attach() {
    let dir = tempfile::tempdir().unwrap();
    let wav = write_click_wav(dir.path(), "click.wav", TEST_RATE, 8);

    let mut rig = rig();
    let pending = rig.engine.begin_initialize(wav.to_str().unwrap()).unwrap();
    let click = pending.wait().unwrap();
    assert_eq!(click.samples().len(), 8);

    rig.engine.attach(click, 300.0);
    rig.engine.start();
    render(&rig, 20);
    let out = drain(&mut rig.output);
    assert_eq!(onsets(&out), vec![0, 640]);
}

#[test]
fn stereo_sink_duplicates_mono_player() {
    let (producer, mut consumer) = RingBuffer::<f32>::new(4096);
    let mut builder = ContextBuilder::new(TEST_RATE).with_output(RtrbSink::stereo(producer));

    let (player, monitor) = LoopPlayer::new();
    monitor.set_loop_end(0.1);
    let mut player = builder.add(player);
    builder.output(&player);
    player.send(tactus::nodes::LoopMessage::SetBuffer(vec![0.25; 4])).unwrap();
    player.send(tactus::nodes::LoopMessage::Start).unwrap();

    let (clock, driver) = ManualClock::new();
    let context = builder.launch(clock).unwrap();
    context.resume();
    driver.advance(2);
    assert!(wait_until(Duration::from_secs(5), || context.frames_rendered() >= 128));

    let out = drain(&mut consumer);
    assert_eq!(out.len(), 256);
    assert!(out[..8].iter().all(|&s| s == 0.25));
    assert_eq!(out[8], 0.0);
    assert_eq!(monitor.loop_frames(), 320);
}

#[test]
fn full_ring_drops_whole_blocks() {
    // Room for one block only
    let (producer, mut consumer) = RingBuffer::<f32>::new(100);
    let sink = RtrbSink::mono(producer);
    let dropped = sink.dropped_counter();
    let mut builder = ContextBuilder::new(TEST_RATE).with_output(sink);

    let (player, _monitor) = LoopPlayer::new();
    let mut player = builder.add(player);
    builder.output(&player);
    let free = player.capacity_left();
    player.send(tactus::nodes::LoopMessage::Start).unwrap();
    assert_eq!(player.capacity_left(), free - 1);

    let (clock, driver) = ManualClock::new();
    let context = builder.launch(clock).unwrap();
    context.resume();
    driver.advance(3);
    assert!(wait_until(Duration::from_secs(5), || context.frames_rendered() >= 192));

    assert_eq!(drain(&mut consumer).len(), 64);
    assert_eq!(dropped.load(std::sync::atomic::Ordering::Relaxed), 2);
}

#[test]
fn monitor_tracks_the_node_clock() {
    let rig = rig();
    let monitor = rig.engine.monitor().clone();
    assert!(!monitor.is_playing());

    let mut rig = rig;
    rig.engine.attach(click(), 120.0);
    assert_eq!(monitor.loop_end(), 0.5);
    rig.engine.start();
    render(&rig, 60);

    assert!(monitor.is_playing());
    assert_eq!(monitor.loops_completed(), 2);
    assert_eq!(monitor.position(), 640);
    assert_eq!(monitor.frames_played(), 3840);
}

#[test]
fn stop_halts_rendering_mid_batch() {
    let mut rig = rig();
    rig.engine.attach(click(), 120.0);
    rig.engine.start();

    // Far more than the render thread can finish before the stop
    rig.driver.advance(1_000_000);
    assert!(wait_until(Duration::from_secs(5), || rig.engine.context().frames_rendered() > 0));
    rig.engine.stop();

    let frames = rig.engine.context().frames_rendered();
    let position = rig.engine.monitor().position();
    let loops = rig.engine.monitor().loops_completed();
    sleep(Duration::from_millis(100));

    assert_eq!(rig.engine.context().frames_rendered(), frames);
    assert_eq!(rig.engine.monitor().position(), position);
    assert_eq!(rig.engine.monitor().loops_completed(), loops);

    // The unrendered part of the batch is kept for the next resume
    assert_eq!(rig.driver.pending(), 1_000_000 - frames / 64);
    drain(&mut rig.output);
}

#[test]
fn dropping_the_context_closes_the_output_gate() {
    let (producer, _consumer) = RingBuffer::<f32>::new(1024);
    let gate = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(true));
    let mut builder = ContextBuilder::new(TEST_RATE)
        .with_output(RtrbSink::mono(producer))
        .with_output_gate(gate.clone());
    let (player, _monitor) = LoopPlayer::new();
    let player = builder.add(player);
    builder.output(&player);

    let (clock, _driver) = ManualClock::new();
    let context = builder.launch(clock).unwrap();
    context.resume();
    assert!(!gate.load(std::sync::atomic::Ordering::Acquire));

    drop(context);
    assert!(gate.load(std::sync::atomic::Ordering::Acquire));
}
