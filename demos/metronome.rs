//! Practice metronome on the default output device
//!
//! Run with: cargo run --example metronome --features cpal_sink -- --bpm 96

use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{info, warn, Level};

use tactus::{
    BackgroundTicker, BeatEngine, CpalDevice, FileStore, Metronome, MetronomeConfig, MetronomeEvent,
    PresetStore, StoreError,
};

#[derive(Parser, Debug)]
#[command(about = "Drift-free practice metronome")]
struct Args {
    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Click sound: path, file:// or http(s):// URL (a click is synthesized if omitted)
    #[arg(long)]
    sound: Option<String>,

    /// Tempo in bpm; overrides the selected preset
    #[arg(long)]
    bpm: Option<f64>,

    /// Name of a stored preset to play
    #[arg(long)]
    preset: Option<String>,

    /// Stop after this many seconds
    #[arg(long, default_value_t = 10.0)]
    seconds: f64,

    /// List output devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

/// A 20 ms decaying 1 kHz blip.
fn write_click(dir: &Path) -> Result<PathBuf, hound::Error> {
    let path = dir.join("click.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 48_000,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    for i in 0..960 {
        let t = i as f32 / 48_000.0;
        let envelope = (-t * 250.0).exp();
        writer.write_sample((t * 1000.0 * std::f32::consts::TAU).sin() * envelope * 0.8)?;
    }
    writer.finalize()?;
    Ok(path)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    if args.list_devices {
        for (i, device) in CpalDevice::list_outputs().iter().enumerate() {
            println!("[{}] {} ({} Hz, {} ch)", i, device.name(), device.sample_rate(), device.channels());
        }
        return Ok(());
    }

    let mut config = match &args.config {
        Some(path) => MetronomeConfig::load(path)?,
        None => MetronomeConfig::default(),
    };

    let scratch = tempfile::tempdir()?;
    config.sound = match args.sound {
        Some(sound) => sound,
        None if Path::new(&config.sound).exists() || config.sound.contains("://") => config.sound,
        None => write_click(scratch.path())?.display().to_string(),
    };

    // Presets
    let mut store = PresetStore::open(FileStore::open(&config.storage_dir)?)?;
    let mut data = match store.get() {
        Ok(data) => data,
        Err(StoreError::Parse { .. }) => {
            warn!("preset record is corrupt, replacing it with the default");
            store.reseed()?
        }
        Err(err) => return Err(err.into()),
    };
    if let Some(name) = &args.preset {
        if data.select(name) {
            store.save(&data)?;
        } else {
            warn!(name = %name, "no such preset, keeping {}", data.current_name);
        }
    }
    let preset = data.current().cloned();

    // Engine
    let engine = BeatEngine::default_output(config.lead_frames)?;
    let ticker = BackgroundTicker::spawn()?;
    let mut metronome = Metronome::new(engine, ticker, config)?;

    match (args.bpm, &preset) {
        (Some(bpm), _) => {
            metronome.set_tempo(bpm);
        }
        (None, Some(preset)) => {
            info!(name = %preset.name, goal = preset.goal_bpm, "playing preset");
            metronome.select_preset(preset);
        }
        (None, None) => {}
    }
    metronome.start();

    let started = Instant::now();
    while started.elapsed().as_secs_f64() < args.seconds {
        for event in metronome.poll() {
            match event {
                MetronomeEvent::Ready { bpm } => info!(bpm, "ready"),
                MetronomeEvent::LoadFailed(err) => return Err(err.into()),
                MetronomeEvent::Pulse(pulse) if metronome.is_running() => {
                    let time = metronome.engine().context().current_time();
                    println!("tick {:>4}  audio clock {:>8.3}s", pulse.seq, time);
                }
                MetronomeEvent::Pulse(_) => {}
                MetronomeEvent::Stalled { frames } => warn!(frames, "audio output stalled"),
            }
        }
        sleep(Duration::from_millis(5));
    }

    metronome.stop();
    Ok(())
}
