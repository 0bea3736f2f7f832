//! Glitch CLI - run, render or inspect a pattern

use clap::{Parser, Subcommand};
use glitch::analysis::FftSource;
use glitch::bridge::{BridgeConfig, EngineConfig, PatternBridge};
use glitch::bus::EventBus;
use glitch::clock::CycleClock;
use glitch::pattern::PatternTable;
use glitch::scheduler::SchedulerCore;
use glitch::synth::{render_cycles, write_wav, AudioRenderer};
use glitch::time::WallClock;
use glitch::visual::TerminalVisualizer;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "glitch")]
#[command(about = "Cycle-based pattern engine for the journal pages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a pattern live with terminal band meters
    Play {
        /// Pattern table JSON file (defaults to the built-in demo loop)
        #[arg(short, long)]
        pattern: Option<PathBuf>,

        /// Tempo in beats per minute
        #[arg(short, long, default_value = "120")]
        bpm: f64,

        /// Beats per cycle
        #[arg(long, default_value = "4")]
        beats: f64,

        /// How long to play, in seconds
        #[arg(short, long, default_value = "8.0")]
        duration: f32,

        /// Analyze the live mix with an FFT instead of synthetic bands
        #[arg(long)]
        fft: bool,

        /// Skip audio output, keep the meters
        #[arg(long)]
        mute: bool,
    },

    /// Render whole cycles of a pattern to a WAV file
    Render {
        /// Output WAV file path
        output: PathBuf,

        /// Pattern table JSON file (defaults to the built-in demo loop)
        #[arg(short, long)]
        pattern: Option<PathBuf>,

        /// Tempo in beats per minute
        #[arg(short, long, default_value = "120")]
        bpm: f64,

        /// Beats per cycle
        #[arg(long, default_value = "4")]
        beats: f64,

        /// Number of cycles to render
        #[arg(short, long, default_value = "4")]
        cycles: u32,

        /// Sample rate in Hz
        #[arg(short, long, default_value = "44100")]
        sample_rate: u32,
    },

    /// Print one cycle of scheduled fires without making a sound
    Preview {
        /// Pattern table JSON file (defaults to the built-in demo loop)
        #[arg(short, long)]
        pattern: Option<PathBuf>,

        /// Tempo in beats per minute
        #[arg(short, long, default_value = "120")]
        bpm: f64,

        /// Beats per cycle
        #[arg(long, default_value = "4")]
        beats: f64,
    },
}

fn load_table(path: &Option<PathBuf>) -> glitch::Result<PatternTable> {
    match path {
        Some(path) => PatternTable::from_json_file(path),
        None => Ok(PatternTable::demo()),
    }
}

fn main() -> glitch::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Play {
            pattern,
            bpm,
            beats,
            duration,
            fft,
            mute,
        } => play(pattern, bpm, beats, duration, fft, mute),
        Commands::Render {
            output,
            pattern,
            bpm,
            beats,
            cycles,
            sample_rate,
        } => render(output, pattern, bpm, beats, cycles, sample_rate),
        Commands::Preview {
            pattern,
            bpm,
            beats,
        } => preview(pattern, bpm, beats),
    }
}

fn play(
    pattern: Option<PathBuf>,
    bpm: f64,
    beats: f64,
    duration: f32,
    fft: bool,
    mute: bool,
) -> glitch::Result<()> {
    let table = load_table(&pattern)?;
    let engine = EngineConfig {
        bpm,
        beats_per_cycle: beats,
        ..EngineConfig::default()
    };
    let config = BridgeConfig::default();

    let bus = Arc::new(EventBus::new());
    let bridge = PatternBridge::new(
        table,
        engine,
        config,
        Arc::new(WallClock::new()),
        Arc::clone(&bus),
    )?;

    // wire the renderers before playback so they catch the first events
    let visualizer = TerminalVisualizer::attach(Arc::clone(&bus));
    let _audio = if mute {
        None
    } else {
        let feed = if fft {
            let rate = glitch::synth::default_output_sample_rate()?;
            let (source, feed) = FftSource::new(rate as f32, config.fft_size)?;
            bridge.connect_source(Box::new(source));
            Some(feed)
        } else {
            None
        };
        Some(AudioRenderer::start(Arc::clone(&bus), feed)?)
    };

    println!(
        "playing {} beats/cycle at {} bpm for {:.1}s (ctrl-c to quit early)",
        beats, bpm, duration
    );
    bridge.play();

    let started = Instant::now();
    let mut stdout = std::io::stdout();
    while started.elapsed().as_secs_f32() < duration {
        visualizer.draw(&mut stdout)?;
        std::thread::sleep(Duration::from_millis(50));
    }

    bridge.stop();
    visualizer.detach();
    println!();
    Ok(())
}

fn render(
    output: PathBuf,
    pattern: Option<PathBuf>,
    bpm: f64,
    beats: f64,
    cycles: u32,
    sample_rate: u32,
) -> glitch::Result<()> {
    let table = load_table(&pattern)?;
    let engine = EngineConfig {
        bpm,
        beats_per_cycle: beats,
        ..EngineConfig::default()
    };

    let samples = render_cycles(&table, &engine, cycles, sample_rate)?;
    write_wav(&output, &samples, sample_rate)?;
    println!(
        "wrote {} cycles ({:.2}s) to {}",
        cycles,
        samples.len() as f64 / sample_rate as f64,
        output.display()
    );
    Ok(())
}

fn preview(pattern: Option<PathBuf>, bpm: f64, beats: f64) -> glitch::Result<()> {
    let table = load_table(&pattern)?;
    let engine = EngineConfig {
        bpm,
        beats_per_cycle: beats,
        ..EngineConfig::default()
    };
    let cycle_ms = engine.validate()?;

    println!("one cycle = {:.1}ms at {} bpm, {} beats", cycle_ms, bpm, beats);

    let clock = CycleClock::with_cycle_ms(0.0, cycle_ms);
    let mut core = SchedulerCore::new(clock, table, engine.tick_interval_ms);

    for fired in core.begin(0.0) {
        println!(
            "  {:>7.1}ms  pos {:.3}  {:?}  gain {:.2}",
            0.0, fired.event.time, fired.event.category, fired.event.gain
        );
    }
    let mut now_ms = 0.0;
    while now_ms < cycle_ms {
        now_ms += engine.tick_interval_ms;
        for fired in core.tick(now_ms) {
            println!(
                "  {:>7.1}ms  pos {:.3}  {:?}  gain {:.2}",
                now_ms, fired.event.time, fired.event.category, fired.event.gain
            );
        }
    }
    Ok(())
}
