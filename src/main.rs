use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use mayra::db::{self, Stores, memory::format_listing};
use mayra::prompt::{PromptContext, build_system_instruction};
use mayra::Config;
use mayra::voice::{
    CpalMicrophone, CpalSpeaker, Microphone, PlaybackScheduler, Speaker, rms, samples_to_wav,
};

/// Mayra - voice-first conversational assistant
#[derive(Parser)]
#[command(name = "mayra", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Write the captured audio to a WAV file
        #[arg(short, long)]
        record: Option<PathBuf>,
    },
    /// Test speaker output
    TestSpeaker,
    /// Print the system instruction the next session would receive
    Prompt,
    /// List long-term memories
    Memories,
    /// Delete long-term memories by index
    Forget {
        /// Delete every memory
        #[arg(long, conflicts_with = "indices")]
        all: bool,
        /// Indices as shown by `mayra memories`
        indices: Vec<usize>,
    },
    /// Set the owner's name
    SetName {
        name: String,
    },
    /// Clear the persisted transcript and mode
    ResetSession,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,mayra=info",
        1 => "info,mayra=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load()?;
    tracing::debug!(data_dir = %config.data_dir.display(), "loaded configuration");

    match cli.command {
        Command::TestMic { duration, record } => test_mic(&config, duration, record).await,
        Command::TestSpeaker => test_speaker(&config).await,
        Command::Prompt => show_prompt(&config),
        Command::Memories => list_memories(&config),
        Command::Forget { all, indices } => forget(&config, all, &indices),
        Command::SetName { name } => set_name(&config, &name),
        Command::ResetSession => reset_session(&config),
    }
}

fn open_stores(config: &Config) -> anyhow::Result<Stores> {
    let pool = db::init(config.db_path())?;
    Ok(Stores::new(pool))
}

/// Test microphone input
async fn test_mic(config: &Config, duration: u64, record: Option<PathBuf>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let window = Arc::new(Mutex::new(Vec::<f32>::new()));
    let recording = Arc::new(Mutex::new(Vec::<f32>::new()));
    let keep = record.is_some();

    let mut microphone = CpalMicrophone::new(config.audio);
    let mut stream = {
        let window = Arc::clone(&window);
        let recording = Arc::clone(&recording);
        microphone.open(Box::new(move |samples| {
            if keep && let Ok(mut all) = recording.lock() {
                all.extend_from_slice(&samples);
            }
            if let Ok(mut w) = window.lock() {
                w.extend(samples);
            }
        }))?
    };

    println!("Capture rate: {} Hz", config.audio.input_sample_rate);
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = window
            .lock()
            .map(|mut w| std::mem::take(&mut *w))
            .unwrap_or_default();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    stream.stop();

    if let Some(path) = record {
        let samples = recording
            .lock()
            .map(|mut all| std::mem::take(&mut *all))
            .unwrap_or_default();
        let wav = samples_to_wav(&samples, config.audio.input_sample_rate)?;
        tokio::fs::write(&path, wav).await?;
        println!("\nRecorded {} samples to {}", samples.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker(config: &Config) -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = config.audio.output_sample_rate;
    let frequency = 440.0_f32;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
    let mut speaker = CpalSpeaker::new(sample_rate);
    let mut output = speaker.open(Box::new(move |id| {
        let _ = done_tx.send(id);
    }))?;

    let mut scheduler = PlaybackScheduler::new(sample_rate);
    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);
    let scheduled = scheduler.enqueue(output.as_mut(), samples)?;

    if let Some(scheduled) = scheduled {
        let wait = Duration::from_secs_f64(scheduled.duration + 1.0);
        match tokio::time::timeout(wait, done_rx.recv()).await {
            Ok(Some(id)) => {
                scheduler.finished(id);
            }
            _ => tracing::warn!("playback did not report completion"),
        }
    }
    drop(output);

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Print the system instruction for the current stored state
fn show_prompt(config: &Config) -> anyhow::Result<()> {
    let stores = open_stores(config)?;
    let mode = stores.session.load_mode();
    let ctx = PromptContext::gather(&stores, config.screen_width, mode)
        .with_google_search(config.session.google_search);
    println!("{}", build_system_instruction(&ctx));
    Ok(())
}

fn list_memories(config: &Config) -> anyhow::Result<()> {
    let stores = open_stores(config)?;
    let items = stores.memory.list();
    if items.is_empty() {
        println!("No memories stored.");
    } else {
        println!("{}", format_listing(&items));
    }
    Ok(())
}

fn forget(config: &Config, all: bool, indices: &[usize]) -> anyhow::Result<()> {
    let stores = open_stores(config)?;

    if all {
        stores.memory.clear()?;
        println!("All memories cleared.");
        return Ok(());
    }

    if indices.is_empty() {
        anyhow::bail!("provide memory indices or --all");
    }

    let removed = stores.memory.delete_indices(indices)?;
    println!("Deleted {removed} memories.");
    Ok(())
}

fn set_name(config: &Config, name: &str) -> anyhow::Result<()> {
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("name must not be empty");
    }

    let stores = open_stores(config)?;
    stores.prefs.set_name(name)?;
    println!("Owner name set to {name}");
    Ok(())
}

fn reset_session(config: &Config) -> anyhow::Result<()> {
    let stores = open_stores(config)?;
    stores.session.clear()?;
    println!("Session transcript and mode cleared");
    Ok(())
}
