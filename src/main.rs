//! Head Sway CLI
//!
//! Head orientation variance telemetry from pose keypoints.

use anyhow::{bail, Context};
use chrono::Local;
use clap::{Parser, Subcommand};
use crossbeam_channel::{unbounded, Receiver};
use head_sway_telemetry::{
    config::Config,
    core::{export::write_export, AlignmentPolicy, AngleChannel, TelemetryEngine},
    session::{create_shared_stats_with_persistence, spawn_config_watcher, spawn_console, Runner},
    source::{
        synthetic::SyntheticConfig, DetectionFrame, ReplayInput, ReplaySource, SyntheticSource,
    },
    VERSION,
};
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "head-sway")]
#[command(version = VERSION)]
#[command(about = "Head orientation sway telemetry from pose keypoints", long_about = None)]
struct Cli {
    /// Log per-frame detail
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Runtime settings that may be overridden on the command line.
#[derive(clap::Args, Debug, Default)]
struct Overrides {
    /// Processing rate in frames per second
    #[arg(long)]
    fps: Option<u32>,

    /// Retention window in seconds
    #[arg(long)]
    window: Option<u64>,

    /// Variance update interval in seconds
    #[arg(long)]
    cadence: Option<u64>,

    /// Angle channel for the variance (pitch, yaw or roll)
    #[arg(long)]
    channel: Option<String>,

    /// Export alignment (timestamp, timestamp:<max skew ms> or right-aligned)
    #[arg(long)]
    alignment: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process recorded detection frames (JSON lines)
    Run {
        /// Input file, or - for standard input
        #[arg(long, short, default_value = "-")]
        input: String,

        #[command(flatten)]
        overrides: Overrides,

        /// Process every recorded frame instead of only the newest per tick
        #[arg(long)]
        every_frame: bool,

        /// Write a CSV export when the session ends
        #[arg(long)]
        export_on_exit: bool,
    },

    /// Process synthetic head sway
    Demo {
        /// Seconds of simulated capture
        #[arg(long, default_value = "120")]
        seconds: u64,

        /// Simulated capture rate
        #[arg(long, default_value = "30")]
        rate: u32,

        /// Drop the pose every N frames
        #[arg(long)]
        dropout_every: Option<u64>,

        #[command(flatten)]
        overrides: Overrides,

        /// Write a CSV export when the session ends
        #[arg(long)]
        export_on_exit: bool,
    },

    /// Change settings; a running session picks them up within a second
    Set {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// Show configuration and cumulative statistics
    Status,

    /// Show configuration
    Config,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            input,
            overrides,
            every_frame,
            export_on_exit,
        } => cmd_run(&input, &overrides, every_frame, export_on_exit),
        Commands::Demo {
            seconds,
            rate,
            dropout_every,
            overrides,
            export_on_exit,
        } => cmd_demo(seconds, rate, dropout_every, &overrides, export_on_exit),
        Commands::Set { overrides } => cmd_set(&overrides),
        Commands::Status => {
            cmd_status();
            Ok(())
        }
        Commands::Config => {
            cmd_config();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Load the stored config, falling back to defaults if it is unreadable.
fn load_config() -> Config {
    Config::load().unwrap_or_else(|e| {
        eprintln!("Warning: Could not load config, using defaults: {e}");
        Config::default()
    })
}

fn apply_overrides(config: &mut Config, overrides: &Overrides) -> anyhow::Result<()> {
    if let Some(fps) = overrides.fps {
        config.target_fps = fps;
    }
    if let Some(window) = overrides.window {
        config.retention_window = Duration::from_secs(window);
    }
    if let Some(cadence) = overrides.cadence {
        config.cadence_period = Duration::from_secs(cadence);
    }
    if let Some(ref channel) = overrides.channel {
        config.channel = channel.parse::<AngleChannel>().map_err(anyhow::Error::msg)?;
    }
    if let Some(ref alignment) = overrides.alignment {
        config.alignment = alignment
            .parse::<AlignmentPolicy>()
            .map_err(anyhow::Error::msg)?;
    }
    config.validate()?;
    Ok(())
}

fn cmd_run(
    input: &str,
    overrides: &Overrides,
    every_frame: bool,
    export_on_exit: bool,
) -> anyhow::Result<()> {
    let stored = load_config();
    let mut config = stored.clone();
    apply_overrides(&mut config, overrides)?;

    let input = ReplayInput::from_arg(input);
    let mut source = ReplaySource::new(input.clone());
    source.start().context("starting replay source")?;

    let session = SessionOptions {
        console: !input.is_stdin(),
        every_frame,
        export_on_exit,
    };
    let result = run_session(&config, stored, source.receiver().clone(), session);
    source.stop();
    result
}

fn cmd_demo(
    seconds: u64,
    rate: u32,
    dropout_every: Option<u64>,
    overrides: &Overrides,
    export_on_exit: bool,
) -> anyhow::Result<()> {
    if rate == 0 {
        bail!("--rate must be at least 1");
    }
    let stored = load_config();
    let mut config = stored.clone();
    apply_overrides(&mut config, overrides)?;

    let mut source = SyntheticSource::new(SyntheticConfig {
        rate_hz: rate,
        frames: Some(seconds.saturating_mul(u64::from(rate))),
        dropout_every,
        ..SyntheticConfig::default()
    });
    source.start().context("starting synthetic source")?;

    // Synthetic time runs ahead of the wall clock, so no frame is dropped.
    let session = SessionOptions {
        console: true,
        every_frame: true,
        export_on_exit,
    };
    let result = run_session(&config, stored, source.receiver().clone(), session);
    source.stop();
    result
}

/// How a session treats its input and its end.
struct SessionOptions {
    /// Read export/reset/quit commands from stdin
    console: bool,
    /// Process every frame instead of only the newest per tick
    every_frame: bool,
    export_on_exit: bool,
}

fn run_session(
    config: &Config,
    stored: Config,
    frames: Receiver<DetectionFrame>,
    session: SessionOptions,
) -> anyhow::Result<()> {
    println!("Head Sway v{VERSION}");
    println!();

    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }

    println!("  Target rate: {} fps", config.target_fps);
    println!("  Retention window: {}s", config.retention_window.as_secs());
    println!("  Variance interval: {}s", config.cadence_period.as_secs());
    println!("  Channel: {}", config.channel);
    println!("  Alignment: {:?}", config.alignment);
    println!("  Exports: {}", config.export_path.display());
    println!();
    if session.console {
        println!("Type 'export', 'reset' or 'quit' and press Enter. Ctrl+C stops.");
    } else {
        println!("Press Ctrl+C to stop");
    }
    println!();

    let stats = create_shared_stats_with_persistence(config.stats_path());
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")?;

    let (command_tx, command_rx) = unbounded();

    if let Err(e) = spawn_config_watcher(
        Config::config_path(),
        stored,
        command_tx.clone(),
        running.clone(),
    ) {
        eprintln!("Warning: Runtime config updates disabled: {e}");
    }
    if session.console {
        if let Err(e) = spawn_console(BufReader::new(std::io::stdin()), command_tx.clone()) {
            eprintln!("Warning: Command console disabled: {e}");
        }
    }
    drop(command_tx);

    let runner = Runner::new(
        TelemetryEngine::new(config.engine_settings()),
        frames,
        command_rx,
        running.clone(),
        stats.clone(),
    )
    .with_tick_interval(config.tick_interval())
    .with_every_frame(session.every_frame)
    .with_export_dir(config.export_path.clone())
    .with_observer(|outcome, engine| {
        if outcome.snapshot.is_some() {
            let view = engine.view();
            println!(
                "[{}] {} variance: {} ({} points)",
                Local::now().format("%H:%M:%S"),
                view.channel,
                view.readout,
                view.series.len()
            );
        }
    });

    let report = runner.run();
    running.store(false, Ordering::SeqCst);

    println!();
    for path in &report.exports {
        println!("Exported {}", path.display());
    }

    if session.export_on_exit && !report.engine.samples().is_empty() {
        let csv = report.engine.export_csv();
        match write_export(&config.export_path, &csv) {
            Ok(path) => {
                stats.record_export();
                println!(
                    "Exported {} samples to {}",
                    report.engine.samples().len(),
                    path.display()
                );
            }
            Err(e) => eprintln!("Error writing export: {e}"),
        }
    }

    if let Err(e) = stats.save() {
        eprintln!("Warning: Could not save session stats: {e}");
    }

    println!();
    println!("{}", stats.summary());
    Ok(())
}

fn cmd_set(overrides: &Overrides) -> anyhow::Result<()> {
    let mut config = load_config();
    apply_overrides(&mut config, overrides)?;
    config.save().context("saving config")?;
    println!("Settings saved to {:?}", Config::config_path());
    Ok(())
}

fn cmd_status() {
    let config = load_config();

    println!("Head Sway Status");
    println!("================");
    println!();
    println!("Configuration:");
    println!("  Target rate: {} fps", config.target_fps);
    println!("  Retention window: {}s", config.retention_window.as_secs());
    println!("  Variance interval: {}s", config.cadence_period.as_secs());
    println!("  Channel: {}", config.channel);
    println!("  Alignment: {:?}", config.alignment);
    println!();

    let stats_path: PathBuf = config.stats_path();
    if stats_path.exists() {
        if let Ok(content) = std::fs::read_to_string(&stats_path) {
            if let Ok(stats) = serde_json::from_str::<serde_json::Value>(&content) {
                println!("Cumulative Statistics:");
                for (key, label) in [
                    ("frames_processed", "Frames processed"),
                    ("frames_without_pose", "Frames without pose"),
                    ("frames_skipped", "Frames skipped"),
                    ("samples_ingested", "Samples ingested"),
                    ("snapshots_produced", "Variance snapshots"),
                    ("exports_written", "Exports written"),
                    ("resets", "Resets"),
                ] {
                    if let Some(value) = stats.get(key) {
                        println!("  {label}: {value}");
                    }
                }
            }
        }
    } else {
        println!("No previous session data found.");
    }
}

fn cmd_config() {
    let config = load_config();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).unwrap_or_else(|_| "Error".to_string())
    );
}
