mod progress;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use wavereel_core::config::Config;
use wavereel_core::presets::WAVEFORM_PRESETS;
use wavereel_core::types::Mode;
use wavereel_render::batch::{run_batch, Session};
use wavereel_render::tracker::{sweep_stale, TempTracker};

use crate::progress::BarSink;

/// Exit status after an interrupt (128 + SIGINT).
const INTERRUPTED_EXIT: i32 = 130;

/// Loaded when present and no `--config` is given.
const DEFAULT_CONFIG_FILE: &str = "wavereel.toml";

#[derive(Parser, Debug)]
#[command(
    name = "wavereel",
    version,
    about = "Turn a folder of audio tracks into audio-reactive visualizer videos"
)]
struct Cli {
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Primary visual source: image or video
    #[arg(long)]
    mode: Option<Mode>,

    /// Folder with the audio files (and images in image mode)
    #[arg(long, value_name = "DIR")]
    input: Option<PathBuf>,

    /// Folder for finished videos
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Folder with looping overlay clips
    #[arg(long, value_name = "DIR")]
    overlay_dir: Option<PathBuf>,

    /// Folder with background videos (video mode)
    #[arg(long, value_name = "DIR")]
    videos_dir: Option<PathBuf>,

    #[arg(long)]
    width: Option<u32>,

    #[arg(long)]
    height: Option<u32>,

    /// Render the track name as a title (needs ImageMagick)
    #[arg(long)]
    text: bool,

    /// Font for the title
    #[arg(long, value_name = "NAME")]
    font: Option<String>,

    /// Allow random assets to repeat before all have been used
    #[arg(long)]
    allow_repeats: bool,

    /// Print the waveform style catalog as JSON and exit
    #[arg(long)]
    list_presets: bool,

    /// Debug logging, including full tool command lines
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(dir) = &self.input {
            config.input_dir = dir.clone();
        }
        if let Some(dir) = &self.output {
            config.output_dir = dir.clone();
        }
        if let Some(dir) = &self.overlay_dir {
            config.overlay_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.videos_dir {
            config.videos_dir = Some(dir.clone());
        }
        if self.width.is_some() {
            config.canvas.width = self.width;
        }
        if self.height.is_some() {
            config.canvas.height = self.height;
        }
        if self.text {
            config.text.enabled = true;
        }
        if let Some(font) = &self.font {
            config.text.font = font.clone();
        }
        if self.allow_repeats {
            config.no_repeat = false;
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_FILE).is_file() => Config::load(DEFAULT_CONFIG_FILE)
            .with_context(|| format!("failed to load {DEFAULT_CONFIG_FILE}"))?,
        None => Config::default(),
    };
    cli.apply(&mut config);
    Ok(config)
}

fn preset_catalog() -> serde_json::Result<String> {
    serde_json::to_string_pretty(WAVEFORM_PRESETS)
}

fn print_banner(config: &Config) {
    let canvas = config
        .canvas()
        .map(|c| c.to_string())
        .unwrap_or_else(|_| "invalid".to_string());
    println!("wavereel {}", env!("CARGO_PKG_VERSION"));
    println!("  mode:   {:?}", config.mode);
    println!("  canvas: {canvas}");
    println!("  input:  {}", config.input_dir.display());
    println!("  output: {}", config.output_dir.display());
    println!();
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

#[cfg(unix)]
struct Signals {
    terminate: Option<tokio::signal::unix::Signal>,
}

#[cfg(unix)]
impl Signals {
    fn new() -> Self {
        use tokio::signal::unix::{signal, SignalKind};
        Self {
            terminate: signal(SignalKind::terminate()).ok(),
        }
    }

    /// Next SIGINT or SIGTERM. False if signals cannot be received.
    async fn next(&mut self) -> bool {
        match self.terminate.as_mut() {
            Some(term) => tokio::select! {
                r = tokio::signal::ctrl_c() => r.is_ok(),
                _ = term.recv() => true,
            },
            None => tokio::signal::ctrl_c().await.is_ok(),
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn new() -> Self {
        Signals
    }

    async fn next(&mut self) -> bool {
        tokio::signal::ctrl_c().await.is_ok()
    }
}

/// First signal: stop the running job and let `main` clean up. Second
/// signal: clean up right here and exit.
fn spawn_signal_handler(tracker: TempTracker, grace: Duration) {
    tokio::spawn(async move {
        let mut signals = Signals::new();
        let mut received = 0;
        while signals.next().await {
            received += 1;
            if received == 1 {
                tracing::warn!("Interrupted, stopping the current job (again to force)");
                tracker.interrupt();
            } else {
                tracing::warn!("Forcing cleanup");
                tracker.cleanup_all(grace);
                std::process::exit(INTERRUPTED_EXIT);
            }
        }
    });
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.list_presets {
        println!("{}", preset_catalog()?);
        return Ok(());
    }

    let config = load_config(&cli)?;
    print_banner(&config);

    std::fs::create_dir_all(&config.output_dir)
        .with_context(|| format!("failed to create {}", config.output_dir.display()))?;
    sweep_stale(&config.output_dir);

    let grace = Duration::from_secs(config.grace_period_secs);
    let tracker = TempTracker::new();
    spawn_signal_handler(tracker.clone(), grace);

    let mut session = Session::new(config, tracker.clone(), Arc::new(BarSink::new()))
        .context("invalid configuration")?;
    tracing::debug!("{session:?}");

    let result = run_batch(&mut session).await;

    let report = tracker.cleanup_all(grace);
    if report.left > 0 {
        tracing::warn!("{} temp file(s) could not be removed", report.left);
    }

    match result {
        Ok(tally) => {
            println!();
            println!("Successfully processed {tally} file(s)");
            Ok(())
        }
        Err(e) if e.is_interrupt() => {
            eprintln!("Interrupted. Removed {} temp file(s).", report.removed);
            std::process::exit(INTERRUPTED_EXIT);
        }
        Err(e) => Err(e).context("batch failed"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
