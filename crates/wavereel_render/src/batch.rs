use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use wavereel_core::assets::{
    find_companion, pick_visual_asset, read_matching, stem, AssetHistory, AUDIO_EXTENSIONS,
    IMAGE_EXTENSIONS, VIDEO_EXTENSIONS,
};
use wavereel_core::config::Config;
use wavereel_core::types::{Canvas, Job, Mode};

use crate::error::{RenderError, Result};
use crate::execute::{Executor, ProgressSink};
use crate::pipeline::make_visualizer;
use crate::text::locate_magick;
use crate::tracker::TempTracker;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Everything a batch shares across jobs: configuration, the executor (and
/// through it the temp tracker), no-repeat histories and the RNG.
pub struct Session {
    config: Config,
    canvas: Canvas,
    exec: Executor,
    videos: AssetHistory,
    overlays: AssetHistory,
    rng: StdRng,
    magick: Option<PathBuf>,
}

impl Session {
    pub fn new(config: Config, tracker: TempTracker, sink: Arc<dyn ProgressSink>) -> Result<Self> {
        let canvas = config.canvas()?;
        let grace = Duration::from_secs(config.grace_period_secs);

        let magick = if config.text.enabled {
            let found = locate_magick(config.tools.magick.as_deref());
            if found.is_none() {
                tracing::warn!("ImageMagick not found, text overlays disabled");
            }
            found
        } else {
            None
        };

        Ok(Self {
            config,
            canvas,
            exec: Executor::new(tracker, grace, sink),
            videos: AssetHistory::new(),
            overlays: AssetHistory::new(),
            rng: StdRng::from_entropy(),
            magick,
        })
    }

    /// Replace the RNG, e.g. with a seeded one.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn executor(&self) -> &Executor {
        &self.exec
    }

    pub fn tracker(&self) -> &TempTracker {
        self.exec.tracker()
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// Text rendering is active only when enabled and ImageMagick was found.
    pub fn magick(&self) -> Option<&Path> {
        self.magick.as_deref()
    }

    /// Random overlay clip, honoring the no-repeat setting.
    pub fn pick_overlay(&mut self) -> Option<PathBuf> {
        let dir = self.config.overlay_dir();
        if self.config.no_repeat {
            self.overlays.pick(&dir, VIDEO_EXTENSIONS, &mut self.rng)
        } else {
            pick_visual_asset(&dir, VIDEO_EXTENSIONS, &mut self.rng)
        }
    }

    /// Primary visual for `audio`, or `None` when the job has to be skipped.
    pub fn resolve_primary(&mut self, audio: &Path) -> Option<PathBuf> {
        let name = stem(audio);
        match self.config.mode {
            Mode::Image => find_companion(&self.config.input_dir, &name, IMAGE_EXTENSIONS),
            Mode::Video => {
                let dir = self.config.videos_dir();
                find_companion(&dir, &name, VIDEO_EXTENSIONS).or_else(|| {
                    if self.config.no_repeat {
                        self.videos.pick(&dir, VIDEO_EXTENSIONS, &mut self.rng)
                    } else {
                        pick_visual_asset(&dir, VIDEO_EXTENSIONS, &mut self.rng)
                    }
                })
            }
        }
    }

    pub fn job_for(&mut self, audio: &Path) -> Option<Job> {
        let primary = self.resolve_primary(audio)?;
        let name = stem(audio);
        Some(Job {
            output: self.config.output_dir.join(format!("{name}.mp4")),
            name,
            audio: audio.to_path_buf(),
            primary,
        })
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("mode", &self.config.mode)
            .field("canvas", &self.canvas)
            .field("magick", &self.magick)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// Final count of a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub succeeded: usize,
    pub total: usize,
}

impl fmt::Display for Tally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.succeeded, self.total)
    }
}

/// Process every audio file of the input folder, one job at a time.
///
/// Skipped and failed jobs count against the tally; an interrupt stops the
/// batch and is returned as [`RenderError::Interrupted`].
pub async fn run_batch(session: &mut Session) -> Result<Tally> {
    let input_dir = session.config().input_dir.clone();
    let audio_files = read_matching(&input_dir, AUDIO_EXTENSIONS)?;
    std::fs::create_dir_all(&session.config().output_dir)?;

    if audio_files.is_empty() {
        tracing::warn!("no audio files found in {}", input_dir.display());
    }

    let mut tally = Tally {
        succeeded: 0,
        total: audio_files.len(),
    };

    for (i, audio) in audio_files.iter().enumerate() {
        if session.tracker().is_interrupted() {
            return Err(RenderError::Interrupted);
        }

        let name = stem(audio);
        tracing::info!("[{}/{}] {name}", i + 1, tally.total);

        let Some(job) = session.job_for(audio) else {
            let missing = match session.config().mode {
                Mode::Image => "image",
                Mode::Video => "video",
            };
            tracing::warn!("Missing {missing} for {name}, skipping");
            continue;
        };

        match make_visualizer(session, &job).await {
            Ok(()) => {
                tally.succeeded += 1;
                tracing::info!("Created {}", job.output.display());
            }
            Err(e) if e.is_interrupt() => return Err(e),
            Err(e) => tracing::error!("Failed to process {name}: {e}"),
        }
    }

    Ok(tally)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
