//! One visualizer video: normalize the audio, choose the assets, render the
//! optional title and compose everything with ffmpeg.

use std::path::{Path, PathBuf};
use wavereel_core::assets::VIDEO_EXTENSIONS;
use wavereel_core::compose::{build_graph, FINAL_OUTPUT};
use wavereel_core::config::Config;
use wavereel_core::graph::FilterGraph;
use wavereel_core::presets::{pick_text_style, random_preset};
use wavereel_core::types::{InputLayout, Job};

use crate::batch::Session;
use crate::error::Result;
use crate::execute::{RenderInput, RenderPlan};
use crate::probe::{get_duration, probe_brightness};
use crate::text::{caption_for, render_text_overlay, text_file_path};

/// Normalized audio written next to the outputs.
pub const TEMP_AUDIO_NAME: &str = "_tmp_audio.wav";

/// Engine inputs of one compose run.
#[derive(Debug, Clone, PartialEq)]
pub struct JobAssets {
    pub primary: PathBuf,
    pub audio: PathBuf,
    pub overlay: Option<PathBuf>,
    pub text: Option<PathBuf>,
}

impl JobAssets {
    pub fn layout(&self) -> InputLayout {
        InputLayout::new(self.overlay.is_some(), self.text.is_some())
    }

    /// Inputs in layout order. Clips are looped, stills repeated.
    pub fn inputs(&self) -> Vec<RenderInput> {
        let primary = if wavereel_core::assets::has_extension(&self.primary, VIDEO_EXTENSIONS) {
            RenderInput::looped(&self.primary)
        } else {
            RenderInput::still(&self.primary)
        };

        let mut inputs = vec![primary, RenderInput::new(&self.audio)];
        if let Some(overlay) = &self.overlay {
            inputs.push(RenderInput::looped(overlay));
        }
        if let Some(text) = &self.text {
            inputs.push(RenderInput::still(text));
        }
        inputs
    }
}

/// Stereo 44.1 kHz 16-bit PCM, which every visualizer filter accepts.
pub fn normalize_plan(audio: &Path, output: &Path) -> RenderPlan {
    RenderPlan {
        inputs: vec![RenderInput::new(audio)],
        filter_graph: String::new(),
        output_args: ["-ac", "2", "-ar", "44100", "-acodec", "pcm_s16le"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        output_path: output.to_path_buf(),
    }
}

pub fn compose_plan(
    assets: &JobAssets,
    graph: &FilterGraph,
    duration: f64,
    config: &Config,
    output: &Path,
) -> RenderPlan {
    let layout = assets.layout();
    let encode = &config.encode;

    let output_args = vec![
        "-map".to_string(),
        format!("[{FINAL_OUTPUT}]"),
        "-map".to_string(),
        format!("{}:a", layout.audio),
        "-t".to_string(),
        format!("{duration:.2}"),
        "-c:v".to_string(),
        encode.video_codec.clone(),
        "-preset".to_string(),
        encode.preset.clone(),
        "-crf".to_string(),
        encode.crf.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-r".to_string(),
        config.fps.to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        encode.audio_bitrate.clone(),
        "-movflags".to_string(),
        "+faststart".to_string(),
    ];

    RenderPlan {
        inputs: assets.inputs(),
        filter_graph: graph.render(),
        output_args,
        output_path: output.to_path_buf(),
    }
}

/// Produce `job.output`. Every transient file the job creates is deleted
/// before this returns, whether it succeeded or not.
pub async fn make_visualizer(session: &mut Session, job: &Job) -> Result<()> {
    let mut temps: Vec<PathBuf> = Vec::new();
    let result = run_job(session, job, &mut temps).await;

    let tracker = session.tracker();
    for path in &temps {
        tracker.discard(path);
    }
    result
}

async fn run_job(session: &mut Session, job: &Job, temps: &mut Vec<PathBuf>) -> Result<()> {
    let exec = session.executor().clone();
    let tracker = exec.tracker().clone();
    let config = session.config().clone();
    let ffmpeg = config.tools.ffmpeg.as_path();

    // 1. Duration
    let duration = get_duration(&exec, &config.tools.ffprobe, &job.audio).await?;
    tracing::info!("{}: {duration:.1}s of audio", job.name);

    // 2. Audio
    let temp_audio = config.output_dir.join(TEMP_AUDIO_NAME);
    tracker.track(&temp_audio);
    temps.push(temp_audio.clone());
    exec.render(
        ffmpeg,
        &normalize_plan(&job.audio, &temp_audio),
        "Normalizing audio",
        Some(duration),
    )
    .await?;

    // 3. Style and assets
    let preset = random_preset(session.rng());
    tracing::info!("Waveform style: {}", preset.name);

    let overlay = session.pick_overlay();
    match &overlay {
        Some(path) => tracing::info!("Overlay: {}", path.display()),
        None => tracing::debug!("no overlay clip available"),
    }

    // 4. Title
    let mut text = None;
    if let Some(magick) = session.magick().map(Path::to_path_buf) {
        let background = probe_brightness(&exec, ffmpeg, &job.primary, &config.tuning).await?;
        let style = pick_text_style(background, session.rng());
        tracing::info!("Text style: {} on {background} background", style.name);

        let path = text_file_path(&config.output_dir);
        tracker.track(&path);
        temps.push(path.clone());
        let caption = caption_for(&job.audio);
        if render_text_overlay(&exec, &magick, &caption, style, &config.text, session.canvas(), &path)
            .await?
        {
            text = Some(path);
        } else {
            tracker.discard(&path);
        }
    }

    // 5. Compose
    let assets = JobAssets {
        primary: job.primary.clone(),
        audio: temp_audio,
        overlay,
        text,
    };
    let layout = assets.layout();
    let graph = build_graph(preset, session.canvas(), &layout, &config.tuning);
    graph.validate(layout.count(), FINAL_OUTPUT)?;

    let plan = compose_plan(&assets, &graph, duration, &config, &job.output);

    tracker.track(&job.output);
    match exec
        .render(ffmpeg, &plan, &format!("Rendering {}", job.name), Some(duration))
        .await
    {
        Ok(()) => {
            tracker.untrack(&job.output);
            Ok(())
        }
        Err(e) => {
            tracker.discard(&job.output);
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
