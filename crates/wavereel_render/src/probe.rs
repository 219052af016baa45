use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use wavereel_core::assets::{has_extension, VIDEO_EXTENSIONS};
use wavereel_core::config::Tuning;
use wavereel_core::graph::Filter;
use wavereel_core::types::BrightnessClass;

use crate::error::{RenderError, Result};
use crate::execute::Executor;

/// Substituted whenever the real duration cannot be determined.
pub const DEFAULT_DURATION_SECS: f64 = 30.0;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

const YAVG_KEY: &str = "lavfi.signalstats.YAVG";

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

// ---------------------------------------------------------------------------
// Duration
// ---------------------------------------------------------------------------

/// Container duration of `path` in seconds. Never fails: any probe problem
/// is logged and [`DEFAULT_DURATION_SECS`] is returned instead. Only an
/// interrupt is passed through.
pub async fn get_duration(exec: &Executor, ffprobe: &Path, path: &Path) -> Result<f64> {
    match probe_duration(exec, ffprobe, path).await {
        Ok(secs) => Ok(secs),
        Err(e) if e.is_interrupt() => Err(e),
        Err(e) => {
            tracing::warn!(
                "could not read duration of {} ({e}), assuming {DEFAULT_DURATION_SECS}s",
                path.display()
            );
            Ok(DEFAULT_DURATION_SECS)
        }
    }
}

/// Strict variant of [`get_duration`].
pub async fn probe_duration(exec: &Executor, ffprobe: &Path, path: &Path) -> Result<f64> {
    if !path.exists() {
        return Err(RenderError::FileNotFound(path.to_path_buf()));
    }

    let args: Vec<String> = ["-v", "error", "-show_entries", "format=duration", "-of", "json"]
        .iter()
        .map(|s| s.to_string())
        .chain([path.to_string_lossy().into_owned()])
        .collect();

    let output = exec.run_captured(ffprobe, &args, PROBE_TIMEOUT).await?;
    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;

    parse_duration(&probe).ok_or_else(|| RenderError::ToolFailed {
        tool: "ffprobe".to_string(),
        status: "no usable duration".to_string(),
        tail: format!("{:?}", probe.format.duration),
    })
}

fn parse_duration(probe: &FfprobeOutput) -> Option<f64> {
    probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

// ---------------------------------------------------------------------------
// Brightness
// ---------------------------------------------------------------------------

/// Classify the brightness of one sampled frame of `path`. Falls back to
/// [`BrightnessClass::Medium`] when the frame cannot be measured.
pub async fn probe_brightness(
    exec: &Executor,
    ffmpeg: &Path,
    path: &Path,
    tuning: &Tuning,
) -> Result<BrightnessClass> {
    match probe_luma(exec, ffmpeg, path, tuning.brightness_sample_secs).await {
        Ok(luma) => {
            let class = BrightnessClass::classify(
                luma,
                tuning.brightness_dark_below,
                tuning.brightness_light_above,
            );
            tracing::debug!("{}: average luma {luma:.1} ({class})", path.display());
            Ok(class)
        }
        Err(e) if e.is_interrupt() => Err(e),
        Err(e) => {
            tracing::warn!(
                "brightness probe failed for {} ({e}), assuming medium",
                path.display()
            );
            Ok(BrightnessClass::Medium)
        }
    }
}

/// Average luma (0-255) of a single frame. Stills have only one frame, so
/// the seek is applied to videos only.
pub async fn probe_luma(exec: &Executor, ffmpeg: &Path, path: &Path, sample_secs: f64) -> Result<f64> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-nostats".into()];
    if has_extension(path, VIDEO_EXTENSIONS) && sample_secs > 0.0 {
        args.push("-ss".into());
        args.push(format!("{sample_secs:.2}"));
    }
    args.push("-i".into());
    args.push(path.to_string_lossy().into_owned());
    args.push("-vf".into());
    args.push(format!(
        "{},{}",
        Filter::new("signalstats"),
        Filter::new("metadata").arg("print").kv("key", YAVG_KEY)
    ));
    args.extend(["-frames:v", "1", "-f", "null", "-"].iter().map(|s| s.to_string()));

    let output = exec.run_captured(ffmpeg, &args, PROBE_TIMEOUT).await?;
    let stderr = String::from_utf8_lossy(&output.stderr);

    parse_luma(&stderr).ok_or_else(|| RenderError::ToolFailed {
        tool: "ffmpeg".to_string(),
        status: "no signalstats output".to_string(),
        tail: String::new(),
    })
}

/// Last `lavfi.signalstats.YAVG=<value>` reported in a metadata dump.
fn parse_luma(stderr: &str) -> Option<f64> {
    let marker = format!("{YAVG_KEY}=");
    stderr
        .lines()
        .filter_map(|line| {
            let start = line.find(&marker)? + marker.len();
            line[start..].split_whitespace().next()?.parse::<f64>().ok()
        })
        .last()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
