//! Pre-rendered title images drawn with ImageMagick.
//!
//! The image is a transparent canvas-sized PNG with the text centered,
//! outlined and lifted off the background by a soft drop shadow. The
//! compositing graph later overlays it at partial opacity.

use std::path::{Path, PathBuf};
use std::time::Duration;
use wavereel_core::config::TextConfig;
use wavereel_core::presets::TextStylePreset;
use wavereel_core::types::Canvas;

use crate::error::Result;
use crate::execute::Executor;

/// File name prefix of rendered text images in the output folder.
pub const TEXT_FILE_PREFIX: &str = "_tmp_text_";

/// Find the ImageMagick executable: the configured override, then `magick`
/// (v7) or `convert` (v6) on `PATH`, then the default install folders on
/// Windows.
pub fn locate_magick(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        return Some(path.to_path_buf());
    }
    ["magick", "convert"]
        .iter()
        .find_map(|name| which::which(name).ok())
        .or_else(install_fallback)
}

#[cfg(windows)]
fn install_fallback() -> Option<PathBuf> {
    ["C:/Program Files/ImageMagick-*/magick.exe", "C:/Program Files (x86)/ImageMagick-*/magick.exe"]
        .iter()
        .filter_map(|pattern| glob::glob(pattern).ok())
        .flat_map(|paths| paths.flatten())
        .max()
}

#[cfg(not(windows))]
fn install_fallback() -> Option<PathBuf> {
    None
}

/// Display text for an audio file: its base name with underscores as spaces.
pub fn caption_for(audio: &Path) -> String {
    wavereel_core::assets::stem(audio)
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Make `text` print literally under `-annotate`, which otherwise expands
/// `%` escapes and backslash sequences and reads a leading `@` as a file.
pub fn escape_annotate(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('%', "%%");
    match escaped.strip_prefix('@') {
        Some(rest) => format!("\\@{rest}"),
        None => escaped,
    }
}

/// Unique path for a job's text image inside `dir`.
pub fn text_file_path(dir: &Path) -> PathBuf {
    dir.join(format!("{TEXT_FILE_PREFIX}{}.png", uuid::Uuid::new_v4().simple()))
}

pub fn build_magick_args(
    text: &str,
    style: &TextStylePreset,
    font: &str,
    point_size: u32,
    canvas: Canvas,
    output: &Path,
) -> Vec<String> {
    let size = canvas.to_string();
    let point_size = point_size.to_string();
    let fill = style.fill.to_css();
    let stroke = style.stroke.to_css();
    let stroke_width = style.stroke_width.to_string();
    let shadow_color = style.shadow.to_css();
    let shadow = format!("{}x{}+0+0", style.shadow_opacity.min(100), style.shadow_sigma);
    let text = escape_annotate(text);

    let mut args: Vec<String> = [
        "-size", size.as_str(), "xc:none",
        "-font", font,
        "-pointsize", point_size.as_str(),
        "-fill", fill.as_str(),
        "-stroke", stroke.as_str(),
        "-strokewidth", stroke_width.as_str(),
        "-gravity", "center",
        "-annotate", "+0+0", text.as_str(),
        // Shadow: clone the glyph layer, tint and blur it, put it underneath.
        "(", "+clone", "-background", shadow_color.as_str(), "-shadow", shadow.as_str(), ")",
        "+swap", "-background", "none", "-layers", "merge", "+repage",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.push(output.to_string_lossy().into_owned());
    args
}

/// Render `text` to `output`. Failures are logged and reported as `false`
/// so the caller can continue without a text layer; only an interrupt is
/// returned as an error.
#[allow(clippy::too_many_arguments)]
pub async fn render_text_overlay(
    exec: &Executor,
    magick: &Path,
    text: &str,
    style: &TextStylePreset,
    config: &TextConfig,
    canvas: Canvas,
    output: &Path,
) -> Result<bool> {
    let args = build_magick_args(text, style, &config.font, config.point_size, canvas, output);
    let limit = Duration::from_secs(config.timeout_secs);

    match exec.run_captured(magick, &args, limit).await {
        Ok(_) if output.is_file() => {
            tracing::debug!("rendered text '{text}' with style {}", style.name);
            Ok(true)
        }
        Ok(_) => {
            tracing::warn!("text renderer produced no image, continuing without text");
            Ok(false)
        }
        Err(e) if e.is_interrupt() => Err(e),
        Err(e) => {
            tracing::warn!("text rendering failed ({e}), continuing without text");
            Ok(false)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
