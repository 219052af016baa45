use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::{Canvas, Mode};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Batch configuration. Every field has a default, so an empty TOML file
/// (or no file at all) is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub mode: Mode,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Defaults to `<input_dir>/overlay`.
    pub overlay_dir: Option<PathBuf>,
    /// Defaults to `<input_dir>/videos`.
    pub videos_dir: Option<PathBuf>,
    pub fps: u32,
    /// Do not reuse a random asset until every eligible one has been used.
    pub no_repeat: bool,
    pub grace_period_secs: u64,
    pub canvas: CanvasConfig,
    pub text: TextConfig,
    pub tuning: Tuning,
    pub tools: Tools,
    pub encode: EncodeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Image,
            input_dir: PathBuf::from("input"),
            output_dir: PathBuf::from("output"),
            overlay_dir: None,
            videos_dir: None,
            fps: 30,
            no_repeat: true,
            grace_period_secs: 3,
            canvas: CanvasConfig::default(),
            text: TextConfig::default(),
            tuning: Tuning::default(),
            tools: Tools::default(),
            encode: EncodeConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&data)
    }

    pub fn overlay_dir(&self) -> PathBuf {
        self.overlay_dir
            .clone()
            .unwrap_or_else(|| self.input_dir.join("overlay"))
    }

    pub fn videos_dir(&self) -> PathBuf {
        self.videos_dir
            .clone()
            .unwrap_or_else(|| self.input_dir.join("videos"))
    }

    /// Explicit dimensions win; anything unset falls back to the mode default.
    pub fn canvas(&self) -> Result<Canvas> {
        let default = self.mode.default_canvas();
        Canvas::new(
            self.canvas.width.unwrap_or(default.width),
            self.canvas.height.unwrap_or(default.height),
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextConfig {
    pub enabled: bool,
    pub font: String,
    pub point_size: u32,
    pub timeout_secs: u64,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            font: "Arial".to_string(),
            point_size: 96,
            timeout_secs: 30,
        }
    }
}

/// Empirically tuned constants for compositing and brightness probing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Tuning {
    pub brightness_dark_below: f64,
    pub brightness_light_above: f64,
    /// Where in the background the brightness sample frame is taken.
    pub brightness_sample_secs: f64,
    pub chroma_key_color: String,
    pub chroma_key_similarity: f64,
    pub chroma_key_blend: f64,
    pub overlay_opacity: f64,
    pub text_opacity: f64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            brightness_dark_below: 100.0,
            brightness_light_above: 155.0,
            brightness_sample_secs: 1.0,
            chroma_key_color: "black".to_string(),
            chroma_key_similarity: 0.01,
            chroma_key_blend: 0.05,
            overlay_opacity: 0.7,
            text_opacity: 0.9,
        }
    }
}

/// External executables, by name (looked up on `PATH`) or full path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Tools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// Skips the ImageMagick lookup when set.
    pub magick: Option<PathBuf>,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            magick: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EncodeConfig {
    pub video_codec: String,
    pub preset: String,
    pub crf: u32,
    pub audio_bitrate: String,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            preset: "medium".to_string(),
            crf: 23,
            audio_bitrate: "192k".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
