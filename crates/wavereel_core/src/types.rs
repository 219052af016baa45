use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{CoreError, Result};

// ---------------------------------------------------------------------------
// Canvas
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CoreError::InvalidCanvas { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn is_landscape(&self) -> bool {
        self.width > self.height
    }
}

impl fmt::Display for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// 1080x1080 square preset.
pub fn preset_square() -> Canvas {
    Canvas {
        width: 1080,
        height: 1080,
    }
}

/// 1920x1080 landscape preset.
pub fn preset_1080p() -> Canvas {
    Canvas {
        width: 1920,
        height: 1080,
    }
}


// ---------------------------------------------------------------------------
// Rgb
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn hex(value: u32) -> Self {
        Self {
            r: ((value >> 16) & 0xFF) as u8,
            g: ((value >> 8) & 0xFF) as u8,
            b: (value & 0xFF) as u8,
        }
    }

    /// `#RRGGBB`, the notation image tools expect.
    pub fn to_css(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

/// ffmpeg color notation, `0xRRGGBB`.
impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

// ---------------------------------------------------------------------------
// AmplitudeScale
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AmplitudeScale {
    Lin,
    Log,
    Sqrt,
    Cbrt,
}

impl AmplitudeScale {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmplitudeScale::Lin => "lin",
            AmplitudeScale::Log => "log",
            AmplitudeScale::Sqrt => "sqrt",
            AmplitudeScale::Cbrt => "cbrt",
        }
    }
}

// ---------------------------------------------------------------------------
// WavePosition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WavePosition {
    Bottom,
    Center,
}

impl WavePosition {
    /// Overlay coordinates for the wave layer on the current background.
    pub fn overlay_xy(&self) -> (&'static str, &'static str) {
        match self {
            WavePosition::Bottom => ("0", "H-h"),
            WavePosition::Center => ("(W-w)/2", "(H-h)/2"),
        }
    }
}

// ---------------------------------------------------------------------------
// BrightnessClass
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BrightnessClass {
    Light,
    Medium,
    Dark,
}

impl BrightnessClass {
    /// Bucket an average luma (0-255). Both bounds are exclusive.
    pub fn classify(luma: f64, dark_below: f64, light_above: f64) -> Self {
        if luma < dark_below {
            BrightnessClass::Dark
        } else if luma > light_above {
            BrightnessClass::Light
        } else {
            BrightnessClass::Medium
        }
    }
}

impl fmt::Display for BrightnessClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BrightnessClass::Light => "light",
            BrightnessClass::Medium => "medium",
            BrightnessClass::Dark => "dark",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Where the primary visual of each job comes from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Still image with the same base name as the audio file.
    #[default]
    Image,
    /// Background video from the videos folder, looped to the audio length.
    Video,
}

impl Mode {
    pub fn default_canvas(&self) -> Canvas {
        match self {
            Mode::Image => preset_square(),
            Mode::Video => preset_1080p(),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "image" | "img" => Ok(Mode::Image),
            "video" | "vid" => Ok(Mode::Video),
            _ => Err(format!("unknown mode '{s}', expected 'image' or 'video'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One unit of batch work. Consumed once by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub name: String,
    pub audio: PathBuf,
    pub primary: PathBuf,
    pub output: PathBuf,
}

// ---------------------------------------------------------------------------
// InputLayout
// ---------------------------------------------------------------------------

/// Numbered engine inputs for one compose run.
///
/// The primary visual is always input 0 and the normalized audio input 1;
/// the overlay clip and the rendered text image follow when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLayout {
    pub primary: usize,
    pub audio: usize,
    pub overlay: Option<usize>,
    pub text: Option<usize>,
}

impl InputLayout {
    pub fn new(has_overlay: bool, has_text: bool) -> Self {
        let mut next = 2;
        let overlay = has_overlay.then(|| {
            next += 1;
            next - 1
        });
        let text = has_text.then(|| {
            next += 1;
            next - 1
        });
        Self {
            primary: 0,
            audio: 1,
            overlay,
            text,
        }
    }

    pub fn count(&self) -> usize {
        2 + usize::from(self.overlay.is_some()) + usize::from(self.text.is_some())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
