use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;

use crate::types::{AmplitudeScale, BrightnessClass, Rgb, WavePosition};

/// Window size used by bar presets that do not set one.
pub const DEFAULT_WINDOW_SIZE: u32 = 2048;

// ---------------------------------------------------------------------------
// Visual kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VectorMode {
    LissajousXy,
    Lissajous,
    Polar,
}

impl VectorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorMode::LissajousXy => "lissajous_xy",
            VectorMode::Lissajous => "lissajous",
            VectorMode::Polar => "polar",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpectrumMode {
    Combined,
    Separate,
}

impl SpectrumMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpectrumMode::Combined => "combined",
            SpectrumMode::Separate => "separate",
        }
    }
}

/// Named spectrogram palettes understood by `showspectrum`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ColorMap {
    Intensity,
    Rainbow,
    Fire,
    Magma,
    Viridis,
    Cool,
    Nebulae,
}

impl ColorMap {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColorMap::Intensity => "intensity",
            ColorMap::Rainbow => "rainbow",
            ColorMap::Fire => "fire",
            ColorMap::Magma => "magma",
            ColorMap::Viridis => "viridis",
            ColorMap::Cool => "cool",
            ColorMap::Nebulae => "nebulae",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WaveMode {
    Point,
    Line,
    P2p,
    Cline,
}

impl WaveMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaveMode::Point => "point",
            WaveMode::Line => "line",
            WaveMode::P2p => "p2p",
            WaveMode::Cline => "cline",
        }
    }
}

/// The audio-reactive renderer a preset uses, with only the fields that
/// renderer understands.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Visual {
    /// Line-drawn frequency response filling the canvas.
    Circular,
    /// Frequency bars. `None` window size means [`DEFAULT_WINDOW_SIZE`].
    Bars { window_size: Option<u32> },
    /// Two-channel scope.
    Vector { mode: VectorMode },
    /// Scrolling spectrogram.
    Spectrum { mode: SpectrumMode, color_map: ColorMap },
    /// Time-domain waveform.
    Wave { mode: WaveMode, split_channels: bool },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisualKind {
    Circular,
    Bars,
    Vector,
    Spectrum,
    Wave,
}

impl VisualKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisualKind::Circular => "circular",
            VisualKind::Bars => "bars",
            VisualKind::Vector => "vector",
            VisualKind::Spectrum => "spectrum",
            VisualKind::Wave => "wave",
        }
    }
}

impl Visual {
    pub fn kind(&self) -> VisualKind {
        match self {
            Visual::Circular => VisualKind::Circular,
            Visual::Bars { .. } => VisualKind::Bars,
            Visual::Vector { .. } => VisualKind::Vector,
            Visual::Spectrum { .. } => VisualKind::Spectrum,
            Visual::Wave { .. } => VisualKind::Wave,
        }
    }
}

// ---------------------------------------------------------------------------
// StylePreset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StylePreset {
    pub name: &'static str,
    pub color: Rgb,
    pub scale: AmplitudeScale,
    pub thickness: u32,
    pub visual: Visual,
    pub glow: bool,
    pub mirror: bool,
    pub shadow: bool,
    pub position: WavePosition,
}

impl StylePreset {
    const fn new(
        name: &'static str,
        color: u32,
        scale: AmplitudeScale,
        thickness: u32,
        visual: Visual,
    ) -> Self {
        Self {
            name,
            color: Rgb::hex(color),
            scale,
            thickness,
            visual,
            glow: true,
            mirror: false,
            shadow: false,
            position: WavePosition::Bottom,
        }
    }

    const fn mirrored(mut self) -> Self {
        self.mirror = true;
        self
    }

    const fn shadowed(mut self) -> Self {
        self.shadow = true;
        self
    }

    const fn centered(mut self) -> Self {
        self.position = WavePosition::Center;
        self
    }

    const fn flat(mut self) -> Self {
        self.glow = false;
        self
    }
}

const fn bars(window_size: u32) -> Visual {
    Visual::Bars {
        window_size: Some(window_size),
    }
}

const fn wave(mode: WaveMode, split_channels: bool) -> Visual {
    Visual::Wave {
        mode,
        split_channels,
    }
}

use crate::types::AmplitudeScale::{Cbrt, Lin, Log, Sqrt};

pub static WAVEFORM_PRESETS: &[StylePreset] = &[
    // Circular
    StylePreset::new("Cyan Radial Pulse", 0x00FFFF, Sqrt, 8, Visual::Circular),
    StylePreset::new("Magenta Circle Wave", 0xFF00FF, Sqrt, 10, Visual::Circular),
    StylePreset::new("Green Frequency Ring", 0x39FF14, Lin, 6, Visual::Circular),
    StylePreset::new("Orange Spectrum Blast", 0xFF4500, Log, 8, Visual::Circular),
    StylePreset::new("Purple Frequency Circle", 0x9D00FF, Cbrt, 12, Visual::Circular),
    // Bars
    StylePreset::new("Electric Blue Bars", 0x00FFFF, Sqrt, 8, bars(1024)),
    StylePreset::new("Neon Pink Equalizer", 0xFF1493, Log, 10, bars(512)),
    StylePreset::new("Lime Green Spectrum", 0x39FF14, Sqrt, 6, bars(2048)),
    StylePreset::new("Blazing Orange Bars", 0xFF4500, Cbrt, 12, bars(1024)),
    StylePreset::new("Royal Purple Waves", 0x9D00FF, Log, 9, bars(768)),
    StylePreset::new("Golden Frequency Bars", 0xFFD700, Sqrt, 7, bars(1536)),
    StylePreset::new("Crimson Red Spectrum", 0xDC143C, Lin, 11, bars(512)),
    StylePreset::new("Turquoise Dream Bars", 0x40E0D0, Sqrt, 8, bars(1024)),
    StylePreset::new("Coral Reef Bars", 0xFF7F50, Cbrt, 9, bars(1280)),
    StylePreset::new(
        "Sapphire Blue Equalizer",
        0x0F52BA,
        Cbrt,
        11,
        Visual::Bars { window_size: None },
    ),
    // Vector
    StylePreset::new(
        "Cyan Lissajous Vector",
        0x00FFFF,
        Sqrt,
        4,
        Visual::Vector {
            mode: VectorMode::LissajousXy,
        },
    )
    .centered(),
    StylePreset::new(
        "Green Polar Scope",
        0x39FF14,
        Lin,
        6,
        Visual::Vector {
            mode: VectorMode::Polar,
        },
    )
    .centered(),
    // Spectrum
    StylePreset::new(
        "Nebula Spectrogram",
        0x8A2BE2,
        Log,
        4,
        Visual::Spectrum {
            mode: SpectrumMode::Combined,
            color_map: ColorMap::Nebulae,
        },
    )
    .flat(),
    StylePreset::new(
        "Magma Split Spectrogram",
        0xFF4500,
        Sqrt,
        4,
        Visual::Spectrum {
            mode: SpectrumMode::Separate,
            color_map: ColorMap::Magma,
        },
    )
    .flat()
    .shadowed(),
    // Wave
    StylePreset::new("White Mirror Line", 0xFFFFFF, Sqrt, 3, wave(WaveMode::Cline, false))
        .mirrored(),
    StylePreset::new("Aqua Dual Channel", 0x00CED1, Lin, 4, wave(WaveMode::Line, true))
        .shadowed(),
    StylePreset::new("Ruby Peak Wave", 0xE0115F, Cbrt, 5, wave(WaveMode::P2p, false))
        .mirrored()
        .shadowed()
        .centered(),
];

/// Pick a waveform style uniformly at random.
pub fn random_preset<R: Rng + ?Sized>(rng: &mut R) -> &'static StylePreset {
    // The catalog is a non-empty static table.
    WAVEFORM_PRESETS
        .choose(rng)
        .unwrap_or(&WAVEFORM_PRESETS[0])
}

pub fn find_preset(name: &str) -> Option<&'static StylePreset> {
    WAVEFORM_PRESETS
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
}

// ---------------------------------------------------------------------------
// TextStylePreset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct TextStylePreset {
    pub name: &'static str,
    pub fill: Rgb,
    pub stroke: Rgb,
    pub stroke_width: u32,
    pub shadow: Rgb,
    /// Percent, 0-100.
    pub shadow_opacity: u8,
    pub shadow_sigma: f32,
    /// How bright the text itself reads.
    pub brightness: BrightnessClass,
}

pub static TEXT_STYLES: &[TextStylePreset] = &[
    TextStylePreset {
        name: "Snow Outline",
        fill: Rgb::hex(0xFFFFFF),
        stroke: Rgb::hex(0x000000),
        stroke_width: 3,
        shadow: Rgb::hex(0x000000),
        shadow_opacity: 80,
        shadow_sigma: 6.0,
        brightness: BrightnessClass::Light,
    },
    TextStylePreset {
        name: "Warm Cream",
        fill: Rgb::hex(0xFFF4D6),
        stroke: Rgb::hex(0x3A2A1A),
        stroke_width: 2,
        shadow: Rgb::hex(0x1A1208),
        shadow_opacity: 70,
        shadow_sigma: 5.0,
        brightness: BrightnessClass::Light,
    },
    TextStylePreset {
        name: "Neon Cyan",
        fill: Rgb::hex(0x00FFFF),
        stroke: Rgb::hex(0x001F3F),
        stroke_width: 2,
        shadow: Rgb::hex(0x000000),
        shadow_opacity: 75,
        shadow_sigma: 8.0,
        brightness: BrightnessClass::Medium,
    },
    TextStylePreset {
        name: "Sunset Gold",
        fill: Rgb::hex(0xFFD700),
        stroke: Rgb::hex(0x4A2C00),
        stroke_width: 3,
        shadow: Rgb::hex(0x000000),
        shadow_opacity: 60,
        shadow_sigma: 4.0,
        brightness: BrightnessClass::Medium,
    },
    TextStylePreset {
        name: "Ink Black",
        fill: Rgb::hex(0x111111),
        stroke: Rgb::hex(0xFFFFFF),
        stroke_width: 2,
        shadow: Rgb::hex(0xFFFFFF),
        shadow_opacity: 60,
        shadow_sigma: 4.0,
        brightness: BrightnessClass::Dark,
    },
    TextStylePreset {
        name: "Deep Navy",
        fill: Rgb::hex(0x0B1D51),
        stroke: Rgb::hex(0xE0E0E0),
        stroke_width: 2,
        shadow: Rgb::hex(0xFFFFFF),
        shadow_opacity: 50,
        shadow_sigma: 5.0,
        brightness: BrightnessClass::Dark,
    },
];

fn contrasts(style: BrightnessClass, background: BrightnessClass) -> bool {
    match background {
        BrightnessClass::Dark => style == BrightnessClass::Light,
        BrightnessClass::Light => {
            matches!(style, BrightnessClass::Dark | BrightnessClass::Medium)
        }
        BrightnessClass::Medium => true,
    }
}

/// Pick a text style from `catalog` that stays legible on a background of
/// the given brightness. Falls back to the whole catalog when nothing
/// contrasts; `None` only for an empty catalog.
pub fn pick_text_style_from<'a, R: Rng + ?Sized>(
    catalog: &'a [TextStylePreset],
    background: BrightnessClass,
    rng: &mut R,
) -> Option<&'a TextStylePreset> {
    let eligible: Vec<&TextStylePreset> = catalog
        .iter()
        .filter(|s| contrasts(s.brightness, background))
        .collect();

    if eligible.is_empty() {
        catalog.choose(rng)
    } else {
        eligible.choose(rng).copied()
    }
}

pub fn pick_text_style<R: Rng + ?Sized>(
    background: BrightnessClass,
    rng: &mut R,
) -> &'static TextStylePreset {
    pick_text_style_from(TEXT_STYLES, background, rng).unwrap_or(&TEXT_STYLES[0])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn catalog_names_are_unique() {
        let names: HashSet<_> = WAVEFORM_PRESETS.iter().map(|p| p.name).collect();
        assert_eq!(names.len(), WAVEFORM_PRESETS.len());
    }

    #[test]
    fn catalog_covers_every_visual_kind() {
        let kinds: HashSet<_> = WAVEFORM_PRESETS
            .iter()
            .map(|p| p.visual.kind().as_str())
            .collect();
        for kind in ["circular", "bars", "vector", "spectrum", "wave"] {
            assert!(kinds.contains(kind), "no preset of kind {kind}");
        }
    }

    #[test]
    fn visual_carries_drawing_mode() {
        let bars = find_preset("Electric Blue Bars").unwrap();
        assert_eq!(bars.visual.kind(), VisualKind::Bars);
        let scope = find_preset("cyan lissajous vector").unwrap();
        assert!(matches!(scope.visual, Visual::Vector { mode } if mode.as_str() == "lissajous_xy"));
        assert_eq!(scope.position, WavePosition::Center);
    }

    #[test]
    fn random_preset_is_from_catalog() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let preset = random_preset(&mut rng);
            assert!(WAVEFORM_PRESETS.iter().any(|p| p == preset));
        }
    }

    #[test]
    fn dark_background_gets_light_text() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            let style = pick_text_style(BrightnessClass::Dark, &mut rng);
            assert_eq!(style.brightness, BrightnessClass::Light);
        }
    }

    #[test]
    fn light_background_avoids_light_text() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..20 {
            let style = pick_text_style(BrightnessClass::Light, &mut rng);
            assert_ne!(style.brightness, BrightnessClass::Light);
        }
    }

    #[test]
    fn medium_background_allows_everything() {
        let mut rng = StdRng::seed_from_u64(3);
        let seen: HashSet<_> = (0..200)
            .map(|_| pick_text_style(BrightnessClass::Medium, &mut rng).name)
            .collect();
        assert_eq!(seen.len(), TEXT_STYLES.len());
    }

    #[test]
    fn falls_back_to_full_catalog_without_contrast() {
        let only_dark: Vec<TextStylePreset> = TEXT_STYLES
            .iter()
            .filter(|s| s.brightness == BrightnessClass::Dark)
            .copied()
            .collect();
        let mut rng = StdRng::seed_from_u64(4);
        let style = pick_text_style_from(&only_dark, BrightnessClass::Dark, &mut rng).unwrap();
        assert_eq!(style.brightness, BrightnessClass::Dark);
        assert!(pick_text_style_from(&[], BrightnessClass::Dark, &mut rng).is_none());
    }
}
