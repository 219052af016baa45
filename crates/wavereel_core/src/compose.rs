//! Builds the compositing graph for one visualizer video.
//!
//! Layers, bottom to top: the primary visual scaled to cover the canvas, an
//! optional chroma-keyed overlay clip, the audio-reactive wave layer and an
//! optional pre-rendered text image.

use crate::config::Tuning;
use crate::graph::{Filter, FilterGraph, Pad, Stage};
use crate::presets::{StylePreset, Visual, VisualKind, DEFAULT_WINDOW_SIZE};
use crate::types::{Canvas, InputLayout};

/// Label of the finished video stream.
pub const FINAL_OUTPUT: &str = "v";

const WAVE: &str = "wave";
const GLOW_BLUR_RADIUS: u32 = 3;
const SHADOW_BLUR_RADIUS: u32 = 5;
const SHADOW_OPACITY: f64 = 0.3;

/// Size of the rendered wave layer before mirroring.
pub fn wave_size(kind: VisualKind, canvas: Canvas) -> (u32, u32) {
    let h = canvas.height;
    let scope = h * 5 / 18;
    let height = match kind {
        VisualKind::Circular => h,
        VisualKind::Bars if canvas.is_landscape() => h * 20 / 27,
        VisualKind::Bars => h * 25 / 27,
        VisualKind::Vector => scope,
        VisualKind::Spectrum | VisualKind::Wave => scope / 2,
    };
    (canvas.width, height.max(1))
}

/// Build the graph for `preset` on `canvas`.
///
/// Inputs are addressed through `layout`; the overlay and text stages are
/// emitted only when the layout declares those inputs. The result always
/// ends in [`FINAL_OUTPUT`].
pub fn build_graph(
    preset: &StylePreset,
    canvas: Canvas,
    layout: &InputLayout,
    tuning: &Tuning,
) -> FilterGraph {
    let mut graph = FilterGraph::new();

    graph.push(cover(Pad::video(layout.primary), canvas).output("bg"));
    let mut layer = "bg".to_string();

    if let Some(index) = layout.overlay {
        let mut prep = cover(Pad::video(index), canvas)
            .filter(Filter::new("format").kv("pix_fmts", "yuva420p"))
            .filter(
                Filter::new("chromakey")
                    .kv("color", &tuning.chroma_key_color)
                    .kv("similarity", tuning.chroma_key_similarity)
                    .kv("blend", tuning.chroma_key_blend),
            );
        if tuning.overlay_opacity < 1.0 {
            prep = prep.filter(Filter::new("colorchannelmixer").kv("aa", tuning.overlay_opacity));
        }
        graph.push(prep.output("overlay_layer"));

        graph.push(
            Stage::new()
                .input(Pad::link(layer))
                .input(Pad::link("overlay_layer"))
                .filter(
                    Filter::new("overlay")
                        .kv("x", 0)
                        .kv("y", 0)
                        .kv("shortest", 1)
                        .kv("format", "auto"),
                )
                .output("bg_overlay"),
        );
        layer = "bg_overlay".to_string();
    }

    let (wave_w, wave_h) = wave_size(preset.visual.kind(), canvas);
    graph.push(
        Stage::new()
            .input(Pad::audio(layout.audio))
            .filter(wave_renderer(preset, wave_w, wave_h))
            .output(WAVE),
    );

    if preset.glow {
        push_glow(&mut graph);
    }
    if preset.mirror {
        push_mirror(&mut graph);
    }
    if preset.shadow {
        push_shadow(&mut graph);
    }

    let (x, y) = preset.position.overlay_xy();
    graph.push(
        Stage::new()
            .input(Pad::link(layer))
            .input(Pad::link(WAVE))
            .filter(Filter::new("overlay").kv("x", x).kv("y", y))
            .output("with_wave"),
    );
    layer = "with_wave".to_string();

    if let Some(index) = layout.text {
        graph.push(
            Stage::new()
                .input(Pad::video(index))
                .filter(Filter::new("format").kv("pix_fmts", "rgba"))
                .filter(Filter::new("colorchannelmixer").kv("aa", tuning.text_opacity))
                .output("text_layer"),
        );
        graph.push(
            Stage::new()
                .input(Pad::link(layer))
                .input(Pad::link("text_layer"))
                .filter(
                    Filter::new("overlay")
                        .kv("x", "(W-w)/2")
                        .kv("y", "(H-h)/2"),
                )
                .output("with_text"),
        );
        layer = "with_text".to_string();
    }

    graph.push(
        Stage::new()
            .input(Pad::link(layer))
            .filter(Filter::new("format").kv("pix_fmts", "yuv420p"))
            .output(FINAL_OUTPUT),
    );

    graph
}

/// Aspect-preserving upscale, centre crop to the exact canvas, square pixels.
fn cover(input: Pad, canvas: Canvas) -> Stage {
    Stage::new()
        .input(input)
        .filter(
            Filter::new("scale")
                .arg(canvas.width)
                .arg(canvas.height)
                .kv("force_original_aspect_ratio", "increase"),
        )
        .filter(Filter::new("crop").arg(canvas.width).arg(canvas.height))
        .filter(Filter::new("setsar").arg(1))
}

fn wave_renderer(preset: &StylePreset, width: u32, height: u32) -> Filter {
    let size = format!("{width}x{height}");
    let scale = preset.scale.as_str();

    match preset.visual {
        Visual::Circular => Filter::new("showfreqs")
            .kv("s", size)
            .kv("mode", "line")
            .kv("colors", preset.color)
            .kv("fscale", "log")
            .kv("ascale", scale),
        Visual::Bars { window_size } => Filter::new("showfreqs")
            .kv("s", size)
            .kv("mode", "bar")
            .kv("colors", preset.color)
            .kv("fscale", "log")
            .kv("ascale", scale)
            .kv("win_size", window_size.unwrap_or(DEFAULT_WINDOW_SIZE)),
        Visual::Vector { mode } => Filter::new("avectorscope")
            .kv("s", size)
            .kv("mode", mode.as_str())
            .kv("draw", "line")
            .kv("scale", scale)
            .kv("rc", preset.color.r)
            .kv("gc", preset.color.g)
            .kv("bc", preset.color.b),
        Visual::Spectrum { mode, color_map } => Filter::new("showspectrum")
            .kv("s", size)
            .kv("mode", mode.as_str())
            .kv("color", color_map.as_str())
            .kv("scale", scale)
            .kv("slide", "scroll"),
        Visual::Wave {
            mode,
            split_channels,
        } => {
            let f = Filter::new("showwaves")
                .kv("s", size)
                .kv("mode", mode.as_str())
                .kv("colors", preset.color)
                .kv("scale", scale)
                .kv("draw", "scale");
            if split_channels {
                f.kv("split_channels", 1)
            } else {
                f
            }
        }
    }
}

fn split_wave(graph: &mut FilterGraph, keep: &str, work: &str) {
    graph.push(
        Stage::new()
            .input(Pad::link(WAVE))
            .filter(Filter::new("split"))
            .output(keep)
            .output(work),
    );
}

fn push_glow(graph: &mut FilterGraph) {
    split_wave(graph, "glow_sharp", "glow_src");
    graph.push(
        Stage::new()
            .input(Pad::link("glow_src"))
            .filter(Filter::new("boxblur").arg(GLOW_BLUR_RADIUS).arg(1))
            .output("glow_blur"),
    );
    graph.push(
        Stage::new()
            .input(Pad::link("glow_blur"))
            .input(Pad::link("glow_sharp"))
            .filter(Filter::new("overlay").kv("format", "auto"))
            .output(WAVE),
    );
}

fn push_mirror(graph: &mut FilterGraph) {
    split_wave(graph, "mirror_top", "mirror_src");
    graph.push(
        Stage::new()
            .input(Pad::link("mirror_src"))
            .filter(Filter::new("vflip"))
            .output("mirror_flip"),
    );
    graph.push(
        Stage::new()
            .input(Pad::link("mirror_top"))
            .input(Pad::link("mirror_flip"))
            .filter(Filter::new("vstack"))
            .output(WAVE),
    );
}

fn push_shadow(graph: &mut FilterGraph) {
    split_wave(graph, "shadow_top", "shadow_src");
    graph.push(
        Stage::new()
            .input(Pad::link("shadow_src"))
            .filter(Filter::new("boxblur").arg(SHADOW_BLUR_RADIUS).arg(1))
            .filter(Filter::new("colorchannelmixer").kv("aa", SHADOW_OPACITY))
            .output("shadow_blur"),
    );
    graph.push(
        Stage::new()
            .input(Pad::link("shadow_blur"))
            .input(Pad::link("shadow_top"))
            .filter(Filter::new("overlay").kv("format", "auto"))
            .output(WAVE),
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets::{find_preset, WAVEFORM_PRESETS};
    use crate::types::{preset_1080p, preset_square};

    fn build(preset: &StylePreset, overlay: bool, text: bool) -> (FilterGraph, InputLayout) {
        let layout = InputLayout::new(overlay, text);
        let graph = build_graph(preset, preset_square(), &layout, &Tuning::default());
        (graph, layout)
    }

    #[test]
    fn every_preset_resolves_in_every_layout() {
        for preset in WAVEFORM_PRESETS {
            for (overlay, text) in [(false, false), (true, false), (false, true), (true, true)] {
                let (graph, layout) = build(preset, overlay, text);
                if let Err(e) = graph.validate(layout.count(), FINAL_OUTPUT) {
                    panic!(
                        "{} (overlay={overlay}, text={text}): {e}\n{}",
                        preset.name,
                        graph.render()
                    );
                }
            }
        }
    }

    #[test]
    fn minimal_graph_has_no_overlay_or_text_stages() {
        let preset = find_preset("Electric Blue Bars").unwrap();
        let (graph, _) = build(preset, false, false);
        let rendered = graph.render();

        assert_eq!(graph.count_filter("chromakey"), 0);
        assert!(!rendered.contains("[2:v]"));
        assert!(!rendered.contains("text_layer"));
        assert!(rendered.starts_with(
            "[0:v]scale=1080:1080:force_original_aspect_ratio=increase,crop=1080:1080,setsar=1[bg]"
        ));
        assert!(rendered.ends_with("[with_wave]format=pix_fmts=yuv420p[v]"));
    }

    #[test]
    fn optional_layers_add_exactly_their_stages() {
        for preset in WAVEFORM_PRESETS {
            let base = build(preset, false, false).0.len();
            assert_eq!(build(preset, true, false).0.len(), base + 2);
            assert_eq!(build(preset, false, true).0.len(), base + 2);
            assert_eq!(build(preset, true, true).0.len(), base + 4);
        }
    }

    #[test]
    fn overlay_stage_is_keyed_and_attenuated() {
        let preset = find_preset("Cyan Radial Pulse").unwrap();
        let (graph, _) = build(preset, true, false);
        let rendered = graph.render();

        assert!(rendered.contains(
            "[2:v]scale=1080:1080:force_original_aspect_ratio=increase,crop=1080:1080,setsar=1,\
             format=pix_fmts=yuva420p,chromakey=color=black:similarity=0.01:blend=0.05,\
             colorchannelmixer=aa=0.7[overlay_layer]"
        ));
        assert!(rendered.contains("[bg][overlay_layer]overlay=x=0:y=0:shortest=1:format=auto[bg_overlay]"));
        assert!(rendered.contains("[bg_overlay][wave]overlay"));
    }

    #[test]
    fn opaque_overlay_skips_alpha_attenuation() {
        let preset = find_preset("Cyan Radial Pulse").unwrap();
        let tuning = Tuning {
            overlay_opacity: 1.0,
            ..Tuning::default()
        };
        let layout = InputLayout::new(true, false);
        let graph = build_graph(preset, preset_square(), &layout, &tuning);
        let overlay_stage = &graph.stages()[1];
        assert!(overlay_stage.has_filter("chromakey"));
        assert!(!overlay_stage.has_filter("colorchannelmixer"));
    }

    #[test]
    fn text_layer_is_centered_at_fixed_opacity() {
        let preset = find_preset("Cyan Radial Pulse").unwrap();
        let (graph, layout) = build(preset, true, true);
        assert_eq!(layout.text, Some(3));
        let rendered = graph.render();
        assert!(rendered.contains("[3:v]format=pix_fmts=rgba,colorchannelmixer=aa=0.9[text_layer]"));
        assert!(rendered.contains("[with_wave][text_layer]overlay=x=(W-w)/2:y=(H-h)/2[with_text]"));
        assert!(rendered.ends_with("[with_text]format=pix_fmts=yuv420p[v]"));
    }

    #[test]
    fn wave_is_fed_from_the_audio_input() {
        let preset = find_preset("Green Polar Scope").unwrap();
        let (graph, _) = build(preset, true, true);
        let wave_stage = graph
            .stages()
            .iter()
            .find(|s| s.has_filter("avectorscope"))
            .unwrap();
        assert_eq!(wave_stage.inputs, vec![Pad::audio(1)]);
        assert_eq!(wave_stage.outputs, vec!["wave".to_string()]);
        let scope = &wave_stage.chain[0];
        assert_eq!(scope.get("mode"), Some("polar"));
        assert_eq!(scope.get("scale"), Some("lin"));
        assert_eq!(scope.get("rc"), Some("57"));
        assert_eq!(scope.get("gc"), Some("255"));
    }

    #[test]
    fn renderer_dispatch_per_kind() {
        let cases = [
            ("Cyan Radial Pulse", "showfreqs", "mode=line"),
            ("Neon Pink Equalizer", "showfreqs", "win_size=512"),
            ("Sapphire Blue Equalizer", "showfreqs", "win_size=2048"),
            ("Cyan Lissajous Vector", "avectorscope", "draw=line"),
            ("Nebula Spectrogram", "showspectrum", "color=nebulae"),
            ("Aqua Dual Channel", "showwaves", "split_channels=1"),
        ];
        for (name, filter, fragment) in cases {
            let preset = find_preset(name).unwrap();
            let (graph, _) = build(preset, false, false);
            assert_eq!(graph.count_filter(filter), 1, "{name}");
            assert!(graph.render().contains(fragment), "{name}: missing {fragment}");
        }

        let plain = find_preset("White Mirror Line").unwrap();
        let rendered = build(plain, false, false).0.render();
        assert!(rendered.contains("draw=scale"));
        assert!(!rendered.contains("split_channels"));
    }

    #[test]
    fn post_processing_runs_glow_mirror_shadow_in_order() {
        let preset = find_preset("Ruby Peak Wave").unwrap();
        assert!(preset.glow && preset.mirror && preset.shadow);
        let (graph, layout) = build(preset, false, false);
        assert!(graph.validate(layout.count(), FINAL_OUTPUT).is_ok());

        let rendered = graph.render();
        let glow = rendered.find("[glow_blur][glow_sharp]overlay=format=auto[wave]").unwrap();
        let mirror = rendered.find("[mirror_top][mirror_flip]vstack[wave]").unwrap();
        let shadow = rendered.find("[shadow_blur][shadow_top]overlay=format=auto[wave]").unwrap();
        assert!(glow < mirror && mirror < shadow);
        assert!(rendered.contains("[shadow_src]boxblur=5:1,colorchannelmixer=aa=0.3[shadow_blur]"));
        assert!(rendered.contains("overlay=x=(W-w)/2:y=(H-h)/2[with_wave]"));
    }

    #[test]
    fn wave_effects_keep_transparency() {
        for preset in WAVEFORM_PRESETS.iter().filter(|p| p.glow || p.shadow) {
            let rendered = build(preset, false, false).0.render();
            for merge in ["[glow_blur][glow_sharp]overlay", "[shadow_blur][shadow_top]overlay"] {
                if let Some(at) = rendered.find(merge) {
                    assert!(
                        rendered[at + merge.len()..].starts_with("=format=auto["),
                        "{} drops the wave alpha",
                        preset.name
                    );
                }
            }
        }
    }

    #[test]
    fn flat_preset_has_no_blur() {
        let preset = find_preset("Nebula Spectrogram").unwrap();
        let (graph, _) = build(preset, false, false);
        assert_eq!(graph.count_filter("boxblur"), 0);
        assert_eq!(graph.count_filter("split"), 0);
    }

    #[test]
    fn bottom_position_is_left_aligned() {
        let preset = find_preset("Electric Blue Bars").unwrap();
        let rendered = build(preset, false, false).0.render();
        assert!(rendered.contains("[bg][wave]overlay=x=0:y=H-h[with_wave]"));
    }

    #[test]
    fn wave_size_matches_canvas() {
        let square = preset_square();
        let wide = preset_1080p();
        assert_eq!(wave_size(VisualKind::Circular, square), (1080, 1080));
        assert_eq!(wave_size(VisualKind::Bars, square), (1080, 1000));
        assert_eq!(wave_size(VisualKind::Bars, wide), (1920, 800));
        assert_eq!(wave_size(VisualKind::Vector, square), (1080, 300));
        assert_eq!(wave_size(VisualKind::Wave, square), (1080, 150));
        assert_eq!(wave_size(VisualKind::Spectrum, wide), (1920, 150));
    }
}
