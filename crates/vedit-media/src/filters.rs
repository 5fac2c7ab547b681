//! Typed filter program consumed by the codec engine.
//!
//! A [`FilterProgram`] is an ordered list of [`FilterStage`]s plus the trim
//! window applied to the primary input. Ordering is decided by the compiler;
//! this module only serializes it, in one place, into FFmpeg's filter-graph
//! grammar and output arguments.

use std::collections::BTreeSet;

use serde::Serialize;

/// Label of the final video stream in the graph.
pub const VIDEO_OUT: &str = "vout";
/// Label of the final audio stream in the graph.
pub const AUDIO_OUT: &str = "aout";

/// FFmpeg accepts `atempo` factors in this range per filter instance.
const ATEMPO_MIN: f64 = 0.5;
const ATEMPO_MAX: f64 = 100.0;

/// Time-range restriction on the primary input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrimWindow {
    pub start: f64,
    pub duration: f64,
}

/// Which stream a stage transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
}

/// How a scale stage treats the source aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleFit {
    /// Scale to exactly the given box
    Exact,
    /// Largest size fitting inside the box, aspect preserved
    Contain,
}

/// A crop side length: concrete when the source geometry is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CropSide {
    Pixels(u32),
    /// `min(iw, ih)` evaluated by the engine
    ShorterEdge,
}

/// One transformation step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum FilterStage {
    /// Combined brightness/contrast/saturation adjustment
    Equalize {
        brightness: Option<f64>,
        contrast: Option<f64>,
        saturation: Option<f64>,
    },
    /// Video timestamps divided by `speed`
    Timeline { speed: f64 },
    /// Audio tempo multiplied by `factor` (speed)
    AudioTempo { factor: f64 },
    DrawText {
        text: String,
        x: i32,
        y: i32,
        font_size: u32,
        color: String,
    },
    /// Composite input `input` over the current video stream
    Overlay {
        input: usize,
        x: i32,
        y: i32,
        scale: Option<(u32, u32)>,
    },
    /// Centered square crop
    CropSquare { side: CropSide },
    Scale {
        width: u32,
        height: u32,
        fit: ScaleFit,
    },
    /// Pad to the canvas; `None` offsets center the content
    Pad {
        width: u32,
        height: u32,
        x: Option<u32>,
        y: Option<u32>,
    },
    /// Square pixels
    SquarePixels,
    /// Hold a solid card for `duration` seconds after `starts_at`
    EndCard {
        starts_at: f64,
        duration: f64,
        text: String,
        background_color: String,
        text_color: String,
        font_size: u32,
    },
    /// Silence appended to the audio for `duration` seconds
    AudioPad { duration: f64 },
}

impl FilterStage {
    /// Stream this stage operates on.
    pub fn stream(&self) -> StreamKind {
        match self {
            FilterStage::AudioTempo { .. } | FilterStage::AudioPad { .. } => StreamKind::Audio,
            _ => StreamKind::Video,
        }
    }

    /// Engine filters this stage needs.
    pub fn required_filters(&self) -> &'static [&'static str] {
        match self {
            FilterStage::Equalize { .. } => &["eq"],
            FilterStage::Timeline { .. } => &["setpts"],
            FilterStage::AudioTempo { .. } => &["atempo"],
            FilterStage::DrawText { .. } => &["drawtext"],
            FilterStage::Overlay { scale: Some(_), .. } => &["overlay", "scale"],
            FilterStage::Overlay { scale: None, .. } => &["overlay"],
            FilterStage::CropSquare { .. } => &["crop"],
            FilterStage::Scale { .. } => &["scale"],
            FilterStage::Pad { .. } => &["pad"],
            FilterStage::SquarePixels => &["setsar"],
            FilterStage::EndCard { .. } => &["tpad", "drawtext"],
            FilterStage::AudioPad { .. } => &["apad"],
        }
    }

    /// Filter text for single-input stages. Overlay is graph-level and
    /// rendered by [`FilterProgram::filter_graph`].
    fn render(&self) -> Option<String> {
        let text = match self {
            FilterStage::Equalize {
                brightness,
                contrast,
                saturation,
            } => {
                let mut params = Vec::new();
                if let Some(b) = brightness {
                    params.push(format!("brightness={}", fmt_num(*b)));
                }
                if let Some(c) = contrast {
                    params.push(format!("contrast={}", fmt_num(*c)));
                }
                if let Some(s) = saturation {
                    params.push(format!("saturation={}", fmt_num(*s)));
                }
                format!("eq={}", params.join(":"))
            }
            // Full precision so the video and audio factors stay coupled
            FilterStage::Timeline { speed } => format!("setpts=PTS/{}", speed),
            FilterStage::AudioTempo { factor } => atempo_chain(*factor)
                .into_iter()
                .map(|f| format!("atempo={}", f))
                .collect::<Vec<_>>()
                .join(","),
            FilterStage::DrawText {
                text,
                x,
                y,
                font_size,
                color,
            } => format!(
                "drawtext={}",
                escape_graph(&format!(
                    "text={}:x={}:y={}:fontsize={}:fontcolor={}",
                    quote_option(&escape_drawtext(text)),
                    x,
                    y,
                    font_size,
                    quote_option(color)
                ))
            ),
            FilterStage::Overlay { .. } => return None,
            FilterStage::CropSquare { side } => match side {
                CropSide::Pixels(px) => format!("crop={px}:{px}"),
                CropSide::ShorterEdge => "crop='min(iw,ih)':'min(iw,ih)'".to_string(),
            },
            FilterStage::Scale { width, height, fit } => match fit {
                ScaleFit::Exact => format!("scale={}:{}", width, height),
                ScaleFit::Contain => format!(
                    "scale={}:{}:force_original_aspect_ratio=decrease",
                    width, height
                ),
            },
            FilterStage::Pad {
                width,
                height,
                x,
                y,
            } => {
                let x = x.map_or_else(|| "(ow-iw)/2".to_string(), |v| v.to_string());
                let y = y.map_or_else(|| "(oh-ih)/2".to_string(), |v| v.to_string());
                format!("pad={}:{}:{}:{}:color=black", width, height, x, y)
            }
            FilterStage::SquarePixels => "setsar=1".to_string(),
            FilterStage::EndCard {
                starts_at,
                duration,
                text,
                background_color,
                text_color,
                font_size,
            } => {
                let pad = format!(
                    "stop_mode=add:stop_duration={}:color={}",
                    fmt_num(*duration),
                    quote_option(background_color)
                );
                let card = format!(
                    "text={}:x=(w-text_w)/2:y=(h-text_h)/2:fontsize={}:fontcolor={}:enable={}",
                    quote_option(&escape_drawtext(text)),
                    font_size,
                    quote_option(text_color),
                    quote_option(&format!("gte(t,{})", fmt_num(*starts_at)))
                );
                format!("tpad={},drawtext={}", escape_graph(&pad), escape_graph(&card))
            }
            FilterStage::AudioPad { duration } => format!("apad=pad_dur={}", fmt_num(*duration)),
        };
        Some(text)
    }
}

/// Ordered transformation program for one engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterProgram {
    /// Applied to the primary input as a seek + duration, not as a filter
    pub trim: Option<TrimWindow>,
    pub stages: Vec<FilterStage>,
    /// Number of inputs the program reads (primary + overlays)
    pub input_count: usize,
}

impl Default for FilterProgram {
    fn default() -> Self {
        Self {
            trim: None,
            stages: Vec::new(),
            input_count: 1,
        }
    }
}

impl FilterProgram {
    /// Whether the program transforms anything beyond re-encoding.
    pub fn is_passthrough(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stages of one stream, in order.
    pub fn stages_for(&self, stream: StreamKind) -> impl Iterator<Item = &FilterStage> {
        self.stages.iter().filter(move |s| s.stream() == stream)
    }

    /// Video playback speed, when a speed change is present.
    pub fn timeline_speed(&self) -> Option<f64> {
        self.stages.iter().find_map(|s| match s {
            FilterStage::Timeline { speed } => Some(*speed),
            _ => None,
        })
    }

    /// Audio tempo factor, when a speed change is present.
    pub fn tempo_factor(&self) -> Option<f64> {
        self.stages.iter().find_map(|s| match s {
            FilterStage::AudioTempo { factor } => Some(*factor),
            _ => None,
        })
    }

    /// Whether the program reads the primary audio stream.
    pub fn uses_audio(&self) -> bool {
        self.stages_for(StreamKind::Audio).next().is_some()
    }

    /// Engine filters the program needs, sorted and deduplicated.
    pub fn required_filters(&self) -> Vec<&'static str> {
        let set: BTreeSet<&'static str> = self
            .stages
            .iter()
            .flat_map(|s| s.required_filters().iter().copied())
            .collect();
        set.into_iter().collect()
    }

    /// Duration of the rendered output, given the source duration when the
    /// program has no trim window.
    pub fn expected_duration(&self, source_duration: Option<f64>) -> Option<f64> {
        let base = self.trim.map(|t| t.duration).or(source_duration)?;
        let mut duration = base / self.timeline_speed().unwrap_or(1.0);
        for stage in &self.stages {
            if let FilterStage::EndCard { duration: card, .. } = stage {
                duration += card;
            }
        }
        Some(duration)
    }

    /// Render the `-filter_complex` graph, or `None` for a passthrough program.
    pub fn filter_graph(&self) -> Option<String> {
        if self.is_passthrough() {
            return None;
        }

        let mut chains: Vec<String> = Vec::new();

        let video: Vec<&FilterStage> = self.stages_for(StreamKind::Video).collect();
        if !video.is_empty() {
            let mut current = "0:v".to_string();
            let mut pending: Vec<String> = Vec::new();
            let mut step = 0usize;

            for stage in video {
                if let FilterStage::Overlay { input, x, y, scale } = stage {
                    let base = format!("v{}", step);
                    chains.push(link(&current, &pending, &base));
                    pending.clear();

                    let overlay_src = match scale {
                        Some((w, h)) => {
                            let scaled = format!("ov{}", input);
                            chains.push(format!("[{}:v]scale={}:{}[{}]", input, w, h, scaled));
                            scaled
                        }
                        None => format!("{}:v", input),
                    };
                    let out = format!("v{}", step + 1);
                    chains.push(format!(
                        "[{}][{}]overlay={}:{}[{}]",
                        base, overlay_src, x, y, out
                    ));
                    current = out;
                    step += 2;
                } else if let Some(text) = stage.render() {
                    pending.push(text);
                }
            }
            chains.push(link(&current, &pending, VIDEO_OUT));
        }

        let audio: Vec<String> = self
            .stages_for(StreamKind::Audio)
            .filter_map(FilterStage::render)
            .collect();
        if !audio.is_empty() {
            chains.push(link("0:a", &audio, AUDIO_OUT));
        }

        Some(chains.join(";"))
    }

    /// Input-side arguments for the primary input (`-ss`/`-t`).
    pub fn primary_input_args(&self) -> Vec<String> {
        match self.trim {
            Some(t) => vec![
                "-ss".to_string(),
                format!("{:.3}", t.start),
                "-t".to_string(),
                format!("{:.3}", t.duration),
            ],
            None => Vec::new(),
        }
    }

    /// Output-side arguments: filter graph and stream mapping.
    pub fn output_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let has_video = self.stages_for(StreamKind::Video).next().is_some();

        if let Some(graph) = self.filter_graph() {
            args.push("-filter_complex".to_string());
            args.push(graph);
        }

        args.push("-map".to_string());
        args.push(if has_video {
            format!("[{}]", VIDEO_OUT)
        } else {
            "0:v".to_string()
        });

        args.push("-map".to_string());
        args.push(if self.uses_audio() {
            format!("[{}]", AUDIO_OUT)
        } else {
            "0:a?".to_string()
        });

        args
    }
}

/// `[in]f1,f2[out]`; an empty chain becomes a `null` passthrough.
fn link(input: &str, filters: &[String], output: &str) -> String {
    let body = if filters.is_empty() {
        "null".to_string()
    } else {
        filters.join(",")
    };
    format!("[{}]{}[{}]", input, body, output)
}

/// Split a tempo factor into per-instance factors FFmpeg accepts.
/// The product of the returned factors equals `factor`.
pub fn atempo_chain(factor: f64) -> Vec<f64> {
    let mut remaining = factor;
    let mut chain = Vec::new();
    while remaining < ATEMPO_MIN {
        chain.push(ATEMPO_MIN);
        remaining /= ATEMPO_MIN;
    }
    while remaining > ATEMPO_MAX {
        chain.push(ATEMPO_MAX);
        remaining /= ATEMPO_MAX;
    }
    chain.push(remaining);
    chain
}

/// Stable number formatting: up to 6 decimals, trailing zeros trimmed.
pub fn fmt_num(value: f64) -> String {
    let s = format!("{:.6}", value);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" || s.is_empty() {
        "0".to_string()
    } else {
        s.to_string()
    }
}

// FFmpeg unescapes drawtext text at three levels. The helpers below each
// handle one, innermost first.

/// Escape `\` and `%` so drawtext prints the text literally.
pub fn escape_drawtext(text: &str) -> String {
    backslash_escape(text, &['\\', '%'])
}

/// Single-quote an option value so `:` and whitespace survive the option
/// parser. Embedded quotes close, get escaped and reopen.
pub fn quote_option(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

/// Escape a filter's whole argument string for the graph parser.
pub fn escape_graph(args: &str) -> String {
    backslash_escape(args, &['\\', '\'', '[', ']', ',', ';'])
}

fn backslash_escape(value: &str, special: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fmt_num() {
        assert_eq!(fmt_num(1.0), "1");
        assert_eq!(fmt_num(0.5), "0.5");
        assert_eq!(fmt_num(1.0 / 3.0), "0.333333");
        assert_eq!(fmt_num(-0.0000001), "0");
        assert_eq!(fmt_num(-0.25), "-0.25");
    }

    const WHITESPACE: &[char] = &[' ', '\n', '\t', '\r'];

    /// Reads one token the way FFmpeg's `av_get_token` does: quotes and
    /// backslashes are stripped, parsing stops at an unescaped terminator.
    fn next_token<'a>(input: &'a str, term: &[char]) -> (String, &'a str) {
        let s = input.trim_start_matches(WHITESPACE);
        let mut out = String::new();
        let mut keep = 0;
        let mut rest = "";
        let mut chars = s.char_indices();
        while let Some((i, c)) = chars.next() {
            if term.contains(&c) {
                rest = &s[i..];
                break;
            }
            match c {
                '\\' => match chars.next() {
                    Some((_, escaped)) => {
                        out.push(escaped);
                        keep = out.len();
                    }
                    None => out.push(c),
                },
                '\'' => {
                    let mut closed = false;
                    for (_, quoted) in chars.by_ref() {
                        if quoted == '\'' {
                            closed = true;
                            break;
                        }
                        out.push(quoted);
                    }
                    if closed {
                        keep = out.len();
                    }
                }
                _ => out.push(c),
            }
        }
        while out.len() > keep && out.ends_with(WHITESPACE) {
            out.pop();
        }
        (out, rest)
    }

    /// Filters of a rendered chain with their `key=value` options.
    fn parse_chain(rendered: &str) -> Vec<(String, Vec<(String, String)>)> {
        let mut filters = Vec::new();
        let mut rest = rendered;
        while !rest.is_empty() {
            let (name, args) = rest.split_once('=').unwrap();
            let (args, tail) = next_token(args, &['[', ']', ',', ';']);
            filters.push((name.to_string(), parse_options(&args)));
            rest = tail.strip_prefix(',').unwrap_or(tail);
        }
        filters
    }

    fn parse_options(args: &str) -> Vec<(String, String)> {
        let mut options = Vec::new();
        let mut rest = args;
        while !rest.is_empty() {
            let (key, value) = rest.split_once('=').unwrap();
            let (value, tail) = next_token(value, &[':']);
            options.push((key.to_string(), value));
            rest = tail.strip_prefix(':').unwrap_or(tail);
        }
        options
    }

    /// drawtext expansion for text without `%{...}` sequences.
    fn expand_drawtext(text: &str) -> String {
        let mut out = String::new();
        let mut chars = text.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => out.extend(chars.next()),
                '%' => panic!("unescaped % in {text:?}"),
                _ => out.push(c),
            }
        }
        out
    }

    fn option<'a>(options: &'a [(String, String)], key: &str) -> &'a str {
        options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or_else(|| panic!("no {key} in {options:?}"))
    }

    #[test]
    fn test_escaping_levels() {
        assert_eq!(escape_drawtext("50% \\o/"), "50\\% \\\\o/");
        assert_eq!(quote_option("it's"), "'it'\\''s'");
        assert_eq!(quote_option("a:b"), "'a:b'");
        assert_eq!(escape_graph("a='x,y';[z]"), "a=\\'x\\,y\\'\\;\\[z\\]");
    }

    #[test]
    fn test_overlay_text_survives_filter_parsing() {
        for text in [
            "Hi: it's 100%",
            "Don't miss: 50% off",
            "[new], a\\b; 'quoted'",
            "  padded  ",
        ] {
            let stage = FilterStage::DrawText {
                text: text.to_string(),
                x: 40,
                y: 80,
                font_size: 48,
                color: "white@0.8".to_string(),
            };
            let rendered = stage.render().unwrap();
            let filters = parse_chain(&rendered);
            assert_eq!(filters.len(), 1, "rendered {rendered}");

            let (name, options) = &filters[0];
            assert_eq!(name, "drawtext");
            let keys: Vec<&str> = options.iter().map(|(k, _)| k.as_str()).collect();
            assert_eq!(keys, ["text", "x", "y", "fontsize", "fontcolor"]);
            assert_eq!(expand_drawtext(option(options, "text")), text);
            assert_eq!(option(options, "x"), "40");
            assert_eq!(option(options, "fontcolor"), "white@0.8");
        }
    }

    #[test]
    fn test_end_card_survives_filter_parsing() {
        let stage = FilterStage::EndCard {
            starts_at: 12.5,
            duration: 3.0,
            text: "Don't miss: 50% off".to_string(),
            background_color: "#101010".to_string(),
            text_color: "white".to_string(),
            font_size: 64,
        };
        let filters = parse_chain(&stage.render().unwrap());
        assert_eq!(filters.len(), 2);

        let (pad, pad_options) = &filters[0];
        assert_eq!(pad, "tpad");
        assert_eq!(option(pad_options, "stop_mode"), "add");
        assert_eq!(option(pad_options, "stop_duration"), "3");
        assert_eq!(option(pad_options, "color"), "#101010");

        let (card, card_options) = &filters[1];
        assert_eq!(card, "drawtext");
        assert_eq!(expand_drawtext(option(card_options, "text")), "Don't miss: 50% off");
        assert_eq!(option(card_options, "x"), "(w-text_w)/2");
        assert_eq!(option(card_options, "enable"), "gte(t,12.5)");
    }

    #[test]
    fn test_speed_renders_exact_factors() {
        for (speed, setpts, atempo) in [
            (3.0, "setpts=PTS/3", "atempo=3"),
            (0.8, "setpts=PTS/0.8", "atempo=0.8"),
            (4e6, "setpts=PTS/4000000", "atempo=100,atempo=100,atempo=100,atempo=4"),
        ] {
            let timeline = FilterStage::Timeline { speed }.render().unwrap();
            let tempo = FilterStage::AudioTempo { factor: speed }.render().unwrap();
            assert_eq!(timeline, setpts);
            assert_eq!(tempo, atempo);
        }
    }

    #[test]
    fn test_atempo_chain_product() {
        assert_eq!(atempo_chain(2.0), vec![2.0]);
        assert_eq!(atempo_chain(0.25), vec![0.5, 0.5, 1.0]);
        let chain = atempo_chain(0.3);
        let product: f64 = chain.iter().product();
        assert!((product - 0.3).abs() < 1e-12);
        assert!(chain.iter().all(|f| (ATEMPO_MIN..=ATEMPO_MAX).contains(f)));
    }

    #[test]
    fn test_passthrough_program() {
        let program = FilterProgram::default();
        assert!(program.filter_graph().is_none());
        assert_eq!(program.output_args(), vec!["-map", "0:v", "-map", "0:a?"]);
        assert!(program.primary_input_args().is_empty());
    }

    #[test]
    fn test_linear_graph() {
        let program = FilterProgram {
            trim: Some(TrimWindow {
                start: 2.0,
                duration: 3.5,
            }),
            stages: vec![
                FilterStage::Equalize {
                    brightness: Some(0.1),
                    contrast: None,
                    saturation: Some(1.3),
                },
                FilterStage::Timeline { speed: 2.0 },
                FilterStage::AudioTempo { factor: 2.0 },
            ],
            input_count: 1,
        };
        assert_eq!(
            program.filter_graph().unwrap(),
            "[0:v]eq=brightness=0.1:saturation=1.3,setpts=PTS/2[vout];[0:a]atempo=2[aout]"
        );
        assert_eq!(program.primary_input_args(), vec!["-ss", "2.000", "-t", "3.500"]);
        let args = program.output_args();
        assert!(args.contains(&"[vout]".to_string()));
        assert!(args.contains(&"[aout]".to_string()));
        assert_eq!(program.expected_duration(None), Some(1.75));
    }

    #[test]
    fn test_overlay_graph() {
        let program = FilterProgram {
            trim: None,
            stages: vec![
                FilterStage::Equalize {
                    brightness: None,
                    contrast: Some(1.1),
                    saturation: None,
                },
                FilterStage::Overlay {
                    input: 1,
                    x: 10,
                    y: 20,
                    scale: Some((200, 100)),
                },
                FilterStage::SquarePixels,
            ],
            input_count: 2,
        };
        assert_eq!(
            program.filter_graph().unwrap(),
            "[0:v]eq=contrast=1.1[v0];[1:v]scale=200:100[ov1];[v0][ov1]overlay=10:20[v1];[v1]setsar=1[vout]"
        );
        assert_eq!(program.required_filters(), vec!["eq", "overlay", "scale", "setsar"]);
        assert!(!program.uses_audio());
    }

    #[test]
    fn test_overlay_native_size_at_end() {
        let program = FilterProgram {
            trim: None,
            stages: vec![FilterStage::Overlay {
                input: 1,
                x: 0,
                y: 0,
                scale: None,
            }],
            input_count: 2,
        };
        assert_eq!(
            program.filter_graph().unwrap(),
            "[0:v]null[v0];[v0][1:v]overlay=0:0[v1];[v1]null[vout]"
        );
    }

    #[test]
    fn test_end_card_extends_expected_duration() {
        let program = FilterProgram {
            trim: Some(TrimWindow {
                start: 0.0,
                duration: 10.0,
            }),
            stages: vec![
                FilterStage::EndCard {
                    starts_at: 10.0,
                    duration: 3.0,
                    text: "Follow us".to_string(),
                    background_color: "black".to_string(),
                    text_color: "white".to_string(),
                    font_size: 64,
                },
                FilterStage::AudioPad { duration: 3.0 },
            ],
            input_count: 1,
        };
        assert_eq!(program.expected_duration(None), Some(13.0));
        let graph = program.filter_graph().unwrap();
        assert!(graph.starts_with("[0:v]tpad=stop_mode=add:stop_duration=3:color=\\'black\\',drawtext="));
        assert!(graph.contains("enable=\\'gte(t\\,10)\\'[vout]"));
        assert!(graph.contains("[0:a]apad=pad_dur=3[aout]"));
    }
}
