//! Edit spec compiler.
//!
//! Maps an [`EditSpec`] (plus an optional target format and end card) to an
//! ordered [`FilterProgram`]. The engine is order-sensitive, so the order
//! below is fixed:
//!
//! 1. trim (input seek + duration, both bounds required)
//! 2. color (single `eq` stage)
//! 3. speed (video timeline and audio tempo, always together)
//! 4. text overlay
//! 5. image overlay (second input)
//! 6. reformat (square crop + scale, or fit + pad)
//! 7. end card
//!
//! Compilation is pure and deterministic.

use vedit_models::{EditSpec, EndCard, OutputFormat};

use crate::error::{CompileError, CompileResult};
use crate::filters::{CropSide, FilterProgram, FilterStage, ScaleFit, TrimWindow};
use crate::geometry::{center_square, letterbox, SourceGeometry};

/// Input index of the image overlay.
const OVERLAY_INPUT: usize = 1;

/// End card text height relative to the canvas height.
const END_CARD_TEXT_RATIO: u32 = 14;
const END_CARD_DEFAULT_FONT_SIZE: u32 = 64;

/// Compile with no knowledge of the source.
pub fn compile(spec: &EditSpec, target: Option<&OutputFormat>) -> CompileResult<FilterProgram> {
    EditCompiler::new().compile(spec, target)
}

/// Compile with known source dimensions, producing concrete crop/scale/pad values.
pub fn compile_for_source(
    spec: &EditSpec,
    target: Option<&OutputFormat>,
    source: SourceGeometry,
) -> CompileResult<FilterProgram> {
    EditCompiler::new().with_source(source).compile(spec, target)
}

/// Compiler with optional knowledge about the source.
#[derive(Debug, Clone, Default)]
pub struct EditCompiler {
    source: Option<SourceGeometry>,
    source_duration: Option<f64>,
    without_audio: bool,
}

impl EditCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source dimensions, for concrete reformat numbers.
    pub fn with_source(mut self, source: SourceGeometry) -> Self {
        self.source = Some(source);
        self
    }

    /// Source duration, used to place an end card when there is no trim window.
    pub fn with_source_duration(mut self, seconds: f64) -> Self {
        self.source_duration = Some(seconds);
        self
    }

    /// The source has no audio stream; audio stages are omitted.
    pub fn without_audio(mut self) -> Self {
        self.without_audio = true;
        self
    }

    pub fn compile(&self, spec: &EditSpec, target: Option<&OutputFormat>) -> CompileResult<FilterProgram> {
        self.compile_with_end_card(spec, target, None)
    }

    pub fn compile_with_end_card(
        &self,
        spec: &EditSpec,
        target: Option<&OutputFormat>,
        end_card: Option<&EndCard>,
    ) -> CompileResult<FilterProgram> {
        validate(spec)?;
        if let Some(format) = target {
            if format.width == 0 || format.height == 0 {
                return Err(CompileError::InvalidOutputFormat {
                    width: format.width,
                    height: format.height,
                });
            }
        }
        if let Some(source) = self.source {
            if source.width == 0 || source.height == 0 {
                return Err(CompileError::InvalidSourceGeometry {
                    width: source.width,
                    height: source.height,
                });
            }
        }

        let mut program = FilterProgram {
            trim: trim_window(spec),
            ..FilterProgram::default()
        };

        if spec.has_color_adjustment() {
            program.stages.push(FilterStage::Equalize {
                brightness: spec.brightness,
                contrast: spec.contrast,
                saturation: spec.saturation,
            });
        }

        if let Some(speed) = spec.speed.filter(|s| *s != 1.0) {
            program.stages.push(FilterStage::Timeline { speed });
            if !self.without_audio {
                program.stages.push(FilterStage::AudioTempo { factor: speed });
            }
        }

        if let Some(text) = &spec.text_overlay {
            program.stages.push(FilterStage::DrawText {
                text: text.content.clone(),
                x: text.x,
                y: text.y,
                font_size: text.font_size,
                color: text.color.clone(),
            });
        }

        if let Some(image) = &spec.image_overlay {
            program.stages.push(FilterStage::Overlay {
                input: OVERLAY_INPUT,
                x: image.x,
                y: image.y,
                scale: image.scale_box(),
            });
            program.input_count = OVERLAY_INPUT + 1;
        }

        if let Some(format) = target {
            self.push_reformat(&mut program, format);
        }

        if let Some(card) = end_card {
            self.push_end_card(&mut program, spec, target, card)?;
        }

        Ok(program)
    }

    fn push_reformat(&self, program: &mut FilterProgram, format: &OutputFormat) {
        let (tw, th) = (format.width, format.height);

        if format.is_square() {
            let side = match self.source {
                Some(source) => CropSide::Pixels(center_square(source).width),
                None => CropSide::ShorterEdge,
            };
            program.stages.push(FilterStage::CropSquare { side });
            program.stages.push(FilterStage::Scale {
                width: tw,
                height: th,
                fit: ScaleFit::Exact,
            });
        } else {
            match self.source {
                Some(source) => {
                    let fit = letterbox(source, tw, th);
                    program.stages.push(FilterStage::Scale {
                        width: fit.content_width,
                        height: fit.content_height,
                        fit: ScaleFit::Exact,
                    });
                    program.stages.push(FilterStage::Pad {
                        width: tw,
                        height: th,
                        x: Some(fit.offset_x),
                        y: Some(fit.offset_y),
                    });
                }
                None => {
                    program.stages.push(FilterStage::Scale {
                        width: tw,
                        height: th,
                        fit: ScaleFit::Contain,
                    });
                    program.stages.push(FilterStage::Pad {
                        width: tw,
                        height: th,
                        x: None,
                        y: None,
                    });
                }
            }
        }

        program.stages.push(FilterStage::SquarePixels);
    }

    fn push_end_card(
        &self,
        program: &mut FilterProgram,
        spec: &EditSpec,
        target: Option<&OutputFormat>,
        card: &EndCard,
    ) -> CompileResult<()> {
        if !card.duration.is_finite() || card.duration <= 0.0 {
            return Err(CompileError::InvalidEndCardDuration(card.duration));
        }

        let content = program
            .trim
            .map(|t| t.duration)
            .or(self.source_duration)
            .ok_or(CompileError::EndCardNeedsDuration)?;
        let speed = spec.speed.unwrap_or(1.0);

        let font_size = target
            .map(|f| (f.height / END_CARD_TEXT_RATIO).max(12))
            .unwrap_or(END_CARD_DEFAULT_FONT_SIZE);

        program.stages.push(FilterStage::EndCard {
            starts_at: content / speed,
            duration: card.duration,
            text: card.text.clone(),
            background_color: card.background_color.clone(),
            text_color: card.text_color.clone(),
            font_size,
        });
        if !self.without_audio {
            program.stages.push(FilterStage::AudioPad {
                duration: card.duration,
            });
        }
        Ok(())
    }
}

/// Trim applies only when both bounds are present. A single bound is
/// ignored rather than defaulted.
fn trim_window(spec: &EditSpec) -> Option<TrimWindow> {
    match (spec.trim_start, spec.trim_end) {
        (Some(start), Some(end)) => Some(TrimWindow {
            start,
            duration: end - start,
        }),
        _ => None,
    }
}

fn validate(spec: &EditSpec) -> CompileResult<()> {
    for bound in [spec.trim_start, spec.trim_end].into_iter().flatten() {
        if !bound.is_finite() || bound < 0.0 {
            return Err(CompileError::InvalidTrimBound(bound));
        }
    }
    if let (Some(start), Some(end)) = (spec.trim_start, spec.trim_end) {
        if end <= start {
            return Err(CompileError::InvalidTrimRange { start, end });
        }
    }

    if let Some(speed) = spec.speed {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(CompileError::InvalidSpeed(speed));
        }
    }

    for (field, value) in [
        ("brightness", spec.brightness),
        ("contrast", spec.contrast),
        ("saturation", spec.saturation),
    ] {
        if let Some(v) = value {
            if !v.is_finite() {
                return Err(CompileError::InvalidColorValue { field, value: v });
            }
        }
    }

    if let Some(text) = &spec.text_overlay {
        if text.content.trim().is_empty() {
            return Err(CompileError::EmptyText);
        }
        if text.font_size == 0 {
            return Err(CompileError::InvalidFontSize);
        }
    }

    if let Some(image) = &spec.image_overlay {
        let (w, h) = (image.width.unwrap_or(1), image.height.unwrap_or(1));
        if w == 0 || h == 0 {
            return Err(CompileError::InvalidOverlaySize { width: w, height: h });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vedit_models::{ImageOverlay, MediaSource, TextOverlay};

    fn text(content: &str) -> TextOverlay {
        TextOverlay {
            content: content.to_string(),
            x: 40,
            y: 80,
            font_size: 48,
            color: "white".to_string(),
        }
    }

    fn image(width: Option<u32>, height: Option<u32>) -> ImageOverlay {
        ImageOverlay {
            source: MediaSource::path("logo.png"),
            x: 16,
            y: 16,
            width,
            height,
        }
    }

    fn kinds(program: &FilterProgram) -> Vec<&'static str> {
        program
            .stages
            .iter()
            .map(|s| match s {
                FilterStage::Equalize { .. } => "eq",
                FilterStage::Timeline { .. } => "timeline",
                FilterStage::AudioTempo { .. } => "tempo",
                FilterStage::DrawText { .. } => "text",
                FilterStage::Overlay { .. } => "overlay",
                FilterStage::CropSquare { .. } => "crop",
                FilterStage::Scale { .. } => "scale",
                FilterStage::Pad { .. } => "pad",
                FilterStage::SquarePixels => "sar",
                FilterStage::EndCard { .. } => "end_card",
                FilterStage::AudioPad { .. } => "apad",
            })
            .collect()
    }

    #[test]
    fn test_speed_factors_are_coupled() {
        for speed in [0.25, 0.5, 0.75, 1.5, 2.0, 3.0, 7.0] {
            let program = compile(&EditSpec::new().with_speed(speed), None).unwrap();
            assert_eq!(program.timeline_speed(), Some(speed));
            assert_eq!(program.tempo_factor(), Some(speed));
        }
    }

    #[test]
    fn test_unit_speed_emits_nothing() {
        let program = compile(&EditSpec::new().with_speed(1.0), None).unwrap();
        assert!(program.is_passthrough());
    }

    #[test]
    fn test_invalid_speed_rejected() {
        for speed in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = compile(&EditSpec::new().with_speed(speed), None).unwrap_err();
            assert!(matches!(err, CompileError::InvalidSpeed(_)));
        }
    }

    #[test]
    fn test_trim_requires_end_after_start() {
        let err = compile(&EditSpec::new().with_trim(5.0, 5.0), None).unwrap_err();
        assert_eq!(err, CompileError::InvalidTrimRange { start: 5.0, end: 5.0 });

        let err = compile(&EditSpec::new().with_trim(8.0, 3.0), None).unwrap_err();
        assert!(matches!(err, CompileError::InvalidTrimRange { .. }));

        let ok = compile(&EditSpec::new().with_trim(3.0, 8.0), None).unwrap();
        assert_eq!(ok.trim, Some(TrimWindow { start: 3.0, duration: 5.0 }));
    }

    #[test]
    fn test_single_trim_bound_is_ignored() {
        let spec = EditSpec {
            trim_start: Some(4.0),
            ..EditSpec::default()
        };
        assert_eq!(compile(&spec, None).unwrap().trim, None);

        let spec = EditSpec {
            trim_end: Some(9.0),
            ..EditSpec::default()
        };
        assert_eq!(compile(&spec, None).unwrap().trim, None);
    }

    #[test]
    fn test_color_merged_into_one_stage() {
        let spec = EditSpec::new().with_brightness(0.05).with_saturation(1.4);
        let program = compile(&spec, None).unwrap();
        assert_eq!(
            program.stages,
            vec![FilterStage::Equalize {
                brightness: Some(0.05),
                contrast: None,
                saturation: Some(1.4),
            }]
        );
    }

    #[test]
    fn test_stage_order() {
        let spec = EditSpec::new()
            .with_trim(1.0, 11.0)
            .with_contrast(1.2)
            .with_speed(2.0)
            .with_text(text("Hello"))
            .with_image(image(Some(120), Some(60)));
        let program = compile(&spec, Some(&OutputFormat::portrait())).unwrap();
        assert_eq!(
            kinds(&program),
            vec!["eq", "timeline", "tempo", "text", "overlay", "scale", "pad", "sar"]
        );
        assert_eq!(program.input_count, 2);
    }

    #[test]
    fn test_image_overlay_scaling_needs_both_dimensions() {
        let program = compile(&EditSpec::new().with_image(image(Some(100), None)), None).unwrap();
        assert!(matches!(
            program.stages[0],
            FilterStage::Overlay { scale: None, .. }
        ));

        let program = compile(&EditSpec::new().with_image(image(Some(100), Some(40))), None).unwrap();
        assert!(matches!(
            program.stages[0],
            FilterStage::Overlay {
                scale: Some((100, 40)),
                ..
            }
        ));
    }

    #[test]
    fn test_square_target_crops_shorter_edge_first() {
        let program = compile_for_source(
            &EditSpec::new(),
            Some(&OutputFormat::square()),
            SourceGeometry::new(1920, 1080),
        )
        .unwrap();
        assert_eq!(
            program.stages,
            vec![
                FilterStage::CropSquare {
                    side: CropSide::Pixels(1080)
                },
                FilterStage::Scale {
                    width: 1080,
                    height: 1080,
                    fit: ScaleFit::Exact
                },
                FilterStage::SquarePixels,
            ]
        );
        let graph = program.filter_graph().unwrap();
        assert_eq!(graph, "[0:v]crop=1080:1080,scale=1080:1080,setsar=1[vout]");
    }

    #[test]
    fn test_square_target_small_canvas() {
        let format = OutputFormat::new(600, 600).unwrap();
        let program = compile_for_source(&EditSpec::new(), Some(&format), SourceGeometry::new(720, 1280)).unwrap();
        assert_eq!(
            &program.stages[..2],
            &[
                FilterStage::CropSquare {
                    side: CropSide::Pixels(720)
                },
                FilterStage::Scale {
                    width: 600,
                    height: 600,
                    fit: ScaleFit::Exact
                },
            ]
        );
    }

    #[test]
    fn test_square_target_without_source_uses_expression() {
        let program = compile(&EditSpec::new(), Some(&OutputFormat::square())).unwrap();
        assert!(program
            .filter_graph()
            .unwrap()
            .starts_with("[0:v]crop='min(iw,ih)':'min(iw,ih)',scale=1080:1080"));
    }

    #[test]
    fn test_non_square_target_fits_and_pads() {
        let program = compile_for_source(
            &EditSpec::new(),
            Some(&OutputFormat::portrait()),
            SourceGeometry::new(1920, 1080),
        )
        .unwrap();
        assert_eq!(
            &program.stages[..2],
            &[
                FilterStage::Scale {
                    width: 1080,
                    height: 608,
                    fit: ScaleFit::Exact
                },
                FilterStage::Pad {
                    width: 1080,
                    height: 1920,
                    x: Some(0),
                    y: Some(656)
                },
            ]
        );

        let generic = compile(&EditSpec::new(), Some(&OutputFormat::portrait())).unwrap();
        assert_eq!(
            generic.filter_graph().unwrap(),
            "[0:v]scale=1080:1920:force_original_aspect_ratio=decrease,\
             pad=1080:1920:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1[vout]"
        );
    }

    #[test]
    fn test_end_card_after_reformat() {
        let card = EndCard::new("Subscribe", "black", "white", 2.5);
        let spec = EditSpec::new().with_trim(10.0, 20.0).with_speed(2.0);
        let program = EditCompiler::new()
            .compile_with_end_card(&spec, Some(&OutputFormat::portrait()), Some(&card))
            .unwrap();
        assert_eq!(
            kinds(&program),
            vec!["timeline", "tempo", "scale", "pad", "sar", "end_card", "apad"]
        );
        match &program.stages[5] {
            FilterStage::EndCard {
                starts_at,
                font_size,
                ..
            } => {
                assert_eq!(*starts_at, 5.0);
                assert_eq!(*font_size, 1920 / END_CARD_TEXT_RATIO);
            }
            other => panic!("unexpected stage {:?}", other),
        }
        assert_eq!(program.expected_duration(None), Some(7.5));
    }

    #[test]
    fn test_end_card_needs_duration() {
        let card = EndCard::new("Bye", "black", "white", 2.0);
        let err = EditCompiler::new()
            .compile_with_end_card(&EditSpec::new(), None, Some(&card))
            .unwrap_err();
        assert_eq!(err, CompileError::EndCardNeedsDuration);

        let ok = EditCompiler::new()
            .with_source_duration(30.0)
            .compile_with_end_card(&EditSpec::new(), None, Some(&card));
        assert!(ok.is_ok());

        let bad = EndCard::new("Bye", "black", "white", 0.0);
        let err = EditCompiler::new()
            .compile_with_end_card(&EditSpec::new().with_trim(0.0, 1.0), None, Some(&bad))
            .unwrap_err();
        assert_eq!(err, CompileError::InvalidEndCardDuration(0.0));
    }

    #[test]
    fn test_without_audio_drops_audio_stages() {
        let program = EditCompiler::new()
            .without_audio()
            .compile(&EditSpec::new().with_speed(1.5), None)
            .unwrap();
        assert!(program.tempo_factor().is_none());
        assert!(!program.uses_audio());
        assert!(program.timeline_speed().is_some());
    }

    #[test]
    fn test_invalid_overlays_rejected() {
        assert_eq!(
            compile(&EditSpec::new().with_text(text("   ")), None).unwrap_err(),
            CompileError::EmptyText
        );
        assert!(matches!(
            compile(&EditSpec::new().with_image(image(Some(0), Some(10))), None).unwrap_err(),
            CompileError::InvalidOverlaySize { .. }
        ));
    }

    #[test]
    fn test_compile_is_deterministic() {
        let spec = EditSpec::new()
            .with_trim(2.0, 9.0)
            .with_brightness(0.1)
            .with_contrast(1.1)
            .with_speed(1.25)
            .with_text(text("Hi: it's 100%"))
            .with_image(image(Some(64), Some(64)));
        let format = OutputFormat::landscape();
        let a = compile(&spec, Some(&format)).unwrap();
        let b = compile(&spec, Some(&format)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.filter_graph(), b.filter_graph());
        assert_eq!(a.output_args(), b.output_args());
    }
}
