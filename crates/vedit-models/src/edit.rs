//! Declarative edit requests.

use std::path::PathBuf;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where a media input comes from.
///
/// Paths are used in place; URLs and raw bytes are materialized into
/// scratch files by the pipeline before the engine runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MediaSource {
    /// Local file, read in place
    Path(PathBuf),
    /// Remote file fetched over HTTP(S)
    Url(String),
    /// In-memory payload (e.g. an upload)
    Bytes(Vec<u8>),
}

impl MediaSource {
    /// Create a source from a local path.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    /// Create a source from a URL.
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    /// Short description for logs (never includes payload bytes).
    pub fn describe(&self) -> String {
        match self {
            MediaSource::Path(p) => p.display().to_string(),
            MediaSource::Url(u) => u.clone(),
            MediaSource::Bytes(b) => format!("<{} bytes>", b.len()),
        }
    }

    /// Guess a file extension for materialized copies.
    pub fn extension_hint(&self) -> Option<String> {
        let name = match self {
            MediaSource::Path(p) => return p.extension().map(|e| e.to_string_lossy().into_owned()),
            MediaSource::Url(u) => u.split(['?', '#']).next().unwrap_or_default(),
            MediaSource::Bytes(_) => return None,
        };
        let last = name.rsplit('/').next()?;
        let (_, ext) = last.rsplit_once('.')?;
        if ext.is_empty() || ext.len() > 5 {
            None
        } else {
            Some(ext.to_ascii_lowercase())
        }
    }
}

/// Text drawn on top of the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TextOverlay {
    pub content: String,
    pub x: i32,
    pub y: i32,
    pub font_size: u32,
    /// Any color the engine understands (`white`, `#ff0000`, `0xRRGGBB`)
    pub color: String,
}

/// Image composited over the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageOverlay {
    pub source: MediaSource,
    pub x: i32,
    pub y: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl ImageOverlay {
    /// Scale box, only when both dimensions are present.
    pub fn scale_box(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }
}

/// One set of requested transformations.
///
/// Every field is optional; an empty spec compiles to a program that only
/// re-encodes (and reformats, when a target format is given).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EditSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_start: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trim_end: Option<f64>,
    /// -1.0 .. 1.0, 0 is neutral
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
    /// 1.0 is neutral
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f64>,
    /// 1.0 is neutral
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saturation: Option<f64>,
    /// Playback rate multiplier, 1.0 is unchanged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_overlay: Option<TextOverlay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_overlay: Option<ImageOverlay>,
}

impl EditSpec {
    /// Create an empty spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to `[start, end)`.
    pub fn with_trim(mut self, start: f64, end: f64) -> Self {
        self.trim_start = Some(start);
        self.trim_end = Some(end);
        self
    }

    pub fn with_brightness(mut self, value: f64) -> Self {
        self.brightness = Some(value);
        self
    }

    pub fn with_contrast(mut self, value: f64) -> Self {
        self.contrast = Some(value);
        self
    }

    pub fn with_saturation(mut self, value: f64) -> Self {
        self.saturation = Some(value);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_text(mut self, overlay: TextOverlay) -> Self {
        self.text_overlay = Some(overlay);
        self
    }

    pub fn with_image(mut self, overlay: ImageOverlay) -> Self {
        self.image_overlay = Some(overlay);
        self
    }

    /// Whether any color adjustment is requested.
    pub fn has_color_adjustment(&self) -> bool {
        self.brightness.is_some() || self.contrast.is_some() || self.saturation.is_some()
    }

    /// Merge `other` on top of `self`; fields set in `other` win.
    pub fn overlay_with(&self, other: &EditSpec) -> EditSpec {
        EditSpec {
            trim_start: other.trim_start.or(self.trim_start),
            trim_end: other.trim_end.or(self.trim_end),
            brightness: other.brightness.or(self.brightness),
            contrast: other.contrast.or(self.contrast),
            saturation: other.saturation.or(self.saturation),
            speed: other.speed.or(self.speed),
            text_overlay: other.text_overlay.clone().or_else(|| self.text_overlay.clone()),
            image_overlay: other.image_overlay.clone().or_else(|| self.image_overlay.clone()),
        }
    }
}
