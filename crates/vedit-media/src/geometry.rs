//! Aspect-ratio reformatting math.
//!
//! Square targets are center-cropped to the shorter source edge and then
//! scaled; other targets are scaled to fit inside the canvas and padded
//! (letterboxed) to fill it exactly, centered.

use serde::{Deserialize, Serialize};

/// Pixel dimensions of a source video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceGeometry {
    pub width: u32,
    pub height: u32,
}

impl SourceGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Shorter edge, the side of the largest centered square.
    pub fn shorter_edge(&self) -> u32 {
        self.width.min(self.height)
    }
}

/// A centered crop rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Result of fitting a source inside a canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Letterbox {
    /// Scaled content size
    pub content_width: u32,
    pub content_height: u32,
    /// Offset of the content on the canvas
    pub offset_x: u32,
    pub offset_y: u32,
}

/// Largest centered square inside the source.
pub fn center_square(source: SourceGeometry) -> CropRect {
    let side = source.shorter_edge();
    CropRect {
        x: (source.width - side) / 2,
        y: (source.height - side) / 2,
        width: side,
        height: side,
    }
}

/// Fit `source` inside a `target_width x target_height` canvas preserving
/// aspect ratio, then center it.
///
/// Content dimensions are rounded down to even values (libx264 requires
/// even dimensions) and never exceed the canvas.
pub fn letterbox(source: SourceGeometry, target_width: u32, target_height: u32) -> Letterbox {
    let scale_w = target_width as f64 / source.width as f64;
    let scale_h = target_height as f64 / source.height as f64;
    let scale = scale_w.min(scale_h);

    let content_width = fit_dimension(source.width as f64 * scale, target_width);
    let content_height = fit_dimension(source.height as f64 * scale, target_height);

    Letterbox {
        content_width,
        content_height,
        offset_x: (target_width - content_width) / 2,
        offset_y: (target_height - content_height) / 2,
    }
}

fn fit_dimension(scaled: f64, limit: u32) -> u32 {
    let rounded = scaled.round().min(limit as f64).max(2.0) as u32;
    make_even(rounded).min(limit)
}

/// Rounds down to the nearest even number (libx264 requirement).
#[inline]
pub fn make_even(value: u32) -> u32 {
    (value / 2) * 2
}
