//! Target output geometry.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors constructing an [`OutputFormat`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("output dimensions must be positive, got {width}x{height}")]
    ZeroDimension { width: u32, height: u32 },
}

/// A named target geometry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutputFormat {
    pub width: u32,
    pub height: u32,
    /// Reduced `width:height`, e.g. `9:16`
    pub aspect_ratio_label: String,
}

impl OutputFormat {
    /// Create a format; the label is derived from the reduced ratio.
    pub fn new(width: u32, height: u32) -> Result<Self, FormatError> {
        if width == 0 || height == 0 {
            return Err(FormatError::ZeroDimension { width, height });
        }
        Ok(Self {
            width,
            height,
            aspect_ratio_label: aspect_label(width, height),
        })
    }

    /// 1080x1920 portrait (shorts, reels).
    pub fn portrait() -> Self {
        Self::fixed(1080, 1920)
    }

    /// 1080x1080 square feed post.
    pub fn square() -> Self {
        Self::fixed(1080, 1080)
    }

    /// 1920x1080 landscape.
    pub fn landscape() -> Self {
        Self::fixed(1920, 1080)
    }

    /// 1080x1350 (4:5) feed portrait.
    pub fn feed_portrait() -> Self {
        Self::fixed(1080, 1350)
    }

    fn fixed(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            aspect_ratio_label: aspect_label(width, height),
        }
    }

    /// Whether the canvas is square.
    pub fn is_square(&self) -> bool {
        self.width == self.height
    }

    /// Check the invariants (useful for deserialized values).
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.width == 0 || self.height == 0 {
            return Err(FormatError::ZeroDimension {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} ({})", self.width, self.height, self.aspect_ratio_label)
    }
}

/// Reduced `w:h` label.
pub fn aspect_label(width: u32, height: u32) -> String {
    let d = gcd(width, height).max(1);
    format!("{}:{}", width / d, height / d)
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}
