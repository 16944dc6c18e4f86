//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the high-level [`operations`](super::operations) module
//! (which decides which files to create) and the [`backend`](super::backend)
//! (which does the actual pixel work).
//!
//! ## Types
//!
//! - [`Quality`]: JPEG encoding quality (1–100, default 90). Clamped on construction.
//! - [`ThumbnailParams`]: source, output, bounding box, decode hint, quality.
//! - [`AverageParams`]: inputs, output, quality.

use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// Parameters for a thumbnail: fit inside `max_width` x `max_height`,
/// aspect ratio preserved.
#[derive(Debug, Clone, PartialEq)]
pub struct ThumbnailParams {
    pub source: PathBuf,
    pub output: PathBuf,
    pub max_width: u32,
    pub max_height: u32,
    /// Size hint for the decoder; backends that can decode at reduced
    /// resolution may use it, others ignore it.
    pub decode_width: u32,
    pub decode_height: u32,
    pub quality: Quality,
}

/// Parameters for a pixel-wise mean over several captures.
#[derive(Debug, Clone, PartialEq)]
pub struct AverageParams {
    /// Inputs in a stable order. The first decodable one sets the output size.
    pub sources: Vec<PathBuf>,
    pub output: PathBuf,
    pub quality: Quality,
}
