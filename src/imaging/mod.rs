//! Image processing for captures: thumbnails and averaged composites.
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`] + [`MagickBackend`]
//! - **Operations**: High-level functions deciding file names and inputs

pub mod backend;
mod calculations;
pub mod magick_backend;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend};
pub use calculations::fit_within;
pub use magick_backend::MagickBackend;
pub use operations::{average_inputs, create_average, create_thumbnail, plan_thumbnail};
pub use params::{AverageParams, Quality, ThumbnailParams};
pub use rust_backend::RustBackend;

use crate::config::{BackendKind, ImagingConfig};

/// Construct the backend selected in configuration.
pub fn backend_from_config(config: &ImagingConfig) -> Box<dyn ImageBackend> {
    match config.backend {
        BackendKind::Rust => Box::new(RustBackend::new()),
        BackendKind::ImageMagick => Box::new(MagickBackend::new(&config.convert_binary)),
    }
}
