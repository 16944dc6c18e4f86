//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, GIF, WebP) | `image` crate, format sniffed from content |
//! | Orientation | `ImageDecoder::orientation` + `DynamicImage::apply_orientation` |
//! | Thumbnail | [`fit_within`] + `resize_exact` with `Triangle` filter |
//! | Average | per-channel `u64` accumulation over RGB8 buffers |
//! | Encode | `JpegEncoder` with quality; PNG/GIF/WebP via `save_with_format` |
//!
//! Grabbers are amateur setups and the bytes behind an image URL are not
//! always an image. Format is sniffed from content, not the extension, and
//! averaging skips inputs that fail to decode.

use super::backend::{BackendError, ImageBackend};
use super::calculations::fit_within;
use super::params::{AverageParams, ThumbnailParams};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageFormat, ImageReader, RgbImage};
use std::path::Path;
use tracing::warn;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_failed(path: &Path, e: impl std::fmt::Display) -> BackendError {
    BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
}

/// Load and decode an image from disk, applying EXIF orientation.
fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    let mut decoder = ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .into_decoder()
        .map_err(|e| decode_failed(path, e))?;
    let orientation = decoder.orientation().map_err(|e| decode_failed(path, e))?;
    let mut img = DynamicImage::from_decoder(decoder).map_err(|e| decode_failed(path, e))?;
    img.apply_orientation(orientation);
    Ok(img)
}

/// Save an image, choosing the encoder from the output extension.
///
/// JPEG honours `quality`; the other formats are lossless here.
fn save_image(img: &DynamicImage, path: &Path, quality: u32) -> Result<(), BackendError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "jpg" | "jpeg" => save_jpeg(img, path, quality),
        other => match ImageFormat::from_extension(other).filter(|f| f.writing_enabled()) {
            Some(format) => img.save_with_format(path, format).map_err(|e| {
                BackendError::ProcessingFailed(format!("Encode {} failed: {}", path.display(), e))
            }),
            // Unknown extension: still produce a viewable file
            None => save_jpeg(img, path, quality),
        },
    }
}

fn save_jpeg(img: &DynamicImage, path: &Path, quality: u32) -> Result<(), BackendError> {
    let file = std::fs::File::create(path).map_err(BackendError::Io)?;
    let writer = std::io::BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(writer, quality.clamp(1, 100) as u8);
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(encoder)
        .map_err(|e| BackendError::ProcessingFailed(format!("JPEG encode failed: {}", e)))
}

/// Pixel-wise mean of RGB frames. All frames must share the first frame's size.
fn mean_of(frames: &[RgbImage]) -> Option<RgbImage> {
    let first = frames.first()?;
    let (w, h) = first.dimensions();
    let mut sums = vec![0u64; first.as_raw().len()];
    for frame in frames {
        for (sum, &v) in sums.iter_mut().zip(frame.as_raw()) {
            *sum += u64::from(v);
        }
    }
    let n = frames.len() as u64;
    let pixels = sums.into_iter().map(|s| ((s + n / 2) / n) as u8).collect();
    RgbImage::from_raw(w, h, pixels)
}

impl ImageBackend for RustBackend {
    fn thumbnail(&self, params: &ThumbnailParams) -> Result<(), BackendError> {
        let img = load_image(&params.source)?;
        let (w, h) = fit_within(img.dimensions(), (params.max_width, params.max_height));
        let thumb = img.resize_exact(w, h, FilterType::Triangle);
        save_image(&thumb, &params.output, params.quality.value())
    }

    fn average(&self, params: &AverageParams) -> Result<(), BackendError> {
        let mut frames: Vec<RgbImage> = Vec::with_capacity(params.sources.len());
        for source in &params.sources {
            let img = match load_image(source) {
                Ok(img) => img,
                Err(e) => {
                    warn!(path = %source.display(), error = %e, "skipping undecodable capture");
                    continue;
                }
            };
            let rgb = match frames.first() {
                Some(first) if first.dimensions() != img.dimensions() => {
                    let (w, h) = first.dimensions();
                    img.resize_exact(w, h, FilterType::Triangle).to_rgb8()
                }
                _ => img.to_rgb8(),
            };
            frames.push(rgb);
        }

        let mean = mean_of(&frames).ok_or_else(|| {
            BackendError::ProcessingFailed(format!(
                "No decodable inputs for {}",
                params.output.display()
            ))
        })?;
        save_jpeg(
            &DynamicImage::ImageRgb8(mean),
            &params.output,
            params.quality.value(),
        )
    }
}
