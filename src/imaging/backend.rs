//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations the pipeline needs:
//! thumbnail and average.
//!
//! | Backend | How |
//! |---|---|
//! | [`RustBackend`](super::rust_backend::RustBackend) | `image` crate, in process |
//! | [`MagickBackend`](super::magick_backend::MagickBackend) | ImageMagick `convert` subprocess |
//!
//! The Rust backend is the default. The ImageMagick backend reproduces the
//! exact output of long-running installations that already depend on it.

use super::params::{AverageParams, ThumbnailParams};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("External tool not found: {0}")]
    ToolMissing(String),
}

/// Trait for image processing backends.
///
/// The rest of the codebase is backend-agnostic; the pipeline receives a
/// `&dyn ImageBackend` and tests substitute a recording mock.
pub trait ImageBackend {
    /// Write a reduced-size copy of `params.source` to `params.output`.
    fn thumbnail(&self, params: &ThumbnailParams) -> Result<(), BackendError>;

    /// Write the pixel-wise mean of `params.sources` to `params.output`.
    fn average(&self, params: &AverageParams) -> Result<(), BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::Quality;
    use std::sync::Mutex;

    /// Mock backend that records operations without executing them.
    #[derive(Default)]
    pub struct MockBackend {
        pub operations: Mutex<Vec<RecordedOp>>,
        /// When set, every operation fails after being recorded.
        pub fail_with: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Thumbnail {
            source: String,
            output: String,
            max_width: u32,
            max_height: u32,
            quality: u32,
        },
        Average {
            sources: Vec<String>,
            output: String,
            quality: u32,
        },
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing(message: &str) -> Self {
            Self {
                operations: Mutex::new(Vec::new()),
                fail_with: Some(message.to_string()),
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        fn outcome(&self) -> Result<(), BackendError> {
            match &self.fail_with {
                Some(msg) => Err(BackendError::ProcessingFailed(msg.clone())),
                None => Ok(()),
            }
        }
    }

    impl ImageBackend for MockBackend {
        fn thumbnail(&self, params: &ThumbnailParams) -> Result<(), BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Thumbnail {
                source: params.source.to_string_lossy().to_string(),
                output: params.output.to_string_lossy().to_string(),
                max_width: params.max_width,
                max_height: params.max_height,
                quality: params.quality.value(),
            });
            self.outcome()
        }

        fn average(&self, params: &AverageParams) -> Result<(), BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Average {
                sources: params
                    .sources
                    .iter()
                    .map(|p| p.to_string_lossy().to_string())
                    .collect(),
                output: params.output.to_string_lossy().to_string(),
                quality: params.quality.value(),
            });
            self.outcome()
        }
    }

    #[test]
    fn mock_records_thumbnail() {
        let backend = MockBackend::new();

        backend
            .thumbnail(&ThumbnailParams {
                source: "/data/WA1X.2410181430.aaaaaaaaaa.jpg".into(),
                output: "/data/thumbs/WA1X.2410181430.aaaaaaaaaa.jpg".into(),
                max_width: 250,
                max_height: 150,
                decode_width: 500,
                decode_height: 150,
                quality: Quality::new(85),
            })
            .unwrap();

        let ops = backend.get_operations();
        assert_eq!(ops.len(), 1);
        assert!(matches!(
            &ops[0],
            RecordedOp::Thumbnail {
                max_width: 250,
                max_height: 150,
                quality: 85,
                ..
            }
        ));
    }

    #[test]
    fn mock_records_average() {
        let backend = MockBackend::new();

        backend
            .average(&AverageParams {
                sources: vec!["/a.jpg".into(), "/b.jpg".into()],
                output: "/mean.jpg".into(),
                quality: Quality::default(),
            })
            .unwrap();

        let ops = backend.get_operations();
        assert!(matches!(
            &ops[0],
            RecordedOp::Average { sources, quality: 90, .. } if sources.len() == 2
        ));
    }

    #[test]
    fn failing_mock_still_records() {
        let backend = MockBackend::failing("boom");
        let result = backend.average(&AverageParams {
            sources: vec!["/a.jpg".into()],
            output: "/mean.jpg".into(),
            quality: Quality::default(),
        });
        assert!(matches!(result, Err(BackendError::ProcessingFailed(m)) if m == "boom"));
        assert_eq!(backend.get_operations().len(), 1);
    }
}
