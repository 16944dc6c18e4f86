//! ImageMagick backend: shells out to `convert`.
//!
//! | Operation | Command |
//! |---|---|
//! | Thumbnail | `convert -define jpeg:size=500x150 IN -auto-orient -thumbnail 250x150 -quality 85 OUT` |
//! | Average | `convert IN... -evaluate-sequence Mean -quality 90 OUT` |
//!
//! A missing binary surfaces as [`BackendError::ToolMissing`]; a non-zero
//! exit as [`BackendError::ProcessingFailed`] carrying the tool's stderr.

use super::backend::{BackendError, ImageBackend};
use super::params::{AverageParams, ThumbnailParams};
use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::Command;

pub struct MagickBackend {
    binary: PathBuf,
}

impl MagickBackend {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Argument list for a thumbnail, without the binary.
    pub fn thumbnail_args(params: &ThumbnailParams) -> Vec<OsString> {
        vec![
            "-define".into(),
            format!("jpeg:size={}x{}", params.decode_width, params.decode_height).into(),
            params.source.clone().into(),
            "-auto-orient".into(),
            "-thumbnail".into(),
            format!("{}x{}", params.max_width, params.max_height).into(),
            "-quality".into(),
            params.quality.value().to_string().into(),
            params.output.clone().into(),
        ]
    }

    /// Argument list for an average, without the binary.
    pub fn average_args(params: &AverageParams) -> Vec<OsString> {
        let mut args: Vec<OsString> = params.sources.iter().map(|p| p.clone().into()).collect();
        args.extend([
            "-evaluate-sequence".into(),
            "Mean".into(),
            "-quality".into(),
            params.quality.value().to_string().into(),
            params.output.clone().into(),
        ]);
        args
    }

    fn run(&self, args: Vec<OsString>) -> Result<(), BackendError> {
        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    BackendError::ToolMissing(self.binary.display().to_string())
                }
                _ => BackendError::Io(e),
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(BackendError::ProcessingFailed(format!(
                "{} exited with {}: {}",
                self.binary.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

impl ImageBackend for MagickBackend {
    fn thumbnail(&self, params: &ThumbnailParams) -> Result<(), BackendError> {
        self.run(Self::thumbnail_args(params))
    }

    fn average(&self, params: &AverageParams) -> Result<(), BackendError> {
        if params.sources.is_empty() {
            return Err(BackendError::ProcessingFailed(
                "Average needs at least one input".into(),
            ));
        }
        self.run(Self::average_args(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::Quality;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn thumbnail_command_line() {
        let params = ThumbnailParams {
            source: "data/WA1X.2410181430.aaaaaaaaaa.jpg".into(),
            output: "data/thumbs/WA1X.2410181430.aaaaaaaaaa.jpg".into(),
            max_width: 250,
            max_height: 150,
            decode_width: 500,
            decode_height: 150,
            quality: Quality::new(85),
        };
        assert_eq!(
            strings(MagickBackend::thumbnail_args(&params)),
            vec![
                "-define",
                "jpeg:size=500x150",
                "data/WA1X.2410181430.aaaaaaaaaa.jpg",
                "-auto-orient",
                "-thumbnail",
                "250x150",
                "-quality",
                "85",
                "data/thumbs/WA1X.2410181430.aaaaaaaaaa.jpg",
            ]
        );
    }

    #[test]
    fn average_command_line() {
        let params = AverageParams {
            sources: vec!["a.jpg".into(), "b.png".into()],
            output: "averages/WA1X.2410181430.mean.jpg".into(),
            quality: Quality::default(),
        };
        assert_eq!(
            strings(MagickBackend::average_args(&params)),
            vec![
                "a.jpg",
                "b.png",
                "-evaluate-sequence",
                "Mean",
                "-quality",
                "90",
                "averages/WA1X.2410181430.mean.jpg",
            ]
        );
    }

    #[test]
    fn missing_binary_is_tool_missing() {
        let backend = MagickBackend::new("/nonexistent/bin/convert-qrss-test");
        let result = backend.average(&AverageParams {
            sources: vec!["a.jpg".into()],
            output: "mean.jpg".into(),
            quality: Quality::default(),
        });
        assert!(matches!(result, Err(BackendError::ToolMissing(_))));
    }

    #[test]
    fn average_without_inputs_errors() {
        let backend = MagickBackend::new("convert");
        let result = backend.average(&AverageParams {
            sources: vec![],
            output: "mean.jpg".into(),
            quality: Quality::default(),
        });
        assert!(matches!(result, Err(BackendError::ProcessingFailed(_))));
    }
}
