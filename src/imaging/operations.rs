//! High-level image operations.
//!
//! These functions decide which files to create and where, then hand
//! parameters to the backend. They take configuration, compute parameters,
//! and call the backend.

use super::backend::{BackendError, ImageBackend};
use super::params::{AverageParams, Quality, ThumbnailParams};
use crate::bucket::TimeBucket;
use crate::config::ThumbnailsConfig;
use crate::index::list_artifacts;
use crate::naming::ArtifactName;
use std::path::{Path, PathBuf};

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Plan a thumbnail operation without executing it.
pub fn plan_thumbnail(source: &Path, output: &Path, config: &ThumbnailsConfig) -> ThumbnailParams {
    ThumbnailParams {
        source: source.to_path_buf(),
        output: output.to_path_buf(),
        max_width: config.max_width,
        max_height: config.max_height,
        decode_width: config.decode_width,
        decode_height: config.decode_height,
        quality: Quality::new(config.quality),
    }
}

/// Create a thumbnail of one artifact in `thumbs_dir`.
///
/// The thumbnail keeps the artifact's filename so it decodes to the same
/// tuple and ages out on the same schedule. Returns the thumbnail path.
pub fn create_thumbnail(
    backend: &dyn ImageBackend,
    artifact: &Path,
    thumbs_dir: &Path,
    config: &ThumbnailsConfig,
) -> Result<PathBuf> {
    let file_name = artifact.file_name().ok_or_else(|| {
        BackendError::ProcessingFailed(format!("Not a file path: {}", artifact.display()))
    })?;
    let output = thumbs_dir.join(file_name);
    backend.thumbnail(&plan_thumbnail(artifact, &output, config))?;
    Ok(output)
}

/// Captures of exactly `source_id` in `data_dir`, failures and composites
/// excluded, in filename order.
pub fn average_inputs(data_dir: &Path, source_id: &str) -> Result<Vec<PathBuf>> {
    Ok(list_artifacts(data_dir)?
        .into_iter()
        .filter(|e| e.name.source_id == source_id && !e.name.is_failure())
        .filter(|e| e.name.hash != crate::naming::MEAN_TAG)
        .map(|e| e.path)
        .collect())
}

/// Create the averaged composite for one source at `bucket`.
///
/// Returns `Ok(None)` when the source has no captures to average.
pub fn create_average(
    backend: &dyn ImageBackend,
    data_dir: &Path,
    averages_dir: &Path,
    source_id: &str,
    bucket: TimeBucket,
    quality: Quality,
) -> Result<Option<PathBuf>> {
    let sources = average_inputs(data_dir, source_id)?;
    if sources.is_empty() {
        return Ok(None);
    }
    let output = averages_dir.join(ArtifactName::mean(source_id, bucket).encode());
    backend.average(&AverageParams {
        sources,
        output: output.clone(),
        quality,
    })?;
    Ok(Some(output))
}
