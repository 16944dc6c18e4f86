//! Retention sweep: delete artifacts older than a threshold.
//!
//! Age comes from the bucket encoded in the filename, not file mtime, so a
//! restored backup or a clock-skewed copy ages the same as the original.
//! Only files that decode as artifacts and carry a swept extension are
//! candidates; everything else in the directory is left alone.

use crate::bucket::TimeBucket;
use crate::index::list_artifacts;
use crate::naming::{FAIL_TAG, IMAGE_EXTENSIONS};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};


/// What one sweep of one directory did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub dir: PathBuf,
    /// Candidates examined (decodable, swept extension).
    pub examined: usize,
    pub deleted: Vec<PathBuf>,
    /// Paths whose deletion failed, with the error text.
    pub failed: Vec<(PathBuf, String)>,
}

impl SweepReport {
    pub fn retained(&self) -> usize {
        self.examined - self.deleted.len() - self.failed.len()
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} deleted, {} kept",
            self.dir.display(),
            self.deleted.len(),
            self.retained()
        )?;
        if !self.failed.is_empty() {
            write!(f, ", {} failed", self.failed.len())?;
        }
        Ok(())
    }
}

/// Every extension the pipeline writes: captures, thumbnails, averages and
/// failure sentinels.
fn is_swept_extension(ext: &str) -> bool {
    ext.eq_ignore_ascii_case(FAIL_TAG)
        || IMAGE_EXTENSIONS
            .iter()
            .any(|s| s.eq_ignore_ascii_case(ext))
}

/// Delete artifacts in `dir` older than `max_age_minutes` as of `now`.
///
/// Strictly older: an artifact exactly at the threshold is kept. Only
/// listing the directory can fail; a missing directory is an empty report.
pub fn sweep(dir: &Path, max_age_minutes: u32, now: &TimeBucket) -> io::Result<SweepReport> {
    let mut report = SweepReport {
        dir: dir.to_path_buf(),
        ..SweepReport::default()
    };

    for entry in list_artifacts(dir)? {
        if !is_swept_extension(&entry.name.extension) {
            continue;
        }
        report.examined += 1;
        let age = now.minutes_since(&entry.name.bucket);
        if age <= i64::from(max_age_minutes) {
            continue;
        }
        match std::fs::remove_file(&entry.path) {
            Ok(()) => {
                debug!(path = %entry.path.display(), age, "expired");
                report.deleted.push(entry.path);
            }
            Err(e) => {
                warn!(path = %entry.path.display(), error = %e, "could not delete expired artifact");
                report.failed.push((entry.path, e.to_string()));
            }
        }
    }

    Ok(report)
}
