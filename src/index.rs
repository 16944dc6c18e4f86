//! Index of artifacts currently on disk.
//!
//! There is no persisted manifest: at the start of every run the data
//! directory is listed and each filename decoded via [`naming::decode`].
//! The resulting [`SeenSet`] answers two questions for the rest of the run:
//!
//! 1. Has this exact content already been captured for this source inside
//!    the retention window? (hash prefixes per source)
//! 2. When did the pipeline last produce anything? (latest bucket overall)
//!
//! Failure sentinels count for (2), since they prove a run happened, but
//! never for (1). Undecodable names count for neither.

use crate::bucket::TimeBucket;
use crate::naming::{self, ArtifactName};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// SHA-256 of a payload as lowercase hex.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// SHA-256 prefix of a payload, as used in artifact names.
pub fn content_hash_prefix(bytes: &[u8]) -> String {
    naming::hash_prefix(&hash_bytes(bytes)).to_string()
}

/// A decodable artifact found in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactEntry {
    pub path: PathBuf,
    pub name: ArtifactName,
}

/// List regular files directly inside `dir` whose names decode as artifacts.
///
/// Subdirectories are not descended into. Undecodable names are skipped.
/// Results are sorted by filename so scans are deterministic. A missing
/// directory lists as empty.
pub fn list_artifacts(dir: &Path) -> io::Result<Vec<ArtifactEntry>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(io::Error::other)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };
        if let Some(name) = naming::decode(file_name) {
            entries.push(ArtifactEntry {
                path: entry.into_path(),
                name,
            });
        }
    }
    Ok(entries)
}

/// Per-source buckets and hashes observed in the data directory.
#[derive(Debug, Clone, Default)]
pub struct SeenSet {
    buckets: BTreeMap<String, Vec<TimeBucket>>,
    hashes: BTreeMap<String, BTreeSet<String>>,
}

impl SeenSet {
    /// Build the set by scanning `data_dir`.
    pub fn scan(data_dir: &Path) -> io::Result<Self> {
        let mut seen = Self::default();
        for entry in list_artifacts(data_dir)? {
            seen.record(&entry.name);
        }
        Ok(seen)
    }

    /// Add one artifact to the set.
    pub fn record(&mut self, name: &ArtifactName) {
        self.buckets
            .entry(name.source_id.clone())
            .or_default()
            .push(name.bucket);
        if !name.is_failure() {
            self.hashes
                .entry(name.source_id.clone())
                .or_default()
                .insert(name.hash.clone());
        }
    }

    /// Whether `hash` was already captured for `source_id`.
    pub fn contains_hash(&self, source_id: &str, hash: &str) -> bool {
        self.hashes
            .get(source_id)
            .is_some_and(|set| set.contains(hash))
    }

    /// Most recent bucket across all sources.
    pub fn latest_bucket(&self) -> Option<TimeBucket> {
        self.buckets.values().flatten().max().copied()
    }

    /// Number of artifacts indexed.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Minutes since the latest artifact, measured from `now`.
    ///
    /// `None` when nothing has been captured yet.
    pub fn minutes_since_last_run(&self, now: &TimeBucket) -> Option<i64> {
        self.latest_bucket().map(|latest| now.minutes_since(&latest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"x").unwrap();
    }

    #[test]
    fn hash_bytes_is_sha256_hex() {
        let h = hash_bytes(b"hello world");
        assert_eq!(h.len(), 64);
        assert_eq!(
            h,
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn content_hash_prefix_is_ten_chars() {
        assert_eq!(content_hash_prefix(b"hello world"), "b94d27b993");
    }

    #[test]
    fn list_artifacts_skips_undecodable_and_dirs() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "WA1X.2410181430.aaaaaaaaaa.jpg");
        touch(tmp.path(), "status.txt");
        touch(tmp.path(), "notes.about.this.folder.txt");
        fs::create_dir(tmp.path().join("thumbs")).unwrap();
        touch(&tmp.path().join("thumbs"), "WA1X.2410181430.aaaaaaaaaa.jpg");

        let entries = list_artifacts(tmp.path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name.source_id, "WA1X");
    }

    #[test]
    fn list_artifacts_missing_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let entries = list_artifacts(&tmp.path().join("nope")).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn scan_groups_by_source() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "WA1X.2410181410.aaaaaaaaaa.jpg");
        touch(tmp.path(), "WA1X.2410181420.bbbbbbbbbb.jpg");
        touch(tmp.path(), "K4RCG.2410181420.cccccccccc.png");

        let seen = SeenSet::scan(tmp.path()).unwrap();
        assert_eq!(seen.len(), 3);
        assert!(seen.contains_hash("WA1X", "aaaaaaaaaa"));
        assert!(seen.contains_hash("WA1X", "bbbbbbbbbb"));
        assert!(!seen.contains_hash("WA1X", "cccccccccc"));
        assert!(seen.contains_hash("K4RCG", "cccccccccc"));
        assert!(!seen.contains_hash("NOBODY", "aaaaaaaaaa"));
    }

    #[test]
    fn failures_count_for_buckets_not_hashes() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "WA1X.2410181410.aaaaaaaaaa.jpg");
        touch(tmp.path(), "WA1X.2410181420.fail.fail");

        let seen = SeenSet::scan(tmp.path()).unwrap();
        assert!(!seen.contains_hash("WA1X", "fail"));
        assert_eq!(
            seen.latest_bucket(),
            TimeBucket::parse("2410181420")
        );
    }

    #[test]
    fn unparseable_names_never_count() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "WA1X.latest.aaaaaaaaaa.jpg");
        touch(tmp.path(), "WA1X.aaaaaaaaaa.jpg");

        let seen = SeenSet::scan(tmp.path()).unwrap();
        assert!(seen.is_empty());
        assert!(!seen.contains_hash("WA1X", "aaaaaaaaaa"));
        assert_eq!(seen.latest_bucket(), None);
    }

    #[test]
    fn minutes_since_last_run_uses_calendar_time() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "WA1X.2410182350.aaaaaaaaaa.jpg");
        let seen = SeenSet::scan(tmp.path()).unwrap();

        let now = TimeBucket::parse("2410190010").unwrap();
        assert_eq!(seen.minutes_since_last_run(&now), Some(20));
    }

    #[test]
    fn minutes_since_last_run_empty_is_none() {
        let seen = SeenSet::default();
        let now = TimeBucket::parse("2410190010").unwrap();
        assert_eq!(seen.minutes_since_last_run(&now), None);
    }

    #[test]
    fn record_adds_to_set() {
        let mut seen = SeenSet::default();
        let bucket = TimeBucket::parse("2410181430").unwrap();
        seen.record(&ArtifactName::new("WA1X", bucket, "0123456789", "jpg"));
        assert!(seen.contains_hash("WA1X", "0123456789"));
        assert_eq!(seen.latest_bucket(), Some(bucket));
    }
}
