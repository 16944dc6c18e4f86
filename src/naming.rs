//! Canonical artifact filenames.
//!
//! Every file the pipeline produces is named by the tuple it represents:
//!
//! ```text
//! WA1X.2410181430.3f9a0c12be.jpg
//! ^^^^ ^^^^^^^^^^ ^^^^^^^^^^ ^^^
//! id   bucket     hash       extension
//! ```
//!
//! The name *is* the record. Scanners recover the tuple by splitting on `.`;
//! anything that does not split into exactly four fields, or whose bucket is
//! not a valid ten-digit stamp, is simply not an artifact. Decoding never
//! fails loudly, so stray files in the data directory are ignored rather
//! than breaking a scan.
//!
//! ## Reserved fields
//!
//! - Failed fetches: hash and extension are both `fail` (`WA1X.2410181430.fail.fail`).
//! - Averages: hash is `mean` (`WA1X.2410181430.mean.jpg`).

use crate::bucket::TimeBucket;

/// Field separator in artifact names.
pub const DELIMITER: char = '.';

/// Number of hex characters of the content hash kept in the name.
pub const HASH_PREFIX_LEN: usize = 10;

/// Hash and extension of a sentinel written for a failed fetch.
pub const FAIL_TAG: &str = "fail";

/// Hash field of an averaged composite.
pub const MEAN_TAG: &str = "mean";

/// Extension used when a URL does not end in a known image extension.
pub const DEFAULT_EXTENSION: &str = "jpg";

/// Extensions a capture may carry. Anything else a URL ends in (`.php`,
/// `.cgi`) is written as [`DEFAULT_EXTENSION`].
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// The four fields encoded in an artifact filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactName {
    pub source_id: String,
    pub bucket: TimeBucket,
    pub hash: String,
    pub extension: String,
}

impl ArtifactName {
    pub fn new(
        source_id: impl Into<String>,
        bucket: TimeBucket,
        hash: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            bucket,
            hash: hash.into(),
            extension: extension.into(),
        }
    }

    /// Sentinel name recorded when a fetch for `source_id` fails.
    pub fn failure(source_id: impl Into<String>, bucket: TimeBucket) -> Self {
        Self::new(source_id, bucket, FAIL_TAG, FAIL_TAG)
    }

    /// Name of the averaged composite for `source_id`.
    pub fn mean(source_id: impl Into<String>, bucket: TimeBucket) -> Self {
        Self::new(source_id, bucket, MEAN_TAG, "jpg")
    }

    pub fn is_failure(&self) -> bool {
        self.extension == FAIL_TAG
    }

    pub fn encode(&self) -> String {
        encode(&self.source_id, &self.bucket, &self.hash, &self.extension)
    }
}

/// Join the four fields with [`DELIMITER`].
///
/// Callers are responsible for keeping the delimiter out of `source_id` and
/// `extension` (the registry loader and [`extension_for_url`] do this).
pub fn encode(source_id: &str, bucket: &TimeBucket, hash: &str, extension: &str) -> String {
    format!("{source_id}{DELIMITER}{bucket}{DELIMITER}{hash}{DELIMITER}{extension}")
}

/// Recover the fields of an artifact filename.
///
/// - `"WA1X.2410181430.3f9a0c12be.jpg"` → `Some(..)`
/// - `"status.txt"` → `None` (2 fields)
/// - `"WA1X.2410181430.3f9a0c12be.thumb.jpg"` → `None` (5 fields)
/// - `"WA1X.24101814.3f9a0c12be.jpg"` → `None` (short stamp)
pub fn decode(name: &str) -> Option<ArtifactName> {
    let fields: Vec<&str> = name.split(DELIMITER).collect();
    let [source_id, stamp, hash, extension] = fields.as_slice() else {
        return None;
    };
    if source_id.is_empty() || hash.is_empty() || extension.is_empty() {
        return None;
    }
    let bucket = TimeBucket::parse(stamp)?;
    Some(ArtifactName::new(*source_id, bucket, *hash, *extension))
}

/// First [`HASH_PREFIX_LEN`] characters of a hex digest.
pub fn hash_prefix(digest: &str) -> &str {
    let end = digest
        .char_indices()
        .nth(HASH_PREFIX_LEN)
        .map(|(i, _)| i)
        .unwrap_or(digest.len());
    &digest[..end]
}

/// Derive a safe artifact extension from a fetch URL.
///
/// Looks at the last path segment only (query strings and fragments are
/// ignored), lowercases it, and falls back to [`DEFAULT_EXTENSION`] unless
/// the extension is one of [`IMAGE_EXTENSIONS`].
///
/// - `"http://host/cam.JPG"` → `"jpg"`
/// - `"http://host/grab.png?t=123"` → `"png"`
/// - `"http://host/latest"` → `"jpg"`
/// - `"http://host/cgi-bin/grab.php"` → `"jpg"`
pub fn extension_for_url(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let after_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);
    // Host-only URLs have no path segment to inspect
    let Some((_, path)) = after_scheme.split_once('/') else {
        return DEFAULT_EXTENSION.to_string();
    };
    let segment = path.rsplit('/').next().unwrap_or("");
    let ext = match segment.rsplit_once(DELIMITER) {
        Some((stem, ext)) if !stem.is_empty() => ext.to_ascii_lowercase(),
        _ => return DEFAULT_EXTENSION.to_string(),
    };
    if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        ext
    } else {
        DEFAULT_EXTENSION.to_string()
    }
}
