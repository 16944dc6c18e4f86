//! Grabber registry loading and refresh.
//!
//! The registry is a small CSV file, one grabber per row:
//!
//! ```text
//! ID, call, title, name, loc, site, url
//! WA1X,WA1X,WA1X 30m,Bob,FN42,http://wa1x.example,http://wa1x.example/grab.jpg
//! # commented rows are skipped
//! ```
//!
//! Only `ID` and `url` drive the pipeline; the rest is display metadata.
//! Fields are trimmed of whitespace. A double-quoted field may contain
//! commas, and `""` inside quotes is a literal quote.
//!
//! ## Skipped rows
//!
//! - Blank lines, the header row, and rows whose first field starts with `#`
//! - Rows with fewer than 5 fields
//! - Rows without a url (5 or 6 fields)
//! - Rows whose ID is empty or contains the artifact delimiter (`.`)
//!
//! The first two are silent; the others log a warning since they usually
//! indicate an editing mistake.

use crate::fetch::{FetchError, Fetcher};
use crate::naming::DELIMITER;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

const MIN_FIELDS: usize = 5;
const URL_FIELD: usize = 6;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Registry not found: {0}")]
    Missing(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Registry download failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Downloaded registry contains no usable sources")]
    Empty,
}

/// One grabber from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    /// Unique ID, used as the artifact filename prefix.
    pub id: String,
    pub call: String,
    pub title: String,
    pub name: String,
    pub loc: String,
    pub site: String,
    /// Image fetched on every run.
    pub url: String,
}

impl SourceDescriptor {
    /// Descriptor with only the load-bearing fields set.
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            call: String::new(),
            title: String::new(),
            name: String::new(),
            loc: String::new(),
            site: String::new(),
            url: url.into(),
        }
    }
}

/// Split one CSV line into trimmed fields, honoring double quotes.
///
/// An unterminated quote runs to the end of the line.
fn split_fields(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => fields.push(std::mem::take(&mut field).trim().to_string()),
            _ => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

fn is_header(fields: &[String]) -> bool {
    fields[0].eq_ignore_ascii_case("id")
        && fields
            .get(URL_FIELD)
            .is_some_and(|f| f.eq_ignore_ascii_case("url"))
}

/// Parse one registry row. `None` means the row is skipped.
fn parse_row(line: &str) -> Option<SourceDescriptor> {
    if line.trim().is_empty() {
        return None;
    }
    let fields = split_fields(line);
    if fields.len() < MIN_FIELDS || fields[0].starts_with('#') {
        return None;
    }
    if is_header(&fields) {
        return None;
    }
    let id = &fields[0];
    if id.is_empty() || id.contains(DELIMITER) {
        warn!(id = %id, "skipping registry row: ID must be non-empty and contain no '{DELIMITER}'");
        return None;
    }
    let Some(url) = fields.get(URL_FIELD).filter(|u| !u.is_empty()) else {
        warn!(id = %id, "skipping registry row without a url");
        return None;
    };
    Some(SourceDescriptor {
        id: id.clone(),
        call: fields[1].clone(),
        title: fields[2].clone(),
        name: fields[3].clone(),
        loc: fields[4].clone(),
        site: fields.get(5).cloned().unwrap_or_default(),
        url: url.clone(),
    })
}

/// Parse registry text into sources, preserving row order.
pub fn parse_registry(content: &str) -> Vec<SourceDescriptor> {
    content.lines().filter_map(parse_row).collect()
}

/// Load the registry file.
///
/// A missing file is [`RegistryError::Missing`]: the run cannot proceed
/// without knowing what to fetch.
pub fn load_registry(path: &Path) -> Result<Vec<SourceDescriptor>, RegistryError> {
    if !path.is_file() {
        return Err(RegistryError::Missing(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    Ok(parse_registry(&content))
}

/// Trim every line, drop blank lines, and join with `\n`.
///
/// Normalizes CRLF files and stray indentation from hand edits.
pub fn normalize_registry(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace the local registry with a fresh download.
///
/// The download is normalized and must contain at least one usable source;
/// otherwise the local file is left untouched. The write goes through a temp
/// file in the same directory and an atomic rename, so a crash never leaves
/// a half-written registry. Returns the number of sources in the new file.
pub fn refresh_registry(
    fetcher: &dyn Fetcher,
    url: &str,
    path: &Path,
) -> Result<usize, RegistryError> {
    let bytes = fetcher.fetch(url)?;
    let normalized = normalize_registry(&String::from_utf8_lossy(&bytes));
    let count = parse_registry(&normalized).len();
    if count == 0 {
        return Err(RegistryError::Empty);
    }

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut staged = tempfile::Builder::new()
        .prefix(".registry-")
        .tempfile_in(dir)?;
    staged.write_all(normalized.as_bytes())?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(count)
}
