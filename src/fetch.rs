//! Fetching grabber images.
//!
//! Two layers:
//!
//! - [`Fetcher`]: the network capability: one URL in, bytes out. The
//!   production [`HttpFetcher`] wraps a blocking `reqwest` client with a
//!   short timeout and a browser/tool user agent. Tests substitute fakes.
//! - [`grab`]: one source's complete capture: fetch, hash, stage, rename
//!   into place, classify against the [`SeenSet`].
//!
//! ## Outcomes
//!
//! | Outcome | On disk | Next step |
//! |---|---|---|
//! | [`GrabOutcome::New`] | `ID.bucket.hash.ext` | thumbnail |
//! | [`GrabOutcome::Duplicate`] | `ID.bucket.hash.ext` (kept) | none |
//! | [`GrabOutcome::Failed`] | `ID.bucket.fail.fail` sentinel | none |
//!
//! Duplicates are still stored: the averaged composite is computed over
//! every capture in the retention window, identical or not.
//!
//! There is exactly one attempt per source per run. The next scheduled run
//! is the retry.

use crate::bucket::TimeBucket;
use crate::config::FetchConfig;
use crate::index::{SeenSet, content_hash_prefix};
use crate::naming::{self, ArtifactName};
use crate::registry::SourceDescriptor;
use reqwest::blocking::Client;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("HTTP status {0}")]
    Status(u16),
    #[error("empty response")]
    Empty,
    #[error("response larger than {0} bytes")]
    TooLarge(u64),
}

/// Network capability: retrieve the resource at a URL.
pub trait Fetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Blocking HTTP(S) fetcher. One attempt, bounded time, bounded size.
pub struct HttpFetcher {
    client: Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            max_bytes: config.max_bytes,
        })
    }
}

fn classify_reqwest(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Transport(err.to_string())
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().map_err(classify_reqwest)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        if let Some(len) = response.content_length()
            && len > self.max_bytes
        {
            return Err(FetchError::TooLarge(self.max_bytes));
        }

        let mut body = Vec::new();
        response
            .take(self.max_bytes + 1)
            .read_to_end(&mut body)
            .map_err(|e| match e.kind() {
                io::ErrorKind::TimedOut => FetchError::Timeout,
                _ => FetchError::Transport(e.to_string()),
            })?;
        if body.len() as u64 > self.max_bytes {
            return Err(FetchError::TooLarge(self.max_bytes));
        }
        if body.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(body)
    }
}

/// Classification of one grab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrabOutcome {
    New,
    Duplicate,
    Failed(String),
}

impl GrabOutcome {
    /// Short tag used in stats lines.
    pub fn tag(&self) -> &'static str {
        match self {
            GrabOutcome::New => "new",
            GrabOutcome::Duplicate => "dup",
            GrabOutcome::Failed(_) => "fail",
        }
    }
}

/// Everything one grab produced.
#[derive(Debug, Clone)]
pub struct GrabResult {
    pub source_id: String,
    pub outcome: GrabOutcome,
    /// Artifact written on success, or the sentinel on failure (if it could
    /// be written).
    pub artifact: Option<PathBuf>,
    /// Decoded name of `artifact`.
    pub name: Option<ArtifactName>,
}

#[derive(Error, Debug)]
enum StoreError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("storing download failed: {0}")]
    Io(#[from] io::Error),
}

fn staging_path(data_dir: &Path, source_id: &str) -> PathBuf {
    data_dir.join(format!(".staging.{source_id}"))
}

/// Fetch, hash, stage and rename into place.
fn fetch_and_store(
    fetcher: &dyn Fetcher,
    source: &SourceDescriptor,
    data_dir: &Path,
    bucket: TimeBucket,
) -> Result<(PathBuf, ArtifactName), StoreError> {
    let bytes = fetcher.fetch(&source.url)?;
    let hash = content_hash_prefix(&bytes);
    let name = ArtifactName::new(
        source.id.as_str(),
        bucket,
        hash,
        naming::extension_for_url(&source.url),
    );

    let staged = staging_path(data_dir, &source.id);
    let target = data_dir.join(name.encode());
    fs::write(&staged, &bytes)?;
    if let Err(e) = fs::rename(&staged, &target) {
        let _ = fs::remove_file(&staged);
        return Err(e.into());
    }
    Ok((target, name))
}

/// Capture one source into `data_dir` and classify it against `seen`.
///
/// Never returns an error: failures become [`GrabOutcome::Failed`] plus a
/// sentinel artifact so they show up in listings and age out with the rest.
pub fn grab(
    fetcher: &dyn Fetcher,
    source: &SourceDescriptor,
    data_dir: &Path,
    bucket: TimeBucket,
    seen: &SeenSet,
) -> GrabResult {
    debug!(source = %source.id, url = %source.url, "grabbing");
    match fetch_and_store(fetcher, source, data_dir, bucket) {
        Ok((path, name)) => {
            let outcome = if seen.contains_hash(&source.id, &name.hash) {
                GrabOutcome::Duplicate
            } else {
                GrabOutcome::New
            };
            GrabResult {
                source_id: source.id.clone(),
                outcome,
                artifact: Some(path),
                name: Some(name),
            }
        }
        Err(err) => {
            let reason = err.to_string();
            let name = ArtifactName::failure(source.id.as_str(), bucket);
            let path = data_dir.join(name.encode());
            let written = match fs::write(&path, b"") {
                Ok(()) => Some(path),
                Err(e) => {
                    debug!(source = %source.id, error = %e, "could not write failure sentinel");
                    None
                }
            };
            GrabResult {
                source_id: source.id.clone(),
                outcome: GrabOutcome::Failed(reason),
                name: written.as_ref().map(|_| name),
                artifact: written,
            }
        }
    }
}
