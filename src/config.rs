//! Pipeline configuration.
//!
//! Handles loading and validating `qrss-plus.toml`. Every key has a stock
//! default, so the file is optional and sparse: override just the values you
//! need.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [paths]
//! data_dir = "data"               # Primary artifacts; thumbs/ and averages/ live inside
//! registry = "grabbers.csv"       # Source registry (must exist)
//! stats_dir = "stats"             # Day-bucketed run summaries
//! status_file = "data/status.txt" # Latest run log
//!
//! [fetch]
//! timeout_secs = 3
//! user_agent = "Wget/1.12 (linux-gnu)"
//! max_bytes = 10485760
//!
//! [registry]
//! # refresh_url = "https://raw.githubusercontent.com/swharden/QRSSplus/master/grabbers.csv"
//!
//! [retention]
//! data_minutes = 120
//! thumbs_minutes = 120
//! averages_minutes = 120
//!
//! [thumbnails]
//! max_width = 250
//! max_height = 150
//! decode_width = 500
//! decode_height = 150
//! quality = 85
//!
//! [averages]
//! enabled = true
//! quality = 90
//!
//! [imaging]
//! backend = "rust"                # or "imagemagick"
//! convert_binary = "convert"
//!
//! [lock]
//! stale_minutes = 60
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "qrss-plus.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Filesystem layout.
    pub paths: PathsConfig,
    /// HTTP fetch settings shared by grabs and registry refresh.
    pub fetch: FetchConfig,
    /// Remote registry refresh.
    pub registry: RegistryConfig,
    /// Age thresholds per artifact directory.
    pub retention: RetentionConfig,
    /// Thumbnail bounds.
    pub thumbnails: ThumbnailsConfig,
    /// Averaged composite settings.
    pub averages: AveragesConfig,
    /// Which image backend performs transforms.
    pub imaging: ImagingConfig,
    /// Run lock behavior.
    pub lock: LockConfig,
}

impl PipelineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "fetch.timeout_secs must be non-zero".into(),
            ));
        }
        if self.fetch.max_bytes == 0 {
            return Err(ConfigError::Validation(
                "fetch.max_bytes must be non-zero".into(),
            ));
        }
        if self.fetch.user_agent.trim().is_empty() {
            return Err(ConfigError::Validation(
                "fetch.user_agent must not be empty".into(),
            ));
        }
        if let Some(url) = &self.registry.refresh_url
            && !(url.starts_with("http://") || url.starts_with("https://"))
        {
            return Err(ConfigError::Validation(
                "registry.refresh_url must be an http(s) URL".into(),
            ));
        }
        let r = &self.retention;
        if r.data_minutes == 0 || r.thumbs_minutes == 0 || r.averages_minutes == 0 {
            return Err(ConfigError::Validation(
                "retention thresholds must be non-zero".into(),
            ));
        }
        let t = &self.thumbnails;
        if t.max_width == 0 || t.max_height == 0 {
            return Err(ConfigError::Validation(
                "thumbnails.max_width and max_height must be non-zero".into(),
            ));
        }
        if !(1..=100).contains(&t.quality) || !(1..=100).contains(&self.averages.quality) {
            return Err(ConfigError::Validation(
                "thumbnails.quality and averages.quality must be 1-100".into(),
            ));
        }
        if self.imaging.convert_binary.trim().is_empty() {
            return Err(ConfigError::Validation(
                "imaging.convert_binary must not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Directory holding thumbnails of primary artifacts.
    pub fn thumbs_dir(&self) -> PathBuf {
        self.paths.data_dir.join("thumbs")
    }

    /// Directory holding averaged composites.
    pub fn averages_dir(&self) -> PathBuf {
        self.paths.data_dir.join("averages")
    }
}

/// Filesystem layout. Relative paths resolve against the working directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub data_dir: PathBuf,
    pub registry: PathBuf,
    pub stats_dir: PathBuf,
    pub status_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            registry: PathBuf::from("grabbers.csv"),
            stats_dir: PathBuf::from("stats"),
            status_file: PathBuf::from("data/status.txt"),
        }
    }
}

/// HTTP fetch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Whole-request timeout. One attempt only; the next run is the retry.
    pub timeout_secs: u64,
    /// Some grabber hosts block unfamiliar clients.
    pub user_agent: String,
    /// Responses larger than this are treated as failures.
    pub max_bytes: u64,
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 3,
            user_agent: "Wget/1.12 (linux-gnu)".to_string(),
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Remote registry refresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistryConfig {
    /// When set, the local registry is replaced by this download at the start
    /// of every non-test run. Failures fall back to the local file.
    pub refresh_url: Option<String>,
}

/// Retention thresholds in minutes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetentionConfig {
    pub data_minutes: u32,
    pub thumbs_minutes: u32,
    pub averages_minutes: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            data_minutes: 120,
            thumbs_minutes: 120,
            averages_minutes: 120,
        }
    }
}

/// Thumbnail bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbnailsConfig {
    /// Output fits inside `max_width` x `max_height`, aspect preserved.
    pub max_width: u32,
    pub max_height: u32,
    /// JPEG decode size hint passed to ImageMagick (`-define jpeg:size=`).
    pub decode_width: u32,
    pub decode_height: u32,
    /// JPEG encoding quality (1-100).
    pub quality: u32,
}

impl Default for ThumbnailsConfig {
    fn default() -> Self {
        Self {
            max_width: 250,
            max_height: 150,
            decode_width: 500,
            decode_height: 150,
            quality: 85,
        }
    }
}

/// Averaged composite settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AveragesConfig {
    pub enabled: bool,
    /// JPEG encoding quality (1-100).
    pub quality: u32,
}

impl Default for AveragesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quality: 90,
        }
    }
}

/// Available image backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Pure Rust, via the `image` crate.
    #[default]
    Rust,
    /// Shells out to ImageMagick's `convert`.
    ImageMagick,
}

/// Image backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagingConfig {
    pub backend: BackendKind,
    /// Binary used by the ImageMagick backend.
    pub convert_binary: String,
}

impl Default for ImagingConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Rust,
            convert_binary: "convert".to_string(),
        }
    }
}

/// Run lock behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockConfig {
    /// A lock file older than this is assumed abandoned by a killed run.
    pub stale_minutes: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { stale_minutes: 60 }
    }
}

/// Load config from a TOML file.
///
/// A missing file yields the stock defaults. Unknown keys and invalid values
/// are errors.
pub fn load_config(path: &Path) -> Result<PipelineConfig, ConfigError> {
    if !path.exists() {
        return Ok(PipelineConfig::default());
    }
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate config from TOML text.
pub fn parse_config(content: &str) -> Result<PipelineConfig, ConfigError> {
    let config: PipelineConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `qrss-plus.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# QRSS Plus Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Filesystem layout (relative paths resolve against the working directory)
# ---------------------------------------------------------------------------
[paths]
# Primary artifacts. thumbs/ and averages/ are created inside it.
# The directory itself must already exist.
data_dir = "data"

# Source registry: ID, call, title, name, loc, site, url
registry = "grabbers.csv"

# One comma-separated summary line per run, one file per day.
stats_dir = "stats"

# Log of the latest run, lines separated by <br>.
status_file = "data/status.txt"

# ---------------------------------------------------------------------------
# Fetching
# ---------------------------------------------------------------------------
[fetch]
# Per-request timeout. Failed fetches are not retried within a run.
timeout_secs = 3

# Many grabber hosts block unfamiliar clients.
user_agent = "Wget/1.12 (linux-gnu)"

# Larger responses are recorded as failures.
max_bytes = 10485760

# ---------------------------------------------------------------------------
# Registry refresh
# ---------------------------------------------------------------------------
[registry]
# Download the registry before every run. Failures keep the local copy.
# refresh_url = "https://raw.githubusercontent.com/swharden/QRSSplus/master/grabbers.csv"

# ---------------------------------------------------------------------------
# Retention (minutes)
# ---------------------------------------------------------------------------
[retention]
data_minutes = 120
thumbs_minutes = 120
averages_minutes = 120

# ---------------------------------------------------------------------------
# Thumbnails
# ---------------------------------------------------------------------------
[thumbnails]
# Thumbnails fit inside this box, aspect ratio preserved.
max_width = 250
max_height = 150

# JPEG decode size hint (ImageMagick backend only).
decode_width = 500
decode_height = 150

quality = 85

# ---------------------------------------------------------------------------
# Averaged composites (one per source per run)
# ---------------------------------------------------------------------------
[averages]
enabled = true
quality = 90

# ---------------------------------------------------------------------------
# Image backend
# ---------------------------------------------------------------------------
[imaging]
# "rust" (built in) or "imagemagick" (requires convert on PATH)
backend = "rust"
convert_binary = "convert"

# ---------------------------------------------------------------------------
# Run lock
# ---------------------------------------------------------------------------
[lock]
# A lock left behind by a killed run is ignored after this many minutes.
stale_minutes = 60
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.paths.data_dir, PathBuf::from("data"));
        assert_eq!(config.paths.registry, PathBuf::from("grabbers.csv"));
        assert_eq!(config.fetch.timeout_secs, 3);
        assert_eq!(config.fetch.user_agent, "Wget/1.12 (linux-gnu)");
        assert_eq!(config.retention.data_minutes, 120);
        assert_eq!(config.thumbnails.max_width, 250);
        assert_eq!(config.thumbnails.max_height, 150);
        assert!(config.averages.enabled);
        assert_eq!(config.imaging.backend, BackendKind::Rust);
        assert!(config.registry.refresh_url.is_none());
    }

    #[test]
    fn derived_directories() {
        let config = PipelineConfig::default();
        assert_eq!(config.thumbs_dir(), PathBuf::from("data/thumbs"));
        assert_eq!(config.averages_dir(), PathBuf::from("data/averages"));
    }

    #[test]
    fn parse_partial_config() {
        let config = parse_config(
            r#"
[retention]
averages_minutes = 1440
"#,
        )
        .unwrap();
        assert_eq!(config.retention.averages_minutes, 1440);
        // Defaults preserved
        assert_eq!(config.retention.data_minutes, 120);
        assert_eq!(config.fetch.timeout_secs, 3);
    }

    #[test]
    fn parse_backend_kind() {
        let config = parse_config(
            r#"
[imaging]
backend = "imagemagick"
convert_binary = "/usr/local/bin/convert"
"#,
        )
        .unwrap();
        assert_eq!(config.imaging.backend, BackendKind::ImageMagick);
        assert_eq!(config.imaging.convert_binary, "/usr/local/bin/convert");
    }

    #[test]
    fn unknown_key_rejected() {
        let result = parse_config(
            r#"
[fetch]
timout_secs = 3
"#,
        );
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown field"));
    }

    #[test]
    fn unknown_section_rejected() {
        assert!(parse_config("[fetcher]\ntimeout_secs = 3\n").is_err());
    }

    #[test]
    fn unknown_backend_rejected() {
        assert!(parse_config("[imaging]\nbackend = \"gimp\"\n").is_err());
    }

    #[test]
    fn validate_default_config_passes() {
        assert!(PipelineConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_zero_timeout() {
        let mut config = PipelineConfig::default();
        config.fetch.timeout_secs = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn validate_zero_retention() {
        let mut config = PipelineConfig::default();
        config.retention.thumbs_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_quality_range() {
        let mut config = PipelineConfig::default();
        config.thumbnails.quality = 101;
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.averages.quality = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_refresh_url_scheme() {
        let mut config = PipelineConfig::default();
        config.registry.refresh_url = Some("ftp://example/grabbers.csv".into());
        assert!(config.validate().is_err());

        config.registry.refresh_url = Some("https://example/grabbers.csv".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_config_missing_file_is_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(&tmp.path().join("qrss-plus.toml")).unwrap();
        assert_eq!(config.retention.data_minutes, 120);
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("qrss-plus.toml");
        fs::write(
            &path,
            r#"
[paths]
data_dir = "/srv/qrss/data"

[fetch]
timeout_secs = 5
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.paths.data_dir, PathBuf::from("/srv/qrss/data"));
        assert_eq!(config.fetch.timeout_secs, 5);
        assert_eq!(config.fetch.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("qrss-plus.toml");
        fs::write(&path, "this is not valid toml [[[").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("qrss-plus.toml");
        fs::write(&path, "[fetch]\nmax_bytes = 0\n").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config = parse_config(stock_config_toml()).unwrap();
        let defaults = PipelineConfig::default();
        assert_eq!(config.paths.data_dir, defaults.paths.data_dir);
        assert_eq!(config.paths.status_file, defaults.paths.status_file);
        assert_eq!(config.fetch.max_bytes, defaults.fetch.max_bytes);
        assert_eq!(config.thumbnails.decode_width, 500);
        assert_eq!(config.lock.stale_minutes, 60);
        assert!(config.registry.refresh_url.is_none());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        for section in [
            "[paths]",
            "[fetch]",
            "[registry]",
            "[retention]",
            "[thumbnails]",
            "[averages]",
            "[imaging]",
            "[lock]",
        ] {
            assert!(content.contains(section), "missing {section}");
        }
    }
}
