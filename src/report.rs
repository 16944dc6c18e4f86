//! Run log, status file and daily stats.
//!
//! ## Run log
//!
//! Every run keeps an ordered list of human-readable lines, each prefixed
//! with seconds elapsed since the run started (`[12.345s] message`). Lines
//! are mirrored to `tracing` as they are added. At the end of the run the
//! log is written to the status file, lines joined with `<br>` so the web
//! front end can include it verbatim.
//!
//! ## Stats
//!
//! One line per run is appended to `stats/YYYY-MM-DD.txt` (date of the run's
//! bucket):
//!
//! ```text
//! 2410181430,WA1X new,K4RCG dup,VE7IGP fail
//! ```

use crate::bucket::TimeBucket;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;

/// Separator between status lines.
pub const STATUS_SEPARATOR: &str = "<br>\n";

/// Render one log line.
pub fn format_log_line(elapsed: Duration, message: &str) -> String {
    format!("[{:.3}s] {}", elapsed.as_secs_f64(), message)
}

/// Ordered, timestamped log of one run.
#[derive(Debug, Clone)]
pub struct RunLog {
    start: Instant,
    lines: Vec<String>,
}

impl RunLog {
    /// Log timed from `start`.
    pub fn started_at(start: Instant) -> Self {
        Self {
            start,
            lines: Vec::new(),
        }
    }

    pub fn log(&mut self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!("{message}");
        self.lines
            .push(format_log_line(self.start.elapsed(), message));
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Status file body.
    pub fn render_status(&self) -> String {
        self.lines.join(STATUS_SEPARATOR)
    }
}

impl Default for RunLog {
    fn default() -> Self {
        Self::started_at(Instant::now())
    }
}

/// Write the run log to the status file, replacing any previous content.
pub fn write_status(path: &Path, log: &RunLog) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, log.render_status())
}

/// One run's entry in the daily stats file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsLine {
    pub bucket: TimeBucket,
    /// `(source id, outcome tag)` in fetch order.
    pub entries: Vec<(String, String)>,
}

impl StatsLine {
    pub fn new(bucket: TimeBucket) -> Self {
        Self {
            bucket,
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, source_id: impl Into<String>, tag: impl Into<String>) {
        self.entries.push((source_id.into(), tag.into()));
    }

    pub fn render(&self) -> String {
        let mut line = self.bucket.to_string();
        for (id, tag) in &self.entries {
            line.push(',');
            line.push_str(id);
            line.push(' ');
            line.push_str(tag);
        }
        line
    }
}

/// Daily stats file for the date of `bucket`.
pub fn stats_path(stats_dir: &Path, bucket: &TimeBucket) -> PathBuf {
    stats_dir.join(format!("{}.txt", bucket.date().format("%Y-%m-%d")))
}

/// Append `line` to its daily stats file, creating the directory as needed.
pub fn append_stats(stats_dir: &Path, line: &StatsLine) -> io::Result<PathBuf> {
    fs::create_dir_all(stats_dir)?;
    let path = stats_path(stats_dir, &line.bucket);
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    writeln!(file, "{}", line.render())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bucket() -> TimeBucket {
        TimeBucket::parse("2410181430").unwrap()
    }

    #[test]
    fn log_line_has_elapsed_prefix() {
        assert_eq!(
            format_log_line(Duration::from_millis(12345), "fetched WA1X"),
            "[12.345s] fetched WA1X"
        );
        assert_eq!(format_log_line(Duration::ZERO, "start"), "[0.000s] start");
    }

    #[test]
    fn run_log_keeps_order() {
        let mut log = RunLog::default();
        log.log("first");
        log.log(String::from("second"));

        assert_eq!(log.lines().len(), 2);
        assert!(log.lines()[0].ends_with("] first"));
        assert!(log.lines()[1].ends_with("] second"));
    }

    #[test]
    fn status_joins_with_br() {
        let mut log = RunLog::default();
        log.log("a");
        log.log("b");
        let status = log.render_status();
        assert_eq!(status.matches(STATUS_SEPARATOR).count(), 1);
        assert!(status.ends_with("] b"));
    }

    #[test]
    fn write_status_creates_parent_and_replaces() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("data").join("status.txt");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "old").unwrap();

        let mut log = RunLog::default();
        log.log("new run");
        write_status(&path, &log).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.ends_with("] new run"));
        assert!(!content.contains("old"));
    }

    #[test]
    fn stats_line_render() {
        let mut line = StatsLine::new(bucket());
        line.push("WA1X", "new");
        line.push("K4RCG", "dup");
        line.push("VE7IGP", "fail");
        assert_eq!(
            line.render(),
            "2410181430,WA1X new,K4RCG dup,VE7IGP fail"
        );
    }

    #[test]
    fn stats_line_without_entries_is_just_bucket() {
        assert_eq!(StatsLine::new(bucket()).render(), "2410181430");
    }

    #[test]
    fn append_stats_uses_daily_file() {
        let tmp = TempDir::new().unwrap();
        let stats_dir = tmp.path().join("stats");

        let mut first = StatsLine::new(bucket());
        first.push("WA1X", "new");
        let path = append_stats(&stats_dir, &first).unwrap();

        let mut second = StatsLine::new(bucket().plus_buckets(1));
        second.push("WA1X", "dup");
        append_stats(&stats_dir, &second).unwrap();

        assert_eq!(path, stats_dir.join("2024-10-18.txt"));
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "2410181430,WA1X new\n2410181440,WA1X dup\n"
        );
    }

    #[test]
    fn stats_path_follows_bucket_date() {
        let late = TimeBucket::parse("2412312350").unwrap();
        assert_eq!(
            stats_path(Path::new("stats"), &late.plus_buckets(1)),
            PathBuf::from("stats/2025-01-01.txt")
        );
    }
}
