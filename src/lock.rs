//! Exclusive run lock.
//!
//! Runs are triggered by cron and must not overlap: two runs in the same
//! bucket would race on the same filenames. The lock is a file in the data
//! directory created with `create_new`, holding the owner PID and creation
//! time:
//!
//! ```text
//! 48213 2024-10-18T14:30:02
//! ```
//!
//! It is removed when the [`RunLock`] guard drops. A run killed with SIGKILL
//! leaves the file behind, so a lock older than the stale threshold is
//! treated as abandoned and replaced.

use chrono::{NaiveDateTime, TimeDelta};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::warn;

pub const LOCK_FILE_NAME: &str = ".qrss-plus.lock";

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Another run holds {path} ({owner})")]
    Held { path: PathBuf, owner: String },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Guard for the run lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

fn try_create(path: &Path, now: NaiveDateTime) -> io::Result<RunLock> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    writeln!(file, "{} {}", std::process::id(), now.format(TIME_FORMAT))?;
    Ok(RunLock {
        path: path.to_path_buf(),
    })
}

/// Creation time recorded in the lock file, if readable.
fn recorded_time(content: &str) -> Option<NaiveDateTime> {
    let stamp = content.split_whitespace().nth(1)?;
    NaiveDateTime::parse_from_str(stamp, TIME_FORMAT).ok()
}

/// Whether an existing lock is old enough to be considered abandoned.
///
/// Uses the recorded creation time when present. A lock whose content
/// cannot be read yet (its owner may be mid-write) falls back to the file's
/// modification time.
fn is_stale(path: &Path, content: &str, stale_minutes: u32, now: NaiveDateTime) -> bool {
    let threshold = TimeDelta::minutes(i64::from(stale_minutes));
    if let Some(created) = recorded_time(content) {
        return now - created > threshold;
    }
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|mtime| SystemTime::now().duration_since(mtime).ok())
        .is_some_and(|age| age.as_secs() > threshold.num_seconds().max(0) as u64)
}

impl RunLock {
    /// Take the lock at `path`, replacing it if stale.
    pub fn acquire(path: &Path, stale_minutes: u32, now: NaiveDateTime) -> Result<Self, LockError> {
        match try_create(path, now) {
            Ok(lock) => return Ok(lock),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        let content = fs::read_to_string(path).unwrap_or_default();
        if !is_stale(path, &content, stale_minutes, now) {
            return Err(LockError::Held {
                path: path.to_path_buf(),
                owner: content.trim().to_string(),
            });
        }

        warn!(path = %path.display(), owner = %content.trim(), "replacing stale run lock");
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        // Another run may have replaced it first
        try_create(path, now).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => LockError::Held {
                path: path.to_path_buf(),
                owner: String::from("replaced concurrently"),
            },
            _ => LockError::Io(e),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "could not remove run lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket::{Clock, FixedClock};
    use tempfile::TempDir;

    fn now() -> NaiveDateTime {
        FixedClock::at(2024, 10, 18, 14, 30).unwrap().now()
    }

    #[test]
    fn acquire_writes_pid_and_time() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(LOCK_FILE_NAME);

        let lock = RunLock::acquire(&path, 60, now()).unwrap();
        let content = fs::read_to_string(lock.path()).unwrap();

        assert!(content.starts_with(&std::process::id().to_string()));
        assert_eq!(recorded_time(&content), Some(now()));
    }

    #[test]
    fn second_acquire_while_held_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(LOCK_FILE_NAME);

        let _held = RunLock::acquire(&path, 60, now()).unwrap();
        let later = now() + TimeDelta::minutes(5);
        let result = RunLock::acquire(&path, 60, later);

        assert!(matches!(result, Err(LockError::Held { .. })));
    }

    #[test]
    fn drop_releases() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(LOCK_FILE_NAME);

        drop(RunLock::acquire(&path, 60, now()).unwrap());
        assert!(!path.exists());
        assert!(RunLock::acquire(&path, 60, now()).is_ok());
    }

    #[test]
    fn stale_lock_is_replaced() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(LOCK_FILE_NAME);
        fs::write(&path, "1 2024-10-18T12:00:00\n").unwrap();

        let lock = RunLock::acquire(&path, 60, now()).unwrap();
        let content = fs::read_to_string(lock.path()).unwrap();
        assert_eq!(recorded_time(&content), Some(now()));
    }

    #[test]
    fn lock_at_threshold_is_still_held() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(LOCK_FILE_NAME);
        fs::write(&path, "1 2024-10-18T13:30:00\n").unwrap();

        let result = RunLock::acquire(&path, 60, now());
        assert!(matches!(result, Err(LockError::Held { owner, .. }) if owner.starts_with("1 ")));
    }

    #[test]
    fn unreadable_fresh_lock_is_held() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(LOCK_FILE_NAME);
        fs::write(&path, "").unwrap();

        // Falls back to mtime, which is just now
        let result = RunLock::acquire(&path, 60, now());
        assert!(matches!(result, Err(LockError::Held { .. })));
    }

    #[test]
    fn missing_directory_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nope").join(LOCK_FILE_NAME);
        assert!(matches!(
            RunLock::acquire(&path, 60, now()),
            Err(LockError::Io(_))
        ));
    }
}
