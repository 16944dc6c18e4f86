//! Ten-minute time buckets and the clock capability.
//!
//! Every artifact carries the bucket it was captured in, serialized as a
//! fixed-width `YYMMDDHHMM` local-time stamp. The same value doubles as the
//! run heartbeat: two runs in one bucket are considered the same run.
//!
//! ## Arithmetic
//!
//! Elapsed time between buckets is computed on calendar datetimes, never by
//! subtracting the serialized integers. `2410182350` → `2410190000` is 10
//! minutes, not 7650.
//!
//! ```text
//! 14:37:12  →  2410181430
//! 14:40:00  →  2410181440
//! 23:59:59  →  2410182350
//! ```

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, Timelike};
use std::fmt;

/// Bucket granularity in minutes.
pub const BUCKET_MINUTES: u32 = 10;

/// Width of the serialized stamp: YY MM DD HH MM.
pub const STAMP_LEN: usize = 10;

const STAMP_FORMAT: &str = "%y%m%d%H%M";

/// A local time truncated to a [`BUCKET_MINUTES`] boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeBucket(NaiveDateTime);

impl TimeBucket {
    /// Bucket containing `at`: minutes rounded down, seconds dropped.
    pub fn containing(at: NaiveDateTime) -> Self {
        let minute = at.minute() - at.minute() % BUCKET_MINUTES;
        let floored = at
            .date()
            .and_hms_opt(at.hour(), minute, 0)
            .unwrap_or(at);
        Self(floored)
    }

    /// Parse a serialized `YYMMDDHHMM` stamp.
    ///
    /// Returns `None` for anything that is not exactly ten ASCII digits
    /// naming a real calendar minute.
    pub fn parse(stamp: &str) -> Option<Self> {
        if stamp.len() != STAMP_LEN || !stamp.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
            .ok()
            .map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0.date()
    }

    /// Calendar minutes from `earlier` to `self` (negative if `earlier` is later).
    pub fn minutes_since(&self, earlier: &TimeBucket) -> i64 {
        (self.0 - earlier.0).num_minutes()
    }

    /// The bucket `n` steps after this one.
    pub fn plus_buckets(&self, n: i64) -> Self {
        Self(self.0 + Duration::minutes(n * BUCKET_MINUTES as i64))
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(STAMP_FORMAT))
    }
}

/// Source of "now" for a run.
///
/// Threaded through the pipeline instead of reading ambient wall time so
/// runs can be replayed at arbitrary instants in tests.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;

    fn bucket(&self) -> TimeBucket {
        TimeBucket::containing(self.now())
    }
}

/// Local wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl FixedClock {
    /// Clock at the given local date and time, `None` if no such minute exists.
    pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(hour, minute, 0))
            .map(Self)
    }

    pub fn advanced_by_minutes(&self, minutes: i64) -> Self {
        Self(self.0 + Duration::minutes(minutes))
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
