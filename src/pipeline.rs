//! Run orchestration: one cron-triggered pass over every grabber.
//!
//! ```text
//! LOADING → SWEEPING(pre) → INDEXING → THROTTLE_CHECK ─┬→ FETCHING → DERIVING → PERSISTING ─┬→ SWEEPING(post) → DONE
//!                                                      └──────────── skipped ───────────────┘
//! ```
//!
//! Test mode stops after INDEXING and goes straight to SWEEPING(post): the
//! registry is still loaded and old artifacts still expire, but nothing is
//! fetched, derived or persisted.
//!
//! The run lock is taken before LOADING and held until the [`RunReport`] is
//! returned.
//!
//! ## Failure policy
//!
//! | Failure | Effect |
//! |---|---|
//! | Missing data dir / registry, invalid config | run aborts with [`PipelineError`] |
//! | Lock held by a live run | [`PipelineError::AlreadyRunning`] |
//! | One fetch fails | sentinel + `fail` stats tag, batch continues |
//! | Thumbnail / average fails | logged, run continues |
//! | Stats / status write fails | logged, run continues |
//!
//! All capabilities (network, image work, time) are injected, so the whole
//! state machine runs in tests against fakes and a fixed clock.

use crate::bucket::{Clock, TimeBucket};
use crate::config::{ConfigError, PipelineConfig};
use crate::fetch::{Fetcher, GrabOutcome, GrabResult, grab};
use crate::imaging::{self, ImageBackend, Quality};
use crate::index::SeenSet;
use crate::lock::{LOCK_FILE_NAME, LockError, RunLock};
use crate::registry::{self, RegistryError, SourceDescriptor};
use crate::report::{self, RunLog, StatsLine};
use crate::sweep::{self, SweepReport};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Data directory not found: {0}")]
    MissingDataDir(PathBuf),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("Another run is in progress: {0}")]
    AlreadyRunning(String),
    #[error("Run lock failed: {0}")]
    Lock(LockError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl From<LockError> for PipelineError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Held { .. } => PipelineError::AlreadyRunning(err.to_string()),
            other => PipelineError::Lock(other),
        }
    }
}

/// Command-line switches for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Only load, sweep and index.
    pub test: bool,
    /// Fetch even if this bucket already ran.
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Loading,
    SweepingPre,
    Indexing,
    ThrottleCheck,
    Fetching,
    Deriving,
    Persisting,
    SweepingPost,
    Done,
}

/// Outcome of the throttle check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Nothing on disk yet.
    FirstRun,
    /// Last artifact is from an earlier bucket.
    Proceed { latest: TimeBucket },
    /// This bucket already ran, but `--force` was given.
    Forced { latest: TimeBucket },
    /// This bucket already ran.
    Skip { latest: TimeBucket },
}

impl ThrottleDecision {
    pub fn proceeds(&self) -> bool {
        !matches!(self, ThrottleDecision::Skip { .. })
    }
}

/// Decide whether a run at `now` should fetch.
///
/// A latest bucket at or after `now` means this bucket already ran (or the
/// clock moved backwards); either way fetching again would duplicate names.
pub fn check_throttle(latest: Option<TimeBucket>, now: TimeBucket, force: bool) -> ThrottleDecision {
    match latest {
        None => ThrottleDecision::FirstRun,
        Some(latest) if latest < now => ThrottleDecision::Proceed { latest },
        Some(latest) if force => ThrottleDecision::Forced { latest },
        Some(latest) => ThrottleDecision::Skip { latest },
    }
}

/// One source's grab plus its thumbnail.
#[derive(Debug, Clone)]
pub struct SourceOutcome {
    pub grab: GrabResult,
    /// Only attempted for new captures.
    pub thumbnail: Option<Result<PathBuf, String>>,
}

/// Everything a run did, for display and tests.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub bucket: TimeBucket,
    pub options: RunOptions,
    pub phases: Vec<RunPhase>,
    /// Sources in the registry this run.
    pub sources: usize,
    /// `None` when no refresh was attempted.
    pub registry_refresh: Option<Result<usize, String>>,
    /// Artifacts indexed before fetching.
    pub indexed: usize,
    /// `None` in test mode.
    pub throttle: Option<ThrottleDecision>,
    pub outcomes: Vec<SourceOutcome>,
    pub averages: Vec<PathBuf>,
    /// `(source id, error)` for averages that could not be written.
    pub derive_failures: Vec<(String, String)>,
    pub sweeps: Vec<SweepReport>,
    pub persist_errors: Vec<String>,
    pub log: RunLog,
}

impl RunReport {
    fn new(bucket: TimeBucket, options: RunOptions, start: Instant) -> Self {
        Self {
            bucket,
            options,
            phases: Vec::new(),
            sources: 0,
            registry_refresh: None,
            indexed: 0,
            throttle: None,
            outcomes: Vec::new(),
            averages: Vec::new(),
            derive_failures: Vec::new(),
            sweeps: Vec::new(),
            persist_errors: Vec::new(),
            log: RunLog::started_at(start),
        }
    }

    fn enter(&mut self, phase: RunPhase) {
        debug!(?phase, "entering phase");
        self.phases.push(phase);
    }

    /// Count of outcomes matching `pred`.
    pub fn count(&self, pred: impl Fn(&GrabOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.grab.outcome)).count()
    }

    pub fn new_count(&self) -> usize {
        self.count(|o| *o == GrabOutcome::New)
    }

    pub fn duplicate_count(&self) -> usize {
        self.count(|o| *o == GrabOutcome::Duplicate)
    }

    pub fn failed_count(&self) -> usize {
        self.count(|o| matches!(o, GrabOutcome::Failed(_)))
    }

    pub fn deleted_count(&self) -> usize {
        self.sweeps.iter().map(|s| s.deleted.len()).sum()
    }
}

/// The orchestrator. Holds configuration and injected capabilities.
pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
    fetcher: &'a dyn Fetcher,
    backend: &'a dyn ImageBackend,
    clock: &'a dyn Clock,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        config: &'a PipelineConfig,
        fetcher: &'a dyn Fetcher,
        backend: &'a dyn ImageBackend,
        clock: &'a dyn Clock,
    ) -> Self {
        Self {
            config,
            fetcher,
            backend,
            clock,
        }
    }

    /// Execute one run.
    pub fn run(&self, options: RunOptions) -> Result<RunReport, PipelineError> {
        let start = Instant::now();
        self.config.validate()?;

        let now = self.clock.now();
        let bucket = TimeBucket::containing(now);
        let data_dir = self.config.paths.data_dir.as_path();
        // The lock lives in the data dir, so this check precedes it
        if !data_dir.is_dir() {
            return Err(PipelineError::MissingDataDir(data_dir.to_path_buf()));
        }
        let _lock = RunLock::acquire(
            &data_dir.join(LOCK_FILE_NAME),
            self.config.lock.stale_minutes,
            now,
        )?;

        let mut report = RunReport::new(bucket, options, start);
        report.log.log(format!(
            "run started for bucket {bucket}{}{}",
            if options.test { " (test mode)" } else { "" },
            if options.force { " (forced)" } else { "" },
        ));

        report.enter(RunPhase::Loading);
        let sources = self.load(options, &mut report)?;

        report.enter(RunPhase::SweepingPre);
        self.sweep_all(&bucket, &mut report);

        report.enter(RunPhase::Indexing);
        let mut seen = SeenSet::scan(data_dir)?;
        report.indexed = seen.len();
        match seen.minutes_since_last_run(&bucket) {
            Some(minutes) => report.log.log(format!(
                "indexed {} artifacts, last run {minutes} minutes ago",
                seen.len()
            )),
            None => report.log.log("indexed 0 artifacts, no previous run"),
        }

        if !options.test {
            report.enter(RunPhase::ThrottleCheck);
            let decision = check_throttle(seen.latest_bucket(), bucket, options.force);
            report.throttle = Some(decision);
            match decision {
                ThrottleDecision::Skip { latest } => report.log.log(format!(
                    "bucket {latest} already ran, skipping (use --force to run anyway)"
                )),
                ThrottleDecision::Forced { latest } => report
                    .log
                    .log(format!("bucket {latest} already ran, forced")),
                ThrottleDecision::FirstRun | ThrottleDecision::Proceed { .. } => {}
            }

            if decision.proceeds() {
                report.enter(RunPhase::Fetching);
                self.fetch_all(&sources, &bucket, &mut seen, &mut report);

                report.enter(RunPhase::Deriving);
                self.derive(&sources, &bucket, &mut report);

                report.enter(RunPhase::Persisting);
                self.persist(&bucket, &mut report);
            }
        }

        report.enter(RunPhase::SweepingPost);
        self.sweep_all(&bucket, &mut report);

        report.enter(RunPhase::Done);
        report.log.log(format!(
            "done: {} new, {} duplicate, {} failed, {} expired",
            report.new_count(),
            report.duplicate_count(),
            report.failed_count(),
            report.deleted_count()
        ));
        Ok(report)
    }

    fn load(
        &self,
        options: RunOptions,
        report: &mut RunReport,
    ) -> Result<Vec<SourceDescriptor>, PipelineError> {
        fs::create_dir_all(self.config.thumbs_dir())?;
        fs::create_dir_all(self.config.averages_dir())?;

        let registry_path = &self.config.paths.registry;
        if let Some(url) = self.config.registry.refresh_url.as_deref()
            && !options.test
        {
            let result = registry::refresh_registry(self.fetcher, url, registry_path);
            match &result {
                Ok(n) => report.log.log(format!("registry refreshed: {n} sources")),
                Err(e) => report
                    .log
                    .log(format!("registry refresh failed, keeping local copy: {e}")),
            }
            report.registry_refresh = Some(result.map_err(|e| e.to_string()));
        }

        let sources = registry::load_registry(registry_path)?;
        report.sources = sources.len();
        report.log.log(format!(
            "loaded {} sources from {}",
            sources.len(),
            registry_path.display()
        ));
        Ok(sources)
    }

    fn sweep_all(&self, bucket: &TimeBucket, report: &mut RunReport) {
        let retention = &self.config.retention;
        let targets = [
            (self.config.paths.data_dir.clone(), retention.data_minutes),
            (self.config.thumbs_dir(), retention.thumbs_minutes),
            (self.config.averages_dir(), retention.averages_minutes),
        ];
        for (dir, minutes) in targets {
            match sweep::sweep(&dir, minutes, bucket) {
                Ok(sweep_report) => {
                    if !sweep_report.deleted.is_empty() || !sweep_report.failed.is_empty() {
                        report.log.log(format!("swept {sweep_report}"));
                    }
                    report.sweeps.push(sweep_report);
                }
                Err(e) => report
                    .log
                    .log(format!("sweep of {} failed: {e}", dir.display())),
            }
        }
    }

    fn fetch_all(
        &self,
        sources: &[SourceDescriptor],
        bucket: &TimeBucket,
        seen: &mut SeenSet,
        report: &mut RunReport,
    ) {
        let data_dir = self.config.paths.data_dir.as_path();
        for source in sources {
            let result = grab(self.fetcher, source, data_dir, *bucket, seen);
            let file = result
                .artifact
                .as_deref()
                .and_then(Path::file_name)
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            match &result.outcome {
                GrabOutcome::New => report.log.log(format!("{}: new {file}", source.id)),
                GrabOutcome::Duplicate => {
                    report.log.log(format!("{}: duplicate {file}", source.id))
                }
                GrabOutcome::Failed(reason) => {
                    report.log.log(format!("{}: failed: {reason}", source.id))
                }
            }
            if let Some(name) = &result.name {
                seen.record(name);
            }

            let thumbnail = match (&result.outcome, &result.artifact) {
                (GrabOutcome::New, Some(artifact)) => Some(
                    imaging::create_thumbnail(
                        self.backend,
                        artifact,
                        &self.config.thumbs_dir(),
                        &self.config.thumbnails,
                    )
                    .map_err(|e| {
                        report
                            .log
                            .log(format!("{}: thumbnail failed: {e}", source.id));
                        e.to_string()
                    }),
                ),
                _ => None,
            };
            report.outcomes.push(SourceOutcome {
                grab: result,
                thumbnail,
            });
        }
    }

    fn derive(&self, sources: &[SourceDescriptor], bucket: &TimeBucket, report: &mut RunReport) {
        if !self.config.averages.enabled {
            return;
        }
        let quality = Quality::new(self.config.averages.quality);
        let mut done = BTreeSet::new();
        for source in sources {
            if !done.insert(source.id.as_str()) {
                continue;
            }
            match imaging::create_average(
                self.backend,
                &self.config.paths.data_dir,
                &self.config.averages_dir(),
                &source.id,
                *bucket,
                quality,
            ) {
                Ok(Some(path)) => report.averages.push(path),
                Ok(None) => {}
                Err(e) => {
                    report
                        .log
                        .log(format!("{}: average failed: {e}", source.id));
                    report.derive_failures.push((source.id.clone(), e.to_string()));
                }
            }
        }
        if !report.averages.is_empty() {
            report
                .log
                .log(format!("wrote {} averages", report.averages.len()));
        }
    }

    fn persist(&self, bucket: &TimeBucket, report: &mut RunReport) {
        let mut stats = StatsLine::new(*bucket);
        for outcome in &report.outcomes {
            stats.push(outcome.grab.source_id.as_str(), outcome.grab.outcome.tag());
        }
        if let Err(e) = report::append_stats(&self.config.paths.stats_dir, &stats) {
            let msg = format!("stats write failed: {e}");
            error!("{msg}");
            report.log.log(&msg);
            report.persist_errors.push(msg);
        }

        let status_file = &self.config.paths.status_file;
        report
            .log
            .log(format!("writing status to {}", status_file.display()));
        if let Err(e) = report::write_status(status_file, &report.log) {
            let msg = format!("status write failed: {e}");
            error!("{msg}");
            report.persist_errors.push(msg);
        }
    }
}
