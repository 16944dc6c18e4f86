//! # qrss-plus
//!
//! Collects images from a registry of QRSS "grabbers" (amateur radio
//! receivers that publish a periodically refreshed waterfall screenshot at a
//! fixed URL). Run every ten minutes from cron, each invocation fetches every
//! grabber once, drops nothing but flags repeats, derives thumbnails and
//! averaged composites, and expires everything older than the retention
//! window.
//!
//! # Architecture: One Sequential Pass
//!
//! ```text
//! grabbers.csv ─┐
//!               ▼
//! lock → load → sweep → index → throttle → fetch → derive → persist → sweep
//!                         │                   │        │         │
//!                     data/*.*          data/ + thumbs/ averages/ stats/ + status.txt
//! ```
//!
//! There is no database and no manifest. The data directory *is* the state:
//! every artifact's filename encodes `id.bucket.hash.ext`, and each run
//! rebuilds what it needs by listing the directory.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`pipeline`] | Run orchestrator: state machine, failure policy, [`pipeline::RunReport`] |
//! | [`registry`] | Grabber CSV loading and optional refresh from a URL |
//! | [`fetch`] | [`fetch::Fetcher`] capability, HTTP implementation, per-source grab |
//! | [`naming`] | `id.bucket.hash.ext` filename encode/decode |
//! | [`bucket`] | Ten-minute time buckets and the [`bucket::Clock`] capability |
//! | [`index`] | Directory scan into a per-source [`index::SeenSet`] |
//! | [`imaging`] | Thumbnails and averages behind the [`imaging::ImageBackend`] trait |
//! | [`sweep`] | Retention: delete artifacts older than a threshold |
//! | [`report`] | Run log, status file, daily stats lines |
//! | [`lock`] | Exclusive run lock with stale-lock recovery |
//! | [`config`] | `qrss-plus.toml` loading, defaults and validation |
//! | [`output`] | CLI output formatting of a run report |
//!
//! # Design Decisions
//!
//! ## Filenames as Records
//!
//! Dedup, throttling and retention all work from decoded filenames. Anything
//! that does not decode (`status.txt`, a hand-copied `banner.jpg`) is
//! invisible to every phase, so it is never counted and never deleted.
//!
//! ## Buckets, Not Timestamps
//!
//! Captures are grouped into ten-minute local-time buckets. Two runs landing
//! in the same bucket are the same run, which makes cron double-fires and
//! manual reruns harmless: the second one is throttled. Elapsed time between
//! buckets is always computed on calendar datetimes.
//!
//! ## Duplicates Are Kept
//!
//! A grabber that stops updating keeps serving the same bytes. Those
//! captures are stored and tagged `dup` in the stats, but get no thumbnail.
//! They still feed the average, which then honestly reflects a stale source.
//!
//! ## Injected Capabilities
//!
//! Network ([`fetch::Fetcher`]), pixel work ([`imaging::ImageBackend`]) and
//! time ([`bucket::Clock`]) are traits handed to [`pipeline::Pipeline`]. The
//! integration tests drive complete runs across buckets with fakes and a
//! fixed clock, without sockets or sleeping.
//!
//! ## Two Imaging Backends
//!
//! The default backend is pure Rust (`image` crate), so the binary has no
//! system dependencies. The ImageMagick backend runs `convert` for
//! installations that want byte-identical output with existing archives.

pub mod bucket;
pub mod config;
pub mod fetch;
pub mod imaging;
pub mod index;
pub mod lock;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod sweep;
