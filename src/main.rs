use clap::{Parser, Subcommand};
use qrss_plus::bucket::SystemClock;
use qrss_plus::config::{self, DEFAULT_CONFIG_FILE};
use qrss_plus::fetch::HttpFetcher;
use qrss_plus::pipeline::{Pipeline, PipelineError, RunOptions};
use qrss_plus::{imaging, output};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup; called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "qrss-plus")]
#[command(about = "Collect, deduplicate and expire QRSS grabber images")]
#[command(long_about = "\
Collect, deduplicate and expire QRSS grabber images

Meant to run from cron every ten minutes. Each run fetches every grabber in
the registry once, writes captures as ID.YYMMDDHHMM.HASH.EXT, thumbnails new
ones, averages each grabber's recent captures, and deletes artifacts older
than the retention window.

Layout (defaults):

  grabbers.csv                 # registry: ID,call,title,name,loc,site,url
  data/                        # captures and failure sentinels
  ├── thumbs/                  # thumbnails of new captures
  ├── averages/                # ID.YYMMDDHHMM.mean.jpg composites
  └── status.txt               # log of the last run
  stats/YYYY-MM-DD.txt         # one line per run

A second run within the same ten-minute bucket does nothing unless --force
is given.

Run 'qrss-plus gen-config' to generate a documented qrss-plus.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Configuration file (missing file means stock defaults)
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, global = true)]
    config: PathBuf,

    /// Load, sweep and index only: no fetching, deriving or stats
    #[arg(long)]
    test: bool,

    /// Fetch even if this time bucket already ran
    #[arg(long)]
    force: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print a stock qrss-plus.toml with all options documented
    GenConfig,
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("qrss_plus=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::GenConfig) = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    init_tracing();

    let config = config::load_config(&cli.config)?;
    let fetcher = HttpFetcher::new(&config.fetch)?;
    let backend = imaging::backend_from_config(&config.imaging);
    let clock = SystemClock;

    let options = RunOptions {
        test: cli.test,
        force: cli.force,
    };
    match Pipeline::new(&config, &fetcher, backend.as_ref(), &clock).run(options) {
        Ok(report) => output::print_run_report(&report),
        // Overlapping cron invocations are expected; not a failure
        Err(PipelineError::AlreadyRunning(owner)) => {
            tracing::warn!("{owner}; exiting");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
