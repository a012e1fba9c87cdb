//! Harvester CLI
//!
//! Local execution entry point: harvest, write the exports, report.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, ValueEnum};
use harvester::{
    error::Result,
    models::{Config, ExportSet, OutputFormat},
    pipeline::{self, RunSummary, StopSignal},
    services::{HttpSession, ReplaySession, Session, TokioSleeper},
    storage::{LocalStorage, RecordSink},
};

/// CATENA review-time harvester
#[derive(Parser, Debug)]
#[command(
    name = "harvester",
    version,
    about = "Harvest received/accepted dates from the CATENA journal archive"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "harvester.toml")]
    config: PathBuf,

    /// Test mode: stop after 10 articles
    #[arg(long)]
    test: bool,

    /// Maximum number of articles to keep
    #[arg(long)]
    max: Option<usize>,

    /// Volume range, `A-B` or a single volume
    #[arg(long, value_parser = parse_range::<u32>)]
    volumes: Option<[u32; 2]>,

    /// Year range, `A-B` or a single year
    #[arg(long, value_parser = parse_range::<i32>)]
    years: Option<[i32; 2]>,

    /// Run the page session without a visible window
    #[arg(long)]
    headless: Option<bool>,

    /// Output directory
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Export format
    #[arg(long, value_enum)]
    format: Option<FormatArg>,

    /// Serve pages from a snapshot directory instead of the network
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Save every fetched page into this directory
    #[arg(long)]
    snapshots: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check_config: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    All,
    Csv,
    Json,
}

impl FormatArg {
    fn formats(self) -> Vec<OutputFormat> {
        match self {
            FormatArg::All => vec![OutputFormat::Csv, OutputFormat::Json],
            FormatArg::Csv => vec![OutputFormat::Csv],
            FormatArg::Json => vec![OutputFormat::Json],
        }
    }
}

/// Parse `A-B` or `N` into an inclusive range.
fn parse_range<T: FromStr + Copy>(s: &str) -> std::result::Result<[T; 2], String> {
    let parse = |v: &str| {
        v.trim()
            .parse::<T>()
            .map_err(|_| format!("'{}' is not a number", v.trim()))
    };
    match s.split_once('-') {
        Some((low, high)) => Ok([parse(low)?, parse(high)?]),
        None => {
            let n = parse(s)?;
            Ok([n, n])
        }
    }
}

impl Cli {
    /// Command-line values take precedence over the file.
    fn apply(&self, config: &mut Config) {
        if self.test {
            config.scope.test_mode = true;
        }
        if let Some(max) = self.max {
            config.scope.max_articles = Some(max);
        }
        if let Some(range) = self.volumes {
            config.scope.volume_range = Some(range);
        }
        if let Some(range) = self.years {
            config.scope.year_range = Some(range);
        }
        if let Some(headless) = self.headless {
            config.session.headless = headless;
        }
        if let Some(dir) = &self.output {
            config.output.dir = dir.display().to_string();
        }
        if let Some(format) = self.format {
            config.output.formats = format.formats();
        }
        if let Some(dir) = &self.snapshots {
            config.session.snapshot_dir = Some(dir.display().to_string());
        }
    }
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Log the end-of-run summary.
fn report(summary: &RunSummary) {
    let stats = &summary.stats;
    let review = &summary.review;
    let opt = |v: Option<i64>| v.map_or_else(|| "n/a".to_string(), |v| v.to_string());

    log::info!("[SUMMARY] {}", summary.source);
    log::info!("    Records: {}", stats.succeeded);
    log::info!("    Incomplete: {}", stats.incomplete);
    log::info!(
        "    Skipped: {} ({} failed, {} duplicate)",
        stats.skipped(),
        stats.failed,
        stats.duplicates
    );
    log::info!(
        "    Volumes scanned: {} ({} listing page(s))",
        stats.volumes_scanned,
        stats.pages_scanned
    );
    log::info!(
        "    Review days: mean {}, median {}, min {}, max {}",
        review
            .mean
            .map_or_else(|| "n/a".to_string(), |m| format!("{m:.1}")),
        opt(review.median),
        opt(review.min),
        opt(review.max)
    );
    for (year, entry) in &review.by_year {
        log::info!("    {}: {} article(s), mean {:.1} days", year, entry.count, entry.mean);
    }
    for failure in &summary.shortfalls {
        log::warn!("    Incomplete scope {}: {}", failure.url, failure.reason);
    }
    if let Some(reason) = stats.stopped {
        log::info!("    Stopped early: {:?}", reason);
    }
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    log::info!("Harvester starting...");

    let mut config = Config::load_or_default(&cli.config);
    cli.apply(&mut config);

    if let Err(e) = config.validate() {
        log::error!("Config validation failed: {}", e);
        return Err(e);
    }
    if cli.check_config {
        log::info!("Config OK ({})", cli.config.display());
        return Ok(());
    }

    let mut session: Box<dyn Session> = match &cli.replay {
        Some(dir) => {
            log::info!("Replaying pages from {}", dir.display());
            Box::new(ReplaySession::acquire(dir)?)
        }
        None => Box::new(HttpSession::acquire(&config.session)?),
    };

    let stop = StopSignal::new();
    let signal = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupt received; stopping after the current article");
            signal.stop();
        }
    });

    let result = pipeline::harvest(&config, session.as_mut(), Box::new(TokioSleeper), stop).await?;

    let source = config.site.source_name.clone();
    let export = ExportSet::from_result(&result, source.as_str());
    let summary = RunSummary::from_result(&result, source.as_str());

    if result.records.is_empty() {
        log::warn!("No records harvested");
    }

    let storage = LocalStorage::from_config(&config.output.dir, &config.output);
    let written = storage.write(&export, &summary).await?;
    for file in &written.files {
        log::info!("Saved {}", file.display());
    }

    report(&summary);
    log::info!("Done!");

    Ok(())
}
