use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod ingest;
mod source;
mod tracking;
mod utils;

use config::{Config, DEFAULT_OUTPUT_DIR, DEFAULT_SOURCE_PREFIX, DEFAULT_SOURCE_SUFFIX};
use ingest::{Ingestor, RunSummary};
use tracking::TrackingStore;
use utils::http::HttpFetcher;

/// Download aircraft images listed in plane-alert CSV files, skipping any already fetched
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download every image URL not yet recorded in the tracking file
    Fetch {
        /// Directory containing the input CSV files
        #[arg(short, long, default_value = ".")]
        input_dir: PathBuf,

        /// Directory images and the tracking file are written to
        #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,

        /// Only read input files whose names start with this
        #[arg(long, default_value = DEFAULT_SOURCE_PREFIX)]
        prefix: String,

        /// Only read input files whose names end with this
        #[arg(long, default_value = DEFAULT_SOURCE_SUFFIX)]
        suffix: String,

        /// Stop after this many new downloads (0 means no limit)
        #[arg(short, long)]
        limit: Option<usize>,

        /// Seconds to wait for a server before giving up on an image
        #[arg(short, long, default_value_t = config::DEFAULT_TIMEOUT_SECS)]
        timeout: u64,
    },
    /// Show how many images are already tracked
    Status {
        /// Directory holding the tracking file
        #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Fetch {
            input_dir,
            output_dir,
            prefix,
            suffix,
            limit,
            timeout,
        } => {
            let config = Config {
                input_dir,
                output_dir,
                source_prefix: prefix,
                source_suffix: suffix,
                limit,
                timeout: Duration::from_secs(timeout),
                ..Config::default()
            };
            info!("Input: {}", config.input_dir.display());
            info!("Output: {}", config.output_dir.display());

            let fetcher =
                HttpFetcher::new(config.timeout).context("Failed to build HTTP client")?;
            let mut ingestor = Ingestor::new(config, fetcher);
            let summary = ingestor.run().await.context("Download run aborted")?;

            report(&summary);
            info!("Tracking {} images in total", ingestor.mapping().len());
        }
        Commands::Status { output_dir } => {
            let config = Config {
                output_dir,
                ..Config::default()
            };
            let store = TrackingStore::new(config.tracking_path());
            let mapping = store
                .load()
                .with_context(|| format!("Failed to load {}", store.path().display()))?;
            let stats = tracking::summarize(&mapping);

            println!("Tracked images: {}", stats.total);
            if !stats.by_source.is_empty() {
                println!("\nBy input file:");
                for (csv_file, count) in &stats.by_source {
                    println!("  - {}: {}", csv_file, count);
                }
                println!("\nBy column:");
                for (column, count) in &stats.by_column {
                    println!("  - {}: {}", column, count);
                }
            }
        }
    }

    Ok(())
}

fn report(summary: &RunSummary) {
    if !summary.source_failures.is_empty() {
        warn!("Skipped {} unreadable input files:", summary.source_failures.len());
        for failure in &summary.source_failures {
            warn!("  - {}: {}", failure.csv_file, failure.reason);
        }
    }

    if !summary.download_failures.is_empty() {
        warn!("Failed to download {} images:", summary.download_failures.len());
        for failure in &summary.download_failures {
            warn!(
                "  - {} ({} in {}): {}",
                failure.url, failure.column, failure.csv_file, failure.reason
            );
        }
    }

    if summary.limit_reached {
        info!("Reached the download limit, stopped early");
    }

    info!(
        "Download process completed. Processed {} entries, newly downloaded images: {}",
        summary.processed_count, summary.newly_downloaded_count
    );
}
