//! Batch location pipeline.
//!
//! Resolves raw registry records to coordinates, repairs inconsistent administrative
//! labels, attaches municipalities to cached points and audits enriched files against the
//! province boxes.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use locus::config::Config;
use locus::pipeline::{log_audit, Pipeline};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(about = "Geocode and correct energy registry records")]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

/// Flags that take precedence over the configuration file.
#[derive(ClapArgs, Debug)]
struct Overrides {
    /// Geocode cache file
    #[arg(long, global = true)]
    cache: Option<PathBuf>,

    /// Nominatim search endpoint
    #[arg(long, global = true)]
    provider_url: Option<String>,

    /// Resolutions in flight at once
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// Resolve from the dictionary and fallbacks only
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Attach coordinates and region labels to raw records
    Resolve {
        /// Raw record file, or a directory scanned for *.json
        #[arg(short, long)]
        input: PathBuf,

        /// Output file, or output directory when the input is a directory
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Repair province and county labels of enriched records
    Correct {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        /// Re-geocode name-matched records inside their province before falling back
        #[arg(long)]
        reresolve: bool,

        /// CSV file for records that need a human decision
        #[arg(long)]
        review: Option<PathBuf>,
    },

    /// Reverse-geocode the municipality of cached locations that have none
    Municipalities,

    /// Report records whose coordinates lie outside their province
    Audit {
        #[arg(short, long)]
        input: PathBuf,

        /// Also write the full report as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

impl Overrides {
    fn apply(&self, config: &mut Config) {
        if let Some(cache) = &self.cache {
            config.cache.path = cache.clone();
        }
        if let Some(url) = &self.provider_url {
            config.provider.url = url.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.resolver.concurrency = concurrency;
        }
        if self.offline {
            config.provider.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    let mut config = Config::load_or_default(args.config.as_deref())?;
    args.overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!("Locus ingest");
    info!("Cache: {}", config.cache.path.display());

    let pipeline = Pipeline::from_config(&config)?.with_progress(true);
    let started = Utc::now();

    match args.command {
        Command::Resolve { input, output } => {
            info!("Resolving {} -> {}", input.display(), output.display());
            let summary = pipeline.resolve_path(&input, &output).await?;
            summary.log();
        }
        Command::Correct {
            input,
            output,
            reresolve,
            review,
        } => {
            info!("Correcting {} -> {}", input.display(), output.display());
            let summary = pipeline
                .correct_path(&input, &output, reresolve, review.as_deref())
                .await?;
            summary.log();
        }
        Command::Municipalities => {
            info!("Looking up municipalities for {}", config.cache.path.display());
            let summary = pipeline.enrich_municipalities().await?;
            summary.log();
        }
        Command::Audit { input, json } => {
            let report = pipeline.audit_path(&input)?;
            log_audit(&report);
            if let Some(path) = json {
                let body = serde_json::to_vec_pretty(&report)?;
                std::fs::write(&path, body)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Wrote audit report to {}", path.display());
            }
        }
    }

    let elapsed = Utc::now() - started;
    info!(
        "Done in {}s ({} cached locations)",
        elapsed.num_seconds(),
        pipeline.cache().len()
    );

    Ok(())
}
