//! # Newswire CLI
//!
//! Batch entry points for the feed-aggregation pipeline:
//!
//! - `aggregate [category]` — run the pipeline over `<category>.json` and
//!   write `feed/<category>.json` plus `report.json`
//! - `csv-to-json <out>` — convert the registry CSV into the feed input
//!   mapping and the client sources list
//! - `check-report` — validate `report.json`; non-zero exit on violation
//!
//! A hidden `thumbnail-worker` subcommand hosts the sandboxed image codec;
//! the pipeline re-executes its own binary with it.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use newswire_config::Config;
use newswire_core::aggregate::{FeedPipeline, PipelineOptions};
use newswire_core::registry;
use newswire_core::report::{RunReport, check_report};
use newswire_core::sandbox::run_thumbnail_worker;
use newswire_core::shard_by_category;
use newswire_core::store::{ObjectStore, S3Store};

#[derive(Parser, Debug)]
#[command(name = "newswire", version, about = "Publisher feed aggregation pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Aggregate one category's feeds into feed/<category>.json.
    Aggregate {
        /// Input mapping is read from <category>.json.
        #[arg(default_value = "feed")]
        category: String,
        /// Also write per-category shards under feed/category/.
        #[arg(long)]
        shards: bool,
    },
    /// Convert <SOURCES_FILE>.csv into the feed input mapping and sources.json.
    CsvToJson {
        /// Output path of the feed input mapping.
        out: PathBuf,
    },
    /// Validate report.json.
    CheckReport,
    /// Sandboxed thumbnail codec child (internal).
    #[command(hide = true)]
    ThumbnailWorker {
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        #[arg(long)]
        out_size: usize,
        #[arg(long)]
        cache_path: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from_env();
    init_tracing(&config);

    match cli.command {
        Command::ThumbnailWorker {
            width,
            height,
            out_size,
            cache_path,
        } => run_thumbnail_worker(width, height, out_size, &cache_path),
        command => {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime,
                Err(err) => {
                    error!("failed to start runtime: {err}");
                    return ExitCode::FAILURE;
                }
            };
            match runtime.block_on(run(command, config)) {
                Ok(code) => code,
                Err(err) => {
                    error!("{err:#}");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

async fn run(command: Command, config: Config) -> Result<ExitCode> {
    match command {
        Command::Aggregate { category, shards } => aggregate(&config, &category, shards).await,
        Command::CsvToJson { out } => csv_to_json(&config, &out).await,
        Command::CheckReport => Ok(report_exit_code()?),
        Command::ThumbnailWorker { .. } => unreachable!("handled before runtime start"),
    }
}

async fn aggregate(config: &Config, category: &str, shards: bool) -> Result<ExitCode> {
    info!("using {} workers for parallel stages", config.concurrency);

    let input_path = format!("{category}.json");
    let feeds = registry::load_feed_input(Path::new(&input_path))
        .with_context(|| format!("reading feed input {input_path}"))?;

    let store = make_store(config).await;
    let options = PipelineOptions {
        concurrency: config.concurrency,
        pcdn_url_base: config.pcdn_url_base.clone(),
        private_bucket: config.priv_s3_bucket.clone(),
        cache_dir: PathBuf::from("feed/cache"),
        worker_exe: None,
    };
    let mut pipeline = FeedPipeline::new(options, store.clone())?;

    std::fs::create_dir_all("feed").context("creating feed directory")?;
    let items = pipeline.aggregate(&feeds).await?;

    // Write-to-tmp then copy so readers never observe a partial feed.
    let out_path = format!("feed/{category}.json");
    let tmp_path = format!("feed/{category}.json-tmp");
    std::fs::write(&tmp_path, serde_json::to_string(&items)?)
        .with_context(|| format!("writing {tmp_path}"))?;
    std::fs::copy(&tmp_path, &out_path).with_context(|| format!("replacing {out_path}"))?;

    if shards {
        std::fs::create_dir_all("feed/category").context("creating shard directory")?;
        for (shard, shard_items) in shard_by_category(items) {
            let shard_path = format!("feed/category/{shard}.json");
            std::fs::write(&shard_path, serde_json::to_string(&shard_items)?)
                .with_context(|| format!("writing {shard_path}"))?;
        }
    }

    if let Some(store) = &store {
        let feed_key = format!(
            "brave-today/{category}{}.json",
            sources_suffix(&config.sources_file)
        );
        store
            .upload(Path::new(&out_path), &config.pub_s3_bucket, &feed_key)
            .await?;
    }

    std::fs::write("report.json", serde_json::to_string(pipeline.report())?)
        .context("writing report.json")?;
    Ok(ExitCode::SUCCESS)
}

async fn csv_to_json(config: &Config, out: &Path) -> Result<ExitCode> {
    let csv_path = format!("{}.csv", config.sources_file);
    let artifacts = registry::load_registry_csv(Path::new(&csv_path))
        .with_context(|| format!("reading registry {csv_path}"))?;

    std::fs::write(out, serde_json::to_string(&artifacts.by_url)?)
        .with_context(|| format!("writing {}", out.display()))?;
    std::fs::write("sources.json", serde_json::to_string(&artifacts.sources)?)
        .context("writing sources.json")?;

    if let Some(store) = make_store(config).await {
        store
            .upload(
                Path::new("sources.json"),
                &config.pub_s3_bucket,
                &format!("{}.json", config.sources_file),
            )
            .await?;
    }
    Ok(ExitCode::SUCCESS)
}

fn report_exit_code() -> Result<ExitCode> {
    let raw = std::fs::read_to_string("report.json").context("reading report.json")?;
    let report: RunReport = serde_json::from_str(&raw).context("parsing report.json")?;
    Ok(if check_report(&report) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn make_store(config: &Config) -> Option<Arc<dyn ObjectStore>> {
    if config.no_upload {
        return None;
    }
    Some(Arc::new(S3Store::from_env().await))
}

/// Upload-key suffix derived from the registry basename: the part after
/// the `sources` prefix (`sources` -> ``, `sources_en` -> `_en`).
fn sources_suffix(sources_file: &str) -> &str {
    sources_file.strip_prefix("sources").unwrap_or(sources_file)
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.log_directive()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
