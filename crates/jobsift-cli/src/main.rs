use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobsift_match::{RecordFilter, SimilarityScorer};
use jobsift_storage::{JsonRecordStore, RecordStore};
use jobsift_sync::{build_scheduler, query, SyncConfig, SyncRunner};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jobsift")]
#[command(about = "Fetch, filter and deduplicate job postings")]
struct Cli {
    /// YAML config file; `./jobsift.yaml` is used when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one sync and print its summary.
    Sync,
    /// Run syncs on a cron schedule until Ctrl-C.
    Watch {
        /// Six-field cron expression; overrides `schedule_cron`.
        #[arg(long)]
        cron: Option<String>,
        /// Also run one sync right away.
        #[arg(long)]
        now: bool,
    },
    /// Stored records, most relevant first.
    Query {
        /// Replace the configured keywords.
        keywords: Vec<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Per-signal similarity of two job titles.
    Score { a: String, b: String },
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = jobsift_sync::run_sync_once(load_config(config_path)?).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Watch { cron, now } => watch(load_config(config_path)?, cron, now).await?,
        Commands::Query { keywords, limit } => {
            let config = load_config(config_path)?;
            let mut criteria = config.filter.clone();
            if !keywords.is_empty() {
                criteria.keywords = keywords.into_iter().collect();
            }
            let filter =
                RecordFilter::with_scorer(criteria, SimilarityScorer::with_weights(config.weights)?)
                    .context("building query filter")?;
            let store = JsonRecordStore::open(&config.data_dir).await?;
            for ranked in query(&store, &filter).into_iter().take(limit) {
                let record = ranked.record;
                println!(
                    "{:>6.1}  {} | {} | {} | {}",
                    ranked.relevance, record.title, record.company, record.location, record.url
                );
            }
        }
        Commands::Score { a, b } => {
            let config = load_config(config_path)?;
            let scorer = SimilarityScorer::with_weights(config.weights)?;
            println!("{}", serde_json::to_string_pretty(&scorer.breakdown(&a, &b))?);
        }
        Commands::Stats => {
            let config = load_config(config_path)?;
            let store = JsonRecordStore::open(&config.data_dir).await?;
            println!("{}", serde_json::to_string_pretty(store.stats())?);
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    SyncConfig::resolve(path).context("loading jobsift config")
}

async fn watch(config: SyncConfig, cron: Option<String>, now: bool) -> Result<()> {
    let cron = cron.unwrap_or_else(|| config.schedule_cron.clone());
    let runner = Arc::new(SyncRunner::new(config)?);
    let mut sched = build_scheduler(runner.clone(), &cron).await?;
    sched.start().await.context("starting scheduler")?;
    info!(cron = %cron, "watching for scheduled syncs; Ctrl-C stops");

    let initial = now.then(|| {
        let runner = runner.clone();
        tokio::spawn(async move { runner.run_once().await })
    });

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    info!("stopping sync runner");
    runner.stop();
    sched.shutdown().await.context("stopping scheduler")?;

    if let Some(handle) = initial {
        match handle.await.context("joining initial sync")? {
            Ok(summary) => info!(run_id = %summary.run_id, "initial sync finished"),
            Err(err) => warn!(error = %format!("{err:#}"), "initial sync failed"),
        }
    }
    Ok(())
}
