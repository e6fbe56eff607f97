//! Ingestion pipeline, sync runs, Parquet snapshots and scheduling.

mod config;
mod dedup;
mod export;

pub use config::{
    SourceConfig, SyncConfig, SyncConfigError, DEFAULT_CONFIG_FILE, DEFAULT_SCHEDULE_CRON,
};
pub use dedup::{DedupMode, Deduplicator, DuplicateReason};
pub use export::{export_snapshot, ParquetManifest, ParquetManifestFile, MANIFEST_FILE};

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use jobsift_adapters::{extractor_for_format, RecordExtractor};
use jobsift_core::JobRecord;
use jobsift_match::{FilterDecision, RecordFilter, RejectReason};
use jobsift_storage::{
    FetchOrchestrator, JsonRecordStore, PageClient, RecordStore, ReqwestPageClient,
};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "jobsift-sync";

/// Subdirectory of the data dir holding one Parquet snapshot per run.
pub const SNAPSHOTS_DIR: &str = "snapshots";

#[derive(Debug, Clone, Copy)]
pub struct RankedRecord<'a> {
    pub relevance: f64,
    pub record: &'a JobRecord,
}

/// Stored records accepted by `filter`, most relevant first. Ties keep
/// insertion order.
pub fn query<'a, S: RecordStore + ?Sized>(store: &'a S, filter: &RecordFilter) -> Vec<RankedRecord<'a>> {
    let mut ranked: Vec<_> = store
        .records()
        .iter()
        .filter(|record| filter.matches(record))
        .map(|record| RankedRecord {
            relevance: filter.relevance(record),
            record,
        })
        .collect();
    ranked.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
    ranked
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Stored,
    Invalid(&'static str),
    Filtered(RejectReason),
    Duplicate(DuplicateReason),
    /// The store refused a record that passed every check.
    StoreRejected,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub received: usize,
    pub accepted: usize,
    pub invalid: usize,
    pub filtered: usize,
    pub duplicates: usize,
}

/// Single writer in front of a [`RecordStore`]: validate, filter, dedup, save.
#[derive(Debug)]
pub struct IngestionPipeline<S> {
    filter: RecordFilter,
    dedup: Deduplicator,
    store: S,
    report: IngestReport,
}

impl<S: RecordStore> IngestionPipeline<S> {
    pub fn new(filter: RecordFilter, dedup: Deduplicator, store: S) -> Self {
        Self {
            filter,
            dedup,
            store,
            report: IngestReport::default(),
        }
    }

    pub fn ingest(&mut self, record: JobRecord) -> IngestOutcome {
        self.report.received += 1;

        if let Some(field) = record.missing_required_field() {
            self.report.invalid += 1;
            debug!(field, url = %record.url, "candidate missing required field");
            return IngestOutcome::Invalid(field);
        }
        if let FilterDecision::Reject(reason) = self.filter.evaluate(&record) {
            self.report.filtered += 1;
            debug!(title = %record.title, %reason, "candidate filtered");
            return IngestOutcome::Filtered(reason);
        }
        if let Some(reason) = self.dedup.check(&record, &self.store) {
            self.report.duplicates += 1;
            debug!(title = %record.title, company = %record.company, ?reason, "duplicate candidate");
            return IngestOutcome::Duplicate(reason);
        }

        if self.store.save(record) {
            self.report.accepted += 1;
            IngestOutcome::Stored
        } else {
            self.report.duplicates += 1;
            IngestOutcome::StoreRejected
        }
    }

    pub fn ingest_all<I: IntoIterator<Item = JobRecord>>(&mut self, records: I) -> IngestReport {
        for record in records {
            self.ingest(record);
        }
        self.report
    }

    pub fn report(&self) -> IngestReport {
        self.report
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn ranked(&self) -> Vec<RankedRecord<'_>> {
        query(&self.store, &self.filter)
    }

    pub fn into_parts(self) -> (S, IngestReport) {
        (self.store, self.report)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sources: usize,
    pub urls: usize,
    pub fetch_successes: usize,
    pub fetch_failures: usize,
    pub extraction_errors: usize,
    pub extracted: usize,
    pub ingest: IngestReport,
    pub total_jobs: usize,
    pub parquet_manifest: Option<String>,
}

/// Fetch, extract, ingest, persist and snapshot, one run at a time.
pub struct SyncRunner<C: PageClient = ReqwestPageClient> {
    config: SyncConfig,
    orchestrator: FetchOrchestrator<C>,
    run_lock: Mutex<()>,
}

impl SyncRunner<ReqwestPageClient> {
    pub fn new(config: SyncConfig) -> Result<Self> {
        config.validate().context("validating sync config")?;
        let orchestrator = FetchOrchestrator::new(config.fetch_config())?;
        Ok(Self::from_parts(config, orchestrator))
    }
}

impl<C: PageClient> SyncRunner<C> {
    pub fn with_client(client: C, config: SyncConfig) -> Result<Self> {
        config.validate().context("validating sync config")?;
        let orchestrator = FetchOrchestrator::with_client(client, config.fetch_config());
        Ok(Self::from_parts(config, orchestrator))
    }

    fn from_parts(config: SyncConfig, orchestrator: FetchOrchestrator<C>) -> Self {
        Self {
            config,
            orchestrator,
            run_lock: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Stops new fetch attempts for the current and all later runs.
    pub fn stop(&self) {
        self.orchestrator.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.orchestrator.is_stopped()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.orchestrator.cancellation_token()
    }

    pub async fn run_once(&self) -> Result<SyncRunSummary> {
        let _running = self.run_lock.lock().await;
        let run_id = Uuid::new_v4();
        self.run(run_id)
            .instrument(info_span!("sync_run", %run_id))
            .await
    }

    async fn run(&self, run_id: Uuid) -> Result<SyncRunSummary> {
        let started_at = Utc::now();
        let filter = self.config.build_filter().context("building record filter")?;
        let dedup = self
            .config
            .build_deduplicator()
            .context("building deduplicator")?;
        let store = JsonRecordStore::open(&self.config.data_dir).await?;
        let mut pipeline = IngestionPipeline::new(filter, dedup, store);

        let sources: Vec<&SourceConfig> = self.config.enabled_sources().collect();
        let extractors: Vec<Box<dyn RecordExtractor>> = sources
            .iter()
            .map(|source| extractor_for_format(source.format, &source.source_id))
            .collect();
        let mut extractor_by_url: HashMap<&str, usize> = HashMap::new();
        let mut urls = Vec::new();
        for (idx, source) in sources.iter().enumerate() {
            for url in &source.urls {
                match extractor_by_url.entry(url.as_str()) {
                    Entry::Vacant(slot) => {
                        slot.insert(idx);
                        urls.push(url.clone());
                    }
                    Entry::Occupied(first) => warn!(
                        url = %url,
                        source_id = %source.source_id,
                        first_source = %sources[*first.get()].source_id,
                        "url listed by more than one source; keeping the first"
                    ),
                }
            }
        }
        info!(sources = sources.len(), urls = urls.len(), "starting sync run");

        let url_count = urls.len();
        let mut fetch_successes = 0usize;
        let mut fetch_failures = 0usize;
        let mut extraction_errors = 0usize;
        let mut extracted = 0usize;

        let mut results = self.orchestrator.spawn_fetches(urls);
        while let Some(result) = results.recv().await {
            let page = match result.outcome {
                Ok(page) => page,
                Err(err) => {
                    fetch_failures += 1;
                    warn!(url = %result.url, attempts = result.attempts, error = %err, "fetch failed");
                    continue;
                }
            };
            fetch_successes += 1;

            let Some(extractor) = extractor_by_url
                .get(result.url.as_str())
                .map(|idx| &extractors[*idx])
            else {
                continue;
            };
            match extractor.extract(&page) {
                Ok(records) => {
                    debug!(url = %page.url, source_id = extractor.source_id(), records = records.len(), "extracted page");
                    extracted += records.len();
                    pipeline.ingest_all(records);
                }
                Err(err) => {
                    extraction_errors += 1;
                    warn!(url = %page.url, source_id = extractor.source_id(), error = %err, "extraction failed");
                }
            }
        }

        pipeline
            .store_mut()
            .persist()
            .await
            .context("persisting record store")?;

        let parquet_manifest = if self.config.export_parquet {
            let dir = self
                .config
                .data_dir
                .join(SNAPSHOTS_DIR)
                .join(run_id.to_string());
            let ranked = pipeline.ranked();
            let manifest = export_snapshot(&dir, run_id, &ranked, pipeline.store().stats())
                .context("exporting parquet snapshot")?;
            Some(manifest.display().to_string())
        } else {
            None
        };

        let ingest = pipeline.report();
        let summary = SyncRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            sources: sources.len(),
            urls: url_count,
            fetch_successes,
            fetch_failures,
            extraction_errors,
            extracted,
            ingest,
            total_jobs: pipeline.store().stats().total_jobs,
            parquet_manifest,
        };
        info!(
            fetched = summary.fetch_successes,
            failed = summary.fetch_failures,
            extracted = summary.extracted,
            accepted = ingest.accepted,
            duplicates = ingest.duplicates,
            filtered = ingest.filtered,
            invalid = ingest.invalid,
            "sync run finished"
        );
        Ok(summary)
    }
}

pub async fn run_sync_once(config: SyncConfig) -> Result<SyncRunSummary> {
    SyncRunner::new(config)?.run_once().await
}

/// Registers `runner` on `cron` (six fields, seconds first). The caller
/// starts and shuts down the returned scheduler.
pub async fn build_scheduler<C: PageClient>(
    runner: Arc<SyncRunner<C>>,
    cron: &str,
) -> Result<JobScheduler> {
    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job = Job::new_async(cron, move |_uuid, _l| {
        let runner = runner.clone();
        Box::pin(async move {
            if runner.is_stopped() {
                debug!("sync runner stopped; skipping scheduled run");
                return;
            }
            match runner.run_once().await {
                Ok(summary) => info!(
                    run_id = %summary.run_id,
                    accepted = summary.ingest.accepted,
                    "scheduled sync finished"
                ),
                Err(err) => warn!(error = %format!("{err:#}"), "scheduled sync failed"),
            }
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(sched)
}
