use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use jobsift_core::{JobRecord, RecordKey};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const JOBS_FILE: &str = "jobs.json";
pub const STATS_FILE: &str = "stats.json";

const UNKNOWN_SOURCE: &str = "unknown";

#[derive(Debug, Clone, Default)]
struct CompanyEntries {
    ids: Vec<usize>,
    by_title: HashMap<String, usize>,
}

/// Stored records plus hash lookups by url, (company, title) and company.
#[derive(Debug, Clone, Default)]
pub struct RecordIndex {
    records: Vec<JobRecord>,
    by_url: HashMap<String, usize>,
    by_company: HashMap<String, CompanyEntries>,
}

impl RecordIndex {
    pub fn insert(&mut self, record: JobRecord) -> usize {
        let id = self.records.len();
        if !record.url.is_empty() {
            self.by_url.entry(record.url.clone()).or_insert(id);
        }
        let entries = self.by_company.entry(record.company.clone()).or_default();
        entries.ids.push(id);
        entries.by_title.entry(record.title.clone()).or_insert(id);
        self.records.push(record);
        id
    }

    pub fn contains(&self, key: &RecordKey<'_>) -> bool {
        match key {
            RecordKey::Url(url) => !url.is_empty() && self.by_url.contains_key(*url),
            RecordKey::TitleCompany { title, company } => self
                .by_company
                .get(*company)
                .is_some_and(|entries| entries.by_title.contains_key(*title)),
        }
    }

    /// Exact-key duplicate: same non-empty url, or same title and company.
    pub fn contains_record(&self, record: &JobRecord) -> bool {
        record.url_key().is_some_and(|key| self.contains(&key))
            || self.contains(&record.title_company_key())
    }

    pub fn same_company(&self, company: &str) -> Vec<&JobRecord> {
        self.by_company
            .get(company)
            .map(|entries| entries.ids.iter().map(|id| &self.records[*id]).collect())
            .unwrap_or_default()
    }

    pub fn records(&self) -> &[JobRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_jobs: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub sources: BTreeMap<String, usize>,
}

impl StoreStats {
    fn count(&mut self, record: &JobRecord) {
        let source = if record.source.trim().is_empty() {
            UNKNOWN_SOURCE
        } else {
            record.source.as_str()
        };
        *self.sources.entry(source.to_string()).or_default() += 1;
        self.total_jobs += 1;
    }
}

/// Destination for accepted records. Writes are serialized by `&mut self`.
pub trait RecordStore: Send {
    /// Stores the record; false when it is invalid or an exact-key duplicate.
    fn save(&mut self, record: JobRecord) -> bool;
    fn exists(&self, key: &RecordKey<'_>) -> bool;
    fn same_company(&self, company: &str) -> Vec<&JobRecord>;
    fn records(&self) -> &[JobRecord];
    fn stats(&self) -> &StoreStats;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    index: RecordIndex,
    stats: StoreStats,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> &RecordIndex {
        &self.index
    }
}

impl RecordStore for MemoryRecordStore {
    fn save(&mut self, record: JobRecord) -> bool {
        if let Some(field) = record.missing_required_field() {
            debug!(field, url = %record.url, "refusing to store invalid record");
            return false;
        }
        if self.index.contains_record(&record) {
            return false;
        }
        self.stats.count(&record);
        self.stats.last_updated = Some(Utc::now());
        self.index.insert(record);
        true
    }

    fn exists(&self, key: &RecordKey<'_>) -> bool {
        self.index.contains(key)
    }

    fn same_company(&self, company: &str) -> Vec<&JobRecord> {
        self.index.same_company(company)
    }

    fn records(&self) -> &[JobRecord] {
        self.index.records()
    }

    fn stats(&self) -> &StoreStats {
        &self.stats
    }
}

/// Durable store: `jobs.json` and `stats.json` under a data directory.
#[derive(Debug)]
pub struct JsonRecordStore {
    dir: PathBuf,
    inner: MemoryRecordStore,
    dirty: bool,
}

impl JsonRecordStore {
    pub async fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating data directory {}", dir.display()))?;

        let mut inner = MemoryRecordStore::new();
        let jobs_path = dir.join(JOBS_FILE);
        if let Some(bytes) = read_if_exists(&jobs_path).await? {
            let records: Vec<JobRecord> = serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing {}", jobs_path.display()))?;
            let total = records.len();
            let mut skipped = 0usize;
            for record in records {
                if !inner.save(record) {
                    skipped += 1;
                }
            }
            if skipped > 0 {
                warn!(path = %jobs_path.display(), skipped, total, "dropped invalid or duplicate stored records");
            }
        }

        let stats_path = dir.join(STATS_FILE);
        inner.stats.last_updated = match read_if_exists(&stats_path).await? {
            Some(bytes) => {
                let saved: StoreStats = serde_json::from_slice(&bytes)
                    .with_context(|| format!("parsing {}", stats_path.display()))?;
                saved.last_updated
            }
            None => None,
        };

        info!(dir = %dir.display(), records = inner.index.len(), "opened record store");
        Ok(Self {
            dir,
            inner,
            dirty: false,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub async fn persist(&mut self) -> anyhow::Result<()> {
        let jobs = serde_json::to_vec_pretty(self.inner.records()).context("encoding records")?;
        let stats = serde_json::to_vec_pretty(self.inner.stats()).context("encoding stats")?;
        write_atomic(&self.dir.join(JOBS_FILE), &jobs).await?;
        write_atomic(&self.dir.join(STATS_FILE), &stats).await?;
        self.dirty = false;
        debug!(dir = %self.dir.display(), records = self.inner.index.len(), "persisted record store");
        Ok(())
    }
}

impl RecordStore for JsonRecordStore {
    fn save(&mut self, record: JobRecord) -> bool {
        let stored = self.inner.save(record);
        self.dirty |= stored;
        stored
    }

    fn exists(&self, key: &RecordKey<'_>) -> bool {
        self.inner.exists(key)
    }

    fn same_company(&self, company: &str) -> Vec<&JobRecord> {
        self.inner.same_company(company)
    }

    fn records(&self) -> &[JobRecord] {
        self.inner.records()
    }

    fn stats(&self) -> &StoreStats {
        self.inner.stats()
    }
}

async fn read_if_exists(path: &Path) -> anyhow::Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
    }
}

/// Replace `path` via a temp file in the same directory and a rename.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("{} has no parent directory", path.display()))?;
    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));

    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .await
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(bytes)
        .await
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.flush()
        .await
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(err).with_context(|| {
            format!(
                "atomically renaming {} -> {}",
                temp_path.display(),
                path.display()
            )
        });
    }
    Ok(())
}
