use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{BooleanArray, Float64Array, RecordBatch, StringArray, UInt64Array};
use arrow_schema::{DataType, Field as ArrowField, Schema};
use chrono::{DateTime, Utc};
use jobsift_core::JobRecord;
use jobsift_storage::{sha256_hex, StoreStats};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::RankedRecord;

pub const MANIFEST_FILE: &str = "manifest.json";
const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifest {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub files: Vec<ParquetManifestFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetManifestFile {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
    pub rows: usize,
}

/// Write `jobs.parquet` (ranked) and `sources.parquet` under `dir`, plus a
/// manifest with sha256 digests. Returns the manifest path.
pub fn export_snapshot(
    dir: &Path,
    run_id: Uuid,
    ranked: &[RankedRecord<'_>],
    stats: &StoreStats,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;

    let jobs_path = dir.join("jobs.parquet");
    let sources_path = dir.join("sources.parquet");
    write_jobs_parquet(&jobs_path, ranked)?;
    write_sources_parquet(&sources_path, stats)?;

    let manifest = ParquetManifest {
        schema_version: SCHEMA_VERSION,
        run_id,
        generated_at: Utc::now(),
        files: vec![
            manifest_entry("jobs", dir, &jobs_path, ranked.len())?,
            manifest_entry("sources", dir, &sources_path, stats.sources.len())?,
        ],
    };

    let manifest_path = dir.join(MANIFEST_FILE);
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
    fs::write(&manifest_path, bytes)
        .with_context(|| format!("writing {}", manifest_path.display()))?;
    Ok(manifest_path)
}

fn write_parquet(path: &Path, batch: RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

fn text_column(ranked: &[RankedRecord<'_>], field: impl Fn(&JobRecord) -> &str) -> StringArray {
    StringArray::from(
        ranked
            .iter()
            .map(|r| field(r.record))
            .collect::<Vec<_>>(),
    )
}

fn write_jobs_parquet(path: &Path, ranked: &[RankedRecord<'_>]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("title", DataType::Utf8, false),
        ArrowField::new("company", DataType::Utf8, false),
        ArrowField::new("location", DataType::Utf8, false),
        ArrowField::new("url", DataType::Utf8, false),
        ArrowField::new("source", DataType::Utf8, false),
        ArrowField::new("salary_floor", DataType::Float64, true),
        ArrowField::new("job_type", DataType::Utf8, true),
        ArrowField::new("experience_level", DataType::Utf8, true),
        ArrowField::new("remote", DataType::Boolean, true),
        ArrowField::new("date_posted", DataType::Utf8, true),
        ArrowField::new("skills", DataType::Utf8, false),
        ArrowField::new("relevance", DataType::Float64, false),
    ]));

    let titles = text_column(ranked, |r| &r.title);
    let companies = text_column(ranked, |r| &r.company);
    let locations = text_column(ranked, |r| &r.location);
    let urls = text_column(ranked, |r| &r.url);
    let sources = text_column(ranked, |r| &r.source);

    let salary_floors = Float64Array::from(
        ranked
            .iter()
            .map(|r| r.record.salary.as_ref().and_then(|s| s.floor()))
            .collect::<Vec<_>>(),
    );
    let job_types = StringArray::from(
        ranked
            .iter()
            .map(|r| r.record.job_type.as_ref().map(|t| t.label()))
            .collect::<Vec<_>>(),
    );
    let levels = StringArray::from(
        ranked
            .iter()
            .map(|r| r.record.experience_level.as_ref().map(|l| l.label()))
            .collect::<Vec<_>>(),
    );
    let remote = BooleanArray::from(ranked.iter().map(|r| r.record.remote).collect::<Vec<_>>());
    let dates = StringArray::from(
        ranked
            .iter()
            .map(|r| r.record.date_posted.map(|d| d.to_rfc3339()))
            .collect::<Vec<_>>(),
    );
    let skills = StringArray::from(
        ranked
            .iter()
            .map(|r| {
                r.record
                    .skills
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect::<Vec<_>>(),
    );
    let relevance = Float64Array::from(ranked.iter().map(|r| r.relevance).collect::<Vec<_>>());

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(titles),
            Arc::new(companies),
            Arc::new(locations),
            Arc::new(urls),
            Arc::new(sources),
            Arc::new(salary_floors),
            Arc::new(job_types),
            Arc::new(levels),
            Arc::new(remote),
            Arc::new(dates),
            Arc::new(skills),
            Arc::new(relevance),
        ],
    )
    .context("building jobs record batch")?;
    write_parquet(path, batch)
}

fn write_sources_parquet(path: &Path, stats: &StoreStats) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        ArrowField::new("source", DataType::Utf8, false),
        ArrowField::new("jobs", DataType::UInt64, false),
    ]));
    let names = StringArray::from(stats.sources.keys().map(String::as_str).collect::<Vec<_>>());
    let counts = UInt64Array::from(
        stats
            .sources
            .values()
            .map(|count| *count as u64)
            .collect::<Vec<_>>(),
    );
    let batch = RecordBatch::try_new(schema, vec![Arc::new(names), Arc::new(counts)])
        .context("building sources record batch")?;
    write_parquet(path, batch)
}

fn manifest_entry(name: &str, dir: &Path, path: &Path, rows: usize) -> Result<ParquetManifestFile> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let rel = path.strip_prefix(dir).unwrap_or(path).display().to_string();
    Ok(ParquetManifestFile {
        name: name.to_string(),
        path: rel,
        sha256: sha256_hex(&bytes),
        bytes: bytes.len() as u64,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsift_core::{JobType, Salary};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::tempdir;

    #[test]
    fn snapshot_round_trips_rows_and_digests() {
        let dir = tempdir().expect("tempdir");
        let first = JobRecord::new("Rust Engineer", "Acme", "Remote", "https://acme.example/1")
            .with_source("acme")
            .with_salary(Salary::Text("$150K".into()))
            .with_job_type(JobType::FullTime)
            .with_skills(["rust", "tokio"]);
        let second = JobRecord::new("Barista", "Cafe", "Berlin", "https://cafe.example/2");
        let ranked = vec![
            RankedRecord {
                relevance: 91.0,
                record: &first,
            },
            RankedRecord {
                relevance: 4.5,
                record: &second,
            },
        ];
        let mut stats = StoreStats::default();
        stats.sources.insert("acme".into(), 1);
        stats.sources.insert("unknown".into(), 1);

        let run_id = Uuid::new_v4();
        let manifest_path = export_snapshot(dir.path(), run_id, &ranked, &stats).expect("export");

        let manifest: ParquetManifest =
            serde_json::from_slice(&std::fs::read(&manifest_path).unwrap()).unwrap();
        assert_eq!(manifest.run_id, run_id);
        assert_eq!(manifest.files.len(), 2);
        for entry in &manifest.files {
            let bytes = std::fs::read(dir.path().join(&entry.path)).unwrap();
            assert_eq!(entry.sha256, sha256_hex(&bytes));
            assert_eq!(entry.bytes, bytes.len() as u64);
        }

        let file = File::open(dir.path().join("jobs.parquet")).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let rows: usize = reader.map(|batch| batch.unwrap().num_rows()).sum();
        assert_eq!(rows, 2);
    }
}
