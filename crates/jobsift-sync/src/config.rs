use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use jobsift_adapters::SourceFormat;
use jobsift_match::{ConfigError, FilterCriteria, RecordFilter, SignalWeights, SimilarityScorer};
use jobsift_storage::{BackoffPolicy, FetchConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dedup::{DedupMode, Deduplicator};

pub const DEFAULT_CONFIG_FILE: &str = "jobsift.yaml";
pub const DEFAULT_SCHEDULE_CRON: &str = "0 0 */6 * * *";

#[derive(Debug, Error)]
pub enum SyncConfigError {
    #[error("reading config {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },
    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error(transparent)]
    Invalid(#[from] ConfigError),
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub format: SourceFormat,
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// Everything a sync run needs. Loaded from YAML, then overridden by
/// `JOBSIFT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub data_dir: PathBuf,
    pub filter: FilterCriteria,
    pub max_concurrency: usize,
    pub retry_attempts: usize,
    pub backoff_min_seconds: u64,
    pub backoff_max_seconds: u64,
    pub timeout_seconds: u64,
    pub user_agents: Vec<String>,
    pub dedup: DedupMode,
    pub weights: SignalWeights,
    pub sources: Vec<SourceConfig>,
    pub schedule_cron: String,
    pub export_parquet: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let fetch = FetchConfig::default();
        Self {
            data_dir: PathBuf::from("./data"),
            filter: FilterCriteria::default(),
            max_concurrency: fetch.max_concurrency,
            retry_attempts: fetch.backoff.max_attempts,
            backoff_min_seconds: fetch.backoff.min_delay.as_secs(),
            backoff_max_seconds: fetch.backoff.max_delay.as_secs(),
            timeout_seconds: fetch.timeout.as_secs(),
            user_agents: Vec::new(),
            dedup: DedupMode::default(),
            weights: SignalWeights::default(),
            sources: Vec::new(),
            schedule_cron: DEFAULT_SCHEDULE_CRON.to_string(),
            export_parquet: true,
        }
    }
}

impl SyncConfig {
    pub fn load(path: &Path) -> Result<Self, SyncConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| SyncConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&text).map_err(|source| SyncConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Config from `path`, or `jobsift.yaml` in the working directory when it
    /// exists, or defaults; then environment overrides and validation.
    pub fn resolve(path: Option<&Path>) -> Result<Self, SyncConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SyncConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("JOBSIFT_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(value) = lookup("JOBSIFT_MAX_CONCURRENCY") {
            self.max_concurrency = parse_env("JOBSIFT_MAX_CONCURRENCY", &value)?;
        }
        if let Some(value) = lookup("JOBSIFT_TIMEOUT_SECS") {
            self.timeout_seconds = parse_env("JOBSIFT_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("JOBSIFT_DEDUP_MODE") {
            self.dedup = DedupMode::parse(&value).ok_or(SyncConfigError::InvalidEnv {
                key: "JOBSIFT_DEDUP_MODE",
                value,
            })?;
        }
        if let Some(agent) = lookup("JOBSIFT_USER_AGENT") {
            // a single agent pins every request to it
            self.user_agents = vec![agent];
        }
        if let Some(cron) = lookup("JOBSIFT_SCHEDULE_CRON") {
            self.schedule_cron = cron;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), SyncConfigError> {
        self.weights.validate()?;
        self.dedup.validate()?;
        self.build_filter()?;

        if self.max_concurrency == 0 {
            return Err(invalid("max_concurrency", "must be at least 1"));
        }
        if self.retry_attempts == 0 {
            return Err(invalid("retry_attempts", "must be at least 1"));
        }
        if self.timeout_seconds == 0 {
            return Err(invalid("timeout_seconds", "must be at least 1"));
        }
        if self.backoff_min_seconds > self.backoff_max_seconds {
            return Err(invalid(
                "backoff_min_seconds",
                format!(
                    "{} exceeds backoff_max_seconds {}",
                    self.backoff_min_seconds, self.backoff_max_seconds
                ),
            ));
        }
        if let Some(source) = self.sources.iter().find(|s| s.source_id.trim().is_empty()) {
            return Err(invalid(
                "sources",
                format!("source with urls {:?} has no source_id", source.urls),
            ));
        }
        Ok(())
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout: Duration::from_secs(self.timeout_seconds),
            max_concurrency: self.max_concurrency,
            backoff: BackoffPolicy {
                max_attempts: self.retry_attempts,
                min_delay: Duration::from_secs(self.backoff_min_seconds),
                max_delay: Duration::from_secs(self.backoff_max_seconds),
            },
            user_agents: self.user_agents.clone(),
        }
    }

    pub fn build_filter(&self) -> Result<RecordFilter, ConfigError> {
        RecordFilter::with_scorer(
            self.filter.clone(),
            SimilarityScorer::with_weights(self.weights)?,
        )
    }

    pub fn build_deduplicator(&self) -> Result<Deduplicator, ConfigError> {
        Deduplicator::with_scorer(self.dedup, SimilarityScorer::with_weights(self.weights)?)
    }

    pub fn enabled_sources(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|source| source.enabled)
    }
}

fn parse_env<T: FromStr>(key: &'static str, value: &str) -> Result<T, SyncConfigError> {
    value.trim().parse().map_err(|_| SyncConfigError::InvalidEnv {
        key,
        value: value.to_string(),
    })
}

fn invalid(field: &'static str, reason: impl Into<String>) -> SyncConfigError {
    SyncConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
data_dir: /var/lib/jobsift
filter:
  keywords: [rust, backend]
  exclude_keywords: [intern]
  min_salary: 120000
max_concurrency: 4
dedup:
  mode: fuzzy
  threshold: 85
sources:
  - source_id: acme-careers
    format: json-ld
    urls: ["https://acme.example/careers"]
  - source_id: globex
    format: json-feed
    urls: ["https://globex.example/jobs.json"]
    enabled: false
"#;

    #[test]
    fn yaml_fills_unset_fields_with_defaults() {
        let config: SyncConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/jobsift"));
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.timeout_seconds, 30);
        assert_eq!(config.dedup, DedupMode::Fuzzy { threshold: 85.0 });
        assert_eq!(config.filter.min_salary, Some(120_000.0));
        assert!(config.filter.keywords.contains("backend"));
        assert_eq!(config.filter.fuzzy_threshold, 80.0);
        assert_eq!(config.schedule_cron, DEFAULT_SCHEDULE_CRON);

        let enabled: Vec<_> = config.enabled_sources().map(|s| s.source_id.as_str()).collect();
        assert_eq!(enabled, ["acme-careers"]);
        assert_eq!(config.sources[0].format, SourceFormat::JsonLd);
        config.validate().unwrap();
    }

    #[test]
    fn built_components_follow_config() {
        let config: SyncConfig = serde_yaml::from_str(SAMPLE).unwrap();
        let filter = config.build_filter().unwrap();
        assert_eq!(filter.criteria(), &config.filter);
        let dedup = config.build_deduplicator().unwrap();
        assert_eq!(dedup.mode(), DedupMode::Fuzzy { threshold: 85.0 });
    }

    #[test]
    fn env_overrides_take_precedence() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("JOBSIFT_DATA_DIR", "/tmp/jobs"),
            ("JOBSIFT_MAX_CONCURRENCY", "16"),
            ("JOBSIFT_TIMEOUT_SECS", " 5 "),
            ("JOBSIFT_DEDUP_MODE", "exact"),
            ("JOBSIFT_USER_AGENT", "jobsift-test/1.0"),
            ("JOBSIFT_SCHEDULE_CRON", "0 30 7 * * *"),
        ]);
        let mut config: SyncConfig = serde_yaml::from_str(SAMPLE).unwrap();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/jobs"));
        assert_eq!(config.max_concurrency, 16);
        assert_eq!(config.timeout_seconds, 5);
        assert_eq!(config.dedup, DedupMode::Exact);
        assert_eq!(config.user_agents, ["jobsift-test/1.0"]);
        assert_eq!(config.schedule_cron, "0 30 7 * * *");
    }

    #[test]
    fn malformed_env_values_are_errors() {
        let mut config = SyncConfig::default();
        let err = config
            .apply_env(|key| (key == "JOBSIFT_MAX_CONCURRENCY").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            SyncConfigError::InvalidEnv { key: "JOBSIFT_MAX_CONCURRENCY", .. }
        ));

        let err = config
            .apply_env(|key| (key == "JOBSIFT_DEDUP_MODE").then(|| "loose".to_string()))
            .unwrap_err();
        assert!(matches!(err, SyncConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn validation_rejects_bad_settings() {
        let mut config = SyncConfig::default();
        config.weights.ratio = 0.9;
        assert!(matches!(
            config.validate(),
            Err(SyncConfigError::Invalid(ConfigError::InvalidWeights(_)))
        ));

        let mut config = SyncConfig::default();
        config.filter.fuzzy_threshold = 140.0;
        assert!(matches!(
            config.validate(),
            Err(SyncConfigError::Invalid(ConfigError::InvalidThreshold(_)))
        ));

        let config = SyncConfig {
            max_concurrency: 0,
            ..SyncConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(SyncConfigError::InvalidValue { field: "max_concurrency", .. })
        ));

        let config = SyncConfig {
            backoff_min_seconds: 20,
            ..SyncConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn fetch_config_carries_retry_policy() {
        let config = SyncConfig {
            retry_attempts: 5,
            backoff_min_seconds: 1,
            backoff_max_seconds: 3,
            timeout_seconds: 12,
            ..SyncConfig::default()
        };
        let fetch = config.fetch_config();
        assert_eq!(fetch.timeout, Duration::from_secs(12));
        assert_eq!(fetch.backoff.max_attempts, 5);
        assert_eq!(fetch.backoff.delay_for_retry(0), Duration::from_secs(1));
        assert_eq!(fetch.backoff.delay_for_retry(3), Duration::from_secs(3));
        assert_eq!(fetch.max_concurrency, 8);
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = SyncConfig::load(Path::new("/nonexistent/jobsift.yaml")).unwrap_err();
        assert!(matches!(err, SyncConfigError::Read { .. }));
    }
}
