use jobsift_core::JobRecord;
use jobsift_match::{validate_threshold, ConfigError, SimilarityScorer, DEFAULT_FUZZY_THRESHOLD};
use jobsift_storage::RecordStore;
use serde::{Deserialize, Serialize};
use tracing::debug;

fn default_threshold() -> f64 {
    DEFAULT_FUZZY_THRESHOLD
}

/// `Exact` compares url and (title, company) keys only. `Fuzzy` also treats a
/// same-company record with a similar enough title as a duplicate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DedupMode {
    #[default]
    Exact,
    Fuzzy {
        #[serde(default = "default_threshold")]
        threshold: f64,
    },
}

impl DedupMode {
    /// `exact`, `fuzzy` or `fuzzy:<threshold>`.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim().to_ascii_lowercase();
        match value.split_once(':') {
            None if value == "exact" => Some(DedupMode::Exact),
            None if value == "fuzzy" => Some(DedupMode::Fuzzy {
                threshold: DEFAULT_FUZZY_THRESHOLD,
            }),
            Some(("fuzzy", threshold)) => threshold
                .trim()
                .parse()
                .ok()
                .map(|threshold| DedupMode::Fuzzy { threshold }),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            DedupMode::Exact => Ok(()),
            DedupMode::Fuzzy { threshold } => validate_threshold(*threshold).map(|_| ()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateReason {
    Url,
    TitleCompany,
    FuzzyTitle { score: f64, existing_title: String },
}

#[derive(Debug)]
pub struct Deduplicator {
    mode: DedupMode,
    scorer: SimilarityScorer,
}

impl Deduplicator {
    pub fn new(mode: DedupMode) -> Result<Self, ConfigError> {
        Self::with_scorer(mode, SimilarityScorer::new())
    }

    pub fn with_scorer(mode: DedupMode, scorer: SimilarityScorer) -> Result<Self, ConfigError> {
        mode.validate()?;
        Ok(Self { mode, scorer })
    }

    pub fn mode(&self) -> DedupMode {
        self.mode
    }

    pub fn is_duplicate<S: RecordStore + ?Sized>(&self, candidate: &JobRecord, store: &S) -> bool {
        self.check(candidate, store).is_some()
    }

    pub fn check<S: RecordStore + ?Sized>(
        &self,
        candidate: &JobRecord,
        store: &S,
    ) -> Option<DuplicateReason> {
        if candidate.url_key().is_some_and(|key| store.exists(&key)) {
            return Some(DuplicateReason::Url);
        }
        if store.exists(&candidate.title_company_key()) {
            return Some(DuplicateReason::TitleCompany);
        }

        let DedupMode::Fuzzy { threshold } = self.mode else {
            return None;
        };
        let (score, existing) = store
            .same_company(&candidate.company)
            .into_iter()
            .map(|existing| (self.scorer.score(&candidate.title, &existing.title), existing))
            .filter(|(score, _)| *score >= threshold)
            .max_by(|a, b| a.0.total_cmp(&b.0))?;
        debug!(
            title = %candidate.title,
            existing = %existing.title,
            company = %candidate.company,
            score,
            "fuzzy duplicate"
        );
        Some(DuplicateReason::FuzzyTitle {
            score,
            existing_title: existing.title.clone(),
        })
    }
}
