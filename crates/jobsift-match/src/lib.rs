//! Job-title similarity scoring and declarative record filtering.

pub mod vocab;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use jobsift_core::JobRecord;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::vocab::Component;

pub const CRATE_NAME: &str = "jobsift-match";

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 80.0;

/// Titles are cut to this many characters before scoring.
pub const MAX_TITLE_CHARS: usize = 256;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid similarity weights: {0}")]
    InvalidWeights(String),
    #[error("threshold must be within 0..=100, got {0}")]
    InvalidThreshold(f64),
    #[error("min_salary must be a finite non-negative number, got {0}")]
    InvalidMinSalary(f64),
    #[error("cannot compile keyword {keyword:?}")]
    InvalidKeyword {
        keyword: String,
        #[source]
        source: regex::Error,
    },
}

pub fn validate_threshold(threshold: f64) -> Result<f64, ConfigError> {
    if threshold.is_finite() && (0.0..=100.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(ConfigError::InvalidThreshold(threshold))
    }
}

/// Lowercase tokens with surrounding punctuation trimmed. `+` and `#` are
/// kept so "c++" and "c#" survive; inner hyphens and dots are untouched.
pub fn tokenize(title: &str) -> Vec<String> {
    title
        .split_whitespace()
        .map(|raw| {
            raw.trim_matches(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
                .to_lowercase()
        })
        .filter(|token| !token.is_empty())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub ratio: f64,
    pub partial_ratio: f64,
    pub token_sort_ratio: f64,
    pub token_set_ratio: f64,
    pub component: f64,
    pub variation: f64,
    pub synonym: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            ratio: 0.15,
            partial_ratio: 0.15,
            token_sort_ratio: 0.10,
            token_set_ratio: 0.10,
            component: 0.20,
            variation: 0.15,
            synonym: 0.15,
        }
    }
}

impl SignalWeights {
    fn as_array(&self) -> [f64; 7] {
        [
            self.ratio,
            self.partial_ratio,
            self.token_sort_ratio,
            self.token_set_ratio,
            self.component,
            self.variation,
            self.synonym,
        ]
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let values = self.as_array();
        if values.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::InvalidWeights(format!(
                "weights must be finite and non-negative: {values:?}"
            )));
        }
        let sum: f64 = values.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::InvalidWeights(format!(
                "weights must sum to 1.0, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Per-signal sub-scores (each 0..=100) and the combined total.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct ScoreBreakdown {
    pub ratio: f64,
    pub partial_ratio: f64,
    pub token_sort_ratio: f64,
    pub token_set_ratio: f64,
    /// `None` when neither title contains a level/role/specialty/technology term.
    pub component: Option<f64>,
    pub variation: f64,
    pub synonym: f64,
    pub total: f64,
}

/// Memoized synonym sets keyed by lowercase token. Owned by one scorer.
#[derive(Debug, Default)]
pub struct SynonymCache {
    entries: RwLock<HashMap<String, Arc<HashSet<String>>>>,
}

impl SynonymCache {
    pub fn get_or_build(&self, word: &str) -> Arc<HashSet<String>> {
        let cached = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(word)
            .cloned();
        if let Some(hit) = cached {
            return hit;
        }
        let built = Arc::new(vocab::synonyms_for(word));
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(word.to_string())
            .or_insert(built)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn clip_title(title: &str) -> &str {
    match title.char_indices().nth(MAX_TITLE_CHARS) {
        Some((end, _)) => &title[..end],
        None => title,
    }
}

fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::normalized_levenshtein(a, b) * 100.0
}

fn partial_ratio(a: &str, b: &str) -> f64 {
    let (a_len, b_len) = (a.chars().count(), b.chars().count());
    let (short, long, short_len, long_len) = if a_len <= b_len {
        (a, b, a_len, b_len)
    } else {
        (b, a, b_len, a_len)
    };
    if short_len == 0 {
        return 0.0;
    }

    let long_chars: Vec<char> = long.chars().collect();
    let mut best = 0.0f64;
    for start in 0..=(long_len - short_len) {
        let window: String = long_chars[start..start + short_len].iter().collect();
        best = best.max(ratio(short, &window));
        if best >= 100.0 {
            break;
        }
    }
    best
}

fn token_sort_ratio(a: &[String], b: &[String]) -> f64 {
    let mut sorted_a = a.to_vec();
    let mut sorted_b = b.to_vec();
    sorted_a.sort();
    sorted_b.sort();
    ratio(&sorted_a.join(" "), &sorted_b.join(" "))
}

fn join_tokens<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts.into_iter().collect::<Vec<_>>().join(" ")
}

fn token_set_ratio(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    let common = join_tokens(a.intersection(b).copied());
    let only_a = join_tokens(a.difference(b).copied());
    let only_b = join_tokens(b.difference(a).copied());

    let with_a = format!("{common} {only_a}").trim().to_string();
    let with_b = format!("{common} {only_b}").trim().to_string();

    ratio(&common, &with_a)
        .max(ratio(&common, &with_b))
        .max(ratio(&with_a, &with_b))
}

fn component_sets(tokens: &BTreeSet<&str>) -> [BTreeSet<String>; 4] {
    let mut sets: [BTreeSet<String>; 4] = Default::default();
    for token in tokens {
        if let Some(component) = vocab::classify(token) {
            sets[component.index()].insert(vocab::canonicalize(token).to_string());
        }
    }
    sets
}

/// Weighted Jaccard over the component categories present in either title.
fn component_similarity(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> Option<f64> {
    let (sets_a, sets_b) = (component_sets(a), component_sets(b));
    let mut weighted = 0.0;
    let mut applicable = 0.0;
    for component in Component::ALL {
        let (x, y) = (&sets_a[component.index()], &sets_b[component.index()]);
        if x.is_empty() && y.is_empty() {
            continue;
        }
        applicable += component.weight();
        let union = x.union(y).count();
        if union > 0 {
            weighted += component.weight() * x.intersection(y).count() as f64 / union as f64;
        }
    }
    if applicable > 0.0 {
        Some(weighted / applicable * 100.0)
    } else {
        None
    }
}

fn variation_similarity(a: &BTreeSet<&str>, b: &BTreeSet<&str>) -> f64 {
    let denominator = a.len().max(b.len());
    if denominator == 0 {
        return 0.0;
    }
    let groups_b: Vec<HashSet<&str>> = b.iter().map(|t| vocab::variation_group(t)).collect();
    let mut matches = 0usize;
    for token_a in a {
        let group_a = vocab::variation_group(token_a);
        matches += groups_b
            .iter()
            .filter(|group_b| !group_a.is_disjoint(group_b))
            .count();
    }
    (matches as f64 / denominator as f64 * 100.0).clamp(0.0, 100.0)
}

/// Multi-signal job-title similarity on a 0..=100 scale.
#[derive(Debug, Default)]
pub struct SimilarityScorer {
    weights: SignalWeights,
    cache: SynonymCache,
}

impl SimilarityScorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: SignalWeights) -> Result<Self, ConfigError> {
        weights.validate()?;
        Ok(Self {
            weights,
            cache: SynonymCache::default(),
        })
    }

    pub fn weights(&self) -> &SignalWeights {
        &self.weights
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn score(&self, a: &str, b: &str) -> f64 {
        self.breakdown(a, b).total
    }

    pub fn is_match(&self, a: &str, b: &str, threshold: f64) -> bool {
        self.score(a, b) >= threshold
    }

    /// Highest-scoring candidate at or above `threshold`; the first wins ties.
    pub fn best_match<'c, S: AsRef<str>>(
        &self,
        title: &str,
        candidates: &'c [S],
        threshold: f64,
    ) -> Option<(&'c str, f64)> {
        let mut best: Option<(&'c str, f64)> = None;
        for candidate in candidates {
            let score = self.score(title, candidate.as_ref());
            if score >= threshold && best.map_or(true, |(_, top)| score > top) {
                best = Some((candidate.as_ref(), score));
            }
        }
        best
    }

    fn synonym_similarity(&self, a: &[String], b: &[String]) -> f64 {
        let denominator = a.len().max(b.len());
        if denominator == 0 {
            return 0.0;
        }
        let synonyms_b: Vec<_> = b.iter().map(|w| self.cache.get_or_build(w)).collect();
        let mut matches = 0usize;
        for word in a {
            let synonyms_a = self.cache.get_or_build(word);
            matches += synonyms_b
                .iter()
                .filter(|set_b| !synonyms_a.is_disjoint(set_b))
                .count();
        }
        (matches as f64 / denominator as f64 * 100.0).clamp(0.0, 100.0)
    }

    pub fn breakdown(&self, a: &str, b: &str) -> ScoreBreakdown {
        let (a, b) = (clip_title(a), clip_title(b));
        let tokens_a = tokenize(a);
        let tokens_b = tokenize(b);
        if tokens_a.is_empty() || tokens_b.is_empty() {
            return ScoreBreakdown::default();
        }

        let lower_a = a.trim().to_lowercase();
        let lower_b = b.trim().to_lowercase();
        let set_a: BTreeSet<&str> = tokens_a.iter().map(String::as_str).collect();
        let set_b: BTreeSet<&str> = tokens_b.iter().map(String::as_str).collect();

        let mut breakdown = ScoreBreakdown {
            ratio: ratio(&lower_a, &lower_b),
            partial_ratio: partial_ratio(&lower_a, &lower_b),
            token_sort_ratio: token_sort_ratio(&tokens_a, &tokens_b),
            token_set_ratio: token_set_ratio(&set_a, &set_b),
            component: component_similarity(&set_a, &set_b),
            variation: variation_similarity(&set_a, &set_b),
            synonym: self.synonym_similarity(&tokens_a, &tokens_b),
            total: 0.0,
        };

        let w = &self.weights;
        let mut weighted = breakdown.ratio * w.ratio
            + breakdown.partial_ratio * w.partial_ratio
            + breakdown.token_sort_ratio * w.token_sort_ratio
            + breakdown.token_set_ratio * w.token_set_ratio
            + breakdown.variation * w.variation
            + breakdown.synonym * w.synonym;
        let mut applicable = w.ratio
            + w.partial_ratio
            + w.token_sort_ratio
            + w.token_set_ratio
            + w.variation
            + w.synonym;
        if let Some(component) = breakdown.component {
            weighted += component * w.component;
            applicable += w.component;
        }

        breakdown.total = if applicable > 0.0 {
            (weighted / applicable).clamp(0.0, 100.0)
        } else {
            0.0
        };
        breakdown
    }
}

/// Declarative inclusion/exclusion criteria. Blank entries are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterCriteria {
    pub keywords: BTreeSet<String>,
    pub exclude_keywords: BTreeSet<String>,
    pub locations: BTreeSet<String>,
    pub min_salary: Option<f64>,
    pub job_types: BTreeSet<String>,
    pub experience_levels: BTreeSet<String>,
    pub fuzzy_matching: bool,
    pub fuzzy_threshold: f64,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            keywords: BTreeSet::new(),
            exclude_keywords: BTreeSet::new(),
            locations: BTreeSet::new(),
            min_salary: None,
            job_types: BTreeSet::new(),
            experience_levels: BTreeSet::new(),
            fuzzy_matching: false,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

fn string_set<I, S>(values: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values.into_iter().map(Into::into).collect()
}

impl FilterCriteria {
    pub fn with_keywords<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.keywords = string_set(values);
        self
    }

    pub fn with_exclude_keywords<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        values: I,
    ) -> Self {
        self.exclude_keywords = string_set(values);
        self
    }

    pub fn with_locations<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.locations = string_set(values);
        self
    }

    pub fn with_job_types<I: IntoIterator<Item = S>, S: Into<String>>(mut self, values: I) -> Self {
        self.job_types = string_set(values);
        self
    }

    pub fn with_experience_levels<I: IntoIterator<Item = S>, S: Into<String>>(
        mut self,
        values: I,
    ) -> Self {
        self.experience_levels = string_set(values);
        self
    }

    pub fn with_min_salary(mut self, min_salary: f64) -> Self {
        self.min_salary = Some(min_salary);
        self
    }

    pub fn with_fuzzy_matching(mut self, threshold: f64) -> Self {
        self.fuzzy_matching = true;
        self.fuzzy_threshold = threshold;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    MissingField(&'static str),
    Excluded(String),
    NoKeywordMatch,
    Location,
    Salary,
    JobType,
    ExperienceLevel,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::MissingField(field) => write!(f, "missing required field {field}"),
            RejectReason::Excluded(keyword) => write!(f, "matched excluded keyword {keyword:?}"),
            RejectReason::NoKeywordMatch => f.write_str("no keyword matched"),
            RejectReason::Location => f.write_str("location not allowed"),
            RejectReason::Salary => f.write_str("salary below minimum"),
            RejectReason::JobType => f.write_str("job type not allowed"),
            RejectReason::ExperienceLevel => f.write_str("experience level not allowed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    Reject(RejectReason),
}

impl FilterDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, FilterDecision::Accept)
    }
}

#[derive(Debug, Clone)]
struct KeywordMatcher {
    keyword: String,
    pattern: Regex,
}

impl KeywordMatcher {
    /// Case-insensitive whole-word matcher. Boundaries are non-word characters
    /// rather than `\b` so keywords ending in symbols ("c++") still match.
    fn compile(keyword: &str) -> Result<Option<Self>, ConfigError> {
        let trimmed = keyword.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let source = format!(r"(?i)(?:^|\W){}(?:\W|$)", regex::escape(trimmed));
        let pattern = Regex::new(&source).map_err(|source| ConfigError::InvalidKeyword {
            keyword: trimmed.to_string(),
            source,
        })?;
        Ok(Some(Self {
            keyword: trimmed.to_string(),
            pattern,
        }))
    }

    fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

fn compile_all(keywords: &BTreeSet<String>) -> Result<Vec<KeywordMatcher>, ConfigError> {
    let mut out = Vec::with_capacity(keywords.len());
    for keyword in keywords {
        if let Some(matcher) = KeywordMatcher::compile(keyword)? {
            out.push(matcher);
        }
    }
    Ok(out)
}

fn lowercase_set(values: &BTreeSet<String>) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Pure predicate over candidate records, compiled once from [`FilterCriteria`].
#[derive(Debug)]
pub struct RecordFilter {
    criteria: FilterCriteria,
    keywords: Vec<KeywordMatcher>,
    excludes: Vec<KeywordMatcher>,
    locations: Vec<String>,
    job_types: Vec<String>,
    experience_levels: Vec<String>,
    scorer: SimilarityScorer,
}

impl RecordFilter {
    pub fn new(criteria: FilterCriteria) -> Result<Self, ConfigError> {
        Self::with_scorer(criteria, SimilarityScorer::new())
    }

    pub fn with_scorer(
        criteria: FilterCriteria,
        scorer: SimilarityScorer,
    ) -> Result<Self, ConfigError> {
        validate_threshold(criteria.fuzzy_threshold)?;
        if let Some(min) = criteria.min_salary {
            if !min.is_finite() || min < 0.0 {
                return Err(ConfigError::InvalidMinSalary(min));
            }
        }

        Ok(Self {
            keywords: compile_all(&criteria.keywords)?,
            excludes: compile_all(&criteria.exclude_keywords)?,
            locations: lowercase_set(&criteria.locations),
            job_types: lowercase_set(&criteria.job_types),
            experience_levels: lowercase_set(&criteria.experience_levels),
            scorer,
            criteria,
        })
    }

    /// A filter that accepts every valid record.
    pub fn accept_all() -> Self {
        Self {
            criteria: FilterCriteria::default(),
            keywords: Vec::new(),
            excludes: Vec::new(),
            locations: Vec::new(),
            job_types: Vec::new(),
            experience_levels: Vec::new(),
            scorer: SimilarityScorer::new(),
        }
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn matches(&self, record: &JobRecord) -> bool {
        self.evaluate(record).is_accept()
    }

    pub fn evaluate(&self, record: &JobRecord) -> FilterDecision {
        if let Some(field) = record.missing_required_field() {
            return FilterDecision::Reject(RejectReason::MissingField(field));
        }

        let title = record.title.as_str();
        let description = record.description.as_deref().unwrap_or_default();

        if let Some(hit) = self
            .excludes
            .iter()
            .find(|m| m.is_match(title) || m.is_match(description))
        {
            return FilterDecision::Reject(RejectReason::Excluded(hit.keyword.clone()));
        }

        if !self.keywords.is_empty() && !self.include_matches(title, description) {
            return FilterDecision::Reject(RejectReason::NoKeywordMatch);
        }

        if !self.locations.is_empty() {
            let location = record.location.to_lowercase();
            if !self.locations.iter().any(|loc| location.contains(loc.as_str())) {
                return FilterDecision::Reject(RejectReason::Location);
            }
        }

        if let Some(min_salary) = self.criteria.min_salary {
            if record.salary_floor() < min_salary {
                return FilterDecision::Reject(RejectReason::Salary);
            }
        }

        if !self.job_types.is_empty() {
            let label = record
                .job_type
                .as_ref()
                .map(|t| t.label().to_lowercase())
                .unwrap_or_default();
            if !self.job_types.iter().any(|t| label.contains(t.as_str())) {
                return FilterDecision::Reject(RejectReason::JobType);
            }
        }

        if !self.experience_levels.is_empty() {
            let label = record
                .experience_level
                .as_ref()
                .map(|l| l.label().to_lowercase())
                .unwrap_or_default();
            if !self.experience_levels.iter().any(|l| label.contains(l.as_str())) {
                return FilterDecision::Reject(RejectReason::ExperienceLevel);
            }
        }

        FilterDecision::Accept
    }

    fn include_matches(&self, title: &str, description: &str) -> bool {
        if self
            .keywords
            .iter()
            .any(|m| m.is_match(title) || m.is_match(description))
        {
            return true;
        }
        if !self.criteria.fuzzy_matching {
            return false;
        }
        self.keywords.iter().any(|m| {
            let score = self.scorer.score(&m.keyword, title);
            debug!(keyword = %m.keyword, title, score, "fuzzy keyword check");
            score >= self.criteria.fuzzy_threshold
        })
    }

    /// Highest title similarity against any keyword; 0 without keywords.
    pub fn relevance(&self, record: &JobRecord) -> f64 {
        self.keywords
            .iter()
            .map(|m| self.scorer.score(&m.keyword, &record.title))
            .fold(0.0, f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobsift_core::{ExperienceLevel, JobType, Salary};

    const TITLES: &[&str] = &[
        "Senior Software Engineer",
        "Sr. Software Engineer",
        "Lead Backend Developer",
        "Lead Back-End Developer",
        "Marketing Coordinator",
        "Barista",
        "Principal Engineer, Platform (Rust / Kubernetes)",
        "C++ Developer",
    ];

    fn record(title: &str) -> JobRecord {
        JobRecord::new(title, "Acme", "San Francisco, CA", "https://acme.example/jobs/1")
    }

    #[test]
    fn score_is_reflexive() {
        let scorer = SimilarityScorer::new();
        for title in TITLES {
            let score = scorer.score(title, title);
            assert!((score - 100.0).abs() < 1e-9, "{title}: {score}");
        }
    }

    #[test]
    fn score_is_symmetric() {
        let scorer = SimilarityScorer::new();
        for a in TITLES {
            for b in TITLES {
                assert_eq!(scorer.score(a, b), scorer.score(b, a), "{a} / {b}");
            }
        }
    }

    #[test]
    fn abbreviated_level_scores_as_near_duplicate() {
        let scorer = SimilarityScorer::new();
        let breakdown = scorer.breakdown("Senior Software Engineer", "Sr. Software Engineer");
        assert!(breakdown.total >= 80.0, "{breakdown:?}");
        assert_eq!(breakdown.variation, 100.0);
        assert_eq!(breakdown.component, Some(100.0));
    }

    #[test]
    fn unrelated_titles_score_low() {
        let scorer = SimilarityScorer::new();
        let score = scorer.score("Lead Backend Developer", "Marketing Coordinator");
        assert!(score < 40.0, "{score}");
        assert!(
            scorer.score("Software Engineer", "Software Developer")
                > scorer.score("Software Engineer", "Marketing Coordinator")
        );
    }

    #[test]
    fn blank_titles_score_zero_everywhere() {
        let scorer = SimilarityScorer::new();
        assert_eq!(scorer.breakdown("", "").total, 0.0);
        assert_eq!(scorer.breakdown("   ", "Engineer"), ScoreBreakdown::default());
        assert_eq!(scorer.score("Engineer", " -- "), 0.0);
    }

    #[test]
    fn component_signal_is_skipped_without_taxonomy_terms() {
        let scorer = SimilarityScorer::new();
        let breakdown = scorer.breakdown("Barista", "Cashier");
        assert_eq!(breakdown.component, None);
        assert!(breakdown.total < 50.0);
    }

    #[test]
    fn invalid_weights_are_rejected() {
        let bad = SignalWeights {
            ratio: 0.5,
            ..SignalWeights::default()
        };
        assert!(matches!(
            SimilarityScorer::with_weights(bad),
            Err(ConfigError::InvalidWeights(_))
        ));

        let negative = SignalWeights {
            ratio: -0.15,
            partial_ratio: 0.45,
            ..SignalWeights::default()
        };
        assert!(SimilarityScorer::with_weights(negative).is_err());

        let only_ratio = SignalWeights {
            ratio: 1.0,
            partial_ratio: 0.0,
            token_sort_ratio: 0.0,
            token_set_ratio: 0.0,
            component: 0.0,
            variation: 0.0,
            synonym: 0.0,
        };
        let scorer = SimilarityScorer::with_weights(only_ratio).unwrap();
        assert_eq!(scorer.weights(), &only_ratio);
        assert_eq!(scorer.score("abcd", "abcd"), 100.0);
        assert_eq!(scorer.score("abcd", "abce"), 75.0);
    }

    #[test]
    fn overlong_titles_are_clipped_before_scoring() {
        let scorer = SimilarityScorer::new();
        let a = "backend engineer ".repeat(600);
        let b = "platform developer ".repeat(600);
        let clipped = |t: &str| t.chars().take(MAX_TITLE_CHARS).collect::<String>();

        assert_eq!(scorer.score(&a, &b), scorer.score(&clipped(&a), &clipped(&b)));
    }

    #[test]
    fn synonym_cache_is_owned_per_scorer() {
        let first = SimilarityScorer::new();
        first.score("Senior Engineer", "Lead Developer");
        assert!(first.cache_len() >= 4);

        let second = SimilarityScorer::new();
        assert_eq!(second.cache_len(), 0);
    }

    #[test]
    fn best_match_respects_threshold() {
        let scorer = SimilarityScorer::new();
        let candidates = ["Data Scientist", "Senior Software Engineer", "Product Manager"];
        let (title, score) = scorer
            .best_match("Sr. Software Engineer", &candidates, 80.0)
            .unwrap();
        assert_eq!(title, "Senior Software Engineer");
        assert!(score >= 80.0);
        assert!(scorer
            .best_match("Sr. Software Engineer", &candidates, 95.0)
            .is_none());
    }

    #[test]
    fn tokenizer_trims_punctuation_but_keeps_symbols() {
        assert_eq!(
            tokenize("Sr. C++ / Back-End (Remote)"),
            vec!["sr", "c++", "back-end", "remote"]
        );
        assert!(tokenize(" - ").is_empty());
    }

    #[test]
    fn exclude_keyword_wins_over_include() {
        let filter = RecordFilter::new(
            FilterCriteria::default()
                .with_keywords(["engineer"])
                .with_exclude_keywords(["intern"]),
        )
        .unwrap();

        assert_eq!(
            filter.evaluate(&record("Software Engineering Intern")),
            FilterDecision::Reject(RejectReason::Excluded("intern".into()))
        );
        assert!(filter.matches(&record("Software Engineer")));
        assert_eq!(
            filter.evaluate(&record("Office Manager")),
            FilterDecision::Reject(RejectReason::NoKeywordMatch)
        );
    }

    #[test]
    fn keywords_match_whole_words_in_description() {
        let filter =
            RecordFilter::new(FilterCriteria::default().with_keywords(["rust", "c++"])).unwrap();
        let described = record("Systems Developer").with_description("Work in Rust daily.");
        assert!(filter.matches(&described));
        assert!(filter.matches(&record("Senior C++ Developer")));
        assert!(!filter.matches(&record("Trusted Advisor")));
    }

    #[test]
    fn missing_required_field_is_rejected_first() {
        let filter = RecordFilter::accept_all();
        let mut candidate = record("Software Engineer");
        candidate.url.clear();
        assert_eq!(
            filter.evaluate(&candidate),
            FilterDecision::Reject(RejectReason::MissingField("url"))
        );
    }

    #[test]
    fn location_is_a_case_insensitive_substring() {
        let filter = RecordFilter::new(
            FilterCriteria::default().with_locations(["san francisco", "Remote"]),
        )
        .unwrap();
        assert!(filter.matches(&record("Engineer")));

        let mut remote = record("Engineer");
        remote.location = "REMOTE - US".into();
        assert!(filter.matches(&remote));

        let mut berlin = record("Engineer");
        berlin.location = "Berlin".into();
        assert_eq!(
            filter.evaluate(&berlin),
            FilterDecision::Reject(RejectReason::Location)
        );
    }

    #[test]
    fn salary_floor_applies_suffixes_and_rejects_unparseable() {
        let filter =
            RecordFilter::new(FilterCriteria::default().with_min_salary(100_000.0)).unwrap();
        assert!(filter.matches(&record("Engineer").with_salary(Salary::Text("$120K".into()))));
        assert!(!filter.matches(&record("Engineer").with_salary(Salary::Text("$90K".into()))));
        assert!(!filter.matches(&record("Engineer").with_salary(Salary::Text("DOE".into()))));
        assert_eq!(
            filter.evaluate(&record("Engineer")),
            FilterDecision::Reject(RejectReason::Salary)
        );
    }

    #[test]
    fn job_type_and_experience_allow_sets() {
        let filter = RecordFilter::new(
            FilterCriteria::default()
                .with_job_types(["full-time"])
                .with_experience_levels(["Senior", "Lead"]),
        )
        .unwrap();

        let ok = record("Engineer")
            .with_job_type(JobType::FullTime)
            .with_experience_level(ExperienceLevel::Senior);
        assert!(filter.matches(&ok));

        let contract = ok.clone().with_job_type(JobType::Contract);
        assert_eq!(
            filter.evaluate(&contract),
            FilterDecision::Reject(RejectReason::JobType)
        );

        let junior = ok.clone().with_experience_level(ExperienceLevel::Entry);
        assert_eq!(
            filter.evaluate(&junior),
            FilterDecision::Reject(RejectReason::ExperienceLevel)
        );

        let mut unknown = ok;
        unknown.job_type = None;
        assert!(!filter.matches(&unknown));
    }

    #[test]
    fn fuzzy_keyword_match_is_opt_in() {
        let exact =
            RecordFilter::new(FilterCriteria::default().with_keywords(["Senior Software Engineer"]))
                .unwrap();
        assert!(!exact.matches(&record("Sr. Software Engineer")));

        let fuzzy = RecordFilter::new(
            FilterCriteria::default()
                .with_keywords(["Senior Software Engineer"])
                .with_fuzzy_matching(80.0),
        )
        .unwrap();
        assert!(fuzzy.matches(&record("Sr. Software Engineer")));
        assert!(!fuzzy.matches(&record("Marketing Coordinator")));
    }

    #[test]
    fn invalid_thresholds_fail_construction() {
        let criteria = FilterCriteria::default().with_fuzzy_matching(120.0);
        assert!(matches!(
            RecordFilter::new(criteria),
            Err(ConfigError::InvalidThreshold(_))
        ));
        let negative_salary = FilterCriteria::default().with_min_salary(-1.0);
        assert!(RecordFilter::new(negative_salary).is_err());
    }

    #[test]
    fn relevance_ranks_closer_titles_higher() {
        let filter = RecordFilter::new(
            FilterCriteria::default().with_keywords(["Backend Developer"]),
        )
        .unwrap();
        let close = filter.relevance(&record("Senior Backend Developer"));
        let far = filter.relevance(&record("Frontend Designer"));
        assert!(close > far, "{close} <= {far}");
        assert_eq!(RecordFilter::accept_all().relevance(&record("Anything")), 0.0);
    }
}
