//! Record extraction contracts plus generic JSON-LD and JSON feed extractors.

use chrono::{DateTime, Utc};
use jobsift_core::{parse_date_posted, parse_salary, ExperienceLevel, JobRecord, JobType, Salary};
use jobsift_storage::FetchedPage;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, warn};

pub const CRATE_NAME: &str = "jobsift-adapters";

const LD_JSON_SELECTOR: &str = r#"script[type="application/ld+json"]"#;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("invalid selector {selector:?}: {message}")]
    Selector { selector: String, message: String },
    #[error("invalid json from {url}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported payload from {url}: {reason}")]
    Unsupported { url: String, reason: String },
}

/// Turns one fetched page into candidate records. Per-record problems are
/// logged and skipped; only an unreadable page is an error.
pub trait RecordExtractor: Send + Sync {
    fn source_id(&self) -> &str;
    fn extract(&self, page: &FetchedPage) -> Result<Vec<JobRecord>, ExtractError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceFormat {
    JsonLd,
    JsonFeed,
}

impl SourceFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json-ld" | "jsonld" | "html" => Some(SourceFormat::JsonLd),
            "json-feed" | "json" | "feed" => Some(SourceFormat::JsonFeed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceFormat::JsonLd => "json-ld",
            SourceFormat::JsonFeed => "json-feed",
        }
    }
}

pub fn extractor_for_format(format: SourceFormat, source_id: &str) -> Box<dyn RecordExtractor> {
    match format {
        SourceFormat::JsonLd => Box::new(JsonLdExtractor::new(source_id)),
        SourceFormat::JsonFeed => Box::new(JsonFeedExtractor::new(source_id)),
    }
}

fn text_or_none(value: &str) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn html_to_text(value: &str) -> Option<String> {
    if value.contains('<') {
        let fragment = Html::parse_fragment(value);
        text_or_none(&fragment.root_element().text().collect::<Vec<_>>().join(" "))
    } else {
        text_or_none(value)
    }
}

fn json_str<'a>(value: &'a JsonValue, key: &str) -> Option<&'a str> {
    value.get(key)?.as_str()
}

/// A string, or the `name` of an object (schema.org Organization, Country).
fn string_or_name(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => text_or_none(s),
        JsonValue::Object(_) => json_str(value, "name").and_then(text_or_none),
        _ => None,
    }
}

fn first_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Array(items) => items.iter().find_map(first_string),
        other => string_or_name(other),
    }
}

fn location_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Array(items) => {
            let parts: Vec<String> = items.iter().filter_map(location_text).collect();
            text_or_none(&parts.join("; "))
        }
        JsonValue::Object(_) => match value.get("address") {
            Some(JsonValue::String(s)) => text_or_none(s),
            Some(address @ JsonValue::Object(_)) => {
                let parts: Vec<String> = ["addressLocality", "addressRegion", "addressCountry"]
                    .iter()
                    .filter_map(|key| address.get(*key).and_then(string_or_name))
                    .collect();
                text_or_none(&parts.join(", "))
            }
            _ => json_str(value, "name").and_then(text_or_none),
        },
        other => string_or_name(other),
    }
}

fn number_like(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => parse_salary(s),
        _ => None,
    }
}

/// schema.org `baseSalary`: a number, text, MonetaryAmount or QuantitativeValue.
fn salary_from(value: &JsonValue) -> Option<Salary> {
    match value {
        JsonValue::Number(n) => n.as_f64().map(Salary::Amount),
        JsonValue::String(s) => text_or_none(s).map(Salary::Text),
        JsonValue::Object(map) => {
            let min = map.get("minValue").and_then(number_like);
            let max = map.get("maxValue").and_then(number_like);
            match (min, max) {
                (Some(min), Some(max)) => Some(Salary::Range {
                    min: min.min(max),
                    max: max.max(min),
                }),
                (Some(value), None) | (None, Some(value)) => Some(Salary::Amount(value)),
                (None, None) => map.get("value").and_then(salary_from),
            }
        }
        _ => None,
    }
}

fn skills_from(value: &JsonValue) -> Vec<String> {
    match value {
        JsonValue::String(s) => s.split(',').filter_map(text_or_none).collect(),
        JsonValue::Array(items) => items.iter().filter_map(string_or_name).collect(),
        _ => Vec::new(),
    }
}

fn is_job_posting(map: &Map<String, JsonValue>) -> bool {
    let is_posting = |v: &JsonValue| v.as_str().is_some_and(|t| t.eq_ignore_ascii_case("JobPosting"));
    match map.get("@type") {
        Some(JsonValue::Array(types)) => types.iter().any(is_posting),
        Some(other) => is_posting(other),
        None => false,
    }
}

fn collect_postings(value: JsonValue, out: &mut Vec<JsonValue>) {
    match value {
        JsonValue::Array(items) => {
            for item in items {
                collect_postings(item, out);
            }
        }
        JsonValue::Object(mut map) => {
            if is_job_posting(&map) {
                out.push(JsonValue::Object(map));
            } else if let Some(graph) = map.remove("@graph") {
                collect_postings(graph, out);
            }
        }
        _ => {}
    }
}

/// schema.org `JobPosting` objects embedded as `application/ld+json`.
#[derive(Debug, Clone)]
pub struct JsonLdExtractor {
    source_id: String,
}

impl JsonLdExtractor {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
        }
    }

    fn posting_to_record(
        &self,
        posting: &JsonValue,
        page: &FetchedPage,
        now: DateTime<Utc>,
    ) -> JobRecord {
        let title = json_str(posting, "title")
            .or_else(|| json_str(posting, "name"))
            .and_then(text_or_none)
            .unwrap_or_default();
        let company = posting
            .get("hiringOrganization")
            .and_then(string_or_name)
            .unwrap_or_default();
        let remote = json_str(posting, "jobLocationType")
            .map(|kind| kind.eq_ignore_ascii_case("TELECOMMUTE"));
        let mut location = posting
            .get("jobLocation")
            .and_then(location_text)
            .unwrap_or_default();
        if location.is_empty() && remote == Some(true) {
            location = "Remote".to_string();
        }
        let url = json_str(posting, "url")
            .and_then(text_or_none)
            .unwrap_or_else(|| page.final_url.clone());

        let mut record = JobRecord::new(title, company, location, url).with_source(&self.source_id);
        record.remote = remote;
        record.description = json_str(posting, "description").and_then(html_to_text);
        record.salary = posting.get("baseSalary").and_then(salary_from);
        record.date_posted =
            json_str(posting, "datePosted").and_then(|text| parse_date_posted(text, now));
        record.job_type = posting
            .get("employmentType")
            .and_then(first_string)
            .map(|text| JobType::parse(&text));
        record.experience_level = posting
            .get("experienceRequirements")
            .and_then(first_string)
            .map(|text| ExperienceLevel::parse(&text))
            .or_else(|| match ExperienceLevel::parse(&record.title) {
                ExperienceLevel::Other(_) => None,
                level => Some(level),
            });
        record.skills = posting
            .get("skills")
            .map(skills_from)
            .unwrap_or_default()
            .into_iter()
            .map(|skill| skill.to_lowercase())
            .collect();
        record
    }
}

impl RecordExtractor for JsonLdExtractor {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn extract(&self, page: &FetchedPage) -> Result<Vec<JobRecord>, ExtractError> {
        let selector = Selector::parse(LD_JSON_SELECTOR).map_err(|e| ExtractError::Selector {
            selector: LD_JSON_SELECTOR.to_string(),
            message: e.to_string(),
        })?;
        let document = Html::parse_document(&page.text());

        let mut postings = Vec::new();
        for (block, script) in document.select(&selector).enumerate() {
            let raw = script.text().collect::<String>();
            match serde_json::from_str::<JsonValue>(raw.trim()) {
                Ok(value) => collect_postings(value, &mut postings),
                Err(err) => {
                    warn!(source_id = %self.source_id, url = %page.url, block, error = %err, "skipping malformed ld+json block")
                }
            }
        }

        let now = Utc::now();
        let records: Vec<JobRecord> = postings
            .iter()
            .map(|posting| self.posting_to_record(posting, page, now))
            .collect();
        debug!(source_id = %self.source_id, url = %page.url, records = records.len(), "extracted json-ld postings");
        Ok(records)
    }
}

/// A JSON array of record-shaped objects, or an object holding one under `jobs`.
#[derive(Debug, Clone)]
pub struct JsonFeedExtractor {
    source_id: String,
}

impl JsonFeedExtractor {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
        }
    }
}

/// Rewrites free-text `date_posted` values ("3 days ago") to RFC 3339 so the
/// record deserializes; unparseable dates are dropped.
fn normalize_feed_item(mut item: JsonValue, now: DateTime<Utc>) -> JsonValue {
    if let Some(map) = item.as_object_mut() {
        if let Some(JsonValue::String(text)) = map.get("date_posted") {
            match parse_date_posted(text, now) {
                Some(parsed) => {
                    map.insert("date_posted".into(), JsonValue::String(parsed.to_rfc3339()));
                }
                None => {
                    map.remove("date_posted");
                }
            }
        }
    }
    item
}

impl RecordExtractor for JsonFeedExtractor {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn extract(&self, page: &FetchedPage) -> Result<Vec<JobRecord>, ExtractError> {
        let value: JsonValue =
            serde_json::from_slice(&page.body).map_err(|source| ExtractError::Json {
                url: page.url.clone(),
                source,
            })?;
        let items = match value {
            JsonValue::Array(items) => items,
            JsonValue::Object(mut map) => match map.remove("jobs") {
                Some(JsonValue::Array(items)) => items,
                _ => {
                    return Err(ExtractError::Unsupported {
                        url: page.url.clone(),
                        reason: "object without a `jobs` array".into(),
                    })
                }
            },
            _ => {
                return Err(ExtractError::Unsupported {
                    url: page.url.clone(),
                    reason: "expected a json array or object".into(),
                })
            }
        };

        let now = Utc::now();
        let mut records = Vec::with_capacity(items.len());
        for (position, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<JobRecord>(normalize_feed_item(item, now)) {
                Ok(mut record) => {
                    if record.source.trim().is_empty() {
                        record.source = self.source_id.clone();
                    }
                    records.push(record);
                }
                Err(err) => {
                    warn!(source_id = %self.source_id, url = %page.url, position, error = %err, "skipping malformed feed item")
                }
            }
        }
        Ok(records)
    }
}
