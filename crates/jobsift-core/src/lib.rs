//! Core job-record model and lenient field parsing for jobsift.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "jobsift-core";

/// Fields a candidate must carry (non-blank) before it can be stored.
pub const REQUIRED_FIELDS: [&str; 4] = ["title", "company", "location", "url"];

/// A job posting as handed over by an extractor and, once accepted, as stored.
///
/// Required string fields deserialize to empty strings when absent so that
/// validation can reject them explicitly instead of failing the whole page.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JobRecord {
    pub title: String,
    pub company: String,
    pub location: String,
    pub url: String,
    pub source: String,
    pub description: Option<String>,
    pub salary: Option<Salary>,
    pub date_posted: Option<DateTime<Utc>>,
    pub job_type: Option<JobType>,
    pub experience_level: Option<ExperienceLevel>,
    pub remote: Option<bool>,
    pub skills: BTreeSet<String>,
}

impl JobRecord {
    pub fn new(
        title: impl Into<String>,
        company: impl Into<String>,
        location: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            company: company.into(),
            location: location.into(),
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_salary(mut self, salary: Salary) -> Self {
        self.salary = Some(salary);
        self
    }

    pub fn with_job_type(mut self, job_type: JobType) -> Self {
        self.job_type = Some(job_type);
        self
    }

    pub fn with_experience_level(mut self, level: ExperienceLevel) -> Self {
        self.experience_level = Some(level);
        self
    }

    pub fn with_remote(mut self, remote: bool) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_date_posted(mut self, date_posted: DateTime<Utc>) -> Self {
        self.date_posted = Some(date_posted);
        self
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skills = skills.into_iter().map(Into::into).collect();
        self
    }

    /// Name of the first required field that is blank, if any.
    pub fn missing_required_field(&self) -> Option<&'static str> {
        let values = [&self.title, &self.company, &self.location, &self.url];
        REQUIRED_FIELDS
            .iter()
            .zip(values)
            .find(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
    }

    pub fn is_valid(&self) -> bool {
        self.missing_required_field().is_none()
    }

    /// Numeric salary floor; missing or unparseable salaries count as zero.
    pub fn salary_floor(&self) -> f64 {
        self.salary
            .as_ref()
            .and_then(Salary::floor)
            .unwrap_or(0.0)
    }

    pub fn url_key(&self) -> Option<RecordKey<'_>> {
        if self.url.is_empty() {
            None
        } else {
            Some(RecordKey::Url(&self.url))
        }
    }

    pub fn title_company_key(&self) -> RecordKey<'_> {
        RecordKey::TitleCompany {
            title: &self.title,
            company: &self.company,
        }
    }
}

/// Lookup key accepted by record stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKey<'a> {
    Url(&'a str),
    TitleCompany { title: &'a str, company: &'a str },
}

/// Salary as published: a single figure, a range, or raw text parsed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Salary {
    Amount(f64),
    Range { min: f64, max: f64 },
    Text(String),
}

impl Salary {
    pub fn floor(&self) -> Option<f64> {
        match self {
            Salary::Amount(value) => Some(*value),
            Salary::Range { min, .. } => Some(*min),
            Salary::Text(text) => parse_salary(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobType {
    FullTime,
    PartTime,
    Contract,
    Internship,
    Temporary,
    Volunteer,
    Other(String),
}

impl JobType {
    /// Lenient classification of free text ("Full-time", "FULL_TIME", "contractor").
    pub fn parse(text: &str) -> Self {
        let lower = text.trim().to_lowercase();
        if lower.contains("full") {
            JobType::FullTime
        } else if lower.contains("part") {
            JobType::PartTime
        } else if lower.contains("contract") || lower.contains("freelance") {
            JobType::Contract
        } else if lower.contains("intern") {
            JobType::Internship
        } else if lower.contains("temp") {
            JobType::Temporary
        } else if lower.contains("volunteer") {
            JobType::Volunteer
        } else {
            JobType::Other(text.trim().to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            JobType::FullTime => "Full-time",
            JobType::PartTime => "Part-time",
            JobType::Contract => "Contract",
            JobType::Internship => "Internship",
            JobType::Temporary => "Temporary",
            JobType::Volunteer => "Volunteer",
            JobType::Other(raw) => raw,
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<String> for JobType {
    fn from(value: String) -> Self {
        JobType::parse(&value)
    }
}

impl From<JobType> for String {
    fn from(value: JobType) -> Self {
        value.label().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ExperienceLevel {
    Entry,
    Mid,
    Senior,
    Lead,
    Manager,
    Director,
    Executive,
    Other(String),
}

impl ExperienceLevel {
    pub fn parse(text: &str) -> Self {
        let lower = text.trim().to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        let has = |candidates: &[&str]| candidates.iter().any(|c| words.contains(c));

        if has(&["executive", "vp", "chief", "cto", "ceo"]) {
            ExperienceLevel::Executive
        } else if has(&["director"]) || lower.contains("head of") {
            ExperienceLevel::Director
        } else if has(&["manager", "mgr"]) {
            ExperienceLevel::Manager
        } else if has(&["lead", "principal", "staff"]) {
            ExperienceLevel::Lead
        } else if has(&["senior", "sr"]) {
            ExperienceLevel::Senior
        } else if has(&["mid", "intermediate"]) {
            ExperienceLevel::Mid
        } else if has(&["entry", "junior", "jr", "graduate", "intern"]) {
            ExperienceLevel::Entry
        } else {
            ExperienceLevel::Other(text.trim().to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ExperienceLevel::Entry => "Entry Level",
            ExperienceLevel::Mid => "Mid Level",
            ExperienceLevel::Senior => "Senior",
            ExperienceLevel::Lead => "Lead",
            ExperienceLevel::Manager => "Manager",
            ExperienceLevel::Director => "Director",
            ExperienceLevel::Executive => "Executive",
            ExperienceLevel::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<String> for ExperienceLevel {
    fn from(value: String) -> Self {
        ExperienceLevel::parse(&value)
    }
}

impl From<ExperienceLevel> for String {
    fn from(value: ExperienceLevel) -> Self {
        value.label().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SalaryAmount {
    value: f64,
    multiplier: Option<f64>,
    start: usize,
    end: usize,
}

impl SalaryAmount {
    fn scaled(&self) -> f64 {
        self.value * self.multiplier.unwrap_or(1.0)
    }
}

fn suffix_multiplier(ch: char) -> Option<f64> {
    match ch.to_ascii_lowercase() {
        'k' => Some(1_000.0),
        'm' => Some(1_000_000.0),
        'b' => Some(1_000_000_000.0),
        _ => None,
    }
}

fn salary_amounts(text: &str) -> Vec<SalaryAmount> {
    let chars: Vec<char> = text.chars().collect();
    let digit_at = |idx: usize| chars.get(idx).is_some_and(|c| c.is_ascii_digit());
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if !chars[i].is_ascii_digit() {
            i += 1;
            continue;
        }
        let start = i;
        let mut digits = String::new();
        let mut seen_dot = false;
        while i < chars.len() {
            let ch = chars[i];
            if ch.is_ascii_digit() {
                digits.push(ch);
            } else if ch == ',' && digit_at(i + 1) {
                // thousands separator
            } else if ch == '.' && !seen_dot && digit_at(i + 1) {
                digits.push('.');
                seen_dot = true;
            } else {
                break;
            }
            i += 1;
        }
        let Ok(value) = digits.parse::<f64>() else {
            continue;
        };

        let mut j = i;
        while chars.get(j) == Some(&' ') {
            j += 1;
        }
        let mut multiplier = None;
        if let Some(mult) = chars.get(j).copied().and_then(suffix_multiplier) {
            let at_boundary = chars.get(j + 1).map_or(true, |c| !c.is_alphabetic());
            if at_boundary {
                multiplier = Some(mult);
                i = j + 1;
            }
        }
        out.push(SalaryAmount {
            value,
            multiplier,
            start,
            end: i,
        });
    }
    out
}

fn is_range_separator(between: &str) -> bool {
    let between = between
        .trim()
        .trim_matches(|c: char| matches!(c, '$' | '€' | '£' | '¥'))
        .trim()
        .to_lowercase();
    matches!(between.as_str(), "-" | "–" | "—" | "to")
}

/// Parse a salary text into `(min, max)`, applying K/M/B suffixes.
///
/// A suffix on the upper bound also scales a bare lower bound, so
/// `"$100-150K"` yields `(100000, 150000)`.
pub fn parse_salary_range(text: &str) -> Option<(f64, f64)> {
    let amounts = salary_amounts(text);
    let first = *amounts.first()?;
    let Some(second) = amounts.get(1).copied() else {
        let value = first.scaled();
        return Some((value, value));
    };

    let between: String = text
        .chars()
        .skip(first.end)
        .take(second.start.saturating_sub(first.end))
        .collect();
    if !is_range_separator(&between) {
        let value = first.scaled();
        return Some((value, value));
    }

    let max = second.scaled();
    let mut min = first.scaled();
    if first.multiplier.is_none() {
        if let Some(mult) = second.multiplier {
            if first.value * mult <= max {
                min = first.value * mult;
            }
        }
    }
    Some((min.min(max), max.max(min)))
}

/// Parse the salary floor from free text ("$120K", "$1.5M", "90,000 - 110,000").
/// Returns `None` when no number can be read.
pub fn parse_salary(text: &str) -> Option<f64> {
    parse_salary_range(text).map(|(min, _)| min)
}

/// Parse a posting date: RFC 3339, `YYYY-MM-DD`, "today", "yesterday" or
/// "N hours/days/weeks/months ago" relative to `now`.
pub fn parse_date_posted(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }

    let lower = trimmed.to_lowercase();
    if lower == "today" || lower.starts_with("just") {
        return Some(now);
    }
    if lower == "yesterday" {
        return Some(now - Duration::days(1));
    }
    if !lower.ends_with("ago") {
        return None;
    }

    let amount = salary_amounts(&lower).first().map(|a| a.value as i64)?;
    let unit = if lower.contains("minute") {
        Duration::try_minutes(amount)
    } else if lower.contains("hour") {
        Duration::try_hours(amount)
    } else if lower.contains("day") {
        Duration::try_days(amount)
    } else if lower.contains("week") {
        Duration::try_weeks(amount)
    } else if lower.contains("month") {
        amount.checked_mul(30).and_then(Duration::try_days)
    } else {
        return None;
    }?;
    now.checked_sub_signed(unit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).single().unwrap()
    }

    #[test]
    fn salary_suffixes_scale_values() {
        assert_eq!(parse_salary("$120K"), Some(120_000.0));
        assert_eq!(parse_salary("$1.5M"), Some(1_500_000.0));
        assert_eq!(parse_salary("2b"), Some(2_000_000_000.0));
        assert_eq!(parse_salary("USD 95,000 per year"), Some(95_000.0));
    }

    #[test]
    fn unparseable_salary_is_none() {
        assert_eq!(parse_salary("competitive"), None);
        assert_eq!(parse_salary(""), None);
        assert_eq!(parse_salary("$"), None);
    }

    #[test]
    fn salary_ranges_propagate_upper_suffix() {
        assert_eq!(parse_salary_range("$100-150K"), Some((100_000.0, 150_000.0)));
        assert_eq!(
            parse_salary_range("$90,000 - $110,000"),
            Some((90_000.0, 110_000.0))
        );
        assert_eq!(parse_salary_range("80k to 95k"), Some((80_000.0, 95_000.0)));
        // a trailing unrelated number is not a range
        assert_eq!(
            parse_salary_range("$120K plus 10% bonus"),
            Some((120_000.0, 120_000.0))
        );
    }

    #[test]
    fn words_starting_with_suffix_letters_do_not_scale() {
        assert_eq!(parse_salary("100 months"), Some(100.0));
        assert_eq!(parse_salary("50 bonus"), Some(50.0));
    }

    #[test]
    fn salary_floor_treats_missing_as_zero() {
        let record = JobRecord::new("Engineer", "Acme", "Remote", "https://a/1");
        assert_eq!(record.salary_floor(), 0.0);

        let ranged = record
            .clone()
            .with_salary(Salary::Range { min: 90_000.0, max: 120_000.0 });
        assert_eq!(ranged.salary_floor(), 90_000.0);

        let text = record.with_salary(Salary::Text("DOE".into()));
        assert_eq!(text.salary_floor(), 0.0);
    }

    #[test]
    fn missing_required_fields_are_reported_in_order() {
        let record = JobRecord::new("Engineer", "  ", "", "https://a/1");
        assert_eq!(record.missing_required_field(), Some("company"));
        assert!(!record.is_valid());

        let ok = JobRecord::new("Engineer", "Acme", "Berlin", "https://a/1");
        assert_eq!(ok.missing_required_field(), None);
    }

    #[test]
    fn dates_parse_absolute_and_relative_forms() {
        let now = now();
        assert_eq!(
            parse_date_posted("2026-03-01", now),
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).single()
        );
        assert_eq!(
            parse_date_posted("2026-03-01T08:30:00Z", now),
            Utc.with_ymd_and_hms(2026, 3, 1, 8, 30, 0).single()
        );
        assert_eq!(parse_date_posted("3 days ago", now), Some(now - Duration::days(3)));
        assert_eq!(parse_date_posted("30+ days ago", now), Some(now - Duration::days(30)));
        assert_eq!(parse_date_posted("Yesterday", now), Some(now - Duration::days(1)));
        assert_eq!(parse_date_posted("sometime soon", now), None);
    }

    #[test]
    fn out_of_range_relative_dates_are_none() {
        let now = now();
        assert_eq!(parse_date_posted("100000000 days ago", now), None);
        assert_eq!(parse_date_posted("999999999999999999 months ago", now), None);
        assert_eq!(parse_date_posted("99999999999999999999 hours ago", now), None);
        assert_eq!(parse_date_posted("2 weeks ago", now), Some(now - Duration::weeks(2)));
    }

    #[test]
    fn job_type_and_level_parse_leniently() {
        assert_eq!(JobType::parse("FULL_TIME"), JobType::FullTime);
        assert_eq!(JobType::parse("Contractor"), JobType::Contract);
        assert_eq!(JobType::parse("Seasonal"), JobType::Other("Seasonal".into()));
        assert_eq!(ExperienceLevel::parse("Sr. level"), ExperienceLevel::Senior);
        assert_eq!(ExperienceLevel::parse("Head of Data"), ExperienceLevel::Director);
        assert_eq!(ExperienceLevel::parse("Entry level"), ExperienceLevel::Entry);
        assert_eq!(ExperienceLevel::Mid.label(), "Mid Level");
    }

    #[test]
    fn feed_shaped_json_deserializes_with_defaults() {
        let json = r#"{
            "title": "Backend Engineer",
            "company": "Acme",
            "url": "https://acme.example/jobs/1",
            "salary": "$140K",
            "job_type": "Full-time",
            "skills": ["rust", "postgres", "rust"]
        }"#;
        let record: JobRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.location, "");
        assert_eq!(record.missing_required_field(), Some("location"));
        assert_eq!(record.salary_floor(), 140_000.0);
        assert_eq!(record.job_type, Some(JobType::FullTime));
        assert_eq!(record.skills.len(), 2);

        let numeric: JobRecord =
            serde_json::from_str(r#"{"salary": {"min": 1.0, "max": 2.0}}"#).unwrap();
        assert_eq!(numeric.salary, Some(Salary::Range { min: 1.0, max: 2.0 }));
    }
}
