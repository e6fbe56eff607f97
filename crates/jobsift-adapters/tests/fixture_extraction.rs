use std::path::{Path, PathBuf};

use jobsift_adapters::{extractor_for_format, SourceFormat};
use jobsift_core::{ExperienceLevel, JobType, Salary};
use jobsift_storage::FetchedPage;

fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn fixture_page(name: &str, url: &str, content_type: &str) -> FetchedPage {
    let body = std::fs::read(fixture_path(name)).expect("read fixture");
    FetchedPage::from_body(url, Some(content_type), body)
}

#[test]
fn acme_careers_page_yields_both_postings() {
    let page = fixture_page(
        "acme-careers.html",
        "https://acme.example/careers",
        "text/html",
    );
    let records = extractor_for_format(SourceFormat::JsonLd, "acme-careers")
        .extract(&page)
        .expect("extract");
    assert_eq!(records.len(), 2);

    let lead = &records[0];
    assert_eq!(lead.title, "Lead Backend Developer");
    assert_eq!(lead.company, "Acme");
    assert_eq!(lead.location, "San Francisco, CA, US");
    assert_eq!(lead.url, "https://acme.example/careers/lead-backend");
    assert_eq!(
        lead.salary,
        Some(Salary::Range {
            min: 170_000.0,
            max: 210_000.0
        })
    );
    assert_eq!(lead.job_type, Some(JobType::FullTime));
    assert_eq!(lead.experience_level, Some(ExperienceLevel::Lead));
    assert_eq!(
        lead.description.as_deref(),
        Some("Own our Rust ingestion services.")
    );
    assert!(lead.skills.contains("postgresql"));
    assert!(lead.date_posted.is_some());
    assert!(lead.is_valid());

    let intern = &records[1];
    assert_eq!(intern.company, "Acme");
    assert_eq!(intern.location, "Austin, TX");
    assert_eq!(intern.job_type, Some(JobType::Internship));
    assert_eq!(intern.experience_level, Some(ExperienceLevel::Entry));
    assert_eq!(intern.salary_floor(), 45.0);
    assert_eq!(intern.source, "acme-careers");
}

#[test]
fn globex_feed_skips_malformed_items_and_fills_source() {
    let page = fixture_page(
        "globex-feed.json",
        "https://globex.example/jobs.json",
        "application/json",
    );
    let records = extractor_for_format(SourceFormat::JsonFeed, "globex")
        .extract(&page)
        .expect("extract");
    assert_eq!(records.len(), 4);

    assert_eq!(records[0].salary_floor(), 150_000.0);
    assert_eq!(records[0].experience_level, Some(ExperienceLevel::Senior));
    assert_eq!(records[0].remote, Some(true));
    assert_eq!(records[0].skills.len(), 3);

    assert_eq!(records[1].job_type, Some(JobType::Contract));
    assert!(records[1].date_posted.is_some());

    assert_eq!(records[2].source, "globex-partner-board");
    assert_eq!(records[0].source, "globex");

    assert_eq!(records[3].missing_required_field(), Some("location"));
}
