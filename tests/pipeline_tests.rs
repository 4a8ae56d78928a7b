//! End-to-end tests of the fallback chain against mock logo services.
//!
//! Every source in the configuration points at a local wiremock server, so
//! these tests exercise the real HTTP sources, retry policy, standardizer,
//! default generator, and progress store together.

mod common;

use common::fixtures::config_for;
use common::wiremock_helpers::*;
use logo_scraper::batch::{BatchCoordinator, BatchOptions, BatchRun, CancellationFlag};
use logo_scraper::config::AppConfig;
use logo_scraper::logger::ProgressReporter;
use logo_scraper::processor::{CompanyProcessor, RunContext};
use logo_scraper::progress_store::ProgressStore;
use logo_scraper::{CompanyRecord, OutcomeStatus, ProcessingOutcome, SourceTag};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::MockServer;

const BLUE: [u8; 4] = [20, 60, 200, 255];

fn coordinator(config: &AppConfig, cancel: CancellationFlag) -> BatchCoordinator {
    let store = ProgressStore::open(&config.processing.output_dir).unwrap();
    let context = Arc::new(RunContext::new(config));
    let processor = CompanyProcessor::from_config(config, store, context).unwrap();
    let options = BatchOptions {
        batch_size: config.processing.batch_size,
        workers: config.processing.workers,
        progress_interval: config.processing.progress_interval,
    };
    BatchCoordinator::new(processor, options, cancel, ProgressReporter::hidden())
}

async fn run(config: &AppConfig, companies: Vec<CompanyRecord>) -> BatchRun {
    coordinator(config, CancellationFlag::new())
        .run(companies)
        .await
        .unwrap()
}

fn outcome<'a>(run: &'a BatchRun, id: &str) -> &'a ProcessingOutcome {
    run.outcomes
        .iter()
        .find(|o| o.id == id)
        .unwrap_or_else(|| panic!("no outcome for {}", id))
}

fn png_files(dir: &std::path::Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().to_string())
        .filter(|name| name.ends_with(".png"))
        .collect();
    names.sort();
    names
}

fn assert_square_png(path: &std::path::Path, size: u32) {
    let img = image::open(path).unwrap_or_else(|e| panic!("{} is not an image: {}", path.display(), e));
    assert_eq!((img.width(), img.height()), (size, size), "{}", path.display());
}

async fn request_count(server: &MockServer) -> usize {
    server.received_requests().await.map(|r| r.len()).unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Fallback order
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_primary_success_skips_favicons() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let config = config_for(&server, out.path());

    mount_png_expecting(&server, "/primary/acme.com", png_bytes(128, 128, BLUE), 1).await;
    mount_status(&server, "/ddg/acme.com.ico", 200, 0).await;
    mount_status(&server, "/google/acme.com", 200, 0).await;

    let run = run(&config, vec![CompanyRecord::new("1", "Acme").with_website("https://www.acme.com/about")]).await;

    let result = outcome(&run, "1");
    assert_eq!(result.status, OutcomeStatus::Saved(SourceTag::Primary));
    assert_eq!(result.service.as_deref(), Some("clearbit"));
    assert_eq!(result.domain.as_ref().map(|d| d.as_str()), Some("acme.com"));
    assert_square_png(&out.path().join("1.png"), 64);
}

#[tokio::test]
async fn test_primary_not_found_falls_back_to_first_favicon() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let config = config_for(&server, out.path());

    // 404 is permanent: exactly one request, no retries
    mount_status(&server, "/primary/globex.com", 404, 1).await;
    mount_png_expecting(&server, "/ddg/globex.com.ico", png_bytes(32, 32, BLUE), 1).await;
    mount_status(&server, "/google/globex.com", 200, 0).await;

    let run = run(&config, vec![CompanyRecord::new("2", "Globex").with_website("globex.com")]).await;

    let result = outcome(&run, "2");
    assert_eq!(result.status, OutcomeStatus::Saved(SourceTag::Favicon));
    assert_eq!(result.service.as_deref(), Some("duckduckgo"));
    assert_square_png(&out.path().join("2.png"), 64);
}

#[tokio::test]
async fn test_too_small_images_fall_through_to_next_source() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let config = config_for(&server, out.path());

    mount_png(&server, "/primary/initech.com", png_bytes(10, 10, BLUE)).await;
    mount_png(&server, "/ddg/initech.com.ico", png_bytes(16, 16, BLUE)).await;
    mount_png_expecting(&server, "/google/initech.com", png_bytes(48, 48, BLUE), 1).await;

    let run = run(&config, vec![CompanyRecord::new("3", "Initech").with_website("initech.com")]).await;

    let result = outcome(&run, "3");
    assert_eq!(result.status, OutcomeStatus::Saved(SourceTag::Favicon));
    assert_eq!(result.service.as_deref(), Some("google"));
}

#[tokio::test]
async fn test_html_response_is_not_retried() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let config = config_for(&server, out.path());

    mount_html(&server, "/primary/parked.com").await;
    mount_png(&server, "/ddg/parked.com.ico", png_bytes(32, 32, BLUE)).await;

    let run = run(&config, vec![CompanyRecord::new("4", "Parked").with_website("parked.com")]).await;

    assert_eq!(outcome(&run, "4").status, OutcomeStatus::Saved(SourceTag::Favicon));
    let primary_hits = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path() == "/primary/parked.com")
        .count();
    assert_eq!(primary_hits, 1);
}

#[tokio::test]
async fn test_all_sources_failing_generates_default() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let config = config_for(&server, out.path());
    // Nothing mounted: every source answers 404

    let run = run(&config, vec![CompanyRecord::new("5", "Umbrella Corporation").with_website("umbrella.example")]).await;

    let result = outcome(&run, "5");
    assert_eq!(result.status, OutcomeStatus::Saved(SourceTag::Default));
    assert_eq!(result.service.as_deref(), Some("default"));
    assert_square_png(&out.path().join("5.png"), 64);
    assert_eq!(request_count(&server).await, 3);
}

#[tokio::test]
async fn test_unusable_website_generates_default_without_requests() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let config = config_for(&server, out.path());

    let companies = vec![
        CompanyRecord::new("6", "No Site"),
        CompanyRecord::new("7", "Bad Site").with_website("not a website"),
        CompanyRecord::new("8", "東京電力"),
    ];
    let run = run(&config, companies).await;

    for id in ["6", "7", "8"] {
        assert_eq!(outcome(&run, id).status, OutcomeStatus::Saved(SourceTag::Default), "{}", id);
        assert_square_png(&out.path().join(format!("{}.png", id)), 64);
    }
    assert_eq!(request_count(&server).await, 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Transient failures and retries
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_server_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let config = config_for(&server, out.path());

    mount_flaky_png(&server, "/primary/hooli.com", 503, 2, png_bytes(64, 64, BLUE)).await;
    mount_status(&server, "/ddg/hooli.com.ico", 200, 0).await;

    let run = run(&config, vec![CompanyRecord::new("9", "Hooli").with_website("hooli.com")]).await;

    assert_eq!(outcome(&run, "9").status, OutcomeStatus::Saved(SourceTag::Primary));
}

#[tokio::test]
async fn test_rate_limited_source_exhausts_retries_then_falls_back() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let config = config_for(&server, out.path());

    // One attempt plus max_retries (2)
    mount_status(&server, "/primary/pied-piper.com", 429, 3).await;
    mount_png_expecting(&server, "/ddg/pied-piper.com.ico", png_bytes(32, 32, BLUE), 1).await;

    let run = run(&config, vec![CompanyRecord::new("10", "Pied Piper").with_website("pied-piper.com")]).await;

    assert_eq!(outcome(&run, "10").status, OutcomeStatus::Saved(SourceTag::Favicon));
}

#[tokio::test]
async fn test_timeout_falls_back_to_next_source() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let mut config = config_for(&server, out.path());
    config.retry.max_retries = 0;

    mount_slow_png(&server, "/primary/slow.com", png_bytes(64, 64, BLUE), Duration::from_millis(2500)).await;
    mount_png(&server, "/ddg/slow.com.ico", png_bytes(32, 32, BLUE)).await;

    let run = run(&config, vec![CompanyRecord::new("11", "Slow").with_website("slow.com")]).await;

    assert_eq!(outcome(&run, "11").status, OutcomeStatus::Saved(SourceTag::Favicon));
}

#[tokio::test]
async fn test_failed_domain_is_not_requested_twice() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let mut config = config_for(&server, out.path());
    config.processing.workers = 1;

    mount_status(&server, "/primary/shared.com", 404, 1).await;
    mount_png_expecting(&server, "/ddg/shared.com.ico", png_bytes(32, 32, BLUE), 2).await;

    let companies = vec![
        CompanyRecord::new("12", "Shared One").with_website("shared.com"),
        CompanyRecord::new("13", "Shared Two").with_website("https://shared.com/careers"),
    ];
    let run = run(&config, companies).await;

    assert_eq!(outcome(&run, "12").status, OutcomeStatus::Saved(SourceTag::Favicon));
    assert_eq!(outcome(&run, "13").status, OutcomeStatus::Saved(SourceTag::Favicon));
}

// ─────────────────────────────────────────────────────────────────────────────
// Batching, resume, and artifacts
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_one_artifact_per_company_and_summary_counts() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let config = config_for(&server, out.path());

    mount_png(&server, "/primary/acme.com", png_bytes(100, 80, BLUE)).await;
    mount_png(&server, "/ddg/globex.com.ico", png_bytes(32, 32, BLUE)).await;

    let companies = vec![
        CompanyRecord::new("1", "Acme").with_website("acme.com"),
        CompanyRecord::new("2", "Globex").with_website("globex.com"),
        CompanyRecord::new("3", "Initech"),
        CompanyRecord::new("1", "Acme Duplicate").with_website("acme.com"),
        CompanyRecord::new("a/b", "Slashed"),
    ];
    let run = run(&config, companies).await;

    let files = png_files(out.path());
    assert_eq!(files.len(), 4);
    assert_eq!(&files[..3], ["1.png", "2.png", "3.png"]);
    assert!(files[3].starts_with("a_b~"), "{:?}", files);
    assert_eq!(run.outcomes.len(), 4);

    let summary = &run.summary;
    assert_eq!(summary.total_companies, 4);
    assert_eq!(summary.duplicates_removed, 1);
    assert_eq!(summary.attempted, 4);
    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.succeeded_by_source.get("primary"), Some(&1));
    assert_eq!(summary.succeeded_by_source.get("favicon"), Some(&1));
    assert_eq!(summary.succeeded_by_source.get("default"), Some(&2));
    assert!(!summary.interrupted);
}

#[tokio::test]
async fn test_ids_differing_only_in_unsafe_characters_keep_separate_logos() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let config = config_for(&server, out.path());

    let companies = vec![
        CompanyRecord::new("トヨタ", "Toyota"),
        CompanyRecord::new("ソニー", "Sony"),
        CompanyRecord::new("a/b", "Slash"),
        CompanyRecord::new("a_b", "Underscore"),
    ];
    let first = run(&config, companies.clone()).await;

    assert_eq!(first.summary.succeeded, 4);
    assert_eq!(png_files(out.path()).len(), 4);

    let second = run(&config, companies).await;
    assert_eq!(second.summary.skipped_existing, 4);
    assert_eq!(second.summary.attempted, 0);
}

#[tokio::test]
async fn test_rerun_skips_existing_logos_without_requests() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let config = config_for(&server, out.path());

    mount_png(&server, "/primary/acme.com", png_bytes(64, 64, BLUE)).await;
    let companies = vec![
        CompanyRecord::new("1", "Acme").with_website("acme.com"),
        CompanyRecord::new("2", "Globex").with_website("globex.com"),
    ];

    let first = run(&config, companies.clone()).await;
    assert_eq!(first.summary.succeeded, 2);
    let before = request_count(&server).await;
    let acme_bytes = std::fs::read(out.path().join("1.png")).unwrap();

    let second = run(&config, companies).await;

    assert_eq!(request_count(&server).await, before);
    assert_eq!(second.summary.skipped_existing, 2);
    assert_eq!(second.summary.attempted, 0);
    assert!(second.outcomes.iter().all(|o| o.status == OutcomeStatus::Existing));
    assert_eq!(std::fs::read(out.path().join("1.png")).unwrap(), acme_bytes);
}

#[tokio::test]
async fn test_leftover_temp_files_are_removed_and_redone() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let config = config_for(&server, out.path());
    std::fs::write(out.path().join("1.png.tmp"), b"partial").unwrap();

    let run = run(&config, vec![CompanyRecord::new("1", "Acme")]).await;

    assert_eq!(outcome(&run, "1").status, OutcomeStatus::Saved(SourceTag::Default));
    assert!(!out.path().join("1.png.tmp").exists());
    assert_square_png(&out.path().join("1.png"), 64);
}

#[tokio::test]
async fn test_cancelled_run_abandons_without_writing() {
    let server = MockServer::start().await;
    let out = TempDir::new().unwrap();
    let config = config_for(&server, out.path());

    let cancel = CancellationFlag::new();
    cancel.cancel();
    let run = coordinator(&config, cancel)
        .run(vec![
            CompanyRecord::new("1", "Acme").with_website("acme.com"),
            CompanyRecord::new("2", "Globex").with_website("globex.com"),
        ])
        .await
        .unwrap();

    assert!(run.summary.interrupted);
    assert_eq!(run.summary.abandoned, 2);
    assert!(run.outcomes.iter().all(|o| o.status == OutcomeStatus::Abandoned));
    assert!(png_files(out.path()).is_empty());
    assert_eq!(request_count(&server).await, 0);
}
