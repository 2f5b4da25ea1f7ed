//! End-to-end tests for edgequake-rx2json.
//!
//! These tests use real scans in `./test_cases/` and make live model calls.
//! They are gated behind the `E2E_ENABLED` environment variable so they do
//! not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 GEMINI_API_KEY=... cargo test --test e2e -- --nocapture
//!
//! The local-backend test additionally needs a vision server on
//! `http://localhost:8000/v1` (or `RX2JSON_BASE_URL`) and, for PDFs, pdfium.

use edgequake_rx2json::{run_batch, BackendKind, BatchConfig, OutputRecord, Prescription};
use std::path::PathBuf;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set *or* the scans folder is empty.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let dir = test_cases_dir();
        let has_files = std::fs::read_dir(&dir)
            .map(|mut entries| entries.any(|e| e.map(|e| e.path().is_file()).unwrap_or(false)))
            .unwrap_or(false);
        if !has_files {
            println!("SKIP: no scans found in {}", dir.display());
            return;
        }
        dir
    }};
}

/// Every written record parses back and, where a reply parsed, matches the
/// prescription schema.
fn assert_records_valid(report: &edgequake_rx2json::BatchReport) {
    for path in &report.written {
        let text = std::fs::read_to_string(path).unwrap();
        let record: OutputRecord = serde_json::from_str(&text)
            .unwrap_or_else(|e| panic!("{} is not an output record: {e}", path.display()));
        let contents = match record {
            OutputRecord::Document { content, .. } => vec![content],
            OutputRecord::Paged { pages, .. } => pages.into_iter().map(|p| p.content).collect(),
        };
        for content in contents {
            if content.is_null() || content.get("error").is_some() {
                println!("  {}: no structured content", path.display());
                continue;
            }
            let rx: Prescription = serde_json::from_value(content).unwrap_or_else(|e| {
                panic!("{} does not follow the schema: {e}", path.display())
            });
            println!("  {}: {} entries", path.display(), rx.entry_count());
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_cloud_batch() {
    let input = e2e_skip_unless_ready!();
    let output = tempfile::tempdir().unwrap();

    let config = BatchConfig::builder()
        .backend_kind(BackendKind::Cloud)
        .input_dir(&input)
        .output_dir(output.path())
        .max_retries(2)
        .build()
        .unwrap();

    let report = run_batch(&config).await.expect("cloud batch failed");
    println!("{report:#?}");
    assert!(report.processed > 0, "nothing was written");
    assert_records_valid(&report);

    let again = run_batch(&config).await.unwrap();
    assert_eq!(again.processed, 0);
    assert_eq!(again.skipped, report.processed);
}

#[tokio::test]
async fn test_local_batch() {
    let input = e2e_skip_unless_ready!();
    if std::env::var("E2E_LOCAL").is_err() {
        println!("SKIP: set E2E_LOCAL=1 when a local vision server is running");
        return;
    }
    let output = tempfile::tempdir().unwrap();

    let mut builder = BatchConfig::builder()
        .backend_kind(BackendKind::Local)
        .input_dir(&input)
        .output_dir(output.path())
        .dpi(150);
    if let Ok(url) = std::env::var("RX2JSON_BASE_URL") {
        builder = builder.base_url(url);
    }
    let config = builder.build().unwrap();

    let report = run_batch(&config).await.expect("local batch failed");
    println!("{report:#?}");
    assert!(report.processed + report.failed > 0);
    assert_records_valid(&report);
}
