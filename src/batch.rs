//! Batch entry point: walk the input directory and write one JSON record per
//! document.
//!
//! Documents are handled one at a time, in listing order. A document whose
//! output file already exists is skipped without contacting the backend, so a
//! batch can be interrupted and re-run at no cost for finished work.
//!
//! Failures are graded:
//!
//! - a request that fails (transport, HTTP status, empty reply) is logged and
//!   recorded as `null` content; the record is still written.
//! - a document that cannot be prepared (corrupt PDF, unencodable page) is
//!   logged and left without output, so the next run retries it.
//! - anything else (unreadable input directory, unwritable output directory,
//!   no pdfium) aborts the batch with an error.

use crate::backend::{build_backend, InferenceBackend, Submission};
use crate::config::BatchConfig;
use crate::error::Rx2JsonError;
use crate::output::{self, BatchReport, OutputRecord};
use crate::pipeline::encode::{self, PagePayload};
use crate::pipeline::extract::{extract, Extraction, ExtractionStrategy};
use crate::pipeline::input::{self, Document};
use crate::pipeline::render::{self, PageRasterizer, PdfiumRasterizer};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

/// Process every pending document in `config.input_dir`.
///
/// # Returns
/// `Ok(BatchReport)` once every listed document has been visited, even when
/// some requests failed or some documents could not be prepared (see the
/// report's counters).
///
/// # Errors
/// Only environment-level failures are returned: the input directory cannot
/// be listed, the output directory cannot be created or written, the
/// backend's HTTP client cannot be built, or pdfium cannot be loaded.
pub async fn run_batch(config: &BatchConfig) -> Result<BatchReport, Rx2JsonError> {
    let start = Instant::now();
    let output_dir = config.output_dir();

    std::fs::create_dir_all(&output_dir).map_err(|e| Rx2JsonError::OutputDirFailed {
        path: output_dir.clone(),
        source: e,
    })?;

    let documents = input::list_documents(&config.input_dir, &config.accepted_extensions())?;
    let total = documents.len();
    info!(
        "Found {} document(s) in {}",
        total,
        config.input_dir.display()
    );

    let backend = build_backend(config)?;
    info!(
        "Using {} backend, model {}",
        backend.name(),
        config.model_id()
    );

    let rasterizer: Arc<dyn PageRasterizer> = match config.rasterizer {
        Some(ref r) => Arc::clone(r),
        None => Arc::new(PdfiumRasterizer::new(config.dpi, config.max_rendered_pixels)),
    };

    let mut report = BatchReport {
        total_documents: total,
        ..Default::default()
    };

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    for (i, document) in documents.iter().enumerate() {
        let index = i + 1;
        let output_path = document.output_path(&output_dir);

        if output::is_processed(&output_path) {
            info!("Skipping {} (Already processed)", document.filename);
            report.skipped += 1;
            if let Some(ref cb) = config.progress_callback {
                cb.on_document_skipped(index, total, &document.filename);
            }
            continue;
        }

        info!("Processing [{}/{}]: {}", index, total, document.filename);
        if let Some(ref cb) = config.progress_callback {
            cb.on_document_start(index, total, &document.filename, &document.mime_type);
        }

        let record = match backend.submission() {
            Submission::WholeDocument => {
                process_whole_document(&backend, document, config, &mut report).await
            }
            Submission::PerPage => {
                process_per_page(&backend, &rasterizer, document, config, &mut report).await
            }
        };

        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_document_local() => {
                error!("Error processing {}: {}", document.filename, e);
                report.failed += 1;
                if let Some(ref cb) = config.progress_callback {
                    cb.on_document_failed(index, total, &document.filename, &e.to_string());
                }
                continue;
            }
            Err(e) => return Err(e),
        };

        output::write_record(&record, &output_path)?;
        info!("Saved to {}", output_path.display());
        report.processed += 1;
        report.written.push(output_path.clone());
        if let Some(ref cb) = config.progress_callback {
            cb.on_document_saved(index, total, &document.filename, &output_path);
        }
    }

    report.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Batch complete: {} processed, {} skipped, {} failed in {}ms",
        report.processed, report.skipped, report.failed, report.duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(&report);
    }

    Ok(report)
}

/// One request carrying the raw document bytes.
async fn process_whole_document(
    backend: &Arc<dyn InferenceBackend>,
    document: &Document,
    config: &BatchConfig,
    report: &mut BatchReport,
) -> Result<OutputRecord, Rx2JsonError> {
    let payload = encode::encode_file(&document.path, &document.mime_type).await?;
    let content = request_extraction(backend, &payload, &document.filename, config).await;
    report.record_extraction(&content);
    Ok(OutputRecord::document(
        document.filename.clone(),
        document.mime_type.clone(),
        content,
    ))
}

/// One request per page. PDFs are rasterised; any other file is page 1.
async fn process_per_page(
    backend: &Arc<dyn InferenceBackend>,
    rasterizer: &Arc<dyn PageRasterizer>,
    document: &Document,
    config: &BatchConfig,
    report: &mut BatchReport,
) -> Result<OutputRecord, Rx2JsonError> {
    let payloads = prepare_pages(rasterizer, document).await?;
    let total_pages = payloads.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_pages_ready(&document.filename, total_pages);
    }

    let mut pages = Vec::with_capacity(total_pages);
    for payload in &payloads {
        debug!(
            "{}: page {}/{}",
            document.filename, payload.page_number, total_pages
        );
        if let Some(ref cb) = config.progress_callback {
            cb.on_page_start(&document.filename, payload.page_number, total_pages);
        }
        let content = request_extraction(backend, payload, &document.filename, config).await;
        report.record_extraction(&content);
        pages.push((payload.page_number, content));
    }

    Ok(OutputRecord::paged(document.filename.clone(), pages))
}

/// Encode every page of `document` before any request is sent, so a
/// document that fails half way through preparation costs no requests.
async fn prepare_pages(
    rasterizer: &Arc<dyn PageRasterizer>,
    document: &Document,
) -> Result<Vec<PagePayload>, Rx2JsonError> {
    if !document.is_pdf() {
        return Ok(vec![encode::encode_image_file(&document.path).await?]);
    }

    let pages = render::rasterize_pdf(Arc::clone(rasterizer), &document.path).await?;
    info!("{}: {} page(s) rasterised", document.filename, pages.len());
    Ok(pages)
}

/// Send one payload and extract JSON from the reply.
///
/// Never fails: a request that does not produce text after all retries is
/// logged against `filename` and yields [`Extraction::Empty`].
async fn request_extraction(
    backend: &Arc<dyn InferenceBackend>,
    payload: &PagePayload,
    filename: &str,
    config: &BatchConfig,
) -> Extraction {
    let prompt = config
        .system_prompt
        .as_deref()
        .unwrap_or_else(|| backend.default_prompt());
    let strategy: ExtractionStrategy = config
        .extraction
        .unwrap_or_else(|| backend.extraction_strategy());

    let reply = complete_with_retry(backend, prompt, payload, filename, config).await;
    let extraction = extract(reply.as_deref(), strategy);
    if extraction.is_failed() {
        warn!(
            "{} page {}: reply is not valid JSON, keeping raw text",
            filename, payload.page_number
        );
    }
    extraction
}

async fn complete_with_retry(
    backend: &Arc<dyn InferenceBackend>,
    prompt: &str,
    payload: &PagePayload,
    filename: &str,
    config: &BatchConfig,
) -> Option<String> {
    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                "{}: retry {}/{} after {}ms",
                filename, attempt, config.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match backend.complete(prompt, payload).await {
            Ok(text) => return Some(text),
            Err(e) => {
                warn!("Error processing {}: {}", filename, e);
                if e.is_auth_error() {
                    break;
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InferenceError;
    use crate::pipeline::render::PageSink;
    use async_trait::async_trait;
    use image::{DynamicImage, Rgb, RgbImage};
    use serde_json::{json, Value};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replies from a script, in order; `Err` entries become transport errors.
    struct Scripted {
        submission: Submission,
        replies: Mutex<Vec<Result<String, InferenceError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(submission: Submission, replies: Vec<Result<&str, &str>>) -> Arc<Self> {
            let replies = replies
                .into_iter()
                .rev()
                .map(|r| {
                    r.map(str::to_string).map_err(|d| InferenceError::Transport {
                        backend: "scripted".into(),
                        detail: d.into(),
                    })
                })
                .collect();
            Arc::new(Self {
                submission,
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl InferenceBackend for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        fn submission(&self) -> Submission {
            self.submission
        }
        async fn complete(&self, _prompt: &str, _payload: &PagePayload) -> Result<String, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies.lock().unwrap().pop().unwrap_or_else(|| {
                Err(InferenceError::EmptyReply {
                    backend: "scripted".into(),
                })
            })
        }
    }

    struct TwoPages;

    impl PageRasterizer for TwoPages {
        fn rasterize(&self, _pdf_path: &Path, sink: &mut PageSink<'_>) -> Result<(), Rx2JsonError> {
            sink(1, DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 255, 255]))))?;
            sink(2, DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0]))))
        }
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn whole_document_record_is_written() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        std::fs::write(input.path().join("rx1.jpg"), b"\xFF\xD8\xFFfake").unwrap();

        let backend = Scripted::new(
            Submission::WholeDocument,
            vec![Ok("```json\n{\"medicines\": []}\n```")],
        );
        let config = BatchConfig::builder()
            .input_dir(input.path())
            .output_dir(output.path())
            .backend(backend.clone())
            .build()
            .unwrap();

        let report = run_batch(&config).await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(
            read_json(&output.path().join("rx1.json")),
            json!({"filename": "rx1.jpg", "mime_type": "image/jpeg", "content": {"medicines": []}})
        );
    }

    #[tokio::test]
    async fn per_page_pdf_gets_one_entry_per_page() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        std::fs::write(input.path().join("rx2.pdf"), b"%PDF-1.4").unwrap();

        let backend = Scripted::new(Submission::PerPage, vec![Ok("{\"a\":1}"), Ok("oops")]);
        let config = BatchConfig::builder()
            .input_dir(input.path())
            .output_dir(output.path())
            .backend(backend.clone())
            .rasterizer(Arc::new(TwoPages))
            .build()
            .unwrap();

        let report = run_batch(&config).await.unwrap();
        assert_eq!(report.parse_failures, 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            read_json(&output.path().join("rx2.json")),
            json!({
                "filename": "rx2.pdf",
                "pages": [
                    {"page_number": 1, "content": {"a": 1}},
                    {"page_number": 2, "content": {"error": "parsing_failed", "raw_content": "oops"}}
                ]
            })
        );
    }

    #[tokio::test]
    async fn retries_until_a_reply_arrives() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        std::fs::write(input.path().join("rx1.png"), b"png").unwrap();

        let backend = Scripted::new(
            Submission::WholeDocument,
            vec![Err("connection refused"), Ok("{\"ok\": true}")],
        );
        let config = BatchConfig::builder()
            .input_dir(input.path())
            .output_dir(output.path())
            .backend(backend.clone())
            .max_retries(1)
            .retry_backoff_ms(1)
            .build()
            .unwrap();

        let report = run_batch(&config).await.unwrap();
        assert_eq!(report.no_response, 0);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert_eq!(read_json(&output.path().join("rx1.json"))["content"], json!({"ok": true}));
    }

    #[tokio::test]
    async fn missing_output_dir_is_created() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let nested = output.path().join("a").join("b");
        let backend = Scripted::new(Submission::WholeDocument, vec![]);
        let config = BatchConfig::builder()
            .input_dir(input.path())
            .output_dir(&nested)
            .backend(backend)
            .build()
            .unwrap();

        let report = run_batch(&config).await.unwrap();
        assert_eq!(report.total_documents, 0);
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn missing_input_dir_is_fatal() {
        let output = tempfile::tempdir().unwrap();
        let config = BatchConfig::builder()
            .input_dir(output.path().join("nope"))
            .output_dir(output.path())
            .backend(Scripted::new(Submission::WholeDocument, vec![]))
            .build()
            .unwrap();

        let err = run_batch(&config).await.unwrap_err();
        assert!(matches!(err, Rx2JsonError::InputDirUnreadable { .. }));
    }
}
