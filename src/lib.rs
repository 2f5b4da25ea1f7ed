//! # edgequake-rx2json
//!
//! Turn a folder of scanned prescriptions into structured JSON using Vision
//! Language Models (VLMs).
//!
//! Each document in the input directory (PDF or image) is shown to a model
//! together with an instruction prompt embedding the prescription schema.
//! Whatever the model answers is run through a tolerant JSON extractor and
//! written to `<output_dir>/<base name>.json`. Documents whose output already
//! exists are skipped, so a batch can always be re-run.
//!
//! ## Pipeline Overview
//!
//! ```text
//! input dir
//!  │
//!  ├─ 1. List     accepted extensions, sorted, non-recursive
//!  ├─ 2. Skip     output file exists → nothing sent
//!  ├─ 3. Prepare  cloud: raw bytes │ local: pdfium rasterise → JPEG per page
//!  ├─ 4. VLM      Gemini generateContent │ OpenAI-compatible chat/completions
//!  ├─ 5. Extract  fenced block / brace span / whole text → JSON or envelope
//!  └─ 6. Output   pretty JSON record, written atomically
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_rx2json::{run_batch, BackendKind, BatchConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads API_KEY from the environment when set.
//!     let config = BatchConfig::builder()
//!         .backend_kind(BackendKind::Local)
//!         .input_dir("./images")
//!         .build()?;
//!     let report = run_batch(&config).await?;
//!     eprintln!("{} written, {} skipped", report.processed, report.skipped);
//!     Ok(())
//! }
//! ```
//!
//! ## Backends
//!
//! | Backend | Service | Submission | Output dir |
//! |---------|---------|------------|------------|
//! | `cloud` | Gemini (`GEMINI_API_KEY`) | whole document | `./output_model_gemini` |
//! | `local` | OpenAI-compatible server (`API_KEY`) | one page per request | `./output_model_olmocr` |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `rx2json` and `rx2json-probe` binaries |
//!
//! ```toml
//! edgequake-rx2json = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod batch;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{build_backend, GeminiBackend, InferenceBackend, LocalVisionBackend, Submission};
pub use batch::run_batch;
pub use config::{BackendKind, BatchConfig, BatchConfigBuilder};
pub use error::{InferenceError, Rx2JsonError};
pub use output::{BatchReport, OutputRecord, PageOutput};
pub use pipeline::encode::PagePayload;
pub use pipeline::extract::{extract, Extraction, ExtractionStrategy};
pub use pipeline::render::{PageRasterizer, PageSink, PdfiumRasterizer};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use schema::Prescription;
