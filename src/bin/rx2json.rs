//! CLI binary for edgequake-rx2json.
//!
//! A thin shim over the library crate that maps CLI flags to `BatchConfig`,
//! runs one batch and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_rx2json::{
    run_batch, BackendKind, BatchConfig, BatchProgressCallback, BatchReport, ExtractionStrategy,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── Progress callbacks ───────────────────────────────────────────────────────

/// Progress bar over documents, with the per-document lines printed above it.
struct BarProgressCallback {
    bar: ProgressBar,
}

impl BarProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} docs  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for BarProgressCallback {
    fn on_batch_start(&self, total_documents: usize) {
        self.bar.set_length(total_documents as u64);
        self.bar.reset_eta();
    }

    fn on_document_skipped(&self, _index: usize, _total: usize, filename: &str) {
        self.bar
            .println(dim(&format!("Skipping {filename} (Already processed)")));
        self.bar.inc(1);
    }

    fn on_document_start(&self, index: usize, total: usize, filename: &str, _mime_type: &str) {
        self.bar
            .println(format!("{} Processing [{index}/{total}]: {}", cyan("◆"), bold(filename)));
        self.bar.set_message(filename.to_string());
    }

    fn on_page_start(&self, filename: &str, page_number: usize, total_pages: usize) {
        self.bar
            .set_message(format!("{filename} page {page_number}/{total_pages}"));
    }

    fn on_document_saved(&self, _index: usize, _total: usize, _filename: &str, output_path: &Path) {
        self.bar.println(format!(
            "  {} Saved to {}",
            green("✓"),
            output_path.display()
        ));
        self.bar.inc(1);
    }

    fn on_document_failed(&self, _index: usize, _total: usize, filename: &str, error: &str) {
        self.bar.println(format!(
            "  {} Error processing {filename}: {}",
            red("✗"),
            red(error)
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _report: &BatchReport) {
        self.bar.finish_and_clear();
    }
}

/// Plain lines on stdout, one per event.
struct LineProgressCallback;

impl BatchProgressCallback for LineProgressCallback {
    fn on_document_skipped(&self, _index: usize, _total: usize, filename: &str) {
        println!("Skipping {filename} (Already processed)");
    }

    fn on_document_start(&self, index: usize, total: usize, filename: &str, _mime_type: &str) {
        println!("Processing [{index}/{total}]: {filename}");
    }

    fn on_document_saved(&self, _index: usize, _total: usize, _filename: &str, output_path: &Path) {
        println!("Saved to {}", output_path.display());
    }

    fn on_document_failed(&self, _index: usize, _total: usize, filename: &str, error: &str) {
        println!("Error processing {filename}: {error}");
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Gemini, whole documents, ./images → ./output_model_gemini
  rx2json

  # Local OpenAI-compatible server, one request per page
  rx2json --backend local --base-url http://localhost:8000/v1

  # Custom folders and a different model
  rx2json --input-dir scans/ --output-dir json/ --model gemini-2.5-pro

  # Retry flaky requests twice
  rx2json --backend local --max-retries 2

BACKENDS:
  Backend  Service                     Submission       Default output dir
  ───────  ──────────────────────────  ───────────────  ─────────────────────
  cloud    Google Gemini               whole document   ./output_model_gemini
  local    OpenAI-compatible (olmOCR)  one page/request ./output_model_olmocr

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY    Key for the cloud backend
  API_KEY           Key for the local backend (optional)
  PDFIUM_LIB_PATH   Path to libpdfium (local backend, PDF input)
  RUST_LOG          Override the log filter

  A .env file in the working directory is loaded at start-up.

Documents whose output file already exists are skipped, so an interrupted
run can simply be started again.
"#;

/// Extract structured JSON from scanned prescriptions using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "rx2json",
    version,
    about = "Extract structured JSON from scanned prescriptions using Vision LLMs",
    long_about = "Send every PDF or image in a folder to a Vision Language Model and write \
one JSON file per document, following the prescription schema. Supports Google Gemini \
(whole-document submission) and any OpenAI-compatible vision server (per-page submission).",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Inference backend.
    #[arg(long, env = "RX2JSON_BACKEND", value_enum, default_value = "cloud")]
    backend: BackendArg,

    /// Folder scanned for documents.
    #[arg(long, env = "RX2JSON_INPUT_DIR", default_value = "./images")]
    input_dir: PathBuf,

    /// Folder receiving one JSON file per document [default: depends on backend].
    #[arg(long, env = "RX2JSON_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Model ID [default: gemini-2.5-flash / allenai_olmOCR-2-7B-1025-Q5_K_M.gguf].
    #[arg(long, env = "RX2JSON_MODEL")]
    model: Option<String>,

    /// Endpoint base URL [default: depends on backend].
    #[arg(long, env = "RX2JSON_BASE_URL")]
    base_url: Option<String>,

    /// API key. Defaults to GEMINI_API_KEY (cloud) or API_KEY (local).
    #[arg(long)]
    api_key: Option<String>,

    /// PDF rasterisation DPI for the local backend (72–600).
    #[arg(long, env = "RX2JSON_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Max output tokens per request (local backend).
    #[arg(long, env = "RX2JSON_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "RX2JSON_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Retries per request on transport or API failure.
    #[arg(long, env = "RX2JSON_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Per-request timeout in seconds [default: none].
    #[arg(long, env = "RX2JSON_TIMEOUT")]
    timeout: Option<u64>,

    /// Path to a text file replacing the built-in instruction prompt.
    #[arg(long, env = "RX2JSON_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// JSON extraction order [default: depends on backend].
    #[arg(long, env = "RX2JSON_EXTRACTION", value_enum)]
    extraction: Option<ExtractionArg>,

    /// Disable the progress bar; print plain lines instead.
    #[arg(long, env = "RX2JSON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "RX2JSON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "RX2JSON_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum BackendArg {
    Cloud,
    Local,
}

impl From<BackendArg> for BackendKind {
    fn from(v: BackendArg) -> Self {
        match v {
            BackendArg::Cloud => BackendKind::Cloud,
            BackendArg::Local => BackendKind::Local,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ExtractionArg {
    /// Fenced block, then brace span, then whole reply.
    Fenced,
    /// Strip fences and parse, then brace span.
    StripFences,
}

impl From<ExtractionArg> for ExtractionStrategy {
    fn from(v: ExtractionArg) -> Self {
        match v {
            ExtractionArg::Fenced => ExtractionStrategy::FencedBlock,
            ExtractionArg::StripFences => ExtractionStrategy::StripFences,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The bar already shows per-document progress, so library INFO logs
    // are only shown without it.
    let show_bar = !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else if show_bar {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if cli.quiet {
        None
    } else if show_bar {
        Some(BarProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        Some(Arc::new(LineProgressCallback))
    };

    let config = build_config(&cli, progress).await?;
    let report = run_batch(&config).await.context("Batch failed")?;

    if !cli.quiet {
        let mark = if report.failed == 0 && report.no_response == 0 {
            green("✔")
        } else {
            cyan("⚠")
        };
        eprintln!(
            "{}  {} written, {} skipped, {} failed  {}ms  →  {}",
            mark,
            bold(&report.processed.to_string()),
            report.skipped,
            report.failed,
            report.duration_ms,
            bold(&config.output_dir().display().to_string()),
        );
        if report.prescriptions > 0 {
            eprintln!(
                "   {} reply(ies) matched the prescription schema  ({} entries)",
                dim(&report.prescriptions.to_string()),
                report.prescription_entries,
            );
        }
        if report.no_response > 0 || report.parse_failures > 0 {
            eprintln!(
                "   {} request(s) without a reply  /  {} reply(ies) kept as raw text",
                dim(&report.no_response.to_string()),
                dim(&report.parse_failures.to_string()),
            );
        }
    }

    Ok(())
}

/// Map CLI args to `BatchConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<BatchConfig> {
    let mut builder = BatchConfig::builder()
        .backend_kind(cli.backend.into())
        .input_dir(&cli.input_dir)
        .dpi(cli.dpi)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries);

    if let Some(ref dir) = cli.output_dir {
        builder = builder.output_dir(dir);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref url) = cli.base_url {
        builder = builder.base_url(url);
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(secs) = cli.timeout {
        builder = builder.request_timeout_secs(secs);
    }
    if let Some(strategy) = cli.extraction {
        builder = builder.extraction(strategy.into());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
