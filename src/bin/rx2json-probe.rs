//! Smoke test for a local OpenAI-compatible vision server.
//!
//! Checks that the server answers `GET /models`, then (given a file) sends a
//! single image with a plain transcription prompt and prints the raw reply.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_rx2json::backend::openai_compat::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use edgequake_rx2json::pipeline::encode;
use edgequake_rx2json::prompts::PROBE_PROMPT;
use edgequake_rx2json::{InferenceBackend, LocalVisionBackend};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Check connectivity to a local vision server and run one test transcription.
#[derive(Parser, Debug)]
#[command(name = "rx2json-probe", version)]
struct Cli {
    /// Image to transcribe. Without it only the connection is checked.
    path: Option<PathBuf>,

    /// Server base URL.
    #[arg(long, env = "RX2JSON_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Model ID.
    #[arg(long, env = "RX2JSON_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// API key for the server.
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let backend = LocalVisionBackend::new(&cli.base_url, &cli.model, cli.api_key.clone(), cli.timeout)
        .context("Failed to build HTTP client")?;

    println!("Testing connection to {}...", backend.base_url());
    match backend.list_models().await {
        Ok(models) => {
            println!("Success: Connected to server.");
            if !models.is_empty() {
                println!("Models: {}", models.join(", "));
            }
        }
        Err(e) => {
            println!("Connection failed: {e}");
            return Ok(ExitCode::FAILURE);
        }
    }

    let Some(path) = cli.path else {
        println!("Usage: rx2json-probe path/to/document.jpg");
        return Ok(ExitCode::SUCCESS);
    };

    println!("Processing '{}'...", path.display());
    if !path.exists() {
        println!("Error: File not found: {}", path.display());
        return Ok(ExitCode::FAILURE);
    }

    let payload = encode::encode_image_file(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    println!("{}", payload.mime_type);

    match backend.complete(PROBE_PROMPT, &payload).await {
        Ok(text) => {
            println!("\nOCR Result:\n");
            println!("{text}");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("Request failed: {e}");
            Ok(ExitCode::FAILURE)
        }
    }
}
