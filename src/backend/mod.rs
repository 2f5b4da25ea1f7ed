//! Inference backends: the boundary to the model endpoints.
//!
//! Both services take an instruction prompt plus one attachment and answer
//! with free-form text. They differ in what an attachment is:
//!
//! | Backend | Module | Attachment |
//! |---------|--------|------------|
//! | cloud   | [`gemini`] | the whole document, PDFs included |
//! | local   | [`openai_compat`] | one page image; PDFs are rasterised first |
//!
//! A backend reports failures as [`InferenceError`]; it is the batch, not the
//! backend, that decides to log and continue.

pub mod gemini;
pub mod openai_compat;

use crate::config::{BackendKind, BatchConfig};
use crate::error::{InferenceError, Rx2JsonError};
use crate::pipeline::encode::PagePayload;
use crate::pipeline::extract::ExtractionStrategy;
use crate::prompts::{DOCUMENT_PROMPT, PAGE_PROMPT};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub use gemini::GeminiBackend;
pub use openai_compat::LocalVisionBackend;

/// What a single request carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Submission {
    /// Raw document bytes; the service handles multi-page files itself.
    WholeDocument,
    /// One image per request.
    PerPage,
}

/// A vision-capable model endpoint.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &str;

    fn submission(&self) -> Submission;

    /// Fallback order used on this backend's replies.
    fn extraction_strategy(&self) -> ExtractionStrategy {
        match self.submission() {
            Submission::WholeDocument => ExtractionStrategy::StripFences,
            Submission::PerPage => ExtractionStrategy::FencedBlock,
        }
    }

    /// Prompt used when the configuration does not override it.
    fn default_prompt(&self) -> &str {
        match self.submission() {
            Submission::WholeDocument => DOCUMENT_PROMPT,
            Submission::PerPage => PAGE_PROMPT,
        }
    }

    /// Send `prompt` and `payload`, returning the model's raw text.
    async fn complete(&self, prompt: &str, payload: &PagePayload) -> Result<String, InferenceError>;
}

/// Resolve the backend for a batch: a pre-built one if configured, else the
/// one named by `backend_kind`.
pub fn build_backend(config: &BatchConfig) -> Result<Arc<dyn InferenceBackend>, Rx2JsonError> {
    if let Some(ref backend) = config.backend {
        return Ok(Arc::clone(backend));
    }

    let api_key = config.resolved_api_key();
    let backend: Arc<dyn InferenceBackend> = match config.backend_kind {
        BackendKind::Cloud => Arc::new(
            GeminiBackend::new(config.endpoint(), config.model_id(), api_key, config.request_timeout_secs)?
                .with_temperature(config.temperature),
        ),
        BackendKind::Local => Arc::new(
            LocalVisionBackend::new(config.endpoint(), config.model_id(), api_key, config.request_timeout_secs)?
                .with_temperature(config.temperature)
                .with_max_tokens(config.max_tokens),
        ),
    };
    Ok(backend)
}

/// Shared reqwest client construction; `timeout_secs = None` never times out.
fn http_client(backend: &str, timeout_secs: Option<u64>) -> Result<reqwest::Client, Rx2JsonError> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build().map_err(|e| Rx2JsonError::HttpClient {
        backend: backend.to_string(),
        detail: e.to_string(),
    })
}

/// Map a reqwest send/read failure.
fn transport_error(backend: &str, e: reqwest::Error) -> InferenceError {
    let detail = if e.is_connect() {
        format!("connection failed: {e}")
    } else if e.is_timeout() {
        format!("timed out: {e}")
    } else {
        e.to_string()
    };
    InferenceError::Transport {
        backend: backend.to_string(),
        detail,
    }
}

/// Turn a non-success response into [`InferenceError::Api`].
async fn check_status(backend: &str, response: reqwest::Response) -> Result<reqwest::Response, InferenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(InferenceError::Api {
        backend: backend.to_string(),
        status: status.as_u16(),
        body,
    })
}
