//! Configuration types for a batch run.
//!
//! Every knob lives in [`BatchConfig`], built via [`BatchConfigBuilder`].
//! Fields that depend on the chosen backend (model, endpoint, output
//! directory, accepted extensions, credential variable) are `Option`s; the
//! accessor methods fall back to the backend's defaults, so switching
//! `--backend` switches all of them together unless one was set explicitly.

use crate::backend::{InferenceBackend, Submission};
use crate::error::Rx2JsonError;
use crate::pipeline::extract::ExtractionStrategy;
use crate::pipeline::render::PageRasterizer;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Input directory used when none is configured.
pub const DEFAULT_INPUT_DIR: &str = "./images";

/// Which inference service a batch talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Google Gemini; whole documents (PDFs included) in one request.
    #[default]
    Cloud,
    /// Locally hosted OpenAI-compatible vision server; one request per page.
    Local,
}

impl BackendKind {
    pub fn submission(self) -> Submission {
        match self {
            BackendKind::Cloud => Submission::WholeDocument,
            BackendKind::Local => Submission::PerPage,
        }
    }

    pub fn default_model(self) -> &'static str {
        match self {
            BackendKind::Cloud => crate::backend::gemini::DEFAULT_MODEL,
            BackendKind::Local => crate::backend::openai_compat::DEFAULT_MODEL,
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            BackendKind::Cloud => crate::backend::gemini::DEFAULT_BASE_URL,
            BackendKind::Local => crate::backend::openai_compat::DEFAULT_BASE_URL,
        }
    }

    /// Environment variable holding the credential.
    pub fn api_key_env(self) -> &'static str {
        match self {
            BackendKind::Cloud => "GEMINI_API_KEY",
            BackendKind::Local => "API_KEY",
        }
    }

    pub fn default_output_dir(self) -> &'static str {
        match self {
            BackendKind::Cloud => "./output_model_gemini",
            BackendKind::Local => "./output_model_olmocr",
        }
    }

    /// Extensions each service is known to accept.
    pub fn default_extensions(self) -> &'static [&'static str] {
        match self {
            BackendKind::Cloud => &["pdf", "png", "jpg", "jpeg", "webp", "heic"],
            BackendKind::Local => &["pdf", "png", "jpg", "jpeg", "tiff", "bmp", "webp"],
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Cloud => f.write_str("cloud"),
            BackendKind::Local => f.write_str("local"),
        }
    }
}

/// Configuration for one batch run.
///
/// # Example
/// ```rust
/// use edgequake_rx2json::{BackendKind, BatchConfig};
///
/// let config = BatchConfig::builder()
///     .backend_kind(BackendKind::Local)
///     .input_dir("./scans")
///     .dpi(200)
///     .build()
///     .unwrap();
/// assert_eq!(config.output_dir().to_str(), Some("./output_model_olmocr"));
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Backend to construct when `backend` is `None`. Default: cloud.
    pub backend_kind: BackendKind,

    /// Directory scanned for documents. Default: `./images`.
    pub input_dir: PathBuf,

    /// Directory receiving one JSON file per document.
    /// If None, uses the backend's default.
    pub output_dir: Option<PathBuf>,

    /// Model identifier. If None, uses the backend's default.
    pub model: Option<String>,

    /// Endpoint base URL. If None, uses the backend's default.
    pub base_url: Option<String>,

    /// Credential. If None, read from the backend's environment variable at
    /// build time; absence is not an error (the first request fails instead).
    pub api_key: Option<String>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Transcription wants the model to copy what it sees, not improvise.
    pub temperature: f32,

    /// Maximum tokens generated per request (per-page backend). Default: 4096.
    pub max_tokens: usize,

    /// PDF rasterisation DPI (per-page backend). Range: 72–600. Default: 300.
    pub dpi: u32,

    /// Cap on either edge of a rasterised page. Default: 4000.
    pub max_rendered_pixels: u32,

    /// Accepted file extensions. If None, uses the backend's defaults.
    pub extensions: Option<Vec<String>>,

    /// Custom instruction prompt. If None, uses the backend's default.
    pub system_prompt: Option<String>,

    /// Fallback order for JSON extraction. If None, uses the backend's default.
    pub extraction: Option<ExtractionStrategy>,

    /// Retries per request after a transport/API failure. Default: 0.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-request timeout in seconds. Default: None (wait indefinitely).
    pub request_timeout_secs: Option<u64>,

    /// Pre-constructed backend. Takes precedence over `backend_kind`.
    pub backend: Option<Arc<dyn InferenceBackend>>,

    /// Pre-constructed PDF rasteriser. If None, pdfium is used.
    pub rasterizer: Option<Arc<dyn PageRasterizer>>,

    /// Per-document progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            backend_kind: BackendKind::default(),
            input_dir: PathBuf::from(DEFAULT_INPUT_DIR),
            output_dir: None,
            model: None,
            base_url: None,
            api_key: None,
            temperature: 0.1,
            max_tokens: 4096,
            dpi: 300,
            max_rendered_pixels: 4000,
            extensions: None,
            system_prompt: None,
            extraction: None,
            max_retries: 0,
            retry_backoff_ms: 500,
            request_timeout_secs: None,
            backend: None,
            rasterizer: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("backend_kind", &self.backend_kind)
            .field("input_dir", &self.input_dir)
            .field("output_dir", &self.output_dir())
            .field("model", &self.model_id())
            .field("base_url", &self.endpoint())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("dpi", &self.dpi)
            .field("extensions", &self.accepted_extensions())
            .field("extraction", &self.extraction)
            .field("max_retries", &self.max_retries)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("backend", &self.backend.as_ref().map(|b| b.name().to_string()))
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.backend_kind.default_output_dir()))
    }

    pub fn model_id(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.backend_kind.default_model())
    }

    pub fn endpoint(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.backend_kind.default_base_url())
    }

    pub fn accepted_extensions(&self) -> Vec<String> {
        match &self.extensions {
            Some(list) => list.clone(),
            None => self
                .backend_kind
                .default_extensions()
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }

    /// Explicit key, else the backend's environment variable, else None.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            std::env::var(self.backend_kind.api_key_env())
                .ok()
                .filter(|k| !k.is_empty())
        })
    }
}

/// Builder for [`BatchConfig`].
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl fmt::Debug for BatchConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl BatchConfigBuilder {
    pub fn backend_kind(mut self, kind: BackendKind) -> Self {
        self.config.backend_kind = kind;
        self
    }

    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = Some(dir.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.extensions = Some(exts.into_iter().map(Into::into).collect());
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn extraction(mut self, strategy: ExtractionStrategy) -> Self {
        self.config.extraction = Some(strategy);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = Some(secs);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn InferenceBackend>) -> Self {
        self.config.backend = Some(backend);
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.config.rasterizer = Some(rasterizer);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, Rx2JsonError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(Rx2JsonError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.max_tokens == 0 {
            return Err(Rx2JsonError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.input_dir.as_os_str().is_empty() {
            return Err(Rx2JsonError::InvalidConfig(
                "input directory must not be empty".into(),
            ));
        }
        if matches!(&c.extensions, Some(list) if list.is_empty()) {
            return Err(Rx2JsonError::InvalidConfig(
                "at least one file extension must be accepted".into(),
            ));
        }
        Ok(self.config)
    }
}
