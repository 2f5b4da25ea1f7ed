//! Error types for the edgequake-rx2json library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Rx2JsonError`]: raised while preparing or persisting a document
//!   (unreadable input directory, output directory cannot be created, PDF
//!   cannot be rasterised). Most variants are **fatal** for the batch; a few
//!   are local to one document, see [`Rx2JsonError::is_document_local`].
//!
//! * [`InferenceError`]: **non-fatal**. A single request to the model
//!   endpoint failed (network, auth, rate limit, malformed reply). The batch
//!   logs it against the document's filename and records "no response" for
//!   that document or page, then moves on.

use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by the batch pipeline.
#[derive(Debug, Error)]
pub enum Rx2JsonError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The input directory could not be listed.
    #[error("Cannot read input directory '{path}': {source}")]
    InputDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An input document could not be read.
    #[error("Cannot read input file '{path}': {source}")]
    InputReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt or the PDF is encrypted.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for '{path}' page {page}: {detail}")]
    RasterisationFailed {
        path: PathBuf,
        page: usize,
        detail: String,
    },

    /// A rasterised page could not be re-encoded as JPEG.
    #[error("Image encoding failed for page {page}: {detail}")]
    ImageEncodeFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
PDF inputs are rasterised with pdfium. Either:\n\
  • place libpdfium next to the binary or in the working directory,\n\
  • install it system-wide, or\n\
  • set PDFIUM_LIB_PATH=/path/to/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Output errors ─────────────────────────────────────────────────────
    /// The output directory could not be created.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write an output JSON file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The HTTP client for a backend could not be constructed.
    #[error("Failed to build HTTP client for '{backend}': {detail}")]
    HttpClient { backend: String, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Rx2JsonError {
    /// `true` when the error concerns a single document and the batch should
    /// continue with the next one.
    ///
    /// Everything else points at a misconfigured environment (missing
    /// directories, no write permission, no pdfium) and stops the batch.
    pub fn is_document_local(&self) -> bool {
        matches!(
            self,
            Rx2JsonError::CorruptPdf { .. }
                | Rx2JsonError::RasterisationFailed { .. }
                | Rx2JsonError::ImageEncodeFailed { .. }
        )
    }
}

/// A non-fatal failure talking to an inference endpoint.
///
/// The pipeline never propagates this: it is logged with the offending
/// filename and the document (or page) is recorded as having no response.
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    /// Connection refused, DNS failure, timeout, TLS error.
    #[error("{backend}: request failed: {detail}")]
    Transport { backend: String, detail: String },

    /// The endpoint answered with a non-success HTTP status.
    #[error("{backend}: HTTP {status}: {body}")]
    Api {
        backend: String,
        status: u16,
        body: String,
    },

    /// The endpoint answered but produced no text (no candidates/choices,
    /// blocked by a safety filter, or a null message).
    #[error("{backend}: reply contained no text")]
    EmptyReply { backend: String },

    /// The reply envelope itself could not be decoded.
    #[error("{backend}: malformed reply: {detail}")]
    MalformedReply { backend: String, detail: String },
}

impl InferenceError {
    /// HTTP 401/403; retrying will not help.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, InferenceError::Api { status, .. } if *status == 401 || *status == 403)
    }
}
