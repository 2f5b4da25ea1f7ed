//! Pipeline stages for prescription extraction.
//!
//! Each submodule implements exactly one step, so each can be tested alone
//! and the external collaborators (pdfium, the model endpoint) stay behind
//! narrow seams.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ backend ──▶ extract
//! (listing)  (pdfium)  (base64)   (model)    (JSON)
//! ```
//!
//! 1. [`input`]: list accepted files in the input directory, infer MIME
//! 2. [`render`]: rasterise PDF pages (per-page backend only)
//! 3. [`encode`]: wrap file bytes or JPEG pages as base64 payloads
//! 4. [`crate::backend`]: one request per document or per page
//! 5. [`extract`]: recover JSON from the reply; never fails

pub mod encode;
pub mod extract;
pub mod input;
pub mod render;
