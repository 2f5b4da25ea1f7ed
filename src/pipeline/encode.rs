//! Payload encoding: bytes → base64 attachment for the inference request.
//!
//! Files on disk (images, or whole PDFs for the cloud backend) are sent as-is.
//! Rasterised PDF pages are re-encoded as JPEG; the JPEG encoder has no alpha
//! channel, so pages are flattened to RGB first.

use crate::error::Rx2JsonError;
use crate::pipeline::input::image_mime_type;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

/// One attachment submitted to a model: a page image or a whole document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagePayload {
    /// 1-based page number within the owning document (1 for whole documents).
    pub page_number: usize,
    /// MIME type sent alongside the data.
    pub mime_type: String,
    /// Base64 (standard alphabet, padded) encoded bytes.
    pub data: String,
}

impl PagePayload {
    /// `data:` URL form used by OpenAI-compatible chat APIs.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Read `path` and wrap its bytes unchanged.
pub async fn encode_file(path: &Path, mime_type: &str) -> Result<PagePayload, Rx2JsonError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| Rx2JsonError::InputReadFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
    debug!("Read {} ({} bytes)", path.display(), bytes.len());
    Ok(encode_bytes(1, &bytes, mime_type))
}

/// Read an image file, inferring its MIME type (JPEG when unknown).
pub async fn encode_image_file(path: &Path) -> Result<PagePayload, Rx2JsonError> {
    let mime = image_mime_type(path);
    encode_file(path, &mime).await
}

/// Encode a rasterised page as a base64 JPEG.
pub fn encode_page(page_number: usize, img: &DynamicImage) -> Result<PagePayload, Rx2JsonError> {
    let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)
        .map_err(|e| Rx2JsonError::ImageEncodeFailed {
            page: page_number,
            detail: e.to_string(),
        })?;
    Ok(encode_bytes(page_number, &buf, "image/jpeg"))
}

fn encode_bytes(page_number: usize, bytes: &[u8], mime_type: &str) -> PagePayload {
    let data = STANDARD.encode(bytes);
    debug!("Encoded page {} → {} bytes base64", page_number, data.len());
    PagePayload {
        page_number,
        mime_type: mime_type.to_string(),
        data,
    }
}
