//! PDF rasterisation: turn each page of a PDF into an image.
//!
//! Only the per-page backend needs this; the cloud backend reads PDFs
//! natively. Rasterisation sits behind [`PageRasterizer`] so the batch can be
//! driven without a pdfium library (tests inject an in-memory rasteriser).
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and CPU-heavy rendering.
//! [`rasterize_pdf`] moves the call onto tokio's blocking pool so the runtime
//! worker is never stalled.
//!
//! Pages are handed to a sink as they are rendered and are encoded there, so
//! only one full-resolution bitmap is alive at a time.

use crate::error::Rx2JsonError;
use crate::pipeline::encode::{self, PagePayload};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Receives each rendered page with its 1-based page number.
pub type PageSink<'a> = dyn FnMut(usize, DynamicImage) -> Result<(), Rx2JsonError> + 'a;

/// Renders every page of a PDF, in page order.
///
/// Each page must be passed to `sink` before the next one is rendered; an
/// error from the sink stops rendering and is returned unchanged.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, pdf_path: &Path, sink: &mut PageSink<'_>) -> Result<(), Rx2JsonError>;
}

/// [`PageRasterizer`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    /// Render resolution in dots per inch.
    pub dpi: u32,
    /// Cap on either edge of a rendered page, in pixels.
    pub max_rendered_pixels: u32,
}

impl PdfiumRasterizer {
    pub fn new(dpi: u32, max_rendered_pixels: u32) -> Self {
        Self {
            dpi,
            max_rendered_pixels,
        }
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf_path: &Path, sink: &mut PageSink<'_>) -> Result<(), Rx2JsonError> {
        let pdfium = bind_pdfium()?;

        let document = pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| Rx2JsonError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

        let pages = document.pages();
        let total = pages.len();
        info!("PDF loaded: {} pages", total);

        // PDF user space is 72 units per inch.
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(self.dpi as f32 / 72.0)
            .set_maximum_width(self.max_rendered_pixels as i32)
            .set_maximum_height(self.max_rendered_pixels as i32);

        for idx in 0..total {
            let page = pages
                .get(idx)
                .map_err(|e| Rx2JsonError::RasterisationFailed {
                    path: pdf_path.to_path_buf(),
                    page: idx as usize + 1,
                    detail: format!("{:?}", e),
                })?;

            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                Rx2JsonError::RasterisationFailed {
                    path: pdf_path.to_path_buf(),
                    page: idx as usize + 1,
                    detail: format!("{:?}", e),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            sink(idx as usize + 1, image)?;
        }

        Ok(())
    }
}

/// Rasterise `pdf_path` on the blocking pool, encoding each page as soon as
/// it is rendered.
pub async fn rasterize_pdf(
    rasterizer: Arc<dyn PageRasterizer>,
    pdf_path: &Path,
) -> Result<Vec<PagePayload>, Rx2JsonError> {
    let path: PathBuf = pdf_path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<Vec<PagePayload>, Rx2JsonError> {
        let mut payloads = Vec::new();
        rasterizer.rasterize(&path, &mut |page_number, image| {
            payloads.push(encode::encode_page(page_number, &image)?);
            Ok(())
        })?;
        Ok(payloads)
    })
    .await
    .map_err(|e| Rx2JsonError::Internal(format!("Render task panicked: {}", e)))?
}

/// Bind to a pdfium shared library.
///
/// Resolution order: `PDFIUM_LIB_PATH`, the working directory, then the
/// system library search path.
fn bind_pdfium() -> Result<Pdfium, Rx2JsonError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| Rx2JsonError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}
