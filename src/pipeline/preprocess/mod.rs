//! DocumentPreprocessor — raw bytes in, bounded page-image sequence out.
//!
//! Pure transform: nothing here is persisted. PDFs are rasterized page by
//! page (first page always, further pages up to the configured cap); single
//! images are orientation-corrected and re-encoded. The rendering DPI adapts
//! downward until the total PNG payload fits under the model size ceiling.

pub mod format;
pub mod hash;
pub mod image_norm;
pub mod pdf_render;

pub use format::{detect_format, sanitize_filename, FileCategory, FormatDetection};
pub use hash::compute_content_hash;
pub use pdf_render::{MockPageRenderer, PageRenderer, PdfiumRenderer};

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::PipelineConfig;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt document: {0}")]
    CorruptDocument(String),

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("image processing error: {0}")]
    ImageProcessing(String),
}

/// One normalized page, ready for model consumption. Ephemeral — never stored.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page_number: usize,
    pub png_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Output of preprocessing: the page sequence plus container metadata.
#[derive(Debug, Clone)]
pub struct PreprocessedDocument {
    pub pages: Vec<PageImage>,
    pub format: FormatDetection,
    /// Total page count of the container, which may exceed `pages.len()`
    /// when the render cap kicked in.
    pub total_page_count: usize,
    pub content_hash: String,
}

/// Normalizes raw document bytes into a bounded sequence of page images.
pub struct DocumentPreprocessor {
    renderer: Arc<dyn PageRenderer>,
    config: PipelineConfig,
}

/// DPI ladder for the adaptive-resolution loop. Starts at the configured DPI
/// and steps down until the payload fits or options run out.
const DPI_LADDER: &[u32] = &[200, 150, 100, 72];

impl DocumentPreprocessor {
    pub fn new(renderer: Arc<dyn PageRenderer>, config: PipelineConfig) -> Self {
        Self { renderer, config }
    }

    /// Normalize raw bytes into page images.
    ///
    /// Fails with `UnsupportedFormat` for mime types outside PDF/PNG/JPEG/
    /// TIFF/BMP and `CorruptDocument` when the container cannot be parsed.
    pub fn normalize(
        &self,
        bytes: &[u8],
        declared_mime: &str,
    ) -> Result<PreprocessedDocument, PreprocessError> {
        let format = detect_format(bytes, declared_mime)?;
        let content_hash = compute_content_hash(bytes);

        let (pages, total_page_count) = match format.category {
            FileCategory::Pdf => self.render_pdf(bytes)?,
            FileCategory::Image => {
                let (png_bytes, width, height) = image_norm::normalize_image(bytes)?;
                (
                    vec![PageImage {
                        page_number: 0,
                        png_bytes,
                        width,
                        height,
                    }],
                    1,
                )
            }
            FileCategory::Unsupported => {
                // detect_format already rejects this; keep the match exhaustive.
                return Err(PreprocessError::UnsupportedFormat(format.mime_type));
            }
        };

        debug!(
            mime = %format.mime_type,
            pages_rendered = pages.len(),
            total_pages = total_page_count,
            payload_bytes = pages.iter().map(|p| p.png_bytes.len()).sum::<usize>(),
            "Document preprocessed"
        );

        Ok(PreprocessedDocument {
            pages,
            format,
            total_page_count,
            content_hash,
        })
    }

    /// Render a PDF under the page cap and payload ceiling.
    ///
    /// Policy: page 0 always; pages 1..max_pages only for multi-page PDFs.
    /// If the rendered payload exceeds the ceiling, re-render the whole set
    /// one DPI step lower so page quality stays uniform across the document.
    fn render_pdf(&self, bytes: &[u8]) -> Result<(Vec<PageImage>, usize), PreprocessError> {
        let total = self.renderer.page_count(bytes)?;
        if total == 0 {
            return Err(PreprocessError::CorruptDocument(
                "PDF contains no pages".into(),
            ));
        }

        let render_count = total.min(self.config.max_pages);

        let ladder: Vec<u32> = DPI_LADDER
            .iter()
            .copied()
            .filter(|&dpi| dpi <= self.config.render_dpi)
            .collect();
        let ladder = if ladder.is_empty() {
            vec![self.config.render_dpi]
        } else {
            ladder
        };

        let mut last_attempt: Option<Vec<PageImage>> = None;
        for &dpi in &ladder {
            let pages = self.render_all(bytes, render_count, dpi)?;
            let payload: usize = pages.iter().map(|p| p.png_bytes.len()).sum();
            if payload <= self.config.max_payload_bytes {
                return Ok((pages, total));
            }
            warn!(
                dpi,
                payload,
                ceiling = self.config.max_payload_bytes,
                "Rendered payload over ceiling, stepping DPI down"
            );
            last_attempt = Some(pages);
        }

        // Lowest rung still over the ceiling: ship it rather than fail —
        // the backend may still accept it, and rejecting here would hide
        // the document from analysis entirely.
        let pages = last_attempt.expect("DPI ladder is never empty");
        Ok((pages, total))
    }

    fn render_all(
        &self,
        bytes: &[u8],
        count: usize,
        dpi: u32,
    ) -> Result<Vec<PageImage>, PreprocessError> {
        let mut pages = Vec::with_capacity(count);
        for page_number in 0..count {
            let png_bytes = self.renderer.render_page(bytes, page_number, dpi)?;
            let (width, height) = png_dimensions(&png_bytes).unwrap_or((0, 0));
            pages.push(PageImage {
                page_number,
                png_bytes,
                width,
                height,
            });
        }
        Ok(pages)
    }
}

/// Read width/height from a PNG IHDR without a full decode.
fn png_dimensions(png: &[u8]) -> Option<(u32, u32)> {
    if png.len() < 24 || &png[..8] != [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] {
        return None;
    }
    let w = u32::from_be_bytes(png[16..20].try_into().ok()?);
    let h = u32::from_be_bytes(png[20..24].try_into().ok()?);
    Some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preprocessor(pages: usize) -> DocumentPreprocessor {
        DocumentPreprocessor::new(
            Arc::new(MockPageRenderer::new(pages)),
            PipelineConfig::default(),
        )
    }

    #[test]
    fn unsupported_mime_fails_fast() {
        let pre = preprocessor(1);
        let err = pre
            .normalize(b"PK\x03\x04zipzip", "application/msword")
            .unwrap_err();
        assert!(matches!(err, PreprocessError::UnsupportedFormat(_)));
    }

    #[test]
    fn single_page_pdf_renders_one_page() {
        let pre = preprocessor(1);
        let doc = pre.normalize(b"%PDF-1.4 fake", "application/pdf").unwrap();
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.total_page_count, 1);
        assert_eq!(doc.pages[0].page_number, 0);
    }

    #[test]
    fn multi_page_pdf_capped_at_max_pages() {
        let pre = preprocessor(12);
        let doc = pre.normalize(b"%PDF-1.4 fake", "application/pdf").unwrap();
        assert_eq!(doc.pages.len(), PipelineConfig::default().max_pages);
        assert_eq!(doc.total_page_count, 12);
    }

    #[test]
    fn zero_page_pdf_is_corrupt() {
        let pre = preprocessor(0);
        let err = pre
            .normalize(b"%PDF-1.4 fake", "application/pdf")
            .unwrap_err();
        assert!(matches!(err, PreprocessError::CorruptDocument(_)));
    }

    #[test]
    fn content_hash_stable_across_calls() {
        let pre = preprocessor(1);
        let a = pre.normalize(b"%PDF-1.4 fake", "application/pdf").unwrap();
        let b = pre.normalize(b"%PDF-1.4 fake", "application/pdf").unwrap();
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn png_dimensions_reads_ihdr() {
        let png = pdf_render::minimal_png();
        assert_eq!(png_dimensions(&png), Some((1, 1)));
    }

    #[test]
    fn png_dimensions_rejects_non_png() {
        assert_eq!(png_dimensions(b"not a png at all, sorry"), None);
    }
}
