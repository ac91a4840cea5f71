//! services/api/src/adapters/pdf.rs
//!
//! The `DocumentExtractor` adapter. PDF text comes from `pdf-extract`; embedded
//! page images come from `lopdf`. Plain UTF-8 uploads are accepted as text with
//! no images.

use std::sync::OnceLock;

use async_trait::async_trait;
use lopdf::Document as PdfDocument;
use regex::Regex;
use study_assistant_core::domain::{ExtractedDocument, ImageEncoding, PageImage};
use study_assistant_core::ports::{DocumentExtractor, PortError, PortResult};
use tracing::{debug, info, warn};

/// Pages with less meaningful text than this contribute no images.
const MIN_PAGE_TEXT_CHARS: usize = 20;

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentExtractor for PdfExtractor {
    async fn extract(&self, bytes: &[u8], file_name: &str) -> PortResult<ExtractedDocument> {
        if !looks_like_pdf(bytes, file_name) {
            let text = String::from_utf8(bytes.to_vec()).map_err(|_| {
                PortError::Unexpected("Only PDF and UTF-8 text files are supported".to_string())
            })?;
            return Ok(ExtractedDocument {
                text,
                images: Vec::new(),
            });
        }

        // Both parsers are CPU-bound.
        let owned = bytes.to_vec();
        let name = file_name.to_string();
        tokio::task::spawn_blocking(move || extract_pdf(&owned, &name))
            .await
            .map_err(|e| PortError::Unexpected(format!("PDF extraction task failed: {e}")))?
    }
}

fn looks_like_pdf(bytes: &[u8], file_name: &str) -> bool {
    bytes.starts_with(b"%PDF") || file_name.to_ascii_lowercase().ends_with(".pdf")
}

fn extract_pdf(bytes: &[u8], file_name: &str) -> PortResult<ExtractedDocument> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| PortError::Unexpected(format!("Could not extract text from PDF: {e}")))?;

    // Image extraction is best effort: a PDF whose structure lopdf rejects still yields text.
    let images = match PdfDocument::load_mem(bytes) {
        Ok(document) => page_images(&document),
        Err(e) => {
            warn!(file = %file_name, error = %e, "Could not parse PDF structure, skipping images");
            Vec::new()
        }
    };

    info!(file = %file_name, chars = text.len(), images = images.len(), "PDF extracted");
    Ok(ExtractedDocument { text, images })
}

fn page_images(document: &PdfDocument) -> Vec<PageImage> {
    let mut images = Vec::new();
    for (page_number, page_id) in document.get_pages() {
        let page_text = document.extract_text(&[page_number]).unwrap_or_default();
        if meaningful_chars(&page_text) < MIN_PAGE_TEXT_CHARS {
            debug!(page = page_number, "Skipping page with only links or little text");
            continue;
        }

        let Ok(page_images) = document.get_page_images(page_id) else {
            continue;
        };
        for image in page_images {
            // Only DCT streams are self-contained image files.
            let is_jpeg = image
                .filters
                .as_ref()
                .is_some_and(|filters| filters.iter().any(|f| f == "DCTDecode"));
            if !is_jpeg {
                continue;
            }
            images.push(PageImage {
                payload: image.content.to_vec(),
                encoding: ImageEncoding::Jpeg,
                width: image.width.max(0) as u32,
                height: image.height.max(0) as u32,
                page: page_number,
            });
        }
    }
    images
}

/// Counts the characters left after removing watermarks and URLs.
fn meaningful_chars(page_text: &str) -> usize {
    static WATERMARKS: OnceLock<Regex> = OnceLock::new();
    static URLS: OnceLock<Regex> = OnceLock::new();

    let watermarks = WATERMARKS.get_or_init(|| {
        Regex::new(r"(?i)(oalevelnotes\.com|dalevelnotes\.com|made with gamma)")
            .expect("watermark pattern is valid")
    });
    let urls = URLS.get_or_init(|| {
        Regex::new(r"https?://\S+|www\.\S+").expect("url pattern is valid")
    });

    let without_marks = watermarks.replace_all(page_text.trim(), "");
    urls.replace_all(without_marks.trim(), "")
        .trim()
        .chars()
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_only_pages_are_not_meaningful() {
        assert_eq!(meaningful_chars("  https://example.com/a www.example.org  "), 0);
        assert_eq!(meaningful_chars("Made with GAMMA oalevelnotes.com"), 0);
        assert!(meaningful_chars("Photosynthesis converts light into chemical energy") >= 20);
    }

    #[test]
    fn pdf_detection_uses_magic_or_extension() {
        assert!(looks_like_pdf(b"%PDF-1.7", "upload"));
        assert!(looks_like_pdf(b"", "Chapter.PDF"));
        assert!(!looks_like_pdf(b"plain text", "notes.txt"));
    }

    #[tokio::test]
    async fn text_uploads_pass_through() {
        let extracted = PdfExtractor::new()
            .extract("Cells divide.".as_bytes(), "cells.txt")
            .await
            .unwrap();
        assert_eq!(extracted.text, "Cells divide.");
        assert!(extracted.images.is_empty());
    }

    #[tokio::test]
    async fn binary_non_pdf_is_rejected() {
        let result = PdfExtractor::new().extract(&[0xff, 0xfe, 0x00], "blob.bin").await;
        assert!(result.is_err());
    }
}
