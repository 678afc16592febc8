use crate::error::LoadError;
use lopdf::Document;
use std::path::Path;
use tracing::warn;

/// A page-delimited span of raw extracted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSpan {
    pub page_start: u32,
    pub page_end: u32,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Paged,
    FlatText,
}

impl DocumentKind {
    /// Unknown extensions are decoded as flat text.
    pub fn from_filename(filename: &str) -> Self {
        let is_pdf = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            DocumentKind::Paged
        } else {
            DocumentKind::FlatText
        }
    }
}

pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageSpan>, LoadError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageSpan>, LoadError> {
        let document =
            Document::load(path).map_err(|error| LoadError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    warn!(path = %path.display(), page = page_no, %error, "page text extraction failed");
                    String::new()
                }
            };

            pages.push(PageSpan {
                page_start: page_no,
                page_end: page_no,
                text,
            });
        }

        Ok(pages)
    }
}

/// Loads a file as ordered page spans, dispatching on the declared filename's
/// extension rather than the on-disk path.
pub fn load_document(path: &Path, declared_filename: &str) -> Result<Vec<PageSpan>, LoadError> {
    match DocumentKind::from_filename(declared_filename) {
        DocumentKind::Paged => LopdfExtractor.extract_pages(path),
        DocumentKind::FlatText => load_flat_text(path),
    }
}

fn load_flat_text(path: &Path) -> Result<Vec<PageSpan>, LoadError> {
    let bytes = std::fs::read(path)?;
    Ok(vec![PageSpan {
        page_start: 1,
        page_end: 1,
        text: String::from_utf8_lossy(&bytes).into_owned(),
    }])
}
