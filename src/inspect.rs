use lopdf::Document as LoDocument;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InspectError {
    #[error("PDF_PARSE_FAILED: {0}")]
    ParseFailed(String),
    #[error("PDF_IO_ERROR: {0}")]
    Io(String),
    #[error("PDF_EMPTY_OR_NO_PAGES: pdf has no pages")]
    NoPages,
    #[error("PDF_PAGE_COUNT_MISMATCH: expected {expected} pages, found {found}")]
    PageCountMismatch { expected: usize, found: usize },
}

impl InspectError {
    pub fn code(&self) -> &'static str {
        match self {
            InspectError::ParseFailed(_) => "PDF_PARSE_FAILED",
            InspectError::Io(_) => "PDF_IO_ERROR",
            InspectError::NoPages => "PDF_EMPTY_OR_NO_PAGES",
            InspectError::PageCountMismatch { .. } => "PDF_PAGE_COUNT_MISMATCH",
        }
    }
}

/// What a PDF reader sees in an exported document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfInspectReport {
    pub pdf_version: String,
    pub page_count: usize,
    pub encrypted: bool,
    pub file_size_bytes: usize,
    pub title: Option<String>,
}

pub fn inspect_pdf_bytes(bytes: &[u8]) -> Result<PdfInspectReport, InspectError> {
    let pdf =
        LoDocument::load_mem(bytes).map_err(|err| InspectError::ParseFailed(err.to_string()))?;
    let title = pdf
        .trailer
        .get(b"Info")
        .and_then(|info| info.as_reference())
        .and_then(|id| pdf.get_dictionary(id))
        .and_then(|dict| dict.get(b"Title"))
        .and_then(|title| title.as_str())
        .ok()
        .map(|raw| raw.iter().map(|b| *b as char).collect::<String>());

    Ok(PdfInspectReport {
        pdf_version: pdf.version.clone(),
        page_count: pdf.get_pages().len(),
        encrypted: pdf.is_encrypted(),
        file_size_bytes: bytes.len(),
        title,
    })
}

pub fn inspect_pdf_path(path: &Path) -> Result<PdfInspectReport, InspectError> {
    let data = std::fs::read(path).map_err(|err| InspectError::Io(err.to_string()))?;
    inspect_pdf_bytes(&data)
}

/// Re-reads freshly encoded bytes and checks they hold exactly the pages laid out.
pub fn verify_pdf_bytes(bytes: &[u8], expected_pages: usize) -> Result<PdfInspectReport, InspectError> {
    let report = inspect_pdf_bytes(bytes)?;
    if report.page_count == 0 {
        return Err(InspectError::NoPages);
    }
    if report.page_count != expected_pages {
        return Err(InspectError::PageCountMismatch {
            expected: expected_pages,
            found: report.page_count,
        });
    }
    Ok(report)
}
