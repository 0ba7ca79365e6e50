//! PDF detection and hand-off to an external PDF extractor.
//!
//! Detection looks at three signals: the URL (`.pdf` in the path or query),
//! the `content-type` header, and the `%PDF-` magic bytes. Parsing itself is
//! not done here; callers plug in a [`PdfExtractor`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

/// Magic bytes at the start of every PDF file.
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Where a PDF signal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PdfSignal {
    /// The URL names a `.pdf` resource.
    Url,
    /// The response declared `application/pdf`.
    ContentType,
    /// The body starts with the PDF signature.
    MagicBytes,
}

/// Text and metadata returned by a PDF extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfDocument {
    pub title: Option<String>,
    pub author: Option<String>,
    pub page_count: u32,
    pub text: String,
    #[serde(default)]
    pub metadata: Value,
}

/// Given a URL, return PDF text and metadata.
#[async_trait]
pub trait PdfExtractor: Send + Sync {
    async fn extract(&self, url: &str) -> anyhow::Result<PdfDocument>;
}

/// Extractor used when no PDF support is configured.
pub struct NoopPdfExtractor;

#[async_trait]
impl PdfExtractor for NoopPdfExtractor {
    async fn extract(&self, url: &str) -> anyhow::Result<PdfDocument> {
        Err(anyhow::anyhow!("PDF extraction is not configured (url: {url})"))
    }
}

/// `.pdf` in the URL path suffix or anywhere in the query string.
pub fn is_pdf_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => {
            let path = parsed.path().to_ascii_lowercase();
            let query = parsed.query().unwrap_or("").to_ascii_lowercase();
            path.ends_with(".pdf") || query.contains(".pdf")
        }
        Err(_) => {
            let lower = url.to_ascii_lowercase();
            let without_fragment = lower.split('#').next().unwrap_or("");
            without_fragment.ends_with(".pdf") || without_fragment.contains(".pdf?")
        }
    }
}

/// `content-type` names a PDF (parameters such as `; charset` are ignored).
pub fn is_pdf_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|mime| mime.trim().eq_ignore_ascii_case("application/pdf"))
        .unwrap_or(false)
}

/// Body begins with `%PDF-`, allowing for a leading BOM or whitespace.
pub fn has_pdf_signature(body: &[u8]) -> bool {
    let trimmed = body
        .strip_prefix(&[0xEF, 0xBB, 0xBF])
        .unwrap_or(body);
    let start = trimmed
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(trimmed.len());
    trimmed[start..].starts_with(PDF_SIGNATURE)
}

/// Sniff a fetched response for a PDF.
pub fn sniff(content_type: Option<&str>, body: &[u8]) -> Option<PdfSignal> {
    if content_type.is_some_and(is_pdf_content_type) {
        return Some(PdfSignal::ContentType);
    }
    if has_pdf_signature(body) {
        return Some(PdfSignal::MagicBytes);
    }
    None
}
