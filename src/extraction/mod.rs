//! Document extraction: turn an image or PDF into structured CRM fields.

pub mod gemini;
mod schema;

pub use gemini::GeminiExtractor;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::ExtractedFields;

/// A document-understanding service.
///
/// Implementations fail fast and never retry; the watcher retries a failed file
/// on its next poll cycle.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn analyze(&self, bytes: &[u8], mime_type: &str) -> Result<ExtractedFields>;
}

/// Analyze a document and fill in a content hash when the service left `scan_id` empty
pub async fn analyze_document(
    extractor: &dyn Extractor,
    bytes: &[u8],
    mime_type: &str,
) -> Result<ExtractedFields> {
    let mut fields = extractor.analyze(bytes, mime_type).await?.normalized();
    if fields.scan_id.trim().is_empty() {
        fields.scan_id = content_hash(bytes);
    }
    Ok(fields)
}

/// SHA-256 hex digest of the document bytes
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Whether the extractor accepts this media type (images and PDF)
pub fn is_supported_mime_type(mime_type: &str) -> bool {
    mime_type.starts_with("image/") || mime_type == "application/pdf"
}
