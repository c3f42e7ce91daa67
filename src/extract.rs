//! Text extraction from uploaded documents.

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while turning document bytes into text.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The PDF parser rejected the document.
    #[error("{0}")]
    Pdf(String),
    /// The parser panicked or its blocking task was cancelled.
    #[error("extraction task aborted: {0}")]
    Aborted(String),
}

/// Interface implemented by document text extractors.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract all text from `bytes`, pages concatenated in page order.
    async fn extract(&self, bytes: Vec<u8>) -> Result<String, ExtractError>;
}

/// PDF extractor built on `pdf-extract`.
///
/// Parsing is CPU-bound and runs on the blocking pool. A panic inside the parser is reported as
/// [`ExtractError::Aborted`] instead of tearing down the consumer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextExtractor;

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, bytes: Vec<u8>) -> Result<String, ExtractError> {
        let size = bytes.len();
        let text = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes).map_err(|err| err.to_string())
        })
        .await
        .map_err(|err| ExtractError::Aborted(err.to_string()))?
        .map_err(ExtractError::Pdf)?;
        tracing::debug!(size, chars = text.chars().count(), "Extracted PDF text");
        Ok(text)
    }
}
