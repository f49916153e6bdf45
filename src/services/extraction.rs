use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::models::InvoiceFields;
use crate::services::cfdi::parse_cfdi_text;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The document was read but yielded nothing usable. Recorded on the row.
    #[error("Extraction failed: {0}")]
    Failed(String),
    /// The extractor itself could not be reached.
    #[error("Extractor unavailable: {0}")]
    Unavailable(String),
}

/// Turns one uploaded document into CFDI fields.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<InvoiceFields, ExtractError>;
}

/// Reads the PDF text layer and parses CFDI fields locally.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    /// Scanned documents come back with whitespace only.
    pub fn has_text_layer(text: &str) -> bool {
        text.split_whitespace().next().is_some()
    }
}

#[async_trait]
impl Extractor for PdfTextExtractor {
    async fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<InvoiceFields, ExtractError> {
        let owned = bytes.to_vec();
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&owned))
            .await
            .map_err(|e| ExtractError::Failed(format!("PDF worker: {}", e)))?
            .map_err(|e| ExtractError::Failed(format!("PDF text: {}", e)))?;

        if !Self::has_text_layer(&text) {
            return Err(ExtractError::Failed(
                "document has no text layer".to_string(),
            ));
        }

        let fields = parse_cfdi_text(&text);
        debug!(
            file = %file_name,
            folio = ?fields.folio_fiscal,
            total_neto = ?fields.total_neto,
            "Parsed CFDI text"
        );
        Ok(fields)
    }
}
