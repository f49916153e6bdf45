use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::warn;

use crate::models::InvoiceFields;
use crate::services::extraction::{ExtractError, Extractor};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct ExtractionRequest<'a> {
    file_name: &'a str,
    content_base64: String,
}

#[derive(Deserialize)]
struct ExtractionResponse {
    #[serde(flatten)]
    fields: InvoiceFields,
    #[serde(default)]
    error: Option<String>,
}

/// Sends the raw document to an extraction service and reads back CFDI fields as JSON.
pub struct HttpExtractor {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpExtractor {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, ExtractError> {
        let endpoint = endpoint.into();
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| {
                ExtractError::Unavailable(format!("HTTP client for {}: {}", endpoint, err))
            })?;
        Ok(HttpExtractor { client, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    async fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<InvoiceFields, ExtractError> {
        let request = ExtractionRequest {
            file_name,
            content_base64: general_purpose::STANDARD.encode(bytes),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify(&self.endpoint, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ExtractError::Failed(format!("service error {}: {}", status, body)));
        }

        let value: Value = response
            .json()
            .await
            .map_err(|e| ExtractError::Failed(format!("invalid JSON: {}", e)))?;
        parse_response(value)
    }
}

fn classify(endpoint: &str, err: reqwest::Error) -> ExtractError {
    if err.is_connect() || err.is_timeout() {
        warn!(endpoint = %endpoint, "Extraction service unreachable: {}", err);
        ExtractError::Unavailable(err.to_string())
    } else {
        ExtractError::Failed(err.to_string())
    }
}

fn response_schema() -> &'static JSONSchema {
    static SCHEMA: OnceLock<JSONSchema> = OnceLock::new();
    SCHEMA.get_or_init(|| {
        let nullable = json!({"type": ["string", "null"]});
        let schema = json!({
            "type": "object",
            "properties": {
                "folio_fiscal": nullable,
                "rfc_emisor": nullable,
                "rfc_receptor": nullable,
                "nombre_emisor": nullable,
                "nombre_receptor": nullable,
                "puesto": nullable,
                "subtotal": nullable,
                "total_deducciones": nullable,
                "total_neto": nullable,
                "uso_cfdi": nullable,
                "efecto_comprobante": nullable,
                "error": nullable
            }
        });
        JSONSchema::compile(&schema).expect("valid extraction response schema")
    })
}

pub fn validate_response(value: &Value) -> bool {
    response_schema().is_valid(value)
}

/// Checks the payload shape, then maps a reported `error` to a failed extraction.
fn parse_response(value: Value) -> Result<InvoiceFields, ExtractError> {
    if !validate_response(&value) {
        return Err(ExtractError::Failed(
            "response does not match the extraction schema".to_string(),
        ));
    }
    let response: ExtractionResponse = serde_json::from_value(value)
        .map_err(|e| ExtractError::Failed(format!("invalid response: {}", e)))?;
    match response.error.filter(|e| !e.trim().is_empty()) {
        Some(error) => Err(ExtractError::Failed(error)),
        None => Ok(response.fields),
    }
}
