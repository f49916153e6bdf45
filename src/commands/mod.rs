pub mod categories;
pub mod dashboard;
pub mod invoices;
pub mod settings;

use serde::Serialize;
use tracing::warn;

use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiStatus {
    Success,
    Error,
}

/// Envelope every command answers with. Failures are reported here, never raised.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub status: ApiStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        ApiResponse {
            status: ApiStatus::Success,
            message: None,
            data: Some(data),
        }
    }

    pub fn success_with(message: impl Into<String>, data: T) -> Self {
        ApiResponse {
            status: ApiStatus::Success,
            message: Some(message.into()),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ApiResponse {
            status: ApiStatus::Error,
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn failure(err: CoreError) -> Self {
        warn!("Command failed: {}", err);
        ApiResponse::error(err.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.status == ApiStatus::Success
    }
}

impl<T> From<CoreResult<T>> for ApiResponse<T> {
    fn from(result: CoreResult<T>) -> Self {
        match result {
            Ok(data) => ApiResponse::success(data),
            Err(err) => ApiResponse::failure(err),
        }
    }
}
