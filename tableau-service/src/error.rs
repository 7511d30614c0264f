use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::gateway::Capability;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("{capability} failed")]
    Backend {
        capability: Capability,
        #[source]
        source: BackendError,
    },

    #[error("Completion service did not return a usable structured reply")]
    MalformedReply { raw: String },

    #[error("{capability} timed out after {secs}s")]
    Timeout { capability: Capability, secs: u64 },

    #[error("Failed to persist configuration to {path}")]
    Persistence {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Errors from the external model services
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Connection failed to {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Request failed (status {status}): {message}")]
    Status { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("No API key configured and OPENAI_API_KEY is not set")]
    MissingCredential,

    #[error("Audio processing failed")]
    Audio(#[from] hound::Error),
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ServiceError {
    pub(crate) fn backend(capability: Capability, source: BackendError) -> Self {
        ServiceError::Backend { capability, source }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Backend { .. } | ServiceError::MalformedReply { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ServiceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::Persistence { .. }
            | ServiceError::Config { .. }
            | ServiceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Backend { capability, .. } => match capability {
                Capability::Transcribe => "transcription_failed",
                Capability::CompleteStructured | Capability::CaptionImage => "completion_failed",
                Capability::GenerateImage | Capability::GenerateMusic => "generation_failed",
            },
            ServiceError::MalformedReply { .. } => "malformed_reply",
            ServiceError::Timeout { .. } => "timeout",
            ServiceError::Persistence { .. } => "persistence_error",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ServiceError::MalformedReply { raw } => Some(serde_json::json!({ "raw_reply": raw })),
            ServiceError::Backend { source, .. } => {
                Some(serde_json::json!({ "cause": source.to_string() }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %render_error_chain(&self), "Request failed");
        }

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(self.error_code().to_string()),
            details: self.details(),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Render an error and all of its sources as one line
pub fn render_error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
