//! Error taxonomy shared by every component of the panel.
//!
//! Handlers return `PanelError` directly; the `IntoResponse` impl turns it into
//! the uniform `{ "status": "error", "message": ... }` envelope the front end
//! renders inline.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Where users are sent when the native BitNet build tooling is absent.
pub const TOOLCHAIN_HELP_URL: &str = "https://github.com/microsoft/BitNet#build-from-source";

#[derive(Error, Debug)]
pub enum PanelError {
    #[error("Invalid model identifier: {0}")]
    InvalidModelId(String),

    #[error("Error downloading model: {0}")]
    Acquisition(String),

    #[error("{0}")]
    UploadRejected(String),

    #[error("C++ compiler tools missing: {0}")]
    ToolchainMissing(String),

    #[error("Error during inference: {0}")]
    Inference(String),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("No model loaded")]
    NoModelLoaded,

    #[error("Unknown download job: {0}")]
    UnknownJob(String),

    #[error("{0}")]
    UnsupportedModel(String),

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PanelError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PanelError::InvalidModelId(_)
            | PanelError::UploadRejected(_)
            | PanelError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            PanelError::NoModelLoaded => StatusCode::CONFLICT,
            PanelError::UnknownJob(_) => StatusCode::NOT_FOUND,
            PanelError::UnsupportedModel(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PanelError::Acquisition(_) => StatusCode::BAD_GATEWAY,
            PanelError::ToolchainMissing(_) => StatusCode::SERVICE_UNAVAILABLE,
            PanelError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            PanelError::Inference(_) | PanelError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for the `status` dimension of request metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            PanelError::InvalidModelId(_) => "invalid_model_id",
            PanelError::Acquisition(_) => "acquisition",
            PanelError::UploadRejected(_) => "upload_rejected",
            PanelError::ToolchainMissing(_) => "toolchain_missing",
            PanelError::Inference(_) => "inference",
            PanelError::InvalidRequest(_) => "invalid_request",
            PanelError::NoModelLoaded => "no_model",
            PanelError::UnknownJob(_) => "unknown_job",
            PanelError::UnsupportedModel(_) => "unsupported_model",
            PanelError::Timeout(_) => "timeout",
            PanelError::Io(_) => "io",
        }
    }

    fn help_url(&self) -> Option<&'static str> {
        match self {
            PanelError::ToolchainMissing(_) => Some(TOOLCHAIN_HELP_URL),
            _ => None,
        }
    }
}

impl From<candle_core::Error> for PanelError {
    fn from(e: candle_core::Error) -> Self {
        PanelError::Inference(e.to_string())
    }
}

impl From<reqwest::Error> for PanelError {
    fn from(e: reqwest::Error) -> Self {
        PanelError::Acquisition(e.to_string())
    }
}

/// JSON body for every failed request.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub status: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_url: Option<&'static str>,
}

impl From<&PanelError> for ErrorEnvelope {
    fn from(e: &PanelError) -> Self {
        Self {
            status: "error",
            message: e.to_string(),
            help_url: e.help_url(),
        }
    }
}

impl IntoResponse for PanelError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(ErrorEnvelope::from(&self))).into_response()
    }
}

pub type PanelResult<T> = Result<T, PanelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toolchain_errors_carry_help_link() {
        let err = PanelError::ToolchainMissing("python3 not found".into());
        let envelope = ErrorEnvelope::from(&err);
        assert_eq!(envelope.status, "error");
        assert!(envelope.message.contains("compiler tools missing"));
        assert_eq!(envelope.help_url, Some(TOOLCHAIN_HELP_URL));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn validation_errors_are_bad_requests() {
        let err = PanelError::InvalidRequest("Prompt cannot be empty".into());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let json = serde_json::to_value(ErrorEnvelope::from(&err)).unwrap();
        assert_eq!(json["message"], "Prompt cannot be empty");
        assert!(json.get("help_url").is_none());
    }

    #[test]
    fn timeouts_keep_the_envelope() {
        let err = PanelError::Timeout(1);
        assert_eq!(err.status_code(), StatusCode::REQUEST_TIMEOUT);
        let json = serde_json::to_value(ErrorEnvelope::from(&err)).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["message"], "Request timed out after 1 seconds");
    }
}
