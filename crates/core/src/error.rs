//! The engine's single error type and its HTTP mapping.
//!
//! Every fallible operation in the engine ultimately resolves to an
//! [`EngineError`] at the boundary where it becomes a response or a
//! `JOB_ERROR` event. Internal crates are free to use their own narrower
//! error enums for anything that isn't user-facing; they convert into this
//! type only when they cross that boundary.

use axum::http::StatusCode;
use serde::Serialize;
use thiserror::Error;

/// The closed set of error codes the HTTP/WS surface can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    VoiceNotFound,
    JobNotFound,
    JobInProgress,
    ModelNotReady,
    VoiceCloneFailed,
    InvalidAudio,
    EmptyText,
    InvalidRequest,
}

impl ErrorCode {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::VoiceNotFound => StatusCode::NOT_FOUND,
            ErrorCode::JobNotFound => StatusCode::NOT_FOUND,
            ErrorCode::JobInProgress => StatusCode::CONFLICT,
            ErrorCode::ModelNotReady => StatusCode::CONFLICT,
            ErrorCode::VoiceCloneFailed => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidAudio => StatusCode::BAD_REQUEST,
            ErrorCode::EmptyText => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::VoiceNotFound => "VOICE_NOT_FOUND",
            ErrorCode::JobNotFound => "JOB_NOT_FOUND",
            ErrorCode::JobInProgress => "JOB_IN_PROGRESS",
            ErrorCode::ModelNotReady => "MODEL_NOT_READY",
            ErrorCode::VoiceCloneFailed => "VOICE_CLONE_FAILED",
            ErrorCode::InvalidAudio => "INVALID_AUDIO",
            ErrorCode::EmptyText => "EMPTY_TEXT",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
        }
    }
}

/// The engine-wide error type. Carries enough structure to render the
/// `{"error":{"code","message","details"}}` envelope directly.
#[derive(Error, Debug, Clone)]
#[error("{code}: {message}", code = self.code.as_str())]
pub struct EngineError {
    pub code: ErrorCode,
    pub message: String,
    pub details: serde_json::Value,
}

impl EngineError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: serde_json::json!({}),
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn to_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "details": self.details,
            }
        })
    }
}

impl axum::response::IntoResponse for EngineError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), axum::Json(self.to_payload())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_matches_envelope_shape() {
        let err = EngineError::new(ErrorCode::EmptyText, "text is empty");
        let payload = err.to_payload();
        assert_eq!(payload["error"]["code"], "EMPTY_TEXT");
        assert_eq!(payload["error"]["message"], "text is empty");
        assert_eq!(payload["error"]["details"], serde_json::json!({}));
    }

    #[test]
    fn status_codes_match_spec_table() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::VoiceNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::JobNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::JobInProgress.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::ModelNotReady.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::VoiceCloneFailed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::InvalidAudio.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::EmptyText.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::InvalidRequest.status_code(), StatusCode::BAD_REQUEST);
    }
}
