use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Matchmaker error taxonomy.
///
/// `CodeNotFound`, `OfferNotReady`, `AnswerNotReady` and `RateLimited` are
/// expected states surfaced to polling callers, not faults. `CodeInUse` is
/// fatal to the registration attempt. `Database` wraps storage failures
/// without retrying them here.
#[derive(Debug, Error)]
pub enum MmError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Code not found: {0}")]
    CodeNotFound(String),

    #[error("Code already in use: {0}")]
    CodeInUse(String),

    #[error("Offer not ready for code: {0}")]
    OfferNotReady(String),

    #[error("No answer yet for code: {0}")]
    AnswerNotReady(String),

    #[error("Free-mode cooldown active: {wait_minutes} minute(s) remaining")]
    RateLimited { wait_minutes: i64 },

    #[error("Trial session already active")]
    TrialAlreadyActive,

    #[error("Code space exhausted after {0} attempts")]
    ExhaustedCodeSpace(usize),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for MmError {
    fn from(e: sqlx::Error) -> Self {
        MmError::Database(e.to_string())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorDetail {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_minutes: Option<i64>,
}

impl MmError {
    /// HTTP status this error maps to at the boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            MmError::Validation(_) => StatusCode::BAD_REQUEST,
            MmError::CodeNotFound(_) | MmError::OfferNotReady(_) | MmError::AnswerNotReady(_) => {
                StatusCode::NOT_FOUND
            }
            MmError::CodeInUse(_) | MmError::TrialAlreadyActive => StatusCode::CONFLICT,
            MmError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            MmError::ExhaustedCodeSpace(_) | MmError::Database(_) | MmError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable error code for the wire.
    pub fn error_code(&self) -> &'static str {
        match self {
            MmError::Validation(_) => "validation_error",
            MmError::CodeNotFound(_) => "code_not_found",
            MmError::CodeInUse(_) => "code_in_use",
            MmError::OfferNotReady(_) => "offer_not_ready",
            MmError::AnswerNotReady(_) => "answer_not_ready",
            MmError::RateLimited { .. } => "rate_limited",
            MmError::TrialAlreadyActive => "trial_already_active",
            MmError::ExhaustedCodeSpace(_) => "code_space_exhausted",
            MmError::Database(_) => "storage_unavailable",
            MmError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for MmError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        // Storage and internal failures are logged server-side with detail;
        // the wire message stays generic.
        let (message, wait_minutes) = match &self {
            MmError::Database(detail) => {
                tracing::error!(target: "mm.errors", error = %detail, "Storage failure");
                ("An internal storage error occurred".to_string(), None)
            }
            MmError::Internal(detail) => {
                tracing::error!(target: "mm.errors", error = %detail, "Internal error");
                ("An internal error occurred".to_string(), None)
            }
            MmError::RateLimited { wait_minutes } => (self.to_string(), Some(*wait_minutes)),
            _ => (self.to_string(), None),
        };

        let body = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                wait_minutes,
            },
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            MmError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            MmError::CodeNotFound("X".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            MmError::AnswerNotReady("X".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            MmError::CodeInUse("X".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            MmError::RateLimited { wait_minutes: 3 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            MmError::ExhaustedCodeSpace(100).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            MmError::Database("io".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(MmError::CodeInUse("X".into()).error_code(), "code_in_use");
        assert_eq!(
            MmError::AnswerNotReady("X".into()).error_code(),
            "answer_not_ready"
        );
        assert_eq!(
            MmError::Database("io".into()).error_code(),
            "storage_unavailable"
        );
    }

    #[test]
    fn test_from_sqlx_error() {
        let err: MmError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, MmError::Database(_)));
    }
}
