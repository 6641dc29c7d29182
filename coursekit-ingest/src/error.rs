//! Error types for coursekit-ingest

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Structural import failures
///
/// Any of these aborts the import before persistence begins (or, for
/// `PersistenceFailure`, before module work begins). Item-level problems are
/// reported as [`crate::models::ImportWarning`] values instead.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Missing/unknown session, or a role outside the administrative set
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Upload is not a readable archive, breaks a limit, or escapes its root
    #[error("Invalid archive: {0}")]
    ArchiveInvalid(String),

    #[error("Manifest missing: {0}")]
    ManifestMissing(String),

    #[error("Manifest malformed: {0}")]
    ManifestMalformed(String),

    /// Course row could not be created or updated
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },

    /// Scoped temporary workspace could not be created or written
    #[error("Workspace error: {0}")]
    Workspace(#[from] std::io::Error),
}

impl IngestError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Unauthorized(_) => "UNAUTHORIZED",
            IngestError::ArchiveInvalid(_) => "ARCHIVE_INVALID",
            IngestError::ManifestMissing(_) => "MANIFEST_MISSING",
            IngestError::ManifestMalformed(_) => "MANIFEST_MALFORMED",
            IngestError::PersistenceFailure(_) => "PERSISTENCE_FAILURE",
            IngestError::Timeout { .. } => "TIMEOUT",
            IngestError::Workspace(_) => "WORKSPACE_ERROR",
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Import pipeline failure
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Payload too large (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// coursekit-common error
    #[error("Common error: {0}")]
    Common(#[from] coursekit_common::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Ingest(err) => {
                let status = match err {
                    IngestError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
                    IngestError::ArchiveInvalid(_)
                    | IngestError::ManifestMissing(_)
                    | IngestError::ManifestMalformed(_) => StatusCode::BAD_REQUEST,
                    IngestError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                    IngestError::PersistenceFailure(_) | IngestError::Workspace(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                (status, err.code())
            }
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Common(_) => (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.parts();

        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
            "code": code,
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (IngestError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (IngestError::ArchiveInvalid("x".into()), StatusCode::BAD_REQUEST),
            (IngestError::ManifestMissing("x".into()), StatusCode::BAD_REQUEST),
            (IngestError::ManifestMalformed("x".into()), StatusCode::BAD_REQUEST),
            (
                IngestError::Timeout { stage: "Extraction", secs: 5 },
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                IngestError::PersistenceFailure("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn test_timeout_message() {
        let err = IngestError::Timeout { stage: "Extraction", secs: 30 };
        assert_eq!(err.to_string(), "Extraction timed out after 30s");
        assert_eq!(err.code(), "TIMEOUT");
    }
}
