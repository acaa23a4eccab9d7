//! Maps `EngineError` onto the HTTP status codes §7 promises, with the
//! trimmed `{status, message, code}` envelope (no Kubernetes `apiVersion`/
//! `kind: Status` wrapper — this is not a Kubernetes-shaped API).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ipam_engine::error::EngineError;
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    Conflict(String),
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        let body = Json(json!({
            "status": status.as_u16(),
            "message": message,
            "code": status.as_u16(),
        }));
        (status, body).into_response()
    }
}

/// §7: `InternalUnavailable` (allocator exhausted) and `ConflictExhausted`
/// (OCC retry budget) both surface as 500 to preserve the source's wire
/// behavior, even though neither is an unexpected internal fault.
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::BadRequest(m) => ApiError::BadRequest(m),
            EngineError::Forbidden(m) => ApiError::Forbidden(m),
            EngineError::Conflict(m) => ApiError::Conflict(m),
            EngineError::InternalUnavailable(m) => ApiError::Internal(m),
            EngineError::ConflictExhausted(m) => ApiError::Internal(m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_unavailable_maps_to_500_per_source_quirk() {
        let err: ApiError = EngineError::InternalUnavailable("no room".to_string()).into();
        assert!(matches!(err, ApiError::Internal(_)));
    }

    #[test]
    fn conflict_maps_to_409() {
        let err: ApiError = EngineError::Conflict("overlap".to_string()).into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }
}
