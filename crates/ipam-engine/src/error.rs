use std::fmt;

/// Error kinds surfaced by `SpaceService` (§7). Transport-agnostic — the
/// `ipam-api` crate maps each variant to an HTTP status.
///
/// `NotFound` has no variant of its own: the source encodes "not found" as
/// `BadRequest` (e.g. "Invalid space name.") and this rewrite preserves
/// that quirk rather than introducing a cleaner taxonomy the wire contract
/// doesn't actually have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    BadRequest(String),
    Forbidden(String),
    Conflict(String),
    InternalUnavailable(String),
    ConflictExhausted(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::BadRequest(m)
            | EngineError::Forbidden(m)
            | EngineError::Conflict(m)
            | EngineError::InternalUnavailable(m)
            | EngineError::ConflictExhausted(m) => write!(f, "{m}"),
        }
    }
}

impl std::error::Error for EngineError {}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<ipam_core::CoreError> for EngineError {
    fn from(err: ipam_core::CoreError) -> Self {
        EngineError::BadRequest(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::InternalUnavailable(format!("document deserialization failed: {err}"))
    }
}

impl From<ipam_storage::StorageError> for EngineError {
    fn from(err: ipam_storage::StorageError) -> Self {
        use ipam_storage::StorageError;
        match err {
            StorageError::NotFound { .. } => EngineError::BadRequest("Invalid space name.".to_string()),
            StorageError::PreconditionFailed { .. } => {
                EngineError::ConflictExhausted("Document was modified concurrently; retry budget exhausted.".to_string())
            }
            other => EngineError::InternalUnavailable(other.to_string()),
        }
    }
}
