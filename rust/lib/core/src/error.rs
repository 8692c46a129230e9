use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

// ── Error codes ─────────────────────────────────────────────────────
//
// Stable, machine-readable identifiers. Clients match on these,
// never on the human-readable message string.

/// Stable error code constants.
///
/// Clients should match on `code` from `{"code": "MSG_NOT_FOUND", "message": "..."}`.
/// Codes never change; messages may be reworded.
pub mod error_code {
    pub const MSG_NOT_FOUND: &str = "MSG_NOT_FOUND";
    pub const MSG_TYPE_NOT_FOUND: &str = "MSG_TYPE_NOT_FOUND";
    pub const MSG_HAS_CANCELLED: &str = "MSG_HAS_CANCELLED";
    pub const MSG_CANT_EDIT: &str = "MSG_CANT_EDIT";
    pub const NO_ROWS_EFFECTED: &str = "NO_ROWS_EFFECTED";
    pub const UNIQUE_KEY_EXISTS: &str = "UNIQUE_KEY_EXISTS";
    pub const INTERNAL: &str = "INTERNAL";
}

/// Numeric code carried by `Internal` errors wrapped at the edit boundary.
pub const INTERNAL_CODE: u32 = 10_000_000;

// ── ServiceError ────────────────────────────────────────────────────

/// The error taxonomy surfaced to callers of the message services.
///
/// Storage and cache errors never escape raw: they are either remapped
/// onto one of the named kinds or wrapped into [`ServiceError::Internal`].
/// The JSON response always includes both code and message:
///
/// ```json
/// {"code": "MSG_HAS_CANCELLED", "message": "message has been cancelled"}
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// No base snapshot or row exists for the id. HTTP 404.
    #[error("message not found")]
    MsgNotFound,

    /// The request's variant tag is not one of the known kinds. HTTP 400.
    #[error("message type not found")]
    MsgTypeNotFound,

    /// The message was cancelled and can no longer be edited. HTTP 409.
    #[error("message has been cancelled")]
    MsgHasCancelled,

    /// The message reached its final state and can no longer be edited. HTTP 409.
    #[error("message can not be edited")]
    MsgCantEdit,

    /// The update statement matched no row. HTTP 409.
    #[error("no rows effected")]
    NoRowsEffected,

    /// An insert hit a uniqueness constraint. HTTP 409.
    #[error("unique key already exists")]
    UniqueKeyExists,

    /// Anything outside the taxonomy. HTTP 500.
    #[error("{message}")]
    Internal { code: u32, message: String },
}

impl ServiceError {
    /// Wrap an arbitrary cause with the generic internal code.
    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::Internal {
            code: INTERNAL_CODE,
            message: message.into(),
        }
    }

    /// Stable, machine-readable error code.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::MsgNotFound => error_code::MSG_NOT_FOUND,
            ServiceError::MsgTypeNotFound => error_code::MSG_TYPE_NOT_FOUND,
            ServiceError::MsgHasCancelled => error_code::MSG_HAS_CANCELLED,
            ServiceError::MsgCantEdit => error_code::MSG_CANT_EDIT,
            ServiceError::NoRowsEffected => error_code::NO_ROWS_EFFECTED,
            ServiceError::UniqueKeyExists => error_code::UNIQUE_KEY_EXISTS,
            ServiceError::Internal { .. } => error_code::INTERNAL,
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::MsgNotFound => StatusCode::NOT_FOUND,
            ServiceError::MsgTypeNotFound => StatusCode::BAD_REQUEST,
            ServiceError::MsgHasCancelled => StatusCode::CONFLICT,
            ServiceError::MsgCantEdit => StatusCode::CONFLICT,
            ServiceError::NoRowsEffected => StatusCode::CONFLICT,
            ServiceError::UniqueKeyExists => StatusCode::CONFLICT,
            ServiceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "code": self.error_code(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}
