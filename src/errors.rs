use crate::storage::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("bad request: {message}")]
    BadRequest { message: String },

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("insufficient credits: required {required}, remaining {remaining}")]
    InsufficientCredits { required: i64, remaining: i64 },

    /// A webhook that failed one of the reconciliation gates. These map to
    /// 400 with a machine-readable code so the vendor dashboard shows the
    /// reason instead of retrying forever.
    #[error("webhook rejected ({code}): {message}")]
    WebhookRejected { code: &'static str, message: String },

    #[error("upstream generation failed: {message}")]
    Upstream { message: String },

    #[error("storage error: {0}")]
    Storage(#[source] StoreError),
}

impl Error {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Error::Unauthorized { message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest { message: message.into() }
    }
}

impl From<crate::generation::GenerationError> for Error {
    fn from(e: crate::generation::GenerationError) -> Self {
        Error::Upstream { message: e.to_string() }
    }
}

impl From<StoreError> for Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { resource } => Error::NotFound { resource },
            StoreError::InsufficientCredits { requested, available } => Error::InsufficientCredits {
                required: requested,
                remaining: available,
            },
            StoreError::Duplicate { field } => Error::Conflict {
                message: format!("{field} already in use"),
            },
            e @ StoreError::Backend(_) => Error::Storage(e),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Error::Unauthorized { message } => (StatusCode::UNAUTHORIZED, json!({ "message": message })),
            Error::BadRequest { message } => (StatusCode::BAD_REQUEST, json!({ "message": message })),
            Error::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                json!({ "message": format!("{resource} not found") }),
            ),
            Error::Conflict { message } => (StatusCode::CONFLICT, json!({ "message": message })),
            Error::InsufficientCredits { required, remaining } => (
                StatusCode::PAYMENT_REQUIRED,
                json!({
                    "error": "insufficient_credits",
                    "message": format!("This operation requires {required} credits"),
                    "creditsRemaining": remaining,
                }),
            ),
            Error::WebhookRejected { code, message } => (
                StatusCode::BAD_REQUEST,
                json!({ "error": code, "message": message }),
            ),
            Error::Upstream { message } => (StatusCode::BAD_GATEWAY, json!({ "message": message })),
            Error::Storage(e) => {
                error!("storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "storage_error", "message": "internal error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
