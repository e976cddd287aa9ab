//! JSON error responses.
//!
//! Every failure leaves the gate as `{"error": <message>, "kind": <class>}`.
//! Clients branch on `kind`; `error` is safe to show to the buyer.

use crate::error::Error;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, error};

/// Error leaving an HTTP handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    /// Create an error response.
    pub fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    /// Missing or unknown bearer token.
    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Missing or invalid credentials",
        )
    }

    /// HTTP status.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable class.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Buyer-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// HTTP status for each error class.
fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::InvalidInput(_)
        | Error::Image(_)
        | Error::ReferenceMismatch
        | Error::AmountMismatch
        | Error::AccountMismatch => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Expired => StatusCode::GONE,
        Error::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::AttemptsExhausted => StatusCode::TOO_MANY_REQUESTS,
        Error::QrNotDetected => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Storage(_) | Error::Config(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = status_for(&err);
        if status.is_server_error() {
            error!("Request failed: {err}");
        } else {
            debug!("Request rejected: {err}");
        }
        Self::new(status, err.kind(), err.user_message())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Error::InvalidInput(rejection.body_text()).into()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Error::InvalidInput(rejection.body_text()).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "error": self.message,
                "kind": self.kind,
            })),
        )
            .into_response()
    }
}
