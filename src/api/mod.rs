//! HTTP surface of the gate.
//!
//! | Route                                | Handler                         |
//! |--------------------------------------|---------------------------------|
//! | `POST /create-payment`               | [`handlers::create_payment`]    |
//! | `POST /verify-payment` (multipart)   | [`handlers::verify_payment`]    |
//! | `GET /payments/access?itemId=`       | [`handlers::check_access`]      |
//! | `GET /payments/latest-reference`     | [`handlers::latest_reference`]  |
//! | `GET /health`                        | [`handlers::health`]            |
//!
//! Every route except `/health` requires `Authorization: Bearer <token>`.

pub mod auth;
pub mod error;
pub mod handlers;

pub use auth::{Buyer, TokenRegistry};
pub use error::ApiError;

use crate::payment::{AccessGate, Oracle, SessionManager, VerificationEngine};
use crate::qr::QrPipeline;
use axum::extract::{DefaultBodyLimit, FromRef};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

/// Largest accepted request body (receipt screenshots included).
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared handler state.
pub struct AppState<O> {
    /// Session creation and lookup.
    pub manager: Arc<SessionManager>,
    /// Payment verification.
    pub engine: Arc<VerificationEngine<O>>,
    /// Access checks.
    pub gate: Arc<AccessGate>,
    /// Buyer credentials.
    pub tokens: Arc<TokenRegistry>,
    /// Server-side receipt decoding.
    pub qr: Arc<QrPipeline>,
}

impl<O> Clone for AppState<O> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            engine: Arc::clone(&self.engine),
            gate: Arc::clone(&self.gate),
            tokens: Arc::clone(&self.tokens),
            qr: Arc::clone(&self.qr),
        }
    }
}

impl<O> FromRef<AppState<O>> for Arc<TokenRegistry> {
    fn from_ref(state: &AppState<O>) -> Self {
        Arc::clone(&state.tokens)
    }
}

/// Build the gate's router.
pub fn router<O: Oracle + 'static>(state: AppState<O>) -> Router {
    Router::new()
        .route("/create-payment", post(handlers::create_payment::<O>))
        .route("/verify-payment", post(handlers::verify_payment::<O>))
        .route("/payments/access", get(handlers::check_access::<O>))
        .route(
            "/payments/latest-reference",
            get(handlers::latest_reference::<O>),
        )
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}
