//! Bearer-token buyer identity.

use crate::api::error::ApiError;
use crate::config::GateConfig;
use crate::session::BuyerId;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Maps bearer tokens to buyers.
#[derive(Debug, Default, Clone)]
pub struct TokenRegistry {
    tokens: HashMap<String, BuyerId>,
}

impl TokenRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the `[[buyers]]` tokens.
    #[must_use]
    pub fn from_config(config: &GateConfig) -> Self {
        config
            .buyers
            .iter()
            .fold(Self::new(), |registry, buyer| {
                registry.with_token(&buyer.token, buyer.id)
            })
    }

    /// Add a token.
    #[must_use]
    pub fn with_token(mut self, token: &str, buyer_id: BuyerId) -> Self {
        self.tokens.insert(token.to_string(), buyer_id);
        self
    }

    /// Buyer owning `token`.
    #[must_use]
    pub fn resolve(&self, token: &str) -> Option<BuyerId> {
        self.tokens.get(token).copied()
    }
}

/// The authenticated buyer making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Buyer(pub BuyerId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Buyer
where
    Arc<TokenRegistry>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let registry = Arc::<TokenRegistry>::from_ref(state);

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(ApiError::unauthorized)?;

        registry.resolve(token).map(Buyer).ok_or_else(|| {
            debug!("Rejected unknown bearer token");
            ApiError::unauthorized()
        })
    }
}
