//! HTTP handlers.

use crate::api::auth::Buyer;
use crate::api::error::ApiError;
use crate::api::AppState;
use crate::error::Error;
use crate::payment::{AccessStatus, Oracle, SessionKey, SessionOffer, VerifyOutcome};
use crate::session::{ItemId, SessionStatus};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Query, State};
use axum::http::StatusCode;
use axum::Json;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Body of `POST /create-payment`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    /// Item to buy.
    pub item_id: ItemId,
}

/// Session details shown on the checkout page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSessionResponse {
    /// Code to put in the transfer note.
    pub reference_code: String,
    /// Amount to transfer.
    pub amount: Decimal,
    /// Account to transfer to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payee_account: Option<String>,
    /// End of the payment window.
    pub expires_at: DateTime<Utc>,
    /// Set when an active session was handed out again.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub reused: bool,
    /// Set when the item is already owned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SessionStatus>,
}

/// `?itemId=` query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemQuery {
    /// Item being asked about.
    pub item_id: ItemId,
}

/// Body of `GET /payments/access`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResponse {
    /// Whether content may be served.
    pub access_granted: bool,
    /// Status of the deciding session.
    pub status: SessionStatus,
}

/// Body of a successful `POST /verify-payment`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Always true; failures use the error body.
    pub success: bool,
    /// Session status after the call.
    pub status: SessionStatus,
    /// Oracle answer, on the call that committed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_response: Option<Value>,
    /// Set when the session had already been verified.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub already_processed: bool,
}

/// Multipart fields of `POST /verify-payment`.
#[derive(Debug, Default)]
struct VerifyForm {
    item_id: Option<String>,
    reference_code: Option<String>,
    transaction_id: Option<String>,
    account_suffix: Option<String>,
    qr_image: Option<Bytes>,
}

impl VerifyForm {
    async fn read(multipart: &mut Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(malformed)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "qrImage" => form.qr_image = Some(field.bytes().await.map_err(malformed)?),
                "itemId" => form.item_id = Some(field.text().await.map_err(malformed)?),
                "referenceCode" => form.reference_code = Some(field.text().await.map_err(malformed)?),
                "transactionId" => form.transaction_id = Some(field.text().await.map_err(malformed)?),
                "accountSuffix" => form.account_suffix = Some(field.text().await.map_err(malformed)?),
                _ => {}
            }
        }
        Ok(form)
    }
}

fn malformed(err: impl std::fmt::Display) -> ApiError {
    ApiError::from(Error::InvalidInput(format!("malformed form: {err}")))
}

fn required(value: Option<String>, name: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::from(Error::InvalidInput(format!("{name} is required"))))
}

/// `POST /create-payment`
pub async fn create_payment<O: Oracle>(
    State(state): State<AppState<O>>,
    Buyer(buyer_id): Buyer,
    request: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PaymentSessionResponse>), ApiError> {
    let Json(request) = request?;
    let offer = state.manager.create_or_reuse(buyer_id, request.item_id)?;
    let payee_account = state.manager.payee_account(request.item_id).ok();
    let view = offer.view();

    let mut body = PaymentSessionResponse {
        reference_code: view.reference_code.clone(),
        amount: view.amount,
        payee_account,
        expires_at: view.expires_at,
        reused: false,
        status: None,
    };
    let status = match offer {
        SessionOffer::Created(_) => StatusCode::OK,
        SessionOffer::Reused(_) => {
            body.reused = true;
            StatusCode::OK
        }
        SessionOffer::AlreadyOwned(ref view) => {
            body.status = Some(view.status);
            StatusCode::CONFLICT
        }
    };
    Ok((status, Json(body)))
}

/// `POST /verify-payment`
///
/// When `transactionId` is blank the uploaded `qrImage` is decoded here.
pub async fn verify_payment<O: Oracle>(
    State(state): State<AppState<O>>,
    Buyer(buyer_id): Buyer,
    mut multipart: Multipart,
) -> Result<Json<VerifyResponse>, ApiError> {
    let form = VerifyForm::read(&mut multipart).await?;

    let item_id: ItemId = required(form.item_id, "itemId")?
        .parse()
        .map_err(|_| ApiError::from(Error::InvalidInput("itemId must be a number".to_string())))?;
    let reference_code = required(form.reference_code, "referenceCode")?;
    let account_suffix = required(form.account_suffix, "accountSuffix")?;

    let transaction_id = match (required(form.transaction_id, "transactionId"), form.qr_image) {
        (Ok(id), _) => id,
        (Err(_), Some(image)) => {
            let qr = state.qr.clone();
            tokio::task::spawn_blocking(move || qr.decode_bytes(&image))
                .await
                .map_err(|e| ApiError::from(Error::Io(std::io::Error::other(e))))??
        }
        (Err(missing), None) => return Err(missing),
    };

    let key = SessionKey {
        buyer_id,
        item_id,
        reference_code,
    };
    let outcome = state
        .engine
        .verify(&key, &transaction_id, &account_suffix)
        .await
        .map_err(|e| {
            if e.is_retryable() {
                warn!("Verification of {} will need a retry: {e}", key.reference_code);
            }
            ApiError::from(e)
        })?;

    let response = match outcome {
        VerifyOutcome::Verified {
            session,
            provider_response,
        } => VerifyResponse {
            success: true,
            status: session.status,
            provider_response: Some(provider_response),
            already_processed: false,
        },
        VerifyOutcome::AlreadyProcessed { session } => {
            info!("Session {} was already verified", session.id);
            VerifyResponse {
                success: true,
                status: session.status,
                provider_response: None,
                already_processed: true,
            }
        }
    };
    Ok(Json(response))
}

/// `GET /payments/access?itemId=`
pub async fn check_access<O: Oracle>(
    State(state): State<AppState<O>>,
    Buyer(buyer_id): Buyer,
    query: Result<Query<ItemQuery>, QueryRejection>,
) -> Result<Json<AccessResponse>, ApiError> {
    let Query(query) = query?;
    match state.gate.check_access(buyer_id, query.item_id)? {
        AccessStatus::NoSession => Err(Error::NotFound("No payments found".to_string()).into()),
        AccessStatus::Session {
            access_granted,
            status,
        } => Ok(Json(AccessResponse {
            access_granted,
            status,
        })),
    }
}

/// `GET /payments/latest-reference?itemId=`
pub async fn latest_reference<O: Oracle>(
    State(state): State<AppState<O>>,
    Buyer(buyer_id): Buyer,
    query: Result<Query<ItemQuery>, QueryRejection>,
) -> Result<Json<PaymentSessionResponse>, ApiError> {
    let Query(query) = query?;
    let view = state.manager.latest_reference(buyer_id, query.item_id)?;
    Ok(Json(PaymentSessionResponse {
        reference_code: view.reference_code,
        amount: view.amount,
        payee_account: None,
        expires_at: view.expires_at,
        reused: false,
        status: Some(view.status),
    }))
}

/// `GET /health`
pub async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
