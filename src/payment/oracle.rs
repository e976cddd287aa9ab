//! Bank-verification oracle client.
//!
//! The oracle looks up a real bank transaction by id and reports its facts:
//! amount, free-text note and receiver account. Its answers are untrusted;
//! every field is optional and may have any JSON type.

use crate::config::OracleConfig;
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Query sent to the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleRequest {
    /// Bank transaction id, sent as `reference`.
    #[serde(rename = "reference")]
    pub transaction_id: String,
    /// Claimed receiver account suffix.
    pub account_suffix: String,
}

/// Raw oracle answer with lenient accessors.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleReport {
    raw: Value,
}

impl OracleReport {
    /// Wrap a decoded response body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProviderUnavailable`] if the body is not a JSON object.
    pub fn from_value(raw: Value) -> Result<Self> {
        if raw.is_object() {
            Ok(Self { raw })
        } else {
            Err(Error::ProviderUnavailable(
                "malformed verifier response".to_string(),
            ))
        }
    }

    /// The response exactly as received.
    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// True when the oracle explicitly reported `success: false`.
    #[must_use]
    pub fn is_explicit_failure(&self) -> bool {
        matches!(self.raw.get("success"), Some(Value::Bool(false)))
    }

    /// Reported amount, number or string.
    #[must_use]
    pub fn amount(&self) -> Option<&Value> {
        self.raw.get("amount")
    }

    /// Free-text transfer note.
    #[must_use]
    pub fn note(&self) -> Option<String> {
        self.text("reason")
    }

    /// Receiver account as reported.
    #[must_use]
    pub fn receiver_account(&self) -> Option<String> {
        self.text("receiverAccount")
    }

    /// Error message accompanying a failure.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        self.text("error").or_else(|| self.text("message"))
    }

    fn text(&self, field: &str) -> Option<String> {
        match self.raw.get(field)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// External transaction lookup.
pub trait Oracle: Send + Sync {
    /// Look up a transaction.
    ///
    /// Any failure to obtain a usable report, including timeouts, is an
    /// [`Error::ProviderUnavailable`].
    fn verify(&self, request: &OracleRequest) -> impl Future<Output = Result<OracleReport>> + Send;
}

/// Oracle reached over HTTPS.
pub struct HttpOracle {
    client: reqwest::Client,
    config: OracleConfig,
}

impl HttpOracle {
    /// Create a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: OracleConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Config(format!("Failed to build verifier client: {e}")))?;

        if config.api_key.is_none() {
            warn!("No verifier API key configured - every verification will fail");
        }

        Ok(Self { client, config })
    }

    /// Request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.config.timeout()
    }

    async fn call(&self, api_key: &str, request: &OracleRequest) -> Result<OracleReport> {
        let url = format!("{}/verify-cbe", self.config.base_url.trim_end_matches('/'));
        debug!("Querying verifier for transaction {}", request.transaction_id);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("verifier request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Verifier returned {status}: {body}");
            return Err(Error::ProviderUnavailable(format!(
                "verifier returned {status}"
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::ProviderUnavailable(format!("malformed verifier response: {e}")))?;
        debug!("Verifier response: {body}");
        OracleReport::from_value(body)
    }
}

impl Oracle for HttpOracle {
    async fn verify(&self, request: &OracleRequest) -> Result<OracleReport> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            Error::ProviderUnavailable("verifier API key not configured".to_string())
        })?;

        match tokio::time::timeout(self.config.timeout(), self.call(api_key, request)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Verifier query timed out");
                Err(Error::ProviderUnavailable(
                    "verifier query timed out".to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let request = OracleRequest {
            transaction_id: "FT25001ABC".to_string(),
            account_suffix: "6789".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&request).expect("encode"),
            json!({"reference": "FT25001ABC", "accountSuffix": "6789"})
        );
    }

    #[test]
    fn test_report_accessors_are_lenient() {
        let report = OracleReport::from_value(json!({
            "success": true,
            "amount": "500.00 ETB",
            "reason": "Transfer ref AB3DEFGH",
            "receiverAccount": 1_000_123_456_789_u64,
        }))
        .expect("object");

        assert!(!report.is_explicit_failure());
        assert_eq!(report.note().as_deref(), Some("Transfer ref AB3DEFGH"));
        assert_eq!(report.receiver_account().as_deref(), Some("1000123456789"));
        assert_eq!(report.amount(), Some(&json!("500.00 ETB")));
    }

    #[test]
    fn test_explicit_failure() {
        let report =
            OracleReport::from_value(json!({"success": false, "error": "not found"})).expect("object");
        assert!(report.is_explicit_failure());
        assert_eq!(report.error_message().as_deref(), Some("not found"));

        let vague = OracleReport::from_value(json!({"success": "no"})).expect("object");
        assert!(!vague.is_explicit_failure());
    }

    #[test]
    fn test_non_object_is_malformed() {
        assert!(matches!(
            OracleReport::from_value(json!(["nope"])),
            Err(Error::ProviderUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_without_network() {
        let oracle = HttpOracle::new(OracleConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: None,
            timeout_secs: 1,
        })
        .expect("client");

        let result = oracle
            .verify(&OracleRequest {
                transaction_id: "FT1".to_string(),
                account_suffix: "6789".to_string(),
            })
            .await;
        assert!(matches!(result, Err(Error::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn test_unreachable_verifier_is_provider_failure() {
        let oracle = HttpOracle::new(OracleConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: Some("key".to_string()),
            timeout_secs: 2,
        })
        .expect("client");

        let result = oracle
            .verify(&OracleRequest {
                transaction_id: "FT1".to_string(),
                account_suffix: "6789".to_string(),
            })
            .await;
        assert!(matches!(result, Err(Error::ProviderUnavailable(_))));
    }
}
