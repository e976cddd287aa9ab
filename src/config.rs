//! Configuration for bankpay-gate.

use crate::session::{BuyerId, ItemId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Ledger file name inside the data directory.
const LEDGER_FILE: &str = "payments.ledger";

/// Gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// HTTP listen address.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Directory holding the session ledger.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Payment session and reconciliation settings.
    #[serde(default)]
    pub payment: PaymentConfig,

    /// Bank-verification oracle settings.
    #[serde(default)]
    pub oracle: OracleConfig,

    /// Access gate settings.
    #[serde(default)]
    pub access: AccessConfig,

    /// QR decode pipeline settings.
    #[serde(default)]
    pub qr: QrConfig,

    /// Known buyers and their bearer tokens.
    #[serde(default)]
    pub buyers: Vec<BuyerEntry>,

    /// Priced catalog items.
    #[serde(default)]
    pub items: Vec<ItemEntry>,
}

/// Payment session and reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfig {
    /// Minutes a session stays payable after creation.
    #[serde(default = "default_window_minutes")]
    pub window_minutes: u32,

    /// Largest accepted difference between expected and transferred amount.
    #[serde(default = "default_amount_tolerance")]
    pub amount_tolerance: Decimal,

    /// Verification attempts allowed per session.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Bank-verification oracle settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Base URL of the verification API.
    #[serde(default = "default_oracle_url")]
    pub base_url: String,

    /// API key sent as `x-api-key`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,
}

/// Access gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Number of granted (buyer, item) pairs kept in memory.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

/// QR decode pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrConfig {
    /// Longest side, in pixels, after fallback downscaling.
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,

    /// Contrast multiplier applied before the fallback decoder.
    #[serde(default = "default_contrast")]
    pub contrast: f32,

    /// Brightness multiplier applied before the fallback decoder.
    #[serde(default = "default_brightness")]
    pub brightness: f32,
}

/// A buyer allowed to use the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyerEntry {
    /// Buyer identifier.
    pub id: BuyerId,
    /// Bearer token presented by the buyer.
    pub token: String,
}

/// A priced item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemEntry {
    /// Item identifier.
    pub id: ItemId,
    /// Price in the settlement currency.
    pub price: Decimal,
    /// Account the buyer must transfer to.
    pub payee_account: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            payment: PaymentConfig::default(),
            oracle: OracleConfig::default(),
            access: AccessConfig::default(),
            qr: QrConfig::default(),
            buyers: Vec::new(),
            items: Vec::new(),
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            window_minutes: default_window_minutes(),
            amount_tolerance: default_amount_tolerance(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: default_oracle_url(),
            api_key: None,
            timeout_secs: default_oracle_timeout(),
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            contrast: default_contrast(),
            brightness: default_brightness(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}

fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "bankpay")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".bankpay"))
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_window_minutes() -> u32 {
    120
}

fn default_amount_tolerance() -> Decimal {
    Decimal::new(1, 2) // one cent
}

const fn default_max_attempts() -> u32 {
    5
}

fn default_oracle_url() -> String {
    "https://verifyapi.leulzenebe.pro".to_string()
}

const fn default_oracle_timeout() -> u64 {
    12
}

const fn default_cache_capacity() -> usize {
    10_000
}

const fn default_max_dimension() -> u32 {
    1200
}

const fn default_contrast() -> f32 {
    1.2
}

const fn default_brightness() -> f32 {
    1.1
}

impl PaymentConfig {
    /// Session window as a chrono duration.
    #[must_use]
    pub fn window(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.window_minutes))
    }
}

impl OracleConfig {
    /// Request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl GateConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> crate::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Path of the session ledger file.
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_FILE)
    }

    /// Check settings that would make the gate misbehave at runtime.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> crate::Result<()> {
        if self.payment.window_minutes == 0 {
            return Err(crate::Error::Config(
                "payment.window_minutes must be positive".to_string(),
            ));
        }
        if self.payment.amount_tolerance.is_sign_negative() {
            return Err(crate::Error::Config(
                "payment.amount_tolerance must not be negative".to_string(),
            ));
        }
        if self.qr.max_dimension == 0 {
            return Err(crate::Error::Config(
                "qr.max_dimension must be positive".to_string(),
            ));
        }
        if let Some(item) = self.items.iter().find(|item| item.price <= Decimal::ZERO) {
            return Err(crate::Error::Config(format!(
                "item {} has a non-positive price",
                item.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GateConfig::default();
        assert_eq!(config.payment.window_minutes, 120);
        assert_eq!(config.payment.amount_tolerance, Decimal::new(1, 2));
        assert_eq!(config.payment.max_attempts, 5);
        assert_eq!(config.oracle.timeout(), Duration::from_secs(12));
        assert_eq!(config.qr.max_dimension, 1200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_catalog_from_toml() {
        let config: GateConfig = toml::from_str(
            r#"
            listen = "0.0.0.0:8080"

            [payment]
            window_minutes = 30

            [[buyers]]
            id = 42
            token = "secret-42"

            [[items]]
            id = 7
            price = "500.00"
            payee_account = "1000123456789"
            "#,
        )
        .expect("parse");

        assert_eq!(config.listen.port(), 8080);
        assert_eq!(config.payment.window_minutes, 30);
        assert_eq!(config.payment.max_attempts, 5);
        assert_eq!(config.buyers[0].id, 42);
        assert_eq!(config.items[0].price, Decimal::new(50000, 2));
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        let mut config = GateConfig::default();
        config.oracle.api_key = Some("key".to_string());
        config.to_file(&path).expect("write");

        let loaded = GateConfig::from_file(&path).expect("read");
        assert_eq!(loaded.oracle.api_key.as_deref(), Some("key"));
    }

    #[test]
    fn test_validate_rejects_free_items() {
        let mut config = GateConfig::default();
        config.items.push(ItemEntry {
            id: 1,
            price: Decimal::ZERO,
            payee_account: "1234".to_string(),
        });
        assert!(config.validate().is_err());
    }
}
