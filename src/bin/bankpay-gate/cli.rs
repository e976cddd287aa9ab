//! Command-line interface definition.

use bankpay_gate::config::GateConfig;
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Bank-transfer payment gate for digital content.
#[derive(Parser, Debug)]
#[command(name = "bankpay-gate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding the session ledger.
    #[arg(long, env = "BANKPAY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// HTTP listen address.
    #[arg(long, short, env = "BANKPAY_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Base URL of the bank-verification API.
    #[arg(long, env = "BANKPAY_ORACLE_URL")]
    pub oracle_url: Option<String>,

    /// API key for the bank-verification API.
    #[arg(long, env = "BANKPAY_ORACLE_API_KEY", hide_env_values = true)]
    pub oracle_api_key: Option<String>,

    /// Minutes a payment session stays payable.
    #[arg(long, env = "BANKPAY_WINDOW_MINUTES")]
    pub window_minutes: Option<u32>,

    /// Verification attempts allowed per session.
    #[arg(long, env = "BANKPAY_MAX_ATTEMPTS")]
    pub max_attempts: Option<u32>,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, value_enum, default_value = "text", env = "BANKPAY_LOG_FORMAT")]
    pub log_format: CliLogFormat,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

/// Log format CLI enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Convert CLI arguments into a `GateConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn into_config(self) -> color_eyre::Result<GateConfig> {
        // Start with default config or load from file
        let mut config = if let Some(ref path) = self.config {
            GateConfig::from_file(path)?
        } else {
            GateConfig::default()
        };

        // Override with CLI arguments
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(url) = self.oracle_url {
            config.oracle.base_url = url;
        }
        if self.oracle_api_key.is_some() {
            config.oracle.api_key = self.oracle_api_key;
        }
        if let Some(minutes) = self.window_minutes {
            config.payment.window_minutes = minutes;
        }
        if let Some(attempts) = self.max_attempts {
            config.payment.max_attempts = attempts;
        }
        config.log_level = self.log_level;

        Ok(config)
    }
}
