//! Decode the transaction id from a bank receipt screenshot.
//!
//! Runs the same two-stage QR pipeline the gate uses and prints the payload.
//! Exits non-zero when no QR code is found.

use bankpay_gate::config::QrConfig;
use bankpay_gate::qr::QrPipeline;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Extract a bank transaction id from a receipt image.
#[derive(Parser, Debug)]
#[command(name = "bankpay-decode")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Receipt image (PNG, JPEG or WebP).
    image: PathBuf,

    /// Longest side, in pixels, before the fallback decoder runs.
    #[arg(long, default_value = "1200")]
    max_dimension: u32,

    /// Log level.
    #[arg(long, default_value = "warn", env = "RUST_LOG")]
    log_level: String,
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = QrConfig {
        max_dimension: cli.max_dimension,
        ..QrConfig::default()
    };
    let transaction_id = QrPipeline::new(&config).decode_file(&cli.image)?;
    println!("{transaction_id}");
    Ok(())
}
