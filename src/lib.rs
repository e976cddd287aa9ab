//! # bankpay-gate
//!
//! Sells time-limited access to digital content behind manual bank transfers.
//!
//! A buyer asks for a payment session and receives a short reference code and
//! the amount to transfer. After paying from their banking app they upload the
//! confirmation screenshot; the QR code on it carries the bank transaction id.
//! The verification engine asks an external bank-verification service about
//! that transaction, reconciles reference, amount and destination account, and
//! durably grants or denies access.
//!
//! ## Architecture
//!
//! ```text
//! create-payment ──▶ SessionManager ──▶ SessionStore (insert if no active)
//!                                            ▲
//! screenshot ──▶ QrPipeline ──▶ tx id        │
//!                                  │         │
//! verify-payment ──────────────────┴──▶ VerificationEngine ──▶ Oracle
//!                                            │
//! access check ──▶ AccessGate ◀──────────────┘
//! ```

pub mod api;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod payment;
pub mod qr;
pub mod reference;
pub mod server;
pub mod session;
pub mod store;

pub use config::GateConfig;
pub use error::{Error, Result};
pub use server::{RunningServer, ServerBuilder, ShutdownHandle};
