//! Payment sessions, verification and access.
//!
//! # Architecture
//!
//! ```text
//! POST /create-payment            POST /verify-payment          GET /payments/access
//!        │                               │                              │
//!        ▼                               ▼                              ▼
//! ┌────────────────┐           ┌────────────────────┐          ┌───────────────┐
//! │ SessionManager │           │ VerificationEngine │          │  AccessGate   │
//! └───────┬────────┘           └─────┬────────┬─────┘          └───┬───────┬───┘
//!         │                          │        │                    │       │
//!   Catalog + reference         Oracle   reconcile            GrantCache   │
//!         │                          │        │                    │       │
//!         └──────────────────────────┴────────┴────────────────────┘       │
//!                                    │                                     │
//!                                    ▼                                     │
//!                              SessionStore ◀──────────────────────────────┘
//! ```

mod access;
mod cache;
mod catalog;
mod manager;
mod oracle;
mod reconcile;
mod verifier;

pub use access::{AccessGate, AccessStatus};
pub use cache::{CacheStats, GrantCache};
pub use catalog::{Catalog, CatalogItem, StaticCatalog};
pub use manager::{SessionManager, SessionOffer, SessionView};
pub use oracle::{HttpOracle, Oracle, OracleReport, OracleRequest};
pub use reconcile::{account_tail, normalize, parse_amount, reconcile, reference_matches, Rejection};
pub use verifier::{SessionKey, VerificationEngine, VerifyOutcome};
