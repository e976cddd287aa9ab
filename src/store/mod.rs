//! Durable payment session storage.
//!
//! The store is the only shared mutable state in the gate. It owns the two
//! operations that must be atomic under concurrent requests:
//!
//! - **insert if no active session**: a (buyer, item) pair never ends up with
//!   two pending, unexpired sessions, however many creation calls race;
//! - **compare-and-set**: a write lands only if the session still carries the
//!   version the caller read, so two verification calls cannot both commit.
//!
//! ```text
//!  SessionManager ──insert_if_no_active──┐
//!                                        ▼
//!  VerificationEngine ──compare_and_set──▶ Ledger ──▶ (FileStore) snapshot
//!                                        ▲
//!  AccessGate ──sessions_for/expire_stale┘
//! ```

mod file;
mod ledger;
mod memory;

pub use file::FileStore;
pub use ledger::Ledger;
pub use memory::MemoryStore;

use crate::error::Result;
use crate::session::{BuyerId, ItemId, NewSession, PaymentSession, SessionId, Transition};
use chrono::{DateTime, Utc};

/// Result of [`SessionStore::insert_if_no_active`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new session was stored.
    Created(PaymentSession),
    /// An active session already existed; nothing was written.
    Existing(PaymentSession),
    /// The draft's reference code is already in use; nothing was written.
    ReferenceTaken,
}

/// Result of [`SessionStore::compare_and_set`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The transition was written; carries the updated record.
    Applied(PaymentSession),
    /// The record moved on or refused the transition; carries its current state.
    Conflict(PaymentSession),
}

/// Storage backend for payment sessions.
pub trait SessionStore: Send + Sync {
    /// Atomically store `draft` unless the pair already has an active session.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Storage`] if the write could not be persisted.
    fn insert_if_no_active(&self, draft: NewSession, now: DateTime<Utc>)
        -> Result<InsertOutcome>;

    /// Most recently verified session for the pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn latest_verified(&self, buyer_id: BuyerId, item_id: ItemId)
        -> Result<Option<PaymentSession>>;

    /// Most recently created session for the pair carrying `reference_code`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn find_by_reference(
        &self,
        buyer_id: BuyerId,
        item_id: ItemId,
        reference_code: &str,
    ) -> Result<Option<PaymentSession>>;

    /// All sessions for the pair, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn sessions_for(&self, buyer_id: BuyerId, item_id: ItemId) -> Result<Vec<PaymentSession>>;

    /// Session by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, id: SessionId) -> Result<Option<PaymentSession>>;

    /// Apply `transition` iff the session is still at `expected_version`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NotFound`] for an unknown id, or
    /// [`crate::Error::Storage`] if the write could not be persisted.
    fn compare_and_set(
        &self,
        id: SessionId,
        expected_version: u64,
        transition: Transition,
    ) -> Result<CasOutcome>;

    /// Mark the pair's open sessions whose window elapsed as `EXPIRED`.
    ///
    /// Returns the sessions that changed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Storage`] if the write could not be persisted.
    fn expire_stale(
        &self,
        buyer_id: BuyerId,
        item_id: ItemId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentSession>>;
}
