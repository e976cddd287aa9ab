//! Volatile session store.

use super::{CasOutcome, InsertOutcome, Ledger, SessionStore};
use crate::error::Result;
use crate::session::{BuyerId, ItemId, NewSession, PaymentSession, SessionId, Transition};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Session store that lives only as long as the process.
///
/// Every operation runs under one lock, which makes insert-if-no-active and
/// compare-and-set atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Ledger>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

impl SessionStore for MemoryStore {
    fn insert_if_no_active(
        &self,
        draft: NewSession,
        now: DateTime<Utc>,
    ) -> Result<InsertOutcome> {
        Ok(self.inner.lock().insert_if_no_active(draft, now))
    }

    fn latest_verified(
        &self,
        buyer_id: BuyerId,
        item_id: ItemId,
    ) -> Result<Option<PaymentSession>> {
        Ok(self.inner.lock().latest_verified(buyer_id, item_id))
    }

    fn find_by_reference(
        &self,
        buyer_id: BuyerId,
        item_id: ItemId,
        reference_code: &str,
    ) -> Result<Option<PaymentSession>> {
        Ok(self
            .inner
            .lock()
            .find_by_reference(buyer_id, item_id, reference_code))
    }

    fn sessions_for(&self, buyer_id: BuyerId, item_id: ItemId) -> Result<Vec<PaymentSession>> {
        Ok(self.inner.lock().sessions_for(buyer_id, item_id))
    }

    fn get(&self, id: SessionId) -> Result<Option<PaymentSession>> {
        Ok(self.inner.lock().get(id))
    }

    fn compare_and_set(
        &self,
        id: SessionId,
        expected_version: u64,
        transition: Transition,
    ) -> Result<CasOutcome> {
        self.inner
            .lock()
            .compare_and_set(id, expected_version, transition)
    }

    fn expire_stale(
        &self,
        buyer_id: BuyerId,
        item_id: ItemId,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentSession>> {
        Ok(self.inner.lock().expire_stale(buyer_id, item_id, now))
    }
}
