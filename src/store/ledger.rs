//! In-memory session ledger shared by the store backends.

use super::{CasOutcome, InsertOutcome};
use crate::error::{Error, Result};
use crate::session::{
    newest_first, BuyerId, ItemId, NewSession, PaymentSession, SessionId, SessionStatus,
    Transition,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// All payment sessions, keyed by id. Append-mostly: records are never removed.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Ledger {
    next_id: SessionId,
    revision: u64,
    sessions: BTreeMap<SessionId, PaymentSession>,
}

impl Ledger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter bumped by every mutation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when no session was ever stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn pair(&self, buyer_id: BuyerId, item_id: ItemId) -> impl Iterator<Item = &PaymentSession> {
        self.sessions
            .values()
            .filter(move |s| s.belongs_to(buyer_id, item_id))
    }

    /// See [`super::SessionStore::insert_if_no_active`].
    pub fn insert_if_no_active(&mut self, draft: NewSession, now: DateTime<Utc>) -> InsertOutcome {
        if let Some(active) = self
            .pair(draft.buyer_id, draft.item_id)
            .filter(|s| s.is_active(now))
            .min_by(|a, b| newest_first(a, b))
        {
            return InsertOutcome::Existing(active.clone());
        }

        if self
            .sessions
            .values()
            .any(|s| s.reference_code == draft.reference_code)
        {
            return InsertOutcome::ReferenceTaken;
        }

        self.next_id += 1;
        let session = PaymentSession::open(self.next_id, draft);
        self.sessions.insert(session.id, session.clone());
        self.revision += 1;
        InsertOutcome::Created(session)
    }

    /// See [`super::SessionStore::latest_verified`].
    #[must_use]
    pub fn latest_verified(&self, buyer_id: BuyerId, item_id: ItemId) -> Option<PaymentSession> {
        self.pair(buyer_id, item_id)
            .filter(|s| s.status == SessionStatus::Verified)
            .max_by(|a, b| {
                a.verified_at
                    .cmp(&b.verified_at)
                    .then_with(|| a.created_at.cmp(&b.created_at))
            })
            .cloned()
    }

    /// See [`super::SessionStore::find_by_reference`].
    #[must_use]
    pub fn find_by_reference(
        &self,
        buyer_id: BuyerId,
        item_id: ItemId,
        reference_code: &str,
    ) -> Option<PaymentSession> {
        self.pair(buyer_id, item_id)
            .filter(|s| s.reference_code == reference_code)
            .min_by(|a, b| newest_first(a, b))
            .cloned()
    }

    /// See [`super::SessionStore::sessions_for`].
    #[must_use]
    pub fn sessions_for(&self, buyer_id: BuyerId, item_id: ItemId) -> Vec<PaymentSession> {
        let mut sessions: Vec<_> = self.pair(buyer_id, item_id).cloned().collect();
        sessions.sort_by(newest_first);
        sessions
    }

    /// See [`super::SessionStore::get`].
    #[must_use]
    pub fn get(&self, id: SessionId) -> Option<PaymentSession> {
        self.sessions.get(&id).cloned()
    }

    /// See [`super::SessionStore::compare_and_set`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no session has this id.
    pub fn compare_and_set(
        &mut self,
        id: SessionId,
        expected_version: u64,
        transition: Transition,
    ) -> Result<CasOutcome> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("payment session {id}")))?;

        if session.version != expected_version || !session.apply(transition) {
            return Ok(CasOutcome::Conflict(session.clone()));
        }

        let updated = session.clone();
        self.revision += 1;
        Ok(CasOutcome::Applied(updated))
    }

    /// See [`super::SessionStore::expire_stale`].
    pub fn expire_stale(
        &mut self,
        buyer_id: BuyerId,
        item_id: ItemId,
        now: DateTime<Utc>,
    ) -> Vec<PaymentSession> {
        let mut expired = Vec::new();
        for session in self.sessions.values_mut() {
            if session.belongs_to(buyer_id, item_id)
                && session.is_stale(now)
                && session.apply(Transition::Expire)
            {
                expired.push(session.clone());
            }
        }
        if !expired.is_empty() {
            self.revision += 1;
        }
        expired
    }
}
