//! Payment session creation and reuse.

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::event::{GateEvent, GateEventsSender};
use crate::payment::catalog::Catalog;
use crate::reference::generate_reference;
use crate::session::{BuyerId, ItemId, NewSession, PaymentSession, SessionId, SessionStatus};
use crate::store::{InsertOutcome, SessionStore};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// Fresh codes tried before giving up on a reference collision.
const MAX_REFERENCE_ATTEMPTS: usize = 8;

/// What the client shows the buyer for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    /// Session identifier.
    pub session_id: SessionId,
    /// Code to put in the transfer note.
    pub reference_code: String,
    /// Amount to transfer.
    pub amount: Decimal,
    /// Session status.
    pub status: SessionStatus,
    /// End of the payment window.
    pub expires_at: DateTime<Utc>,
}

impl From<&PaymentSession> for SessionView {
    fn from(session: &PaymentSession) -> Self {
        Self {
            session_id: session.id,
            reference_code: session.reference_code.clone(),
            amount: session.expected_amount,
            status: session.status,
            expires_at: session.expires_at,
        }
    }
}

/// Result of [`SessionManager::create_or_reuse`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOffer {
    /// A new session was opened.
    Created(SessionView),
    /// The pair's active session was handed out again.
    Reused(SessionView),
    /// The buyer already paid for the item; route them to the content.
    AlreadyOwned(SessionView),
}

impl SessionOffer {
    /// The session behind the offer.
    #[must_use]
    pub fn view(&self) -> &SessionView {
        match self {
            Self::Created(view) | Self::Reused(view) | Self::AlreadyOwned(view) => view,
        }
    }
}

/// Opens payment sessions, at most one active per (buyer, item).
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    catalog: Arc<dyn Catalog>,
    clock: Arc<dyn Clock>,
    events: GateEventsSender,
    window: chrono::Duration,
}

impl SessionManager {
    /// Create a manager whose sessions stay payable for `window`.
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        catalog: Arc<dyn Catalog>,
        clock: Arc<dyn Clock>,
        events: GateEventsSender,
        window: chrono::Duration,
    ) -> Self {
        Self {
            store,
            catalog,
            clock,
            events,
            window,
        }
    }

    /// Return the pair's active session or open a new one.
    ///
    /// Repeated calls while a session is active hand back the same reference
    /// and amount, so double clicks and client retries are harmless.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] for a zero buyer or item id
    /// - [`Error::NotFound`] for an unknown buyer or unpriced item
    /// - [`Error::Storage`] if the session could not be persisted (retryable)
    pub fn create_or_reuse(&self, buyer_id: BuyerId, item_id: ItemId) -> Result<SessionOffer> {
        if buyer_id == 0 || item_id == 0 {
            return Err(Error::InvalidInput(
                "buyer and item identifiers are required".to_string(),
            ));
        }
        if !self.catalog.buyer_exists(buyer_id) {
            return Err(Error::NotFound(format!("buyer {buyer_id}")));
        }
        let item = self
            .catalog
            .item(item_id)
            .ok_or_else(|| Error::NotFound(format!("item {item_id}")))?;

        if let Some(verified) = self.store.latest_verified(buyer_id, item_id)? {
            info!(
                "Buyer {} already owns item {} (session {})",
                buyer_id, item_id, verified.id
            );
            return Ok(SessionOffer::AlreadyOwned(SessionView::from(&verified)));
        }

        let now = self.clock.now();
        for stale in self.store.expire_stale(buyer_id, item_id, now)? {
            debug!("Session {} expired unverified", stale.id);
            let _ = self.events.send(GateEvent::SessionExpired {
                session_id: stale.id,
            });
        }

        for _ in 0..MAX_REFERENCE_ATTEMPTS {
            let draft = NewSession {
                buyer_id,
                item_id,
                reference_code: generate_reference(),
                expected_amount: item.price,
                created_at: now,
                expires_at: now + self.window,
            };

            match self.store.insert_if_no_active(draft, now)? {
                InsertOutcome::Created(session) => {
                    info!(
                        "Opened payment session {} for buyer {} item {} ({} due)",
                        session.id, buyer_id, item_id, session.expected_amount
                    );
                    let _ = self.events.send(GateEvent::SessionCreated {
                        session_id: session.id,
                        buyer_id,
                        item_id,
                        reference_code: session.reference_code.clone(),
                    });
                    return Ok(SessionOffer::Created(SessionView::from(&session)));
                }
                InsertOutcome::Existing(session) => {
                    debug!("Reusing active session {}", session.id);
                    let _ = self.events.send(GateEvent::SessionReused {
                        session_id: session.id,
                    });
                    return Ok(SessionOffer::Reused(SessionView::from(&session)));
                }
                InsertOutcome::ReferenceTaken => {
                    debug!("Reference code collision, drawing another");
                }
            }
        }

        Err(Error::Storage(
            "could not allocate a unique reference code".to_string(),
        ))
    }

    /// Reference of the pair's most recently created session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the pair has no session.
    pub fn latest_reference(&self, buyer_id: BuyerId, item_id: ItemId) -> Result<SessionView> {
        self.store
            .sessions_for(buyer_id, item_id)?
            .first()
            .map(SessionView::from)
            .ok_or_else(|| Error::NotFound("no recent reference".to_string()))
    }

    /// Payee account for an item, shown next to the reference code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown item.
    pub fn payee_account(&self, item_id: ItemId) -> Result<String> {
        self.catalog
            .item(item_id)
            .map(|item| item.payee_account)
            .ok_or_else(|| Error::NotFound(format!("item {item_id}")))
    }
}
