//! Access gate: may this buyer see this item's content?

use crate::clock::Clock;
use crate::error::Result;
use crate::event::{GateEvent, GateEventsSender};
use crate::payment::cache::{CacheStats, GrantCache};
use crate::session::{access_order, BuyerId, ItemId, SessionStatus};
use crate::store::SessionStore;
use std::sync::Arc;
use tracing::debug;

/// Answer of [`AccessGate::check_access`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessStatus {
    /// The pair never opened a session; route to purchase.
    NoSession,
    /// State of the pair's most relevant session.
    Session {
        /// Whether content may be served.
        access_granted: bool,
        /// Status of that session.
        status: SessionStatus,
    },
}

impl AccessStatus {
    /// True if content may be served.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        matches!(
            self,
            Self::Session {
                access_granted: true,
                ..
            }
        )
    }
}

/// Read-side check over payment sessions.
pub struct AccessGate {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    events: GateEventsSender,
    cache: GrantCache,
}

impl AccessGate {
    /// Create a gate caching up to `cache_capacity` granted pairs.
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        events: GateEventsSender,
        cache_capacity: usize,
    ) -> Self {
        Self {
            store,
            clock,
            events,
            cache: GrantCache::with_capacity(cache_capacity),
        }
    }

    /// Report access for the pair.
    ///
    /// Sessions are ranked `VERIFIED`, then `PENDING`, then the rest, newest
    /// first within a rank. Open sessions past their window are marked
    /// `EXPIRED` before ranking.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or the expiry cannot be
    /// persisted.
    pub fn check_access(&self, buyer_id: BuyerId, item_id: ItemId) -> Result<AccessStatus> {
        if self.cache.contains(&(buyer_id, item_id)) {
            return Ok(AccessStatus::Session {
                access_granted: true,
                status: SessionStatus::Verified,
            });
        }

        for stale in self
            .store
            .expire_stale(buyer_id, item_id, self.clock.now())?
        {
            debug!("Session {} expired unverified", stale.id);
            let _ = self.events.send(GateEvent::SessionExpired {
                session_id: stale.id,
            });
        }

        let sessions = self.store.sessions_for(buyer_id, item_id)?;
        let Some(best) = sessions.iter().min_by(|a, b| access_order(a, b)) else {
            return Ok(AccessStatus::NoSession);
        };

        if best.access_granted {
            self.cache.insert((buyer_id, item_id));
        }
        Ok(AccessStatus::Session {
            access_granted: best.access_granted,
            status: best.status,
        })
    }

    /// Cache statistics.
    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}
