//! Payment lifecycle event system.

use crate::session::{BuyerId, ItemId, SessionId};
use tokio::sync::broadcast;

/// Events emitted by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateEvent {
    /// Server has started successfully.
    Started,

    /// Server is shutting down.
    ShuttingDown,

    /// A new payment session was opened.
    SessionCreated {
        /// Session identifier.
        session_id: SessionId,
        /// Paying buyer.
        buyer_id: BuyerId,
        /// Item being bought.
        item_id: ItemId,
        /// Reference code shown to the buyer.
        reference_code: String,
    },

    /// An active session was handed out again.
    SessionReused {
        /// Session identifier.
        session_id: SessionId,
    },

    /// A session's window elapsed before it was verified.
    SessionExpired {
        /// Session identifier.
        session_id: SessionId,
    },

    /// A payment was verified and access granted.
    PaymentVerified {
        /// Session identifier.
        session_id: SessionId,
        /// Bank transaction id.
        transaction_id: String,
    },

    /// A verification attempt failed.
    PaymentFailed {
        /// Session identifier.
        session_id: SessionId,
        /// Machine failure code.
        reason: String,
    },
}

/// Channel for receiving gate events.
pub type GateEventsChannel = broadcast::Receiver<GateEvent>;

/// Sender for gate events.
pub type GateEventsSender = broadcast::Sender<GateEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (GateEventsSender, GateEventsChannel) {
    broadcast::channel(256)
}
