//! Payment session records and their state transitions.

use crate::error::Error;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Buyer identifier (owned by the account system).
pub type BuyerId = u64;

/// Item identifier (owned by the catalog).
pub type ItemId = u64;

/// Store-assigned session identifier.
pub type SessionId = u64;

/// Lifecycle state of a payment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Waiting for the buyer to pay and submit proof.
    Pending,
    /// Payment confirmed, access granted.
    Verified,
    /// Last verification attempt failed.
    Failed,
    /// Window elapsed before verification.
    Expired,
}

impl SessionStatus {
    /// Upper-case wire name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Verified => "VERIFIED",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Preference when several sessions compete for the access answer.
    fn access_rank(self) -> u8 {
        match self {
            Self::Verified => 0,
            Self::Pending => 1,
            Self::Failed | Self::Expired => 2,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session ended up `FAILED` or `EXPIRED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Verification came after the window closed.
    WindowExpired,
    /// The oracle was unreachable or refused; carries a short summary.
    ProviderFailure(String),
    /// Transaction note lacks the session reference.
    ReferenceMismatch,
    /// Amount outside tolerance or unparsable.
    AmountMismatch,
    /// Receiver account digits differ.
    AccountMismatch,
}

impl FailureReason {
    /// Short machine string stored with the session.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::WindowExpired => "window_expired",
            Self::ProviderFailure(_) => "provider_failure",
            Self::ReferenceMismatch => "reference_mismatch",
            Self::AmountMismatch => "amount_mismatch",
            Self::AccountMismatch => "account_mismatch",
        }
    }

    /// Error class surfaced to callers for this reason.
    #[must_use]
    pub fn to_error(&self) -> Error {
        match self {
            Self::WindowExpired => Error::Expired,
            Self::ProviderFailure(detail) => Error::ProviderUnavailable(detail.clone()),
            Self::ReferenceMismatch => Error::ReferenceMismatch,
            Self::AmountMismatch => Error::AmountMismatch,
            Self::AccountMismatch => Error::AccountMismatch,
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderFailure(detail) => write!(f, "{}: {detail}", self.code()),
            other => f.write_str(other.code()),
        }
    }
}

/// A durable payment session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    /// Store-assigned identifier.
    pub id: SessionId,
    /// Paying buyer.
    pub buyer_id: BuyerId,
    /// Item being bought.
    pub item_id: ItemId,
    /// Code the buyer puts in the transfer note.
    pub reference_code: String,
    /// Price snapshot taken at creation.
    pub expected_amount: Decimal,
    /// Amount the oracle reported on the last attempt.
    pub observed_amount: Option<Decimal>,
    /// Transaction id submitted on the last attempt.
    pub transaction_id: Option<String>,
    /// Current state.
    pub status: SessionStatus,
    /// Present iff status is `FAILED` or `EXPIRED`.
    pub failure_reason: Option<FailureReason>,
    /// Set on verification, never cleared.
    pub access_granted: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Verification time.
    pub verified_at: Option<DateTime<Utc>>,
    /// End of the payment window.
    pub expires_at: DateTime<Utc>,
    /// Verification attempts that reached the oracle.
    pub attempts: u32,
    /// True when the last failure was a provider failure.
    pub retryable: bool,
    /// Bumped on every write; compare-and-set token.
    pub version: u64,
}

/// Fields needed to open a session.
#[derive(Debug, Clone)]
pub struct NewSession {
    /// Paying buyer.
    pub buyer_id: BuyerId,
    /// Item being bought.
    pub item_id: ItemId,
    /// Freshly generated reference code.
    pub reference_code: String,
    /// Price snapshot.
    pub expected_amount: Decimal,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// End of the payment window.
    pub expires_at: DateTime<Utc>,
}

/// A single write applied to a session under compare-and-set.
#[derive(Debug, Clone)]
pub enum Transition {
    /// Window elapsed.
    Expire,
    /// Verification attempt failed.
    Fail {
        /// Why.
        reason: FailureReason,
        /// Transaction id the client claimed.
        transaction_id: String,
        /// Amount the oracle reported, if it parsed.
        observed_amount: Option<Decimal>,
    },
    /// Verification succeeded.
    Verify {
        /// Confirmed transaction id.
        transaction_id: String,
        /// Confirmed amount.
        observed_amount: Decimal,
        /// Commit time.
        at: DateTime<Utc>,
    },
}

impl PaymentSession {
    /// Build a fresh pending session.
    #[must_use]
    pub fn open(id: SessionId, draft: NewSession) -> Self {
        Self {
            id,
            buyer_id: draft.buyer_id,
            item_id: draft.item_id,
            reference_code: draft.reference_code,
            expected_amount: draft.expected_amount,
            observed_amount: None,
            transaction_id: None,
            status: SessionStatus::Pending,
            failure_reason: None,
            access_granted: false,
            created_at: draft.created_at,
            verified_at: None,
            expires_at: draft.expires_at,
            attempts: 0,
            retryable: false,
            version: 0,
        }
    }

    /// Still accepts attempts and has time left in the window. A session
    /// that failed only because the provider was unavailable stays active.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.accepts_attempts() && !self.window_elapsed(now)
    }

    /// The window has closed.
    #[must_use]
    pub fn window_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Still open but past its window; due to be marked `EXPIRED`.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.accepts_attempts() && self.window_elapsed(now)
    }

    /// Pending, or failed in a way that allows another attempt.
    #[must_use]
    pub fn accepts_attempts(&self) -> bool {
        match self.status {
            SessionStatus::Pending => true,
            SessionStatus::Failed => self.retryable,
            SessionStatus::Verified | SessionStatus::Expired => false,
        }
    }

    /// Belongs to the given (buyer, item) pair.
    #[must_use]
    pub fn belongs_to(&self, buyer_id: BuyerId, item_id: ItemId) -> bool {
        self.buyer_id == buyer_id && self.item_id == item_id
    }

    /// Error class matching this session's recorded failure.
    #[must_use]
    pub fn recorded_error(&self) -> Error {
        match (&self.failure_reason, self.status) {
            (Some(reason), _) => reason.to_error(),
            (None, SessionStatus::Expired) => Error::Expired,
            (None, _) => Error::ProviderUnavailable("verification failed".to_string()),
        }
    }

    /// Apply a transition in place and bump the version.
    ///
    /// Returns false, leaving the record untouched, if the session no longer
    /// accepts the transition.
    pub fn apply(&mut self, transition: Transition) -> bool {
        match transition {
            Transition::Expire => {
                if !self.accepts_attempts() {
                    return false;
                }
                self.status = SessionStatus::Expired;
                self.failure_reason = Some(FailureReason::WindowExpired);
                self.retryable = false;
            }
            Transition::Fail {
                reason,
                transaction_id,
                observed_amount,
            } => {
                if !self.accepts_attempts() {
                    return false;
                }
                self.retryable = matches!(reason, FailureReason::ProviderFailure(_));
                self.status = SessionStatus::Failed;
                self.failure_reason = Some(reason);
                self.transaction_id = Some(transaction_id);
                if observed_amount.is_some() {
                    self.observed_amount = observed_amount;
                }
                self.attempts += 1;
            }
            Transition::Verify {
                transaction_id,
                observed_amount,
                at,
            } => {
                if !self.accepts_attempts() {
                    return false;
                }
                self.status = SessionStatus::Verified;
                self.failure_reason = None;
                self.retryable = false;
                self.transaction_id = Some(transaction_id);
                self.observed_amount = Some(observed_amount);
                self.verified_at = Some(at);
                self.access_granted = true;
                self.attempts += 1;
            }
        }
        self.version += 1;
        true
    }
}

/// Order sessions for the access answer: best candidate first.
///
/// `VERIFIED` beats `PENDING` beats the rest, then the latest verification or
/// creation time wins, then the latest creation.
#[must_use]
pub fn access_order(a: &PaymentSession, b: &PaymentSession) -> Ordering {
    a.status
        .access_rank()
        .cmp(&b.status.access_rank())
        .then_with(|| {
            let a_time = a.verified_at.unwrap_or(a.created_at);
            let b_time = b.verified_at.unwrap_or(b.created_at);
            b_time.cmp(&a_time)
        })
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.id.cmp(&a.id))
}

/// Order sessions newest first by creation.
#[must_use]
pub fn newest_first(a: &PaymentSession, b: &PaymentSession) -> Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id))
}
