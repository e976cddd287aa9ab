//! Verification engine: confirms a claimed bank transfer against the oracle.
//!
//! This is the core payment logic of bankpay-gate. Every attempt walks the
//! same ordered checks and the first one that fails decides the outcome:
//!
//! ```text
//! lookup ─▶ already processed? ─▶ window elapsed? ─▶ attempts left?
//!                                                         │
//!   commit VERIFIED ◀─ account ◀─ amount ◀─ reference ◀─ oracle
//! ```
//!
//! Every write is a compare-and-set on the version read at lookup, so two
//! racing attempts on one session commit at most once.

use crate::clock::Clock;
use crate::config::PaymentConfig;
use crate::error::{Error, Result};
use crate::event::{GateEvent, GateEventsSender};
use crate::payment::oracle::{Oracle, OracleRequest};
use crate::payment::reconcile::reconcile;
use crate::reference::is_valid_reference;
use crate::session::{BuyerId, FailureReason, ItemId, PaymentSession, SessionStatus, Transition};
use crate::store::{CasOutcome, SessionStore};
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest provider detail kept on a session record.
const MAX_DETAIL_CHARS: usize = 120;

/// Identifies the session a verification attempt is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    /// Paying buyer.
    pub buyer_id: BuyerId,
    /// Item being bought.
    pub item_id: ItemId,
    /// Reference code the buyer was shown.
    pub reference_code: String,
}

/// Successful result of [`VerificationEngine::verify`].
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    /// This attempt committed the payment.
    Verified {
        /// Session after the commit.
        session: PaymentSession,
        /// Oracle answer that confirmed it.
        provider_response: Value,
    },
    /// The session was already verified, by an earlier or concurrent attempt.
    AlreadyProcessed {
        /// Session as committed.
        session: PaymentSession,
    },
}

impl VerifyOutcome {
    /// The session behind the outcome.
    #[must_use]
    pub fn session(&self) -> &PaymentSession {
        match self {
            Self::Verified { session, .. } | Self::AlreadyProcessed { session } => session,
        }
    }
}

/// Verifies claimed transfers and records the outcome on the session.
pub struct VerificationEngine<O> {
    store: Arc<dyn SessionStore>,
    oracle: O,
    clock: Arc<dyn Clock>,
    events: GateEventsSender,
    config: PaymentConfig,
}

impl<O: Oracle> VerificationEngine<O> {
    /// Create an engine.
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        oracle: O,
        clock: Arc<dyn Clock>,
        events: GateEventsSender,
        config: PaymentConfig,
    ) -> Self {
        info!(
            "Verification engine initialized (max_attempts={}, tolerance={})",
            config.max_attempts, config.amount_tolerance
        );
        Self {
            store,
            oracle,
            clock,
            events,
            config,
        }
    }

    /// The oracle this engine queries.
    #[must_use]
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Verify a claimed transfer for the session identified by `key`.
    ///
    /// Failures are recorded on the session before they are returned, so the
    /// stored reason always matches the error the caller sees.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] for blank identifiers or a malformed reference
    ///   code (no state change)
    /// - [`Error::NotFound`] if no session matches the key (no state change)
    /// - [`Error::Expired`] once the window has elapsed
    /// - [`Error::AttemptsExhausted`] when the attempt bound is reached
    /// - [`Error::ProviderUnavailable`] if the oracle failed (retryable)
    /// - [`Error::ReferenceMismatch`], [`Error::AmountMismatch`],
    ///   [`Error::AccountMismatch`] when reconciliation fails (final)
    /// - [`Error::Storage`] if the outcome could not be persisted
    pub async fn verify(
        &self,
        key: &SessionKey,
        claimed_transaction_id: &str,
        claimed_account_suffix: &str,
    ) -> Result<VerifyOutcome> {
        let reference_code = key.reference_code.trim().to_ascii_uppercase();
        let transaction_id = claimed_transaction_id.trim();
        let account_suffix = claimed_account_suffix.trim();
        if key.buyer_id == 0 || key.item_id == 0 || reference_code.is_empty() {
            return Err(Error::InvalidInput(
                "item and reference code are required".to_string(),
            ));
        }
        if !is_valid_reference(&reference_code) {
            return Err(Error::InvalidInput(format!(
                "malformed reference code {reference_code}"
            )));
        }
        if transaction_id.is_empty() || account_suffix.is_empty() {
            return Err(Error::InvalidInput(
                "transaction id and account suffix are required".to_string(),
            ));
        }

        let session = self
            .store
            .find_by_reference(key.buyer_id, key.item_id, &reference_code)?
            .ok_or_else(|| Error::NotFound(format!("payment session {reference_code}")))?;

        if session.status == SessionStatus::Verified {
            debug!("Session {} already verified", session.id);
            return Ok(VerifyOutcome::AlreadyProcessed { session });
        }
        if !session.accepts_attempts() {
            debug!(
                "Session {} is final ({}), not re-verifying",
                session.id, session.status
            );
            return Err(session.recorded_error());
        }

        if session.window_elapsed(self.clock.now()) {
            return self.expire(&session);
        }

        if session.attempts >= self.config.max_attempts {
            warn!(
                "Session {} used all {} verification attempts",
                session.id, self.config.max_attempts
            );
            return Err(Error::AttemptsExhausted);
        }

        let request = OracleRequest {
            transaction_id: transaction_id.to_string(),
            account_suffix: account_suffix.to_string(),
        };
        let report = match self.oracle.verify(&request).await {
            Ok(report) if report.is_explicit_failure() => Err(report
                .error_message()
                .unwrap_or_else(|| "transaction not confirmed".to_string())),
            Ok(report) => Ok(report),
            Err(Error::ProviderUnavailable(detail)) => Err(detail),
            Err(e) => Err(e.to_string()),
        };
        let report = match report {
            Ok(report) => report,
            Err(detail) => {
                warn!(
                    "Verifier failed for session {} (tx {}): {}",
                    session.id, transaction_id, detail
                );
                let reason = FailureReason::ProviderFailure(summarize(&detail));
                return self.record_failure(&session, reason, transaction_id, None);
            }
        };

        let observed = match reconcile(
            &session,
            &report,
            &reference_code,
            account_suffix,
            self.config.amount_tolerance,
        ) {
            Ok(observed) => observed,
            Err(rejection) => {
                info!(
                    "Session {} rejected: {} (tx {})",
                    session.id, rejection.reason, transaction_id
                );
                return self.record_failure(
                    &session,
                    rejection.reason,
                    transaction_id,
                    rejection.observed_amount,
                );
            }
        };

        let commit = Transition::Verify {
            transaction_id: transaction_id.to_string(),
            observed_amount: observed,
            at: self.clock.now(),
        };
        let outcome = match self
            .store
            .compare_and_set(session.id, session.version, commit.clone())?
        {
            // A concurrent provider failure landed first; this report still
            // matches, so commit on top of it.
            CasOutcome::Conflict(current)
                if current.accepts_attempts() && !current.window_elapsed(self.clock.now()) =>
            {
                debug!(
                    "Session {} changed during verification, retrying commit",
                    current.id
                );
                self.store
                    .compare_and_set(current.id, current.version, commit)?
            }
            outcome => outcome,
        };
        match outcome {
            CasOutcome::Applied(session) => {
                info!(
                    "Payment verified: session {} buyer {} item {} tx {} ({})",
                    session.id, session.buyer_id, session.item_id, transaction_id, observed
                );
                let _ = self.events.send(GateEvent::PaymentVerified {
                    session_id: session.id,
                    transaction_id: transaction_id.to_string(),
                });
                Ok(VerifyOutcome::Verified {
                    session,
                    provider_response: report.raw().clone(),
                })
            }
            CasOutcome::Conflict(current) => resolve_conflict(current),
        }
    }

    fn expire(&self, session: &PaymentSession) -> Result<VerifyOutcome> {
        match self
            .store
            .compare_and_set(session.id, session.version, Transition::Expire)?
        {
            CasOutcome::Applied(expired) => {
                info!("Session {} expired before verification", expired.id);
                let _ = self.events.send(GateEvent::SessionExpired {
                    session_id: expired.id,
                });
                Err(Error::Expired)
            }
            CasOutcome::Conflict(current) => resolve_conflict(current),
        }
    }

    fn record_failure(
        &self,
        session: &PaymentSession,
        reason: FailureReason,
        transaction_id: &str,
        observed_amount: Option<Decimal>,
    ) -> Result<VerifyOutcome> {
        let error = reason.to_error();
        let code = reason.code();
        let failure = Transition::Fail {
            reason,
            transaction_id: transaction_id.to_string(),
            observed_amount,
        };
        match self
            .store
            .compare_and_set(session.id, session.version, failure)?
        {
            CasOutcome::Applied(failed) => {
                let _ = self.events.send(GateEvent::PaymentFailed {
                    session_id: failed.id,
                    reason: code.to_string(),
                });
                Err(error)
            }
            CasOutcome::Conflict(current) => resolve_conflict(current),
        }
    }
}

/// Outcome for the loser of a write race: the winner's state decides.
fn resolve_conflict(current: PaymentSession) -> Result<VerifyOutcome> {
    if current.status == SessionStatus::Verified {
        debug!("Session {} was verified concurrently", current.id);
        Ok(VerifyOutcome::AlreadyProcessed { session: current })
    } else {
        Err(current.recorded_error())
    }
}

fn summarize(detail: &str) -> String {
    let detail = detail.trim();
    if detail.chars().count() <= MAX_DETAIL_CHARS {
        detail.to_string()
    } else {
        let mut short: String = detail.chars().take(MAX_DETAIL_CHARS).collect();
        short.push('…');
        short
    }
}
