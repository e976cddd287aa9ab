//! Three-way reconciliation of an oracle report against a payment session.
//!
//! Checks run in a fixed order and the first failure wins:
//! reference in the transfer note, amount within tolerance, then receiver
//! account digits.

use crate::payment::oracle::OracleReport;
use crate::session::{FailureReason, PaymentSession};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// Digits compared on the receiver account.
const ACCOUNT_DIGITS: usize = 4;

/// A failed reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Which check failed.
    pub reason: FailureReason,
    /// Parsed amount, if the check got that far.
    pub observed_amount: Option<Decimal>,
}

impl Rejection {
    fn new(reason: FailureReason, observed_amount: Option<Decimal>) -> Self {
        Self {
            reason,
            observed_amount,
        }
    }
}

/// Lower-case and drop everything that is not an ASCII letter or digit.
#[must_use]
pub fn normalize(value: &str) -> String {
    value
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// True if any non-empty normalized candidate occurs in the normalized note.
#[must_use]
pub fn reference_matches(note: &str, candidates: &[&str]) -> bool {
    let note = normalize(note);
    if note.is_empty() {
        return false;
    }
    candidates
        .iter()
        .map(|candidate| normalize(candidate))
        .filter(|candidate| !candidate.is_empty())
        .any(|candidate| note.contains(&candidate))
}

/// Parse an amount reported as a number or as a string with currency noise.
///
/// `"500.00 ETB"`, `"ETB 1,250.50"` and `500` all parse; anything that leaves
/// no digits, or more than one decimal point, does not.
#[must_use]
pub fn parse_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => {
            let sanitized: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            if !sanitized.chars().any(|c| c.is_ascii_digit()) {
                return None;
            }
            Decimal::from_str(&sanitized).ok()
        }
        _ => None,
    }
}

/// Last four digits of an account number, ignoring separators.
#[must_use]
pub fn account_tail(account: &str) -> Option<String> {
    let digits: Vec<char> = account.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    let start = digits.len().saturating_sub(ACCOUNT_DIGITS);
    Some(digits[start..].iter().collect())
}

/// Check an oracle report against the session it claims to pay.
///
/// `client_reference` is the reference the client submitted alongside the
/// transaction id; it is accepted as an alternative spelling of the session
/// reference.
///
/// # Errors
///
/// Returns the first failing check as a [`Rejection`].
pub fn reconcile(
    session: &PaymentSession,
    report: &OracleReport,
    client_reference: &str,
    claimed_account_suffix: &str,
    tolerance: Decimal,
) -> Result<Decimal, Rejection> {
    let note = report.note().unwrap_or_default();
    if !reference_matches(&note, &[client_reference, &session.reference_code]) {
        return Err(Rejection::new(FailureReason::ReferenceMismatch, None));
    }

    let observed = report
        .amount()
        .and_then(parse_amount)
        .ok_or_else(|| Rejection::new(FailureReason::AmountMismatch, None))?;
    if (observed - session.expected_amount).abs() > tolerance {
        return Err(Rejection::new(
            FailureReason::AmountMismatch,
            Some(observed),
        ));
    }

    let reported_tail = report.receiver_account().as_deref().and_then(account_tail);
    let claimed_tail = account_tail(claimed_account_suffix);
    if let (Some(reported), Some(claimed)) = (reported_tail, claimed_tail) {
        if reported != claimed {
            return Err(Rejection::new(
                FailureReason::AccountMismatch,
                Some(observed),
            ));
        }
    }

    Ok(observed)
}
