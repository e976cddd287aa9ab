//! Error types for bankpay-gate.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the payment gate.
///
/// Every variant maps to a stable machine-readable class via [`Error::kind`],
/// which is what HTTP clients branch on.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed identifiers in a request.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown buyer, item or payment session.
    #[error("not found: {0}")]
    NotFound(String),

    /// The payment window elapsed before verification.
    #[error("payment window expired")]
    Expired,

    /// The verification service was unreachable or refused the transaction.
    #[error("payment provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The transaction note does not carry the session reference.
    #[error("reference not found in transaction details")]
    ReferenceMismatch,

    /// The transferred amount differs from the expected amount.
    #[error("transferred amount mismatched")]
    AmountMismatch,

    /// The transfer went to a different receiver account.
    #[error("receiver account mismatched")]
    AccountMismatch,

    /// The session has used up its verification attempts.
    #[error("verification attempts exhausted")]
    AttemptsExhausted,

    /// No QR code could be read from the uploaded image.
    #[error("QR code not detected")]
    QrNotDetected,

    /// The uploaded image could not be loaded.
    #[error("image error: {0}")]
    Image(String),

    /// Session persistence failed. Safe to retry.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable error class.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid-input",
            Self::NotFound(_) => "not-found",
            Self::Expired => "expired",
            Self::ProviderUnavailable(_) => "provider-unavailable",
            Self::ReferenceMismatch => "reference-mismatch",
            Self::AmountMismatch => "amount-mismatch",
            Self::AccountMismatch => "account-mismatch",
            Self::AttemptsExhausted => "attempts-exhausted",
            Self::QrNotDetected => "qr-not-detected",
            Self::Image(_) => "image",
            Self::Storage(_) | Self::Config(_) | Self::Io(_) => "internal",
        }
    }

    /// Returns true if the caller may retry the same request later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ProviderUnavailable(_) | Self::Storage(_))
    }

    /// Short message that is safe to show to the buyer.
    ///
    /// Provider and storage details stay in the logs.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::ProviderUnavailable(_) => {
                "Unable to reach payment provider. Please try again.".to_string()
            }
            Self::Storage(_) | Self::Config(_) | Self::Io(_) => {
                "Internal error, please retry shortly.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_distinct_for_verification_failures() {
        let kinds = [
            Error::Expired.kind(),
            Error::ProviderUnavailable(String::new()).kind(),
            Error::ReferenceMismatch.kind(),
            Error::AmountMismatch.kind(),
            Error::AccountMismatch.kind(),
            Error::NotFound(String::new()).kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }

    #[test]
    fn test_provider_details_not_leaked() {
        let err = Error::ProviderUnavailable("upstream 502: stack trace...".to_string());
        assert!(!err.user_message().contains("stack trace"));
        assert!(err.is_retryable());
        assert!(!Error::AmountMismatch.is_retryable());
    }
}
