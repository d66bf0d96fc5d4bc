//! Error types for the PayRail engine.
//!
//! All errors use the `PR_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Deal / validation errors
//! - 2xx: Balance errors
//! - 3xx: Requisite errors
//! - 4xx: Rate errors
//! - 5xx: Aggregator partner errors
//! - 6xx: Settlement errors
//! - 7xx: Callback errors
//! - 8xx: Auction / signature errors
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{AggregatorId, DealId, DealStatus, MerchantId, RequisiteId, TraderId};

/// Central error enum for all PayRail operations.
#[derive(Debug, Error)]
pub enum PayrailError {
    // =================================================================
    // Deal / Validation Errors (1xx)
    // =================================================================
    /// The requested deal was not found in the store.
    #[error("PR_ERR_100: Deal not found: {0}")]
    DealNotFound(DealId),

    /// The deal request failed validation (bad amount, bad method, etc.).
    #[error("PR_ERR_101: Invalid deal request: {reason}")]
    InvalidDeal { reason: String },

    /// The requested amount is zero or negative.
    #[error("PR_ERR_102: Invalid amount: {amount}")]
    InvalidAmount { amount: Decimal },

    /// The merchant was not found.
    #[error("PR_ERR_103: Merchant not found: {0}")]
    MerchantNotFound(MerchantId),

    // =================================================================
    // Balance Errors (2xx)
    // =================================================================
    /// Not enough available balance (plus deposit buffer) for a freeze.
    #[error("PR_ERR_200: Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Decimal, available: Decimal },

    /// Not enough frozen balance to release or consume.
    #[error("PR_ERR_201: Insufficient frozen balance")]
    InsufficientFrozen,

    /// A balance operation would produce a negative value.
    #[error("PR_ERR_202: Balance underflow")]
    BalanceUnderflow,

    /// The trader account was not found.
    #[error("PR_ERR_203: Trader not found: {0}")]
    TraderNotFound(TraderId),

    // =================================================================
    // Requisite Errors (3xx)
    // =================================================================
    /// No internal requisite survived the eligibility scan.
    /// The caller should fail over to the aggregator queue.
    #[error("PR_ERR_300: No internal requisite available")]
    NoInternalRequisite,

    /// Neither an internal requisite nor an aggregator could fulfill
    /// the deal. Hard rejection surfaced to the merchant.
    #[error("PR_ERR_301: No requisite available")]
    NoRequisite,

    /// The selected requisite was taken by a concurrent request between
    /// selection and reservation. Retryable.
    #[error("PR_ERR_302: Requisite taken: {0}")]
    RequisiteTaken(RequisiteId),

    /// The requisite was not found in the pool.
    #[error("PR_ERR_303: Requisite not found: {0}")]
    RequisiteNotFound(RequisiteId),

    // =================================================================
    // Rate Errors (4xx)
    // =================================================================
    /// The rate source is unreachable and no fallback was configured.
    /// The field avoids the name `source`, which thiserror reserves for
    /// error chaining.
    #[error("PR_ERR_400: Rate unavailable for source {source_id}")]
    RateUnavailable { source_id: String },

    // =================================================================
    // Aggregator Partner Errors (5xx)
    // =================================================================
    /// The partner answered with a non-2xx status.
    #[error("PR_ERR_500: Partner {aggregator} rejected: status {status}")]
    PartnerRejected { aggregator: AggregatorId, status: u16 },

    /// The partner call exceeded the bounded timeout.
    #[error("PR_ERR_501: Partner {aggregator} timed out")]
    PartnerTimeout { aggregator: AggregatorId },

    /// Transport-level failure talking to the partner.
    #[error("PR_ERR_502: Partner {aggregator} transport error: {reason}")]
    PartnerTransport {
        aggregator: AggregatorId,
        reason: String,
    },

    // =================================================================
    // Settlement Errors (6xx)
    // =================================================================
    /// The requested status transition is not legal.
    #[error("PR_ERR_600: Invalid transition: {from} -> {to}")]
    InvalidTransition { from: DealStatus, to: DealStatus },

    // =================================================================
    // Callback Errors (7xx)
    // =================================================================
    /// Callback delivery failed. Recorded, never surfaced to the
    /// original caller.
    #[error("PR_ERR_700: Callback delivery failed: {reason}")]
    CallbackFailed { reason: String },

    // =================================================================
    // Auction / Signature Errors (8xx)
    // =================================================================
    /// The inbound auction signature did not verify.
    #[error("PR_ERR_800: Invalid auction signature")]
    InvalidSignature,

    /// The inbound auction timestamp is outside the tolerance window.
    #[error("PR_ERR_801: Expired auction timestamp: skew {skew_secs}s")]
    ExpiredTimestamp { skew_secs: i64 },

    /// Offers are no longer accepted for this auction order.
    #[error("PR_ERR_802: Auction closed for new offers")]
    AuctionClosed,

    /// The merchant's registered auction key could not be parsed.
    #[error("PR_ERR_803: Rejected auction key: {reason}")]
    KeyRejected { reason: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("PR_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("PR_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config, missing fields, etc.).
    #[error("PR_ERR_902: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk, network).
    #[error("PR_ERR_903: I/O error: {0}")]
    Io(String),
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, PayrailError>;

impl From<std::io::Error> for PayrailError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PayrailError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = PayrailError::DealNotFound(DealId::new());
        let msg = format!("{err}");
        assert!(msg.starts_with("PR_ERR_100"), "Got: {msg}");
    }

    #[test]
    fn insufficient_balance_display() {
        let err = PayrailError::InsufficientBalance {
            needed: Decimal::new(100, 0),
            available: Decimal::new(50, 0),
        };
        let msg = format!("{err}");
        assert!(msg.contains("PR_ERR_200"));
        assert!(msg.contains("100"));
        assert!(msg.contains("50"));
    }

    #[test]
    fn invalid_transition_display() {
        let err = PayrailError::InvalidTransition {
            from: DealStatus::Ready,
            to: DealStatus::Created,
        };
        let msg = format!("{err}");
        assert!(msg.contains("PR_ERR_600"));
        assert!(msg.contains("READY"));
        assert!(msg.contains("CREATED"));
    }

    #[test]
    fn rate_unavailable_is_a_leaf_error() {
        // The field must not be picked up as an error-source by thiserror;
        // the failing source id belongs in the message only.
        let err = PayrailError::RateUnavailable {
            source_id: "binance".into(),
        };
        assert!(std::error::Error::source(&err).is_none());
        assert!(format!("{err}").contains("binance"));
    }

    #[test]
    fn all_errors_have_pr_err_prefix() {
        let errors: Vec<Box<dyn std::error::Error>> = vec![
            Box::new(PayrailError::NoInternalRequisite),
            Box::new(PayrailError::NoRequisite),
            Box::new(PayrailError::InsufficientFrozen),
            Box::new(PayrailError::InvalidSignature),
            Box::new(PayrailError::ExpiredTimestamp { skew_secs: 120 }),
            Box::new(PayrailError::Internal("test".into())),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with("PR_ERR_"),
                "Error missing PR_ERR_ prefix: {msg}"
            );
        }
    }
}
