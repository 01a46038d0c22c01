//! Error types for the Tapeline matching engine.
//!
//! All errors use the `TL_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by class:
//! - 1xx: Validation errors (malformed intent, risk failure)
//! - 2xx: State errors (duplicate / unknown / terminal orders)
//! - 3xx: Retryable errors (halted, busy)
//! - 4xx: Audit and replay errors
//! - 9xx: Internal faults and general errors

use thiserror::Error;

use crate::{OrderId, RejectReason, Symbol};

/// Central error enum for all Tapeline operations.
#[derive(Debug, Error)]
pub enum TapelineError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// The intent was rejected before reaching the book.
    #[error("TL_ERR_100: Rejected: {0}")]
    Rejected(RejectReason),

    /// The order failed structural validation.
    #[error("TL_ERR_101: Invalid order: {reason}")]
    InvalidOrder { reason: String },

    /// No engine is running for this symbol.
    #[error("TL_ERR_102: Unknown symbol: {0}")]
    UnknownSymbol(Symbol),

    // =================================================================
    // State Errors (2xx)
    // =================================================================
    /// An order with this id is already live.
    #[error("TL_ERR_200: Order already exists: {0}")]
    DuplicateOrder(OrderId),

    /// The requested order is not known to the engine.
    #[error("TL_ERR_201: Order not found: {0}")]
    OrderNotFound(OrderId),

    // =================================================================
    // Retryable Errors (3xx)
    // =================================================================
    /// The circuit breaker has halted marketable intake.
    #[error("TL_ERR_300: Circuit breaker halted")]
    CircuitBreakerHalt,

    /// The audit / publish path is behind its watermark.
    #[error("TL_ERR_301: Busy, retry later")]
    Busy,

    // =================================================================
    // Audit / Replay Errors (4xx)
    // =================================================================
    /// A record's hash does not match its content or predecessor.
    #[error("TL_ERR_400: Audit chain broken at sequence {sequence}: {reason}")]
    ChainBroken { sequence: u64, reason: String },

    /// A sequence number is missing or out of order.
    #[error("TL_ERR_401: Audit sequence gap: expected {expected}, got {actual}")]
    SequenceGap { expected: u64, actual: u64 },

    /// Replaying the log did not reproduce the recorded events.
    #[error("TL_ERR_402: Replay divergence at sequence {sequence}: {reason}")]
    ReplayDivergence { sequence: u64, reason: String },

    // =================================================================
    // Internal (9xx)
    // =================================================================
    /// An invariant was violated; the symbol stops matching.
    #[error("TL_ERR_900: Invariant violation on {symbol}: {reason}")]
    InvariantViolation { symbol: Symbol, reason: String },

    /// The symbol is faulted and waits for replay-based recovery.
    #[error("TL_ERR_901: Symbol faulted: {0}")]
    SymbolFaulted(Symbol),

    /// Unrecoverable internal error.
    #[error("TL_ERR_902: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("TL_ERR_903: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, inconsistent values).
    #[error("TL_ERR_904: Configuration error: {0}")]
    Configuration(String),

    /// I/O error (disk).
    #[error("TL_ERR_905: I/O error: {0}")]
    Io(String),

    /// A runtime task or channel went away.
    #[error("TL_ERR_906: Channel closed: {0}")]
    ChannelClosed(String),
}

impl TapelineError {
    /// Whether retrying the same intent later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CircuitBreakerHalt | Self::Busy => true,
            Self::Rejected(reason) => reason.is_retryable(),
            _ => false,
        }
    }

    /// Numeric error code (the digits after `TL_ERR_`).
    #[must_use]
    pub const fn code(&self) -> u16 {
        match self {
            Self::Rejected(_) => 100,
            Self::InvalidOrder { .. } => 101,
            Self::UnknownSymbol(_) => 102,
            Self::DuplicateOrder(_) => 200,
            Self::OrderNotFound(_) => 201,
            Self::CircuitBreakerHalt => 300,
            Self::Busy => 301,
            Self::ChainBroken { .. } => 400,
            Self::SequenceGap { .. } => 401,
            Self::ReplayDivergence { .. } => 402,
            Self::InvariantViolation { .. } => 900,
            Self::SymbolFaulted(_) => 901,
            Self::Internal(_) => 902,
            Self::Serialization(_) => 903,
            Self::Configuration(_) => 904,
            Self::Io(_) => 905,
            Self::ChannelClosed(_) => 906,
        }
    }

    /// Whether this error leaves the symbol faulted.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation { .. } | Self::SymbolFaulted(_))
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, TapelineError>;

impl From<std::io::Error> for TapelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TapelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<RejectReason> for TapelineError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::CircuitBreakerHalt => Self::CircuitBreakerHalt,
            RejectReason::Busy => Self::Busy,
            other => Self::Rejected(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_contains_prefix() {
        let err = TapelineError::OrderNotFound(OrderId::new());
        let msg = format!("{err}");
        assert!(msg.starts_with("TL_ERR_201"), "Got: {msg}");
    }

    #[test]
    fn rejected_display_carries_reason() {
        let err = TapelineError::Rejected(RejectReason::PriceCollar);
        let msg = format!("{err}");
        assert!(msg.contains("TL_ERR_100"));
        assert!(msg.contains("PriceCollar"));
    }

    #[test]
    fn retryable_classification() {
        assert!(TapelineError::Busy.is_retryable());
        assert!(TapelineError::from(RejectReason::CircuitBreakerHalt).is_retryable());
        assert!(TapelineError::Rejected(RejectReason::RateLimited).is_retryable());
        assert!(!TapelineError::Rejected(RejectReason::InsufficientBalance).is_retryable());
        assert!(!TapelineError::SymbolFaulted(Symbol::new("X")).is_retryable());
    }

    #[test]
    fn codes_match_display() {
        let errors = vec![
            TapelineError::Busy,
            TapelineError::ChainBroken {
                sequence: 3,
                reason: "x".into(),
            },
            TapelineError::Internal("test".into()),
            TapelineError::SymbolFaulted(Symbol::new("BTC-USD")),
        ];
        for err in errors {
            let msg = format!("{err}");
            assert!(
                msg.starts_with(&format!("TL_ERR_{}", err.code())),
                "code mismatch: {msg}"
            );
        }
    }

    #[test]
    fn io_conversion() {
        let err: TapelineError = std::io::Error::other("disk gone").into();
        assert_eq!(err.code(), 905);
    }
}
