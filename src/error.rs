//! Domain error envelope.
//! Mission: one error type for everything a client can see; everything else
//! (store round-trips, HTTP transport failures) stays an `anyhow::Error`
//! internally and is converted to the nearest domain kind at the boundary.

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced to the realtime transport. Never broadcast — these are
/// always addressed to the client that triggered them.
#[derive(Debug, Clone, Error, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainError {
    #[error("betting is closed for this round")]
    BettingClosed,

    #[error("amount must be positive")]
    InvalidAmount,

    #[error("symbols must be 1..=20 distinct entries")]
    InvalidSelection,

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("wallet gateway unavailable: {message}")]
    WalletUnavailable { message: String },

    #[error("transaction not found")]
    NotFound,

    #[error("cancellation failed after debit reversal was attempted")]
    CancellationFailed,

    #[error("authentication required")]
    AuthRequired,

    #[error("invalid session")]
    InvalidSession,

    #[error("market is closed")]
    MarketClosed,
}

impl DomainError {
    /// Short machine-readable code, stable across message wording changes.
    pub fn code(&self) -> &'static str {
        match self {
            DomainError::BettingClosed => "betting_closed",
            DomainError::InvalidAmount => "invalid_amount",
            DomainError::InvalidSelection => "invalid_selection",
            DomainError::InsufficientBalance => "insufficient_balance",
            DomainError::WalletUnavailable { .. } => "wallet_unavailable",
            DomainError::NotFound => "not_found",
            DomainError::CancellationFailed => "cancellation_failed",
            DomainError::AuthRequired => "auth_required",
            DomainError::InvalidSession => "invalid_session",
            DomainError::MarketClosed => "market_closed",
        }
    }
}

/// Wire envelope: `{type, code?, message}`.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub code: &'static str,
    pub message: String,
}

impl From<&DomainError> for ErrorEnvelope {
    fn from(err: &DomainError) -> Self {
        Self {
            kind: "bet_error".to_string(),
            code: err.code(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
