//! Error taxonomy for the wager engine.
//!
//! Validation and conflict failures are recoverable and carry stable codes
//! the API layer maps one-to-one onto response payloads. Integrity and
//! internal failures are logged with context and surfaced to callers as a
//! generic failure so fairness material never leaks early.

use crate::money::Amount;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("stake {got} outside allowed range [{min}, {max}]")]
    InvalidStake { min: Amount, max: Amount, got: Amount },

    #[error("invalid field: {0}")]
    InvalidField(String),

    #[error("tile {0} already revealed")]
    AlreadyRevealed(u8),

    #[error("a session is already active for this user and mode")]
    SessionActive,

    #[error("no active game for this user and mode")]
    NoActiveGame,

    #[error("no active seed pair for this user")]
    NoActiveSeed,

    #[error("insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: Amount, available: Amount },

    #[error("game mode '{0}' is disabled")]
    FeatureDisabled(String),

    #[error("rate limited, retry in {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Persisted state that fails to decode. Never silently defaulted: the
    /// affected session is frozen for manual reconciliation.
    #[error("integrity failure: {0}")]
    Integrity(String),

    #[error("storage failure: {0}")]
    Store(String),

    #[error("internal failure: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable machine-readable code, part of the API contract.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::InvalidStake { .. } => "INVALID_STAKE",
            EngineError::InvalidField(_) => "INVALID_FIELD",
            EngineError::AlreadyRevealed(_) => "ALREADY_REVEALED",
            EngineError::SessionActive => "SESSION_ACTIVE",
            EngineError::NoActiveGame => "NO_ACTIVE_GAME",
            EngineError::NoActiveSeed => "NO_ACTIVE_SEED",
            EngineError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            EngineError::FeatureDisabled(_) => "FEATURE_DISABLED",
            EngineError::RateLimited { .. } => "RATE_LIMITED",
            EngineError::Integrity(_) => "INTEGRITY_ERROR",
            EngineError::Store(_) | EngineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the failure is a client-visible validation/conflict outcome
    /// (as opposed to a system fault that returns a generic message).
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            EngineError::Integrity(_) | EngineError::Store(_) | EngineError::Internal(_)
        )
    }
}

impl From<rocksdb::Error> for EngineError {
    fn from(e: rocksdb::Error) -> Self {
        EngineError::Store(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
