//! Caller-facing error taxonomy.

use rust_decimal::Decimal;
use thiserror::Error;

use piggybank_core::DomainError;

use crate::config::ConfigError;
use crate::storage::StoreError;

/// Every way a ledger operation can fail, as seen by callers.
///
/// A rejected mutation leaves balance, currency, and version unchanged.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Non-positive, malformed, or over-precise amount.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Withdrawal larger than the current balance.
    #[error("insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Decimal,
        available: Decimal,
    },

    /// Currency outside the configured set.
    #[error("unsupported currency: {0}")]
    UnsupportedCurrency(String),

    /// A durable read or write failed; the in-memory state did not advance.
    #[error("storage failure: {0}")]
    StorageFailure(String),

    /// The movement log and the persisted snapshot disagree. Fatal at startup.
    #[error("ledger consistency error: {0}")]
    ConsistencyError(String),
}

impl LedgerError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageFailure(msg.into())
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::ConsistencyError(msg.into())
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidAmount(msg) => LedgerError::InvalidAmount(msg),
            DomainError::InsufficientFunds {
                requested,
                available,
            } => LedgerError::InsufficientFunds {
                requested,
                available,
            },
            DomainError::UnsupportedCurrency(code) => LedgerError::UnsupportedCurrency(code),
            DomainError::InvariantViolation(msg) => LedgerError::ConsistencyError(msg),
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::DuplicateId(id) => {
                LedgerError::StorageFailure(format!("movement id {id} already logged"))
            }
            StoreError::Storage(msg) => LedgerError::StorageFailure(msg),
            StoreError::Corrupt(msg) => LedgerError::ConsistencyError(msg),
        }
    }
}

/// Every current `ConfigError` is about the currency set (an unknown code, an
/// empty set, or a default outside the set), so all of them surface as
/// `UnsupportedCurrency` carrying the config message.
impl From<ConfigError> for LedgerError {
    fn from(value: ConfigError) -> Self {
        LedgerError::UnsupportedCurrency(value.to_string())
    }
}
