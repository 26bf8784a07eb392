//! Durable storage boundary for the ledger.
//!
//! A backend holds two things: the append-only movement log and a single-row
//! "current state" (the latest snapshot). Nothing here knows about balances or
//! validation; the ledger state engine owns those rules.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryLedgerStore;
pub use sqlite::SqliteLedgerStore;

use std::sync::Arc;

use thiserror::Error;

use piggybank_core::MovementId;
use piggybank_ledger::{LedgerSnapshot, Movement};

/// Storage operation error.
///
/// These are **infrastructure errors** as opposed to domain errors (validation,
/// insufficient funds).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A movement with this id is already in the log.
    #[error("duplicate movement id: {0}")]
    DuplicateId(MovementId),

    /// The backend could not complete a read or write.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Stored data could not be decoded back into domain values.
    #[error("corrupt stored data: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corrupt(msg.into())
    }
}

/// Append-only movement log + single-row ledger state.
///
/// ## Implementation Requirements
///
/// - Writes are durable before returning `Ok` (a crash right after must not lose them).
/// - `append` rejects an id already present with `DuplicateId`.
/// - `append_with_state` persists the movement and the state as ONE unit: after a
///   crash either both are visible or neither is.
/// - `read_all` returns movements in insertion order and may be called any number
///   of times.
/// - There is no update or delete for movements.
pub trait LedgerStore: Send + Sync {
    fn append(&self, movement: &Movement) -> Result<(), StoreError>;

    fn append_with_state(
        &self,
        movement: &Movement,
        state: &LedgerSnapshot,
    ) -> Result<(), StoreError>;

    fn read_all(&self) -> Result<Vec<Movement>, StoreError>;

    /// `None` on first run.
    fn read_current_state(&self) -> Result<Option<LedgerSnapshot>, StoreError>;

    fn write_current_state(&self, state: &LedgerSnapshot) -> Result<(), StoreError>;
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn append(&self, movement: &Movement) -> Result<(), StoreError> {
        (**self).append(movement)
    }

    fn append_with_state(
        &self,
        movement: &Movement,
        state: &LedgerSnapshot,
    ) -> Result<(), StoreError> {
        (**self).append_with_state(movement, state)
    }

    fn read_all(&self) -> Result<Vec<Movement>, StoreError> {
        (**self).read_all()
    }

    fn read_current_state(&self) -> Result<Option<LedgerSnapshot>, StoreError> {
        (**self).read_current_state()
    }

    fn write_current_state(&self, state: &LedgerSnapshot) -> Result<(), StoreError> {
        (**self).write_current_state(state)
    }
}
