//! Append-only movement log.

use std::cmp::Reverse;

use tracing::debug;

use piggybank_ledger::{LedgerSnapshot, Movement};

use crate::storage::{LedgerStore, StoreError};

/// The canonical movement history, backed by a [`LedgerStore`].
///
/// Write-once per record: there is no update or delete. Appends are durable when
/// they return `Ok`.
#[derive(Debug)]
pub struct MovementLog<S> {
    store: S,
}

impl<S> MovementLog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S> MovementLog<S>
where
    S: LedgerStore,
{
    /// Durably append one movement.
    pub fn append(&self, movement: Movement) -> Result<Movement, StoreError> {
        self.store.append(&movement)?;
        debug!(movement_id = %movement.id(), "movement appended");
        Ok(movement)
    }

    /// Durably append one movement together with the snapshot it produces.
    pub fn append_with_state(
        &self,
        movement: Movement,
        state: &LedgerSnapshot,
    ) -> Result<Movement, StoreError> {
        self.store.append_with_state(&movement, state)?;
        debug!(
            movement_id = %movement.id(),
            version = state.version(),
            "movement appended with state"
        );
        Ok(movement)
    }

    /// Full history, newest first (by timestamp, ties broken by id descending).
    pub fn list_all(&self) -> Result<Vec<Movement>, StoreError> {
        let mut movements = self.store.read_all()?;
        movements.sort_by_key(|m| Reverse((m.occurred_at(), m.id())));
        Ok(movements)
    }

    /// Full history in the order it was appended (for replay).
    pub fn replay_order(&self) -> Result<Vec<Movement>, StoreError> {
        self.store.read_all()
    }
}
