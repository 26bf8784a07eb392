use std::collections::BTreeSet;
use std::sync::RwLock;

use piggybank_core::MovementId;
use piggybank_ledger::{LedgerSnapshot, Movement};

use super::{LedgerStore, StoreError};

#[derive(Debug, Default)]
struct Inner {
    movements: Vec<Movement>,
    ids: BTreeSet<MovementId>,
    state: Option<LedgerSnapshot>,
}

impl Inner {
    fn push(&mut self, movement: &Movement) -> Result<(), StoreError> {
        if !self.ids.insert(movement.id()) {
            return Err(StoreError::DuplicateId(movement.id()));
        }
        self.movements.push(movement.clone());
        Ok(())
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev. "Durable" only for the lifetime of the process. Log and
/// state sit behind one lock, so `append_with_state` is trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    inner: RwLock<Inner>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.movements.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn append(&self, movement: &Movement) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::storage("lock poisoned"))?;
        inner.push(movement)
    }

    fn append_with_state(
        &self,
        movement: &Movement,
        state: &LedgerSnapshot,
    ) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::storage("lock poisoned"))?;
        inner.push(movement)?;
        inner.state = Some(state.clone());
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<Movement>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::storage("lock poisoned"))?;
        Ok(inner.movements.clone())
    }

    fn read_current_state(&self) -> Result<Option<LedgerSnapshot>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|_| StoreError::storage("lock poisoned"))?;
        Ok(inner.state.clone())
    }

    fn write_current_state(&self, state: &LedgerSnapshot) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| StoreError::storage("lock poisoned"))?;
        inner.state = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use piggybank_core::Currency;
    use rust_decimal_macros::dec;

    fn deposit(id: u64) -> Movement {
        Movement::deposit(MovementId::new(id), dec!(10), Utc::now(), "").unwrap()
    }

    #[test]
    fn duplicate_ids_are_rejected_and_leave_state_alone() {
        let store = InMemoryLedgerStore::new();
        let first = LedgerSnapshot::from_parts(dec!(10), Currency::Uah, 1).unwrap();
        store.append_with_state(&deposit(1), &first).unwrap();

        let second = LedgerSnapshot::from_parts(dec!(20), Currency::Uah, 2).unwrap();
        let err = store.append_with_state(&deposit(1), &second).unwrap_err();
        assert_eq!(err, StoreError::DuplicateId(MovementId::new(1)));

        assert_eq!(store.len(), 1);
        assert_eq!(store.read_current_state().unwrap(), Some(first));
    }

    #[test]
    fn read_all_keeps_insertion_order_and_is_repeatable() {
        let store = InMemoryLedgerStore::new();
        assert!(store.read_current_state().unwrap().is_none());
        for id in [1, 2, 3] {
            store.append(&deposit(id)).unwrap();
        }

        let once: Vec<u64> = store.read_all().unwrap().iter().map(|m| m.id().value()).collect();
        let twice: Vec<u64> = store.read_all().unwrap().iter().map(|m| m.id().value()).collect();
        assert_eq!(once, vec![1, 2, 3]);
        assert_eq!(once, twice);
    }
}
