//! Piggy-bank ledger domain (single owner, single balance, event-sourced).
//!
//! Pure domain logic only: no IO, no locking, no persistence concerns.

pub mod movement;
pub mod piggy_bank;
pub mod snapshot;

pub use movement::{Movement, MovementKind};
pub use piggy_bank::{
    ChangeCurrency, CurrencyChanged, LedgerCommand, LedgerEvent, PiggyBank, RecordMovement,
    fold_balance,
};
pub use snapshot::LedgerSnapshot;
