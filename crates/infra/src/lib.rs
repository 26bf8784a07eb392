//! Infrastructure layer: storage backends, the ledger state engine, and the
//! public service façade.

pub mod config;
pub mod error;
pub mod ledger_state;
pub mod movement_log;
pub mod service;
pub mod storage;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, LedgerConfig};
pub use error::LedgerError;
pub use ledger_state::LedgerState;
pub use movement_log::MovementLog;
pub use service::{LedgerService, SnapshotHub};
pub use storage::{InMemoryLedgerStore, LedgerStore, SqliteLedgerStore, StoreError};
