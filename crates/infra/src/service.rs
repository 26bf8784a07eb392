//! Public façade over the ledger state engine and its subscription hub.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;

use piggybank_core::{Currency, parse_amount};
use piggybank_events::{EventBus, Subscription, SubscriptionHandle, SubscriptionHub};
use piggybank_ledger::{LedgerSnapshot, Movement};

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::ledger_state::LedgerState;
use crate::storage::{InMemoryLedgerStore, LedgerStore, SqliteLedgerStore};

/// Fan-out of committed ledger snapshots.
pub type SnapshotHub = SubscriptionHub<LedgerSnapshot>;

/// The piggy bank's public API.
///
/// Safe to share across threads (`Arc<LedgerService<_>>`); mutations are
/// serialised internally, reads never block on them.
pub struct LedgerService<S> {
    state: LedgerState<S, Arc<SnapshotHub>>,
    hub: Arc<SnapshotHub>,
}

impl<S> LedgerService<S>
where
    S: LedgerStore,
{
    pub fn open(store: S, config: &LedgerConfig) -> Result<Self, LedgerError> {
        let hub = Arc::new(SnapshotHub::new());
        let state = LedgerState::open(store, hub.clone(), config)?;
        Ok(Self { state, hub })
    }

    pub fn deposit(&self, amount: Decimal) -> Result<LedgerSnapshot, LedgerError> {
        self.state.deposit(amount)
    }

    pub fn deposit_with_note(
        &self,
        amount: Decimal,
        note: impl Into<String>,
    ) -> Result<LedgerSnapshot, LedgerError> {
        self.state.deposit_with_note(amount, note)
    }

    pub fn withdraw(&self, amount: Decimal) -> Result<LedgerSnapshot, LedgerError> {
        self.state.withdraw(amount)
    }

    pub fn withdraw_with_note(
        &self,
        amount: Decimal,
        note: impl Into<String>,
    ) -> Result<LedgerSnapshot, LedgerError> {
        self.state.withdraw_with_note(amount, note)
    }

    /// Deposit a user-typed amount such as `"12.50"`.
    pub fn deposit_text(&self, amount: &str) -> Result<LedgerSnapshot, LedgerError> {
        self.deposit(parse_amount(amount)?)
    }

    /// Withdraw a user-typed amount such as `"12.50"`.
    pub fn withdraw_text(&self, amount: &str) -> Result<LedgerSnapshot, LedgerError> {
        self.withdraw(parse_amount(amount)?)
    }

    pub fn change_currency(&self, currency: Currency) -> Result<LedgerSnapshot, LedgerError> {
        self.state.change_currency(currency)
    }

    /// Like [`change_currency`](Self::change_currency), from a code such as `"usd"`.
    pub fn change_currency_code(&self, code: &str) -> Result<LedgerSnapshot, LedgerError> {
        self.change_currency(code.parse()?)
    }

    pub fn current_snapshot(&self) -> LedgerSnapshot {
        self.state.current_snapshot()
    }

    /// Newest first.
    pub fn history(&self) -> Result<Vec<Movement>, LedgerError> {
        self.state.history()
    }

    /// Receive the current snapshot now, then one per accepted mutation.
    pub fn subscribe(&self) -> Subscription<LedgerSnapshot> {
        self.hub.subscribe()
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.hub.unsubscribe(handle)
    }

    pub fn subscriber_count(&self) -> usize {
        self.hub.subscriber_count()
    }
}

impl LedgerService<InMemoryLedgerStore> {
    /// Non-durable ledger (tests/dev).
    pub fn in_memory(config: &LedgerConfig) -> Result<Self, LedgerError> {
        Self::open(InMemoryLedgerStore::new(), config)
    }
}

impl LedgerService<Arc<dyn LedgerStore>> {
    /// SQLite when `config.database_url` is set, in-memory otherwise.
    ///
    /// All operations are blocking. From async code on a current-thread tokio
    /// runtime the SQLite store refuses to run (`StorageFailure`); call it through
    /// `spawn_blocking` there.
    pub fn open_configured(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let store: Arc<dyn LedgerStore> = match &config.database_url {
            Some(url) => {
                info!(url = %url, "opening SQLite ledger store");
                Arc::new(SqliteLedgerStore::open(url)?)
            }
            None => {
                info!("opening in-memory ledger store");
                Arc::new(InMemoryLedgerStore::new())
            }
        };
        Self::open(store, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn text_entry_points_parse_like_the_input_field() {
        let service = LedgerService::in_memory(&LedgerConfig::default()).unwrap();

        assert_eq!(service.deposit_text("12.50").unwrap().balance(), dec!(12.50));
        assert!(matches!(service.deposit_text("1,5"), Err(LedgerError::InvalidAmount(_))));
        assert!(matches!(service.withdraw_text("-1"), Err(LedgerError::InvalidAmount(_))));
        assert_eq!(service.withdraw_text(".50").unwrap().balance(), dec!(12));
    }

    #[test]
    fn currency_codes_are_case_insensitive() {
        let service = LedgerService::in_memory(&LedgerConfig::default()).unwrap();

        assert_eq!(service.change_currency_code("usd").unwrap().currency(), Currency::Usd);
        assert_eq!(
            service.change_currency_code("EUR").unwrap_err(),
            LedgerError::UnsupportedCurrency("EUR".into())
        );
        assert_eq!(service.current_snapshot().version(), 1);
    }

    #[test]
    fn subscribers_start_from_the_current_snapshot() {
        let service = LedgerService::in_memory(&LedgerConfig::default()).unwrap();
        service.deposit(dec!(3)).unwrap();

        let sub = service.subscribe();
        assert_eq!(sub.try_recv().unwrap().version(), 1);

        service.withdraw(dec!(1)).unwrap();
        assert_eq!(sub.try_recv().unwrap().balance(), dec!(2));

        assert!(service.unsubscribe(sub.handle()));
        assert_eq!(service.subscriber_count(), 0);
        assert!(sub.recv().is_err());
    }

    #[test]
    fn open_configured_without_url_is_in_memory() {
        let service = LedgerService::open_configured(&LedgerConfig::default()).unwrap();
        service.deposit(dec!(1)).unwrap();
        assert_eq!(service.history().unwrap().len(), 1);
    }
}
