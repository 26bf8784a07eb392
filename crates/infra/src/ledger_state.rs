//! The ledger state engine: the single mutation boundary over the piggy bank.
//!
//! Every mutation runs under one `Mutex`: decide (aggregate `handle`), persist,
//! then commit the new state and publish it. The committed snapshot is mirrored
//! into an `RwLock` so readers never wait on an in-flight mutation (they see
//! either the previous or the next snapshot, never a torn one).

use std::sync::{Mutex, PoisonError, RwLock};

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use piggybank_core::{Aggregate, Currency};
use piggybank_events::{Event, EventBus};
use piggybank_ledger::{
    ChangeCurrency, LedgerCommand, LedgerEvent, LedgerSnapshot, Movement, PiggyBank,
    RecordMovement,
};

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::movement_log::MovementLog;
use crate::storage::LedgerStore;

pub struct LedgerState<S, B> {
    log: MovementLog<S>,
    bus: B,
    bank: Mutex<PiggyBank>,
    current: RwLock<LedgerSnapshot>,
}

impl<S, B> LedgerState<S, B>
where
    S: LedgerStore,
    B: EventBus<LedgerSnapshot>,
{
    /// Load (or initialise) the ledger from `store` and publish the starting snapshot.
    ///
    /// First run persists the empty snapshot before returning. On later runs the
    /// log is replayed and must agree with the persisted snapshot, otherwise this
    /// fails with `ConsistencyError` and nothing is published.
    pub fn open(store: S, bus: B, config: &LedgerConfig) -> Result<Self, LedgerError> {
        config.validate()?;
        let log = MovementLog::new(store);

        let persisted = log.store().read_current_state()?;
        let movements = log.replay_order()?;

        let bank = match persisted {
            None if movements.is_empty() => {
                let bank =
                    PiggyBank::new(config.default_currency, config.supported_currencies.clone());
                log.store().write_current_state(&bank.snapshot())?;
                info!(currency = %config.default_currency, "initialised new ledger");
                bank
            }
            None => {
                error!(
                    movement_count = movements.len(),
                    "movement log present but no persisted ledger state"
                );
                return Err(LedgerError::consistency(format!(
                    "{} logged movements but no persisted ledger state",
                    movements.len()
                )));
            }
            Some(snapshot) => {
                PiggyBank::restore(&snapshot, config.supported_currencies.clone(), &movements)
                    .map_err(|err| {
                        error!(error = %err, "ledger log and snapshot disagree");
                        LedgerError::consistency(err.to_string())
                    })?
            }
        };

        let snapshot = bank.snapshot();
        info!(
            version = snapshot.version(),
            balance = %snapshot.balance(),
            currency = %snapshot.currency(),
            movement_count = bank.movement_count(),
            "ledger state loaded"
        );
        if let Err(err) = bus.publish(snapshot.clone()) {
            warn!(error = ?err, "failed to publish initial snapshot");
        }

        Ok(Self {
            log,
            bus,
            bank: Mutex::new(bank),
            current: RwLock::new(snapshot),
        })
    }

    pub fn deposit(&self, amount: Decimal) -> Result<LedgerSnapshot, LedgerError> {
        self.deposit_with_note(amount, "")
    }

    pub fn deposit_with_note(
        &self,
        amount: Decimal,
        note: impl Into<String>,
    ) -> Result<LedgerSnapshot, LedgerError> {
        let note = note.into();
        self.execute(|bank| LedgerCommand::Deposit(record(bank, amount, note)))
    }

    pub fn withdraw(&self, amount: Decimal) -> Result<LedgerSnapshot, LedgerError> {
        self.withdraw_with_note(amount, "")
    }

    pub fn withdraw_with_note(
        &self,
        amount: Decimal,
        note: impl Into<String>,
    ) -> Result<LedgerSnapshot, LedgerError> {
        let note = note.into();
        self.execute(|bank| LedgerCommand::Withdraw(record(bank, amount, note)))
    }

    /// Relabel the balance. No movement is logged, but the version still advances.
    pub fn change_currency(&self, currency: Currency) -> Result<LedgerSnapshot, LedgerError> {
        self.execute(|_| {
            LedgerCommand::ChangeCurrency(ChangeCurrency {
                currency,
                occurred_at: Utc::now(),
            })
        })
    }

    /// Latest committed snapshot. Never waits on the mutation lock.
    pub fn current_snapshot(&self) -> LedgerSnapshot {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Full movement history, newest first.
    pub fn history(&self) -> Result<Vec<Movement>, LedgerError> {
        Ok(self.log.list_all()?)
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    fn execute(
        &self,
        command: impl FnOnce(&PiggyBank) -> LedgerCommand,
    ) -> Result<LedgerSnapshot, LedgerError> {
        // The bank is only ever replaced wholesale after a successful write, so a
        // poisoned lock still guards a consistent value.
        let mut bank = self.bank.lock().unwrap_or_else(PoisonError::into_inner);

        let command = command(&bank);
        let events = bank.handle(&command).map_err(|err| {
            debug!(error = %err, "mutation rejected");
            LedgerError::from(err)
        })?;

        let mut next = bank.clone();
        for event in &events {
            debug!(
                event_type = event.event_type(),
                schema_version = event.schema_version(),
                occurred_at = %event.occurred_at(),
                "applying event"
            );
            next.apply(event);
        }
        let snapshot = next.snapshot();

        let movement = events.iter().find_map(LedgerEvent::movement).cloned();
        let movement_id = movement.as_ref().map(|m| m.id().value());
        let persisted = match movement {
            Some(movement) => self.log.append_with_state(movement, &snapshot).map(drop),
            None => self.log.store().write_current_state(&snapshot),
        };
        if let Err(err) = persisted {
            error!(error = %err, version = snapshot.version(), "failed to persist mutation");
            return Err(err.into());
        }

        *bank = next;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();

        // Still under the mutation lock so versions reach the bus in order.
        // Publishing only enqueues.
        if let Err(err) = self.bus.publish(snapshot.clone()) {
            warn!(error = ?err, version = snapshot.version(), "failed to publish snapshot");
        }

        info!(
            version = snapshot.version(),
            balance = %snapshot.balance(),
            currency = %snapshot.currency(),
            movement_id,
            "ledger mutation committed"
        );
        Ok(snapshot)
    }
}

fn record(bank: &PiggyBank, amount: Decimal, note: String) -> RecordMovement {
    RecordMovement {
        movement_id: bank.next_movement_id(),
        amount,
        occurred_at: Utc::now(),
        note,
    }
}
