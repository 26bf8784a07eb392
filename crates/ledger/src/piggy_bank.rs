use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use piggybank_core::{
    AMOUNT_SCALE, Aggregate, AggregateRoot, Currency, DomainError, MovementId, to_minor_units,
    validate_amount,
};
use piggybank_events::Event;

use crate::movement::Movement;
use crate::snapshot::LedgerSnapshot;

/// Payload shared by the deposit and withdraw commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMovement {
    pub movement_id: MovementId,
    /// Positive magnitude; the direction comes from the command variant.
    pub amount: Decimal,
    pub occurred_at: DateTime<Utc>,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeCurrency {
    pub currency: Currency,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    Deposit(RecordMovement),
    Withdraw(RecordMovement),
    ChangeCurrency(ChangeCurrency),
}

/// Event: the currency label was switched (balance untouched).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyChanged {
    pub from: Currency,
    pub to: Currency,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    Deposited(Movement),
    Withdrawn(Movement),
    CurrencyChanged(CurrencyChanged),
}

impl LedgerEvent {
    /// The movement to append to the log, if this event changes the balance.
    pub fn movement(&self) -> Option<&Movement> {
        match self {
            LedgerEvent::Deposited(m) | LedgerEvent::Withdrawn(m) => Some(m),
            LedgerEvent::CurrencyChanged(_) => None,
        }
    }
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::Deposited(_) => "ledger.movement.deposited",
            LedgerEvent::Withdrawn(_) => "ledger.movement.withdrawn",
            LedgerEvent::CurrencyChanged(_) => "ledger.currency.changed",
        }
    }

    fn schema_version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::Deposited(m) | LedgerEvent::Withdrawn(m) => m.occurred_at(),
            LedgerEvent::CurrencyChanged(e) => e.occurred_at,
        }
    }
}

/// Sum of signed amounts: the balance a log implies.
pub fn fold_balance<'a>(movements: impl IntoIterator<Item = &'a Movement>) -> Decimal {
    let mut total = Decimal::new(0, AMOUNT_SCALE);
    for m in movements {
        total += m.signed_amount();
    }
    total
}

/// Aggregate root: the piggy bank (one balance, one currency label).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PiggyBank {
    balance: Decimal,
    currency: Currency,
    version: u64,
    last_movement_id: Option<MovementId>,
    movement_count: u64,
    supported: BTreeSet<Currency>,
}

impl PiggyBank {
    /// Empty piggy bank (first run, or the starting point of a replay).
    pub fn new(currency: Currency, supported: BTreeSet<Currency>) -> Self {
        let initial = LedgerSnapshot::initial(currency);
        Self {
            balance: initial.balance(),
            currency,
            version: 0,
            last_movement_id: None,
            movement_count: 0,
            supported,
        }
    }

    /// Rebuild from a persisted snapshot plus the full movement log (insertion order).
    ///
    /// The log is replayed from zero and must reproduce the snapshot balance exactly.
    /// Any disagreement is an `InvariantViolation`: either the log or the snapshot
    /// is corrupt and neither may be trusted over the other.
    pub fn restore(
        snapshot: &LedgerSnapshot,
        supported: BTreeSet<Currency>,
        movements: &[Movement],
    ) -> Result<Self, DomainError> {
        let mut bank = Self::new(snapshot.currency(), supported);

        for m in movements {
            bank.ensure_next_id(m.id())?;
            let running = bank.balance + m.signed_amount();
            if running < Decimal::ZERO {
                return Err(DomainError::invariant(format!(
                    "movement {} drives the balance negative ({running})",
                    m.id()
                )));
            }
            let event = if m.signed_amount() > Decimal::ZERO {
                LedgerEvent::Deposited(m.clone())
            } else {
                LedgerEvent::Withdrawn(m.clone())
            };
            bank.apply(&event);
        }

        if bank.balance != snapshot.balance() {
            return Err(DomainError::invariant(format!(
                "log replays to {} but the snapshot says {}",
                bank.balance,
                snapshot.balance()
            )));
        }
        if snapshot.version() < bank.movement_count {
            return Err(DomainError::invariant(format!(
                "snapshot version {} is behind {} logged movements",
                snapshot.version(),
                bank.movement_count
            )));
        }

        bank.version = snapshot.version();
        Ok(bank)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot::new_unchecked(self.balance, self.currency, self.version)
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn supported_currencies(&self) -> &BTreeSet<Currency> {
        &self.supported
    }

    /// Id for the next movement (ids start at 1 and never repeat).
    pub fn next_movement_id(&self) -> MovementId {
        self.last_movement_id
            .map(MovementId::next)
            .unwrap_or(MovementId::FIRST)
    }

    pub fn movement_count(&self) -> u64 {
        self.movement_count
    }

    fn ensure_next_id(&self, id: MovementId) -> Result<(), DomainError> {
        match self.last_movement_id {
            Some(last) if id <= last => Err(DomainError::invariant(format!(
                "movement id {id} does not follow {last}"
            ))),
            _ => Ok(()),
        }
    }

    fn handle_deposit(&self, cmd: &RecordMovement) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_next_id(cmd.movement_id)?;
        let amount = validate_amount(cmd.amount)?;

        let new_balance = self
            .balance
            .checked_add(amount)
            .ok_or_else(|| DomainError::invalid_amount("balance would overflow"))?;
        to_minor_units(new_balance)
            .map_err(|_| DomainError::invalid_amount("balance would overflow"))?;

        let movement =
            Movement::deposit(cmd.movement_id, amount, cmd.occurred_at, cmd.note.clone())?;
        Ok(vec![LedgerEvent::Deposited(movement)])
    }

    fn handle_withdraw(&self, cmd: &RecordMovement) -> Result<Vec<LedgerEvent>, DomainError> {
        self.ensure_next_id(cmd.movement_id)?;
        let amount = validate_amount(cmd.amount)?;

        if amount > self.balance {
            return Err(DomainError::insufficient_funds(amount, self.balance));
        }

        let movement =
            Movement::withdrawal(cmd.movement_id, amount, cmd.occurred_at, cmd.note.clone())?;
        Ok(vec![LedgerEvent::Withdrawn(movement)])
    }

    fn handle_change_currency(&self, cmd: &ChangeCurrency) -> Result<Vec<LedgerEvent>, DomainError> {
        if !self.supported.contains(&cmd.currency) {
            return Err(DomainError::unsupported_currency(cmd.currency.code()));
        }

        Ok(vec![LedgerEvent::CurrencyChanged(CurrencyChanged {
            from: self.currency,
            to: cmd.currency,
            occurred_at: cmd.occurred_at,
        })])
    }
}

impl AggregateRoot for PiggyBank {
    fn version(&self) -> u64 {
        self.version
    }
}

impl Aggregate for PiggyBank {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::Deposited(m) | LedgerEvent::Withdrawn(m) => {
                self.balance += m.signed_amount();
                self.last_movement_id = Some(m.id());
                self.movement_count += 1;
            }
            LedgerEvent::CurrencyChanged(e) => {
                self.currency = e.to;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LedgerCommand::Deposit(cmd) => self.handle_deposit(cmd),
            LedgerCommand::Withdraw(cmd) => self.handle_withdraw(cmd),
            LedgerCommand::ChangeCurrency(cmd) => self.handle_change_currency(cmd),
        }
    }
}
