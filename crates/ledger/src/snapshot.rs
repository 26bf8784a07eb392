use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use piggybank_core::{AMOUNT_SCALE, Currency, DomainError, DomainResult, ValueObject};
use piggybank_events::Versioned;

/// The current derived state of the ledger: balance, currency label, version.
///
/// Replaced wholesale on every accepted mutation. `balance` is never negative
/// and always carries [`AMOUNT_SCALE`] fractional digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerSnapshot {
    balance: Decimal,
    currency: Currency,
    version: u64,
}

impl LedgerSnapshot {
    /// First-run state: zero balance at version 0.
    pub fn initial(currency: Currency) -> Self {
        Self {
            balance: Decimal::new(0, AMOUNT_SCALE),
            currency,
            version: 0,
        }
    }

    /// Rebuild a snapshot from stored fields.
    pub fn from_parts(balance: Decimal, currency: Currency, version: u64) -> DomainResult<Self> {
        if balance < Decimal::ZERO {
            return Err(DomainError::invariant(format!(
                "snapshot balance is negative: {balance}"
            )));
        }
        let mut balance = balance.normalize();
        if balance.scale() > AMOUNT_SCALE {
            return Err(DomainError::invariant(format!(
                "snapshot balance {balance} exceeds {AMOUNT_SCALE} fractional digits"
            )));
        }
        balance.rescale(AMOUNT_SCALE);
        Ok(Self {
            balance,
            currency,
            version,
        })
    }

    /// For the aggregate, whose `handle` already guarantees the invariants.
    pub(crate) fn new_unchecked(balance: Decimal, currency: Currency, version: u64) -> Self {
        Self {
            balance,
            currency,
            version,
        }
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Deserialize)]
struct SnapshotRecord {
    balance: Decimal,
    currency: Currency,
    version: u64,
}

impl<'de> Deserialize<'de> for LedgerSnapshot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let record = SnapshotRecord::deserialize(deserializer)?;
        LedgerSnapshot::from_parts(record.balance, record.currency, record.version)
            .map_err(serde::de::Error::custom)
    }
}

impl Versioned for LedgerSnapshot {
    fn version(&self) -> u64 {
        self.version
    }
}

impl ValueObject for LedgerSnapshot {}

impl core::fmt::Display for LedgerSnapshot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:.prec$} {}",
            self.balance,
            self.currency.symbol(),
            prec = AMOUNT_SCALE as usize
        )
    }
}
