use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use piggybank_core::{AMOUNT_SCALE, DomainError, DomainResult, MovementId, validate_amount};

/// Direction of a movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    Deposit,
    Withdrawal,
}

impl MovementKind {
    /// Stable storage label.
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Deposit => "DEPOSIT",
            MovementKind::Withdrawal => "WITHDRAWAL",
        }
    }

    pub fn parse(label: &str) -> DomainResult<Self> {
        match label {
            "DEPOSIT" => Ok(MovementKind::Deposit),
            "WITHDRAWAL" => Ok(MovementKind::Withdrawal),
            other => Err(DomainError::invariant(format!("unknown movement kind '{other}'"))),
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One accepted change of the balance (immutable fact).
///
/// The sign of `signed_amount` always agrees with `kind`: deposits are positive,
/// withdrawals negative. Construction enforces it, so a `Movement` in hand is
/// always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Movement {
    id: MovementId,
    signed_amount: Decimal,
    kind: MovementKind,
    occurred_at: DateTime<Utc>,
    note: String,
}

impl Movement {
    pub fn deposit(
        id: MovementId,
        amount: Decimal,
        occurred_at: DateTime<Utc>,
        note: impl Into<String>,
    ) -> DomainResult<Self> {
        let amount = validate_amount(amount)?;
        Ok(Self {
            id,
            signed_amount: amount,
            kind: MovementKind::Deposit,
            occurred_at,
            note: note.into(),
        })
    }

    pub fn withdrawal(
        id: MovementId,
        amount: Decimal,
        occurred_at: DateTime<Utc>,
        note: impl Into<String>,
    ) -> DomainResult<Self> {
        let amount = validate_amount(amount)?;
        Ok(Self {
            id,
            signed_amount: -amount,
            kind: MovementKind::Withdrawal,
            occurred_at,
            note: note.into(),
        })
    }

    /// Rebuild a movement from stored fields, re-checking the sign/kind invariant.
    pub fn from_parts(
        id: MovementId,
        signed_amount: Decimal,
        kind: MovementKind,
        occurred_at: DateTime<Utc>,
        note: impl Into<String>,
    ) -> DomainResult<Self> {
        let sign_matches = match kind {
            MovementKind::Deposit => signed_amount > Decimal::ZERO,
            MovementKind::Withdrawal => signed_amount < Decimal::ZERO,
        };
        if !sign_matches {
            return Err(DomainError::invariant(format!(
                "movement {id}: {kind} with signed amount {signed_amount}"
            )));
        }

        match kind {
            MovementKind::Deposit => Self::deposit(id, signed_amount, occurred_at, note),
            MovementKind::Withdrawal => Self::withdrawal(id, -signed_amount, occurred_at, note),
        }
        .map_err(|e| DomainError::invariant(format!("movement {id}: {e}")))
    }

    pub fn id(&self) -> MovementId {
        self.id
    }

    pub fn signed_amount(&self) -> Decimal {
        self.signed_amount
    }

    /// Magnitude of the movement.
    pub fn amount(&self) -> Decimal {
        self.signed_amount.abs()
    }

    pub fn kind(&self) -> MovementKind {
        self.kind
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn note(&self) -> &str {
        &self.note
    }
}

/// Wire shape of a [`Movement`]; only turned into one through `from_parts`.
#[derive(Deserialize)]
struct MovementRecord {
    id: MovementId,
    signed_amount: Decimal,
    kind: MovementKind,
    occurred_at: DateTime<Utc>,
    #[serde(default)]
    note: String,
}

impl<'de> Deserialize<'de> for Movement {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let record = MovementRecord::deserialize(deserializer)?;
        Movement::from_parts(
            record.id,
            record.signed_amount,
            record.kind,
            record.occurred_at,
            record.note,
        )
        .map_err(serde::de::Error::custom)
    }
}

impl core::fmt::Display for Movement {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let sign = match self.kind {
            MovementKind::Deposit => '+',
            MovementKind::Withdrawal => '-',
        };
        write!(
            f,
            "{sign}{:.prec$}",
            self.amount(),
            prec = AMOUNT_SCALE as usize
        )
    }
}
