//! Strongly-typed identifiers used across the domain.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a movement in the ledger log.
///
/// Assigned monotonically (1, 2, 3, ...) by the ledger; never reused.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(u64);

impl MovementId {
    /// The id handed out to the very first movement.
    pub const FIRST: MovementId = MovementId(1);

    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// The id that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl core::fmt::Display for MovementId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for MovementId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<MovementId> for u64 {
    fn from(value: MovementId) -> Self {
        value.0
    }
}

impl FromStr for MovementId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .parse::<u64>()
            .map_err(|e| DomainError::invariant(format!("MovementId: {e}")))?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_ordered_and_advance_by_one() {
        let first = MovementId::FIRST;
        assert_eq!(first.value(), 1);
        assert_eq!(first.next(), MovementId::new(2));
        assert!(first < first.next());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!("17".parse::<MovementId>().unwrap(), MovementId::new(17));
        assert!("abc".parse::<MovementId>().is_err());
    }
}
