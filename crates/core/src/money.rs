//! Monetary primitives: the currency label and fixed-point amounts.
//!
//! Amounts are `Decimal`s with at most [`AMOUNT_SCALE`] fractional digits. Storage
//! backends keep them as integer minor units (kopiyky, kopeks, cents).

use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Number of fractional digits every amount is kept at.
pub const AMOUNT_SCALE: u32 = 2;

/// Currency label of the ledger.
///
/// A closed set. The balance is never converted between currencies; switching the
/// currency only relabels it.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Uah,
    Rub,
    Usd,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::Uah, Currency::Rub, Currency::Usd];

    /// ISO 4217 code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Uah => "UAH",
            Currency::Rub => "RUB",
            Currency::Usd => "USD",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Uah => "₴",
            Currency::Rub => "₽",
            Currency::Usd => "$",
        }
    }
}

impl ValueObject for Currency {}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        Currency::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(code))
            .ok_or_else(|| DomainError::unsupported_currency(code))
    }
}

/// Validate a caller-supplied amount and bring it to [`AMOUNT_SCALE`].
///
/// Rejects zero, negative values, and values with more significant fractional
/// digits than the scale allows (`1.500` is fine, `1.505` is not).
pub fn validate_amount(amount: Decimal) -> DomainResult<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(DomainError::invalid_amount(format!(
            "amount must be positive, got {amount}"
        )));
    }

    let normalized = amount.normalize();
    if normalized.scale() > AMOUNT_SCALE {
        return Err(DomainError::invalid_amount(format!(
            "amount {amount} has more than {AMOUNT_SCALE} fractional digits"
        )));
    }

    let mut scaled = normalized;
    scaled.rescale(AMOUNT_SCALE);
    Ok(scaled)
}

/// Parse user-typed amount text (`"12"`, `"12.5"`, `".75"`, `"3."`).
///
/// Only ASCII digits with at most one decimal point are accepted, and the result
/// goes through [`validate_amount`].
pub fn parse_amount(input: &str) -> DomainResult<Decimal> {
    let text = input.trim();

    let well_formed = text.chars().any(|c| c.is_ascii_digit())
        && text.chars().all(|c| c.is_ascii_digit() || c == '.')
        && text.matches('.').count() <= 1;
    if !well_formed {
        return Err(DomainError::invalid_amount(format!("not a number: {input:?}")));
    }

    // Checked on the text: `Decimal::from_str` rounds past 28 fractional digits.
    if let Some((_, fraction)) = text.split_once('.') {
        if fraction.trim_end_matches('0').len() > AMOUNT_SCALE as usize {
            return Err(DomainError::invalid_amount(format!(
                "{input:?} has more than {AMOUNT_SCALE} fractional digits"
            )));
        }
    }

    let mut canonical = String::with_capacity(text.len() + 2);
    if text.starts_with('.') {
        canonical.push('0');
    }
    canonical.push_str(text.strip_suffix('.').unwrap_or(text));

    let amount = Decimal::from_str(&canonical)
        .map_err(|e| DomainError::invalid_amount(format!("{input:?}: {e}")))?;
    validate_amount(amount)
}

/// Convert an amount (either sign) to integer minor units.
pub fn to_minor_units(amount: Decimal) -> DomainResult<i64> {
    let normalized = amount.normalize();
    if normalized.scale() > AMOUNT_SCALE {
        return Err(DomainError::invalid_amount(format!(
            "amount {amount} has more than {AMOUNT_SCALE} fractional digits"
        )));
    }

    let mut scaled = normalized;
    scaled.rescale(AMOUNT_SCALE);
    i64::try_from(scaled.mantissa())
        .map_err(|_| DomainError::invalid_amount(format!("amount {amount} is out of range")))
}

/// Inverse of [`to_minor_units`].
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, AMOUNT_SCALE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn validate_rejects_non_positive() {
        assert!(matches!(
            validate_amount(Decimal::ZERO),
            Err(DomainError::InvalidAmount(_))
        ));
        assert!(matches!(
            validate_amount(dec!(-5)),
            Err(DomainError::InvalidAmount(_))
        ));
    }

    #[test]
    fn validate_rejects_excess_precision_but_ignores_trailing_zeros() {
        assert!(validate_amount(dec!(1.005)).is_err());
        let ok = validate_amount(dec!(1.500)).unwrap();
        assert_eq!(ok, dec!(1.50));
        assert_eq!(ok.scale(), AMOUNT_SCALE);
    }

    #[test]
    fn parse_accepts_the_usual_shapes() {
        assert_eq!(parse_amount("100").unwrap(), dec!(100.00));
        assert_eq!(parse_amount(" 12.5 ").unwrap(), dec!(12.50));
        assert_eq!(parse_amount(".75").unwrap(), dec!(0.75));
        assert_eq!(parse_amount("3.").unwrap(), dec!(3.00));
        assert_eq!(
            parse_amount("2.5000000000000000000000000000000").unwrap(),
            dec!(2.50)
        );
    }

    #[test]
    fn parse_rejects_malformed_text() {
        for bad in [
            "",
            ".",
            "abc",
            "1.2.3",
            "-4",
            "1,5",
            "0",
            "0.001",
            "1.00000000000000000000000000000001",
        ] {
            assert!(
                matches!(parse_amount(bad), Err(DomainError::InvalidAmount(_))),
                "expected {bad:?} to be rejected"
            );
        }
    }

    #[test]
    fn currency_codes_and_symbols() {
        assert_eq!("usd".parse::<Currency>().unwrap(), Currency::Usd);
        assert_eq!(Currency::Uah.symbol(), "₴");
        assert_eq!(Currency::Rub.to_string(), "RUB");
        assert!(matches!(
            "EUR".parse::<Currency>(),
            Err(DomainError::UnsupportedCurrency(code)) if code == "EUR"
        ));
    }

    #[test]
    fn minor_units_reject_fractions_of_a_cent() {
        assert_eq!(to_minor_units(dec!(-40)).unwrap(), -4000);
        assert!(to_minor_units(dec!(0.001)).is_err());
    }

    proptest! {
        #[test]
        fn validated_amounts_keep_their_value_at_fixed_scale(minor in 1i64..1_000_000_000i64) {
            let amount = from_minor_units(minor).normalize();
            let validated = validate_amount(amount).unwrap();
            prop_assert_eq!(validated.scale(), AMOUNT_SCALE);
            prop_assert_eq!(validated, amount);
        }
    }
}
