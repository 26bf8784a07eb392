//! Ledger configuration (currency set, default currency, storage location).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use piggybank_core::Currency;

pub const ENV_DEFAULT_CURRENCY: &str = "PIGGYBANK_DEFAULT_CURRENCY";
pub const ENV_CURRENCIES: &str = "PIGGYBANK_CURRENCIES";
pub const ENV_DATABASE_URL: &str = "PIGGYBANK_DATABASE_URL";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: unknown currency code `{value}`")]
    UnknownCurrency { var: &'static str, value: String },

    #[error("supported currency set is empty")]
    EmptyCurrencySet,

    #[error("default currency {0} is not in the supported set")]
    DefaultNotSupported(Currency),
}

/// Ledger configuration.
///
/// Adding a currency is a configuration change: `change_currency` only accepts
/// members of `supported_currencies`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Currency of a freshly initialised ledger.
    pub default_currency: Currency,
    pub supported_currencies: BTreeSet<Currency>,
    /// SQLite URL; `None` means the in-memory store.
    pub database_url: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_currency: Currency::default(),
            supported_currencies: Currency::ALL.into_iter().collect(),
            database_url: None,
        }
    }
}

impl LedgerConfig {
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.supported_currencies.is_empty() {
            return Err(ConfigError::EmptyCurrencySet);
        }
        if !self.supported_currencies.contains(&self.default_currency) {
            return Err(ConfigError::DefaultNotSupported(self.default_currency));
        }
        Ok(())
    }

    /// Build from `PIGGYBANK_*` environment variables, defaulting what is unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let default_currency = match lookup(ENV_DEFAULT_CURRENCY) {
            Some(raw) => parse_currency(ENV_DEFAULT_CURRENCY, &raw)?,
            None => {
                tracing::warn!(
                    "{ENV_DEFAULT_CURRENCY} not set, using {}",
                    defaults.default_currency
                );
                defaults.default_currency
            }
        };

        let supported_currencies = match lookup(ENV_CURRENCIES) {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(|code| parse_currency(ENV_CURRENCIES, code))
                .collect::<Result<BTreeSet<_>, _>>()?,
            None => {
                tracing::warn!("{ENV_CURRENCIES} not set, supporting all known currencies");
                defaults.supported_currencies
            }
        };

        let database_url = lookup(ENV_DATABASE_URL).filter(|url| !url.trim().is_empty());
        if database_url.is_none() {
            tracing::warn!("{ENV_DATABASE_URL} not set, ledger will not survive a restart");
        }

        let config = Self {
            default_currency,
            supported_currencies,
            database_url,
        };
        config.validate()?;
        Ok(config)
    }
}

fn parse_currency(var: &'static str, raw: &str) -> Result<Currency, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::UnknownCurrency {
            var,
            value: raw.to_string(),
        })
}
