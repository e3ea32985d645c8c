//! Ledger configuration, read from environment variables.

use std::env;
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use hms_accounting::BALANCE_TOLERANCE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Runtime settings of the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Postgres connection string. Only needed by the Postgres store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// Largest debit/credit difference an entry may carry and still be balanced
    /// (exclusive bound).
    pub balance_tolerance: Decimal,
    /// When true, entries can only be posted into open periods that contain
    /// their date.
    pub enforce_closed_periods: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            balance_tolerance: BALANCE_TOLERANCE,
            enforce_closed_periods: true,
        }
    }
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());

        let max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", defaults.max_connections)?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "DB_MAX_CONNECTIONS",
                value: "0".into(),
            });
        }

        let balance_tolerance: Decimal =
            parse_or(&lookup, "LEDGER_BALANCE_TOLERANCE", defaults.balance_tolerance)?;
        if balance_tolerance <= Decimal::ZERO {
            return Err(ConfigError::Invalid {
                key: "LEDGER_BALANCE_TOLERANCE",
                value: balance_tolerance.to_string(),
            });
        }

        let enforce_closed_periods = parse_or(
            &lookup,
            "LEDGER_ENFORCE_CLOSED_PERIODS",
            defaults.enforce_closed_periods,
        )?;

        Ok(Self {
            database_url,
            max_connections,
            balance_tolerance,
            enforce_closed_periods,
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<LedgerConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LedgerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg, LedgerConfig::default());
        assert_eq!(cfg.balance_tolerance, dec!(0.01));
        assert!(cfg.enforce_closed_periods);
        assert_eq!(cfg.require_database_url(), Err(ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn reads_every_key() {
        let cfg = config(&[
            ("DATABASE_URL", "postgres://localhost/hms"),
            ("DB_MAX_CONNECTIONS", "12"),
            ("LEDGER_BALANCE_TOLERANCE", "0.5"),
            ("LEDGER_ENFORCE_CLOSED_PERIODS", "false"),
        ])
        .unwrap();

        assert_eq!(cfg.require_database_url(), Ok("postgres://localhost/hms"));
        assert_eq!(cfg.max_connections, 12);
        assert_eq!(cfg.balance_tolerance, dec!(0.5));
        assert!(!cfg.enforce_closed_periods);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(
            config(&[("DB_MAX_CONNECTIONS", "many")]),
            Err(ConfigError::Invalid {
                key: "DB_MAX_CONNECTIONS",
                value: "many".into()
            })
        );
        assert!(config(&[("LEDGER_BALANCE_TOLERANCE", "-1")]).is_err());
        assert!(config(&[("LEDGER_ENFORCE_CLOSED_PERIODS", "yes")]).is_err());
        assert!(config(&[("DB_MAX_CONNECTIONS", "0")]).is_err());
    }
}
