//! Strongly-typed identifiers used across the ledger.
//!
//! Entries, lines and periods are numbered by the store on insert (the way a
//! relational `BIGSERIAL` column would), so identifiers are ordered and a
//! ledger can break same-day ties by entry id.

use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Identifier of a journal entry (`asiento`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(i64);

/// Identifier of a single journal line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LineId(i64);

/// Identifier of an accounting period.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodId(i64);

macro_rules! impl_serial_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            pub fn new(value: i64) -> Self {
                Self(value)
            }

            pub fn get(&self) -> i64 {
                self.0
            }

            /// The identifier following this one.
            pub fn next(&self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<i64> for $t {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                if value <= 0 {
                    return Err(DomainError::invalid_id(format!(
                        "{}: must be positive, got {value}",
                        $name
                    )));
                }
                Ok(Self(value))
            }
        }
    };
}

impl_serial_newtype!(EntryId, "EntryId");
impl_serial_newtype!(LineId, "LineId");
impl_serial_newtype!(PeriodId, "PeriodId");
