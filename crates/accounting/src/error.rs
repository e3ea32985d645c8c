//! Ledger error model.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

use hms_core::{DomainError, EntryId, PeriodId};

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Why a single journal line was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("a line cannot carry both a debit and a credit")]
    BothSides,

    #[error("a line must carry either a debit or a credit")]
    NoAmount,

    #[error("line amounts cannot be negative")]
    Negative,

    #[error("line amounts cannot carry more than two decimal places")]
    TooPrecise,
}

/// Ledger-specific failures.
///
/// These are deterministic business errors; callers surface them to the user
/// and nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("entry is unbalanced: debits {debit} != credits {credit}")]
    Unbalanced { debit: Decimal, credit: Decimal },

    #[error("invalid line {index}: {reason}")]
    InvalidLine { index: usize, reason: LineError },

    #[error("journal entry must have lines")]
    EmptyEntry,

    #[error("account code must not be empty")]
    EmptyAccountCode,

    #[error("account {0} already exists")]
    DuplicateAccount(String),

    #[error("account {0} does not exist")]
    UnknownAccount(String),

    #[error("account {0} is inactive")]
    InactiveAccount(String),

    #[error("making {parent} the parent of {account} would create a cycle")]
    ParentCycle { account: String, parent: String },

    #[error("period start {start} is after its end {end}")]
    InvalidPeriodRange { start: NaiveDate, end: NaiveDate },

    #[error("period {name} overlaps existing period {existing}")]
    OverlappingPeriod { name: String, existing: PeriodId },

    #[error("period {0} does not exist")]
    UnknownPeriod(PeriodId),

    #[error("period {0} is closed")]
    PeriodClosed(PeriodId),

    #[error("date {date} is outside period {period}")]
    DateOutsidePeriod { date: NaiveDate, period: PeriodId },

    #[error("journal entry {0} does not exist")]
    UnknownEntry(EntryId),
}

impl From<LedgerError> for DomainError {
    fn from(value: LedgerError) -> Self {
        let msg = value.to_string();
        match value {
            LedgerError::Unbalanced { .. } => DomainError::invariant(msg),
            LedgerError::InvalidLine { .. }
            | LedgerError::EmptyEntry
            | LedgerError::EmptyAccountCode
            | LedgerError::InvalidPeriodRange { .. }
            | LedgerError::DateOutsidePeriod { .. } => DomainError::validation(msg),
            LedgerError::UnknownAccount(_)
            | LedgerError::UnknownPeriod(_)
            | LedgerError::UnknownEntry(_) => DomainError::not_found(msg),
            LedgerError::DuplicateAccount(_)
            | LedgerError::InactiveAccount(_)
            | LedgerError::ParentCycle { .. }
            | LedgerError::OverlappingPeriod { .. }
            | LedgerError::PeriodClosed(_) => DomainError::conflict(msg),
        }
    }
}
