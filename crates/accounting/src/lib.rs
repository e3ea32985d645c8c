//! Accounting module (double-entry general ledger).
//!
//! Pure domain logic only: no IO, no persistence concerns. Everything that
//! aggregates journal lines takes a [`LineSource`] so it can run against an
//! in-memory fixture or rows fetched from a database alike.

pub mod account;
pub mod audit;
pub mod balance;
pub mod chart;
pub mod error;
pub mod journal;
pub mod ledger;
pub mod period;
pub mod reports;
pub mod validation;

pub use account::{Account, AccountKind, NewAccount, NormalBalance};
pub use audit::{AuditFinding, AuditReport, audit_ledger};
pub use balance::{AccountTotals, LineSource, account_balance, account_totals, entry_is_balanced};
pub use chart::ChartOfAccounts;
pub use error::{LedgerError, LedgerResult, LineError};
pub use journal::{
    Journal, JournalEntry, JournalLine, NewJournalEntry, NewJournalLine, PostedEntry, PostedLine,
};
pub use ledger::{LedgerRow, LedgerRows, ledger};
pub use period::{AccountingPeriod, DateRange};
pub use reports::{
    BalanceSheet, IncomeStatement, ReportLine, TrialBalance, TrialBalanceRow, balance_sheet,
    income_statement, trial_balance,
};
pub use validation::{
    AMOUNT_SCALE, BALANCE_TOLERANCE, LineAmounts, ensure_account_postable, ensure_balanced,
    is_balanced, totals, validate_entry_lines, validate_line, validate_stored_entry,
};
