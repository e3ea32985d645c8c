use std::sync::Arc;

use thiserror::Error;

use hms_accounting::{
    Account, AccountingPeriod, DateRange, JournalEntry, JournalLine, NewJournalLine, PostedLine,
};
use hms_core::{EntryId, PeriodId};

/// Ledger persistence error.
///
/// These are **infrastructure errors** (locks, database, row decoding) as
/// opposed to ledger rule violations, which are `LedgerError`s.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("ledger store lock poisoned")]
    LockPoisoned,

    /// A storage-level constraint rejected the write (duplicate key, missing
    /// foreign row).
    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("database error in {operation}: {message}")]
    Database { operation: String, message: String },

    #[error("failed to decode {what}: {message}")]
    Decode { what: &'static str, message: String },
}

/// Staged writes of one ledger transaction.
///
/// Reads through a `LedgerTx` see the writes already staged in the same
/// transaction. Nothing is visible to other readers until the transaction
/// commits.
pub trait LedgerTx {
    fn account(&self, code: &str) -> Option<Account>;
    fn accounts(&self) -> Vec<Account>;
    fn period(&self, id: PeriodId) -> Option<AccountingPeriod>;
    fn periods(&self) -> Vec<AccountingPeriod>;
    fn entry(&self, id: EntryId) -> Option<JournalEntry>;

    fn insert_account(&mut self, account: Account) -> Result<(), StoreError>;
    fn update_account(&mut self, account: Account) -> Result<(), StoreError>;

    /// Reserve the next period identifier.
    fn next_period_id(&mut self) -> PeriodId;
    fn insert_period(&mut self, period: AccountingPeriod) -> Result<(), StoreError>;
    fn update_period(&mut self, period: AccountingPeriod) -> Result<(), StoreError>;

    /// Reserve the next entry identifier.
    fn next_entry_id(&mut self) -> EntryId;
    /// Reserve the next sequential number within `journal`.
    fn next_entry_number(&mut self, journal: &str) -> u64;
    fn insert_entry(&mut self, entry: JournalEntry) -> Result<(), StoreError>;

    /// Store a line under an existing entry, assigning its identifier.
    fn insert_line(&mut self, entry: EntryId, line: NewJournalLine)
    -> Result<JournalLine, StoreError>;
}

/// Repository over accounts, periods, journal entries and lines.
///
/// ## Design Principles
///
/// - **Explicit writes**: every mutation goes through [`LedgerStore::transaction`];
///   validation runs inside the same transaction as the write it guards
/// - **Atomicity**: a transaction's staged writes are applied all together when
///   the closure returns `Ok`, and discarded when it returns `Err`
/// - **Fallible reads**: lines for the balance engine are fetched through
///   [`LedgerStore::account_lines`] and [`LedgerStore::posted_lines`], so a
///   broken store surfaces as an error instead of an empty ledger
pub trait LedgerStore: Send + Sync {
    fn account(&self, code: &str) -> Result<Option<Account>, StoreError>;
    fn accounts(&self) -> Result<Vec<Account>, StoreError>;
    fn period(&self, id: PeriodId) -> Result<Option<AccountingPeriod>, StoreError>;
    fn periods(&self) -> Result<Vec<AccountingPeriod>, StoreError>;
    fn entry(&self, id: EntryId) -> Result<Option<JournalEntry>, StoreError>;
    /// All entries, in id order.
    fn entries(&self) -> Result<Vec<JournalEntry>, StoreError>;
    /// Lines of one entry, in id order.
    fn lines(&self, entry: EntryId) -> Result<Vec<JournalLine>, StoreError>;
    /// Every line in the ledger, in id order.
    fn all_lines(&self) -> Result<Vec<JournalLine>, StoreError>;
    /// Lines of `account` whose entry date falls in `range`, joined with their entry.
    fn account_lines(&self, account: &str, range: &DateRange)
    -> Result<Vec<PostedLine>, StoreError>;
    /// Every line whose entry date falls in `range`, joined with its entry.
    fn posted_lines(&self, range: &DateRange) -> Result<Vec<PostedLine>, StoreError>;

    /// Run `f` against a staging area and commit its writes atomically.
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>,
        E: From<StoreError>;
}

impl<S: LedgerStore + ?Sized> LedgerStore for Arc<S> {
    fn account(&self, code: &str) -> Result<Option<Account>, StoreError> {
        (**self).account(code)
    }

    fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        (**self).accounts()
    }

    fn period(&self, id: PeriodId) -> Result<Option<AccountingPeriod>, StoreError> {
        (**self).period(id)
    }

    fn periods(&self) -> Result<Vec<AccountingPeriod>, StoreError> {
        (**self).periods()
    }

    fn entry(&self, id: EntryId) -> Result<Option<JournalEntry>, StoreError> {
        (**self).entry(id)
    }

    fn entries(&self) -> Result<Vec<JournalEntry>, StoreError> {
        (**self).entries()
    }

    fn lines(&self, entry: EntryId) -> Result<Vec<JournalLine>, StoreError> {
        (**self).lines(entry)
    }

    fn all_lines(&self) -> Result<Vec<JournalLine>, StoreError> {
        (**self).all_lines()
    }

    fn account_lines(
        &self,
        account: &str,
        range: &DateRange,
    ) -> Result<Vec<PostedLine>, StoreError> {
        (**self).account_lines(account, range)
    }

    fn posted_lines(&self, range: &DateRange) -> Result<Vec<PostedLine>, StoreError> {
        (**self).posted_lines(range)
    }

    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        (**self).transaction(f)
    }
}
