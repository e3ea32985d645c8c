//! Ledger persistence boundary.
//!
//! Accounts, periods, entries and lines live behind [`LedgerStore`]. Writes
//! are only possible inside [`LedgerStore::transaction`], which applies the
//! staged changes all together or not at all.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryLedgerStore;
pub use postgres::{LedgerSnapshot, PostgresLedgerStore};
pub use r#trait::{LedgerStore, LedgerTx, StoreError};
