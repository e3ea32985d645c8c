//! Infrastructure layer: ledger persistence, configuration and the write path.

pub mod config;
pub mod db;
pub mod ledger_service;
pub mod ledger_store;


pub use config::{ConfigError, LedgerConfig};
pub use ledger_service::{LedgerService, ServiceError, ServiceResult};
pub use ledger_store::{
    InMemoryLedgerStore, LedgerSnapshot, LedgerStore, LedgerTx, PostgresLedgerStore, StoreError,
};
