//! `hms-core`: domain foundation building blocks for the hospital ledger.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;

pub use entity::{Entity, index_by_id};
pub use error::{DomainError, DomainResult};
pub use id::{EntryId, LineId, PeriodId};
