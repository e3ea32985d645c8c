//! Accounting periods and date ranges.
//!
//! A period is a named span of days entries are posted into. Closing it freezes
//! its entries; periods never overlap, so a date belongs to at most one.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use hms_core::{Entity, PeriodId};

use crate::error::{LedgerError, LedgerResult};

/// Optional inclusive date bounds used to filter journal lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    /// No bounds: every line matches.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    /// Everything up to and including `date`.
    pub fn until(date: NaiveDate) -> Self {
        Self {
            from: None,
            to: Some(date),
        }
    }

    pub fn since(date: NaiveDate) -> Self {
        Self {
            from: Some(date),
            to: None,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}

/// Accounting period (`periodo contable`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingPeriod {
    pub id: PeriodId,
    pub name: String, // e.g. "2024-03"
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub closed: bool,
}

impl AccountingPeriod {
    pub fn new(
        id: PeriodId,
        name: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> LedgerResult<Self> {
        if start > end {
            return Err(LedgerError::InvalidPeriodRange { start, end });
        }
        Ok(Self {
            id,
            name: name.into(),
            start,
            end,
            closed: false,
        })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        start <= self.end && end >= self.start
    }

    pub fn range(&self) -> DateRange {
        DateRange::between(self.start, self.end)
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn reopen(&mut self) {
        self.closed = false;
    }

    /// Check that an entry dated `date` may be posted into this period.
    pub fn ensure_postable(&self, date: NaiveDate) -> LedgerResult<()> {
        if self.closed {
            return Err(LedgerError::PeriodClosed(self.id));
        }
        if !self.contains(date) {
            return Err(LedgerError::DateOutsidePeriod {
                date,
                period: self.id,
            });
        }
        Ok(())
    }
}

impl Entity for AccountingPeriod {
    type Id = PeriodId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}
