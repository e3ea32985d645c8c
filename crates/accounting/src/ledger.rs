//! General ledger (`mayor`): the running-balance view of one account.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hms_core::EntryId;

use crate::account::{Account, NormalBalance};
use crate::balance::LineSource;
use crate::journal::PostedLine;
use crate::period::DateRange;

/// One row of an account's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub date: NaiveDate,
    pub entry: EntryId,
    pub description: String,
    pub debit: Decimal,
    pub credit: Decimal,
    /// Balance after this row, from the account's normal side.
    pub balance: Decimal,
}

/// Lazy running-balance iterator returned by [`ledger`].
#[derive(Debug)]
pub struct LedgerRows {
    lines: std::vec::IntoIter<PostedLine>,
    side: NormalBalance,
    running: Decimal,
}

impl LedgerRows {
    /// Balance accumulated over the rows yielded so far.
    pub fn running_balance(&self) -> Decimal {
        self.running
    }
}

impl Iterator for LedgerRows {
    type Item = LedgerRow;

    fn next(&mut self) -> Option<Self::Item> {
        let line = self.lines.next()?;
        self.running += self.side.signed(line.debit, line.credit);
        Some(LedgerRow {
            date: line.date,
            entry: line.entry,
            description: line.description,
            debit: line.debit,
            credit: line.credit,
            balance: self.running,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.lines.size_hint()
    }
}

impl ExactSizeIterator for LedgerRows {}

/// Chronological ledger of `account` over `range`.
///
/// Lines are ordered by entry date, then entry id, then line id. Each call
/// refetches from `source` and starts the running balance at zero.
pub fn ledger<S: LineSource + ?Sized>(account: &Account, source: &S, range: &DateRange) -> LedgerRows {
    let mut lines = source.lines_for_account(&account.code, range);
    lines.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then(a.entry.cmp(&b.entry))
            .then(a.line.cmp(&b.line))
    });
    LedgerRows {
        lines: lines.into_iter(),
        side: account.normal_balance(),
        running: Decimal::ZERO,
    }
}
