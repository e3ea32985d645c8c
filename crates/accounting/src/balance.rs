//! Account balance calculations.
//!
//! Pure aggregation over journal lines: no caching, no side effects. Calling
//! any of these twice with the same source yields the same result.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hms_core::EntryId;

use crate::account::Account;
use crate::journal::PostedLine;
use crate::period::DateRange;
use crate::validation::{is_balanced, totals};

/// Read access to posted journal lines.
pub trait LineSource {
    /// Lines posted to `account` whose entry date falls in `range`.
    fn lines_for_account(&self, account: &str, range: &DateRange) -> Vec<PostedLine>;

    /// All lines of one entry.
    fn lines_for_entry(&self, entry: EntryId) -> Vec<PostedLine>;
}

impl LineSource for [PostedLine] {
    fn lines_for_account(&self, account: &str, range: &DateRange) -> Vec<PostedLine> {
        self.iter()
            .filter(|l| l.account == account && range.contains(l.date))
            .cloned()
            .collect()
    }

    fn lines_for_entry(&self, entry: EntryId) -> Vec<PostedLine> {
        self.iter().filter(|l| l.entry == entry).cloned().collect()
    }
}

impl LineSource for Vec<PostedLine> {
    fn lines_for_account(&self, account: &str, range: &DateRange) -> Vec<PostedLine> {
        self.as_slice().lines_for_account(account, range)
    }

    fn lines_for_entry(&self, entry: EntryId) -> Vec<PostedLine> {
        self.as_slice().lines_for_entry(entry)
    }
}

impl<S: LineSource + ?Sized> LineSource for &S {
    fn lines_for_account(&self, account: &str, range: &DateRange) -> Vec<PostedLine> {
        (**self).lines_for_account(account, range)
    }

    fn lines_for_entry(&self, entry: EntryId) -> Vec<PostedLine> {
        (**self).lines_for_entry(entry)
    }
}

/// Debit and credit sums of an account plus its signed balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountTotals {
    pub debit: Decimal,
    pub credit: Decimal,
    /// Balance from the account's normal side.
    pub balance: Decimal,
}

pub fn account_totals<S: LineSource + ?Sized>(
    account: &Account,
    source: &S,
    range: &DateRange,
) -> AccountTotals {
    let lines = source.lines_for_account(&account.code, range);
    let (debit, credit) = totals(&lines);
    AccountTotals {
        debit,
        credit,
        balance: account.normal_balance().signed(debit, credit),
    }
}

/// Balance of `account` over `range`.
///
/// Debit-normal accounts: debits − credits. Credit-normal: credits − debits.
/// An account with no lines has a zero balance.
pub fn account_balance<S: LineSource + ?Sized>(
    account: &Account,
    source: &S,
    range: &DateRange,
) -> Decimal {
    account_totals(account, source, range).balance
}

/// Whether the lines of `entry` balance within one cent.
pub fn entry_is_balanced<S: LineSource + ?Sized>(source: &S, entry: EntryId) -> bool {
    is_balanced(&source.lines_for_entry(entry))
}
