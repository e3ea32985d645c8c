//! Double-entry validation rules.
//!
//! - every line is single-sided: exactly one of debit/credit is positive
//! - amounts are whole cents, matching the stored `NUMERIC(18, 2)` columns
//! - an entry's debits equal its credits within [`BALANCE_TOLERANCE`]

use rust_decimal::Decimal;

use crate::account::Account;
use crate::error::{LedgerError, LedgerResult, LineError};
use crate::journal::{JournalLine, NewJournalLine, PostedLine};

/// Decimal places an amount may carry.
pub const AMOUNT_SCALE: u32 = 2;

/// One cent.
pub const BALANCE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Anything carrying a debit and a credit amount.
pub trait LineAmounts {
    fn debit(&self) -> Decimal;
    fn credit(&self) -> Decimal;
}

macro_rules! impl_line_amounts {
    ($t:ty) => {
        impl LineAmounts for $t {
            fn debit(&self) -> Decimal {
                self.debit
            }

            fn credit(&self) -> Decimal {
                self.credit
            }
        }
    };
}

impl_line_amounts!(NewJournalLine);
impl_line_amounts!(JournalLine);
impl_line_amounts!(PostedLine);

impl<T: LineAmounts + ?Sized> LineAmounts for &T {
    fn debit(&self) -> Decimal {
        (**self).debit()
    }

    fn credit(&self) -> Decimal {
        (**self).credit()
    }
}

/// Check that a line carries exactly one positive side.
pub fn validate_line(debit: Decimal, credit: Decimal) -> Result<(), LineError> {
    if debit < Decimal::ZERO || credit < Decimal::ZERO {
        return Err(LineError::Negative);
    }
    if debit.normalize().scale() > AMOUNT_SCALE || credit.normalize().scale() > AMOUNT_SCALE {
        return Err(LineError::TooPrecise);
    }
    match (debit > Decimal::ZERO, credit > Decimal::ZERO) {
        (true, true) => Err(LineError::BothSides),
        (false, false) => Err(LineError::NoAmount),
        _ => Ok(()),
    }
}

/// Sum of debits and sum of credits.
pub fn totals<L: LineAmounts>(lines: impl IntoIterator<Item = L>) -> (Decimal, Decimal) {
    lines
        .into_iter()
        .fold((Decimal::ZERO, Decimal::ZERO), |(debit, credit), line| {
            (debit + line.debit(), credit + line.credit())
        })
}

/// True when debits and credits differ by less than one cent.
pub fn is_balanced<L: LineAmounts>(lines: impl IntoIterator<Item = L>) -> bool {
    let (debit, credit) = totals(lines);
    (debit - credit).abs() < BALANCE_TOLERANCE
}

/// Hard-error form of [`is_balanced`] with a configurable tolerance.
pub fn ensure_balanced<L: LineAmounts>(
    lines: impl IntoIterator<Item = L>,
    tolerance: Decimal,
) -> LedgerResult<()> {
    let (debit, credit) = totals(lines);
    if (debit - credit).abs() < tolerance {
        Ok(())
    } else {
        Err(LedgerError::Unbalanced { debit, credit })
    }
}

/// Full check of a proposed entry's lines: non-empty, single-sided, balanced.
pub fn validate_entry_lines(lines: &[NewJournalLine], tolerance: Decimal) -> LedgerResult<()> {
    if lines.is_empty() {
        return Err(LedgerError::EmptyEntry);
    }
    for (index, line) in lines.iter().enumerate() {
        validate_line(line.debit, line.credit)
            .map_err(|reason| LedgerError::InvalidLine { index, reason })?;
    }
    ensure_balanced(lines, tolerance)
}

/// Hard check of an entry already on the books: it has lines and they
/// balance within `tolerance`.
pub fn validate_stored_entry(lines: &[JournalLine], tolerance: Decimal) -> LedgerResult<()> {
    if lines.is_empty() {
        return Err(LedgerError::EmptyEntry);
    }
    ensure_balanced(lines, tolerance)
}

/// Check that a line may be posted to `code`, given the account found under it.
pub fn ensure_account_postable(account: Option<&Account>, code: &str) -> LedgerResult<()> {
    match account {
        None => Err(LedgerError::UnknownAccount(code.to_string())),
        Some(a) if !a.active => Err(LedgerError::InactiveAccount(code.to_string())),
        Some(_) => Ok(()),
    }
}
