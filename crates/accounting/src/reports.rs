//! Financial statements built from account balances.
//!
//! Each report recomputes balances from the line source; nothing is cached.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::account::{Account, AccountKind};
use crate::balance::{LineSource, account_totals};
use crate::period::DateRange;
use crate::validation::BALANCE_TOLERANCE;

/// One account's contribution to a statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportLine {
    pub code: String,
    pub name: String,
    pub kind: AccountKind,
    pub amount: Decimal,
}

impl ReportLine {
    fn new(account: &Account, amount: Decimal) -> Self {
        Self {
            code: account.code.clone(),
            name: account.name.clone(),
            kind: account.kind,
            amount,
        }
    }
}

fn sum(lines: &[ReportLine]) -> Decimal {
    lines.iter().map(|l| l.amount).sum()
}

/// Balance sheet (`balance general`) as of a cutoff date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSheet {
    pub as_of: Option<NaiveDate>,
    pub assets: Vec<ReportLine>,
    pub liabilities: Vec<ReportLine>,
    pub equity: Vec<ReportLine>,
    pub total_assets: Decimal,
    pub total_liabilities: Decimal,
    pub total_equity: Decimal,
}

impl BalanceSheet {
    /// Assets not matched by liabilities and equity: the result of income and
    /// expense accounts not yet closed into equity.
    pub fn unclosed_result(&self) -> Decimal {
        self.total_assets - self.total_liabilities - self.total_equity
    }
}

/// Build the balance sheet from the active accounts in `accounts`.
///
/// Only non-zero balances are listed. `as_of = None` means all lines.
pub fn balance_sheet<'a, S: LineSource + ?Sized>(
    accounts: impl IntoIterator<Item = &'a Account>,
    source: &S,
    as_of: Option<NaiveDate>,
) -> BalanceSheet {
    let range = DateRange {
        from: None,
        to: as_of,
    };
    let mut assets = Vec::new();
    let mut liabilities = Vec::new();
    let mut equity = Vec::new();

    for account in accounts.into_iter().filter(|a| a.active) {
        let bucket = match account.kind {
            AccountKind::Asset => &mut assets,
            AccountKind::Liability => &mut liabilities,
            AccountKind::Equity => &mut equity,
            _ => continue,
        };
        let balance = account_totals(account, source, &range).balance;
        if !balance.is_zero() {
            bucket.push(ReportLine::new(account, balance));
        }
    }

    BalanceSheet {
        as_of,
        total_assets: sum(&assets),
        total_liabilities: sum(&liabilities),
        total_equity: sum(&equity),
        assets,
        liabilities,
        equity,
    }
}

/// Income statement (`estado de resultados`) over a date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomeStatement {
    pub range: DateRange,
    pub income: Vec<ReportLine>,
    /// Amounts are absolute values.
    pub expenses: Vec<ReportLine>,
    /// Cost of services rendered; amounts are absolute values.
    pub costs: Vec<ReportLine>,
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub total_cost: Decimal,
    /// `total_income − total_expense − total_cost`.
    pub net_result: Decimal,
}

pub fn income_statement<'a, S: LineSource + ?Sized>(
    accounts: impl IntoIterator<Item = &'a Account>,
    source: &S,
    range: &DateRange,
) -> IncomeStatement {
    let mut income = Vec::new();
    let mut expenses = Vec::new();
    let mut costs = Vec::new();

    for account in accounts.into_iter().filter(|a| a.active) {
        let (bucket, absolute) = match account.kind {
            AccountKind::Income => (&mut income, false),
            AccountKind::Expense => (&mut expenses, true),
            AccountKind::Cost => (&mut costs, true),
            _ => continue,
        };
        let balance = account_totals(account, source, range).balance;
        if balance.is_zero() {
            continue;
        }
        let amount = if absolute { balance.abs() } else { balance };
        bucket.push(ReportLine::new(account, amount));
    }

    let total_income = sum(&income);
    let total_expense = sum(&expenses);
    let total_cost = sum(&costs);

    IncomeStatement {
        range: *range,
        income,
        expenses,
        costs,
        total_income,
        total_expense,
        total_cost,
        net_result: total_income - total_expense - total_cost,
    }
}

/// One row of a trial balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalanceRow {
    pub code: String,
    pub name: String,
    pub kind: AccountKind,
    pub debit: Decimal,
    pub credit: Decimal,
    pub balance: Decimal,
}

/// Trial balance (`balance de comprobación`): debit/credit movement per account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialBalance {
    pub range: DateRange,
    pub rows: Vec<TrialBalanceRow>,
    pub total_debit: Decimal,
    pub total_credit: Decimal,
}

impl TrialBalance {
    pub fn is_balanced(&self) -> bool {
        (self.total_debit - self.total_credit).abs() < BALANCE_TOLERANCE
    }
}

/// Accounts without movement in `range` are omitted.
pub fn trial_balance<'a, S: LineSource + ?Sized>(
    accounts: impl IntoIterator<Item = &'a Account>,
    source: &S,
    range: &DateRange,
) -> TrialBalance {
    let rows: Vec<TrialBalanceRow> = accounts
        .into_iter()
        .filter(|a| a.active)
        .filter_map(|account| {
            let totals = account_totals(account, source, range);
            if totals.debit.is_zero() && totals.credit.is_zero() {
                return None;
            }
            Some(TrialBalanceRow {
                code: account.code.clone(),
                name: account.name.clone(),
                kind: account.kind,
                debit: totals.debit,
                credit: totals.credit,
                balance: totals.balance,
            })
        })
        .collect();

    TrialBalance {
        range: *range,
        total_debit: rows.iter().map(|r| r.debit).sum(),
        total_credit: rows.iter().map(|r| r.credit).sum(),
        rows,
    }
}
