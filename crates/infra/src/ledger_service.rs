//! Ledger write path and reporting facade.
//!
//! Every write runs its validation inside the same store transaction as the
//! write itself, so a rejected entry leaves nothing behind:
//!
//! ```text
//! NewJournalEntry
//!   ↓
//! 1. Validate lines (single-sided, balanced within tolerance)
//!   ↓
//! 2. Open store transaction
//!   ↓
//! 3. Check period (exists, open, contains the date)
//!   ↓
//! 4. Insert header, then each line after checking its account
//!   ↓
//! 5. Commit (or discard everything on the first error)
//! ```
//!
//! Reports are computed on demand from the store through the pure functions
//! of `hms-accounting`; nothing is cached.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, instrument, warn};

use hms_accounting::{
    Account, AccountingPeriod, AuditReport, BalanceSheet, ChartOfAccounts, DateRange,
    IncomeStatement, JournalEntry, JournalLine, LedgerError, LedgerRows, NewAccount,
    NewJournalEntry, NewJournalLine, PostedEntry, TrialBalance, audit_ledger,
    ensure_account_postable, is_balanced, validate_entry_lines, validate_line,
    validate_stored_entry,
};
use hms_core::{DomainError, EntryId, PeriodId};

use crate::config::LedgerConfig;
use crate::ledger_store::{LedgerStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// A ledger rule rejected the operation. Deterministic; do not retry.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// The ledger rule behind this error, if it is not an infrastructure failure.
    pub fn as_ledger(&self) -> Option<&LedgerError> {
        match self {
            ServiceError::Ledger(err) => Some(err),
            ServiceError::Store(_) => None,
        }
    }

    /// Map to the domain error model; `None` for infrastructure failures.
    pub fn into_domain(self) -> Option<DomainError> {
        match self {
            ServiceError::Ledger(err) => Some(err.into()),
            ServiceError::Store(_) => None,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Double-entry ledger over a [`LedgerStore`].
#[derive(Debug)]
pub struct LedgerService<S> {
    store: S,
    config: LedgerConfig,
}

impl<S: LedgerStore> LedgerService<S> {
    pub fn new(store: S, config: LedgerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    // ---- chart of accounts ----

    #[instrument(skip(self, new), fields(code = %new.code), err)]
    pub fn register_account(&self, new: NewAccount) -> ServiceResult<Account> {
        let account = self
            .store
            .transaction(|tx| -> ServiceResult<Account> {
                let mut chart = ChartOfAccounts::from_accounts(tx.accounts());
                let account = chart.insert(new)?.clone();
                tx.insert_account(account.clone())?;
                Ok(account)
            })?;
        info!(code = %account.code, kind = %account.kind, level = account.level, "account registered");
        Ok(account)
    }

    /// Move an account under a new parent (or to the root). Levels of the
    /// whole moved subtree are updated in the same transaction.
    #[instrument(skip(self), err)]
    pub fn reparent_account(&self, code: &str, parent: Option<&str>) -> ServiceResult<Account> {
        self.store.transaction(|tx| -> ServiceResult<Account> {
            let before: BTreeMap<String, Account> = tx
                .accounts()
                .into_iter()
                .map(|a| (a.code.clone(), a))
                .collect();
            let mut chart = ChartOfAccounts::from_accounts(before.values().cloned());
            chart.set_parent(code, parent)?;

            for account in chart.iter() {
                if before.get(&account.code) != Some(account) {
                    tx.update_account(account.clone())?;
                }
            }
            chart
                .get(code)
                .cloned()
                .ok_or_else(|| LedgerError::UnknownAccount(code.to_string()).into())
        })
    }

    /// Inactive accounts keep their history but accept no new lines.
    #[instrument(skip(self), err)]
    pub fn deactivate_account(&self, code: &str) -> ServiceResult<Account> {
        self.set_account_active(code, false)
    }

    #[instrument(skip(self), err)]
    pub fn activate_account(&self, code: &str) -> ServiceResult<Account> {
        self.set_account_active(code, true)
    }

    fn set_account_active(&self, code: &str, active: bool) -> ServiceResult<Account> {
        self.store.transaction(|tx| -> ServiceResult<Account> {
            let mut account = tx
                .account(code)
                .ok_or_else(|| LedgerError::UnknownAccount(code.to_string()))?;
            account.active = active;
            tx.update_account(account.clone())?;
            Ok(account)
        })
    }

    // ---- periods ----

    /// Open a new accounting period. Periods may not overlap.
    #[instrument(skip(self), err)]
    pub fn open_period(
        &self,
        name: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ServiceResult<AccountingPeriod> {
        let period = self
            .store
            .transaction(|tx| -> ServiceResult<AccountingPeriod> {
                ensure_no_overlap(&tx.periods(), name, start, end)?;
                let period = AccountingPeriod::new(tx.next_period_id(), name, start, end)?;
                tx.insert_period(period.clone())?;
                Ok(period)
            })?;
        info!(period = %period.id, name = %period.name, "period opened");
        Ok(period)
    }

    #[instrument(skip(self), err)]
    pub fn close_period(&self, id: PeriodId) -> ServiceResult<AccountingPeriod> {
        self.update_period(id, AccountingPeriod::close)
    }

    #[instrument(skip(self), err)]
    pub fn reopen_period(&self, id: PeriodId) -> ServiceResult<AccountingPeriod> {
        self.update_period(id, AccountingPeriod::reopen)
    }

    fn update_period(
        &self,
        id: PeriodId,
        change: fn(&mut AccountingPeriod),
    ) -> ServiceResult<AccountingPeriod> {
        let period = self
            .store
            .transaction(|tx| -> ServiceResult<AccountingPeriod> {
                let mut period = tx.period(id).ok_or(LedgerError::UnknownPeriod(id))?;
                change(&mut period);
                tx.update_period(period.clone())?;
                Ok(period)
            })?;
        info!(period = %period.id, closed = period.closed, "period updated");
        Ok(period)
    }

    // ---- journal entries ----

    /// Create an entry with all its lines in one atomic write.
    ///
    /// Nothing is persisted unless every line is single-sided, debits equal
    /// credits within the configured tolerance, every account exists and is
    /// active, and the period accepts the entry date.
    #[instrument(
        skip(self, new),
        fields(journal = %new.journal, period = %new.period, date = %new.date, lines = new.lines.len()),
        err
    )]
    pub fn create_automatic_entry(&self, new: NewJournalEntry) -> ServiceResult<PostedEntry> {
        if let Err(err) = validate_entry_lines(&new.lines, self.config.balance_tolerance) {
            warn!(error = %err, "journal entry rejected");
            return Err(err.into());
        }

        let enforce = self.config.enforce_closed_periods;
        let posted = self
            .store
            .transaction(|tx| -> ServiceResult<PostedEntry> {
                check_entry_period(tx.period(new.period).as_ref(), new.period, new.date, enforce)?;

                let entry = JournalEntry {
                    id: tx.next_entry_id(),
                    number: tx.next_entry_number(&new.journal),
                    date: new.date,
                    description: new.description,
                    journal: new.journal,
                    period: new.period,
                    counterparty: new.counterparty,
                    cost_center: new.cost_center,
                    source_voucher: new.source_voucher,
                    created_at: Utc::now(),
                };
                tx.insert_entry(entry.clone())?;

                let mut lines = Vec::with_capacity(new.lines.len());
                for line in new.lines {
                    ensure_account_postable(tx.account(&line.account).as_ref(), &line.account)?;
                    lines.push(tx.insert_line(entry.id, line)?);
                }
                Ok(PostedEntry { entry, lines })
            })
            .inspect_err(|err| warn!(error = %err, "journal entry rolled back"))?;

        info!(
            entry = %posted.entry.id,
            number = posted.entry.number,
            "journal entry created"
        );
        Ok(posted)
    }

    /// Add one line to an existing entry.
    ///
    /// The line itself is validated, but the entry is not required to balance
    /// afterwards: lines of a manual entry arrive one at a time. Use
    /// [`validate_entry`](Self::validate_entry) once the entry is complete.
    #[instrument(skip(self, line), fields(account = %line.account), err)]
    pub fn post_line(&self, entry: EntryId, line: NewJournalLine) -> ServiceResult<JournalLine> {
        let enforce = self.config.enforce_closed_periods;
        self.store.transaction(|tx| -> ServiceResult<JournalLine> {
            let header = tx.entry(entry).ok_or(LedgerError::UnknownEntry(entry))?;
            check_added_line(tx.period(header.period).as_ref(), header.period, &line, enforce)?;
            ensure_account_postable(tx.account(&line.account).as_ref(), &line.account)?;
            Ok(tx.insert_line(entry, line)?)
        })
    }

    /// Fail if the stored lines of `entry` are missing or unbalanced.
    #[instrument(skip(self), err)]
    pub fn validate_entry(&self, entry: EntryId) -> ServiceResult<()> {
        let lines = self.entry_lines(entry)?;
        validate_stored_entry(&lines, self.config.balance_tolerance)?;
        Ok(())
    }

    /// Whether the stored lines of `entry` balance within one cent.
    pub fn entry_is_balanced(&self, entry: EntryId) -> ServiceResult<bool> {
        let lines = self.entry_lines(entry)?;
        Ok(is_balanced(&lines))
    }

    /// Post the mirror image of `entry` (debits and credits swapped) into
    /// `period` on `date`.
    #[instrument(skip(self, description), err)]
    pub fn reverse_entry(
        &self,
        entry: EntryId,
        period: PeriodId,
        date: NaiveDate,
        description: &str,
    ) -> ServiceResult<PostedEntry> {
        let original = self
            .store
            .entry(entry)?
            .ok_or(LedgerError::UnknownEntry(entry))?;
        let lines = self.store.lines(entry)?;
        self.create_automatic_entry(original.reversal(&lines, period, date, description))
    }

    /// Re-check every stored entry and line. Findings are reported, not raised.
    #[instrument(skip(self), err)]
    pub fn audit(&self) -> ServiceResult<AuditReport> {
        let report = audit_ledger(
            &self.store.accounts()?,
            &self.store.periods()?,
            &self.store.entries()?,
            &self.store.all_lines()?,
            self.config.balance_tolerance,
        );
        log_audit(&report);
        Ok(report)
    }

    // ---- reports ----

    pub fn account_balance(&self, code: &str, range: &DateRange) -> ServiceResult<Decimal> {
        let account = self.require_account(code)?;
        let lines = self.store.account_lines(code, range)?;
        Ok(hms_accounting::account_balance(&account, &lines, range))
    }

    pub fn ledger(&self, code: &str, range: &DateRange) -> ServiceResult<LedgerRows> {
        let account = self.require_account(code)?;
        let lines = self.store.account_lines(code, range)?;
        Ok(hms_accounting::ledger(&account, &lines, range))
    }

    pub fn balance_sheet(&self, as_of: Option<NaiveDate>) -> ServiceResult<BalanceSheet> {
        let accounts = self.store.accounts()?;
        let lines = self.store.posted_lines(&DateRange { from: None, to: as_of })?;
        Ok(hms_accounting::balance_sheet(&accounts, &lines, as_of))
    }

    pub fn income_statement(&self, range: &DateRange) -> ServiceResult<IncomeStatement> {
        let accounts = self.store.accounts()?;
        let lines = self.store.posted_lines(range)?;
        Ok(hms_accounting::income_statement(&accounts, &lines, range))
    }

    pub fn trial_balance(&self, range: &DateRange) -> ServiceResult<TrialBalance> {
        let accounts = self.store.accounts()?;
        let lines = self.store.posted_lines(range)?;
        Ok(hms_accounting::trial_balance(&accounts, &lines, range))
    }

    fn entry_lines(&self, entry: EntryId) -> ServiceResult<Vec<JournalLine>> {
        if self.store.entry(entry)?.is_none() {
            return Err(LedgerError::UnknownEntry(entry).into());
        }
        Ok(self.store.lines(entry)?)
    }

    fn require_account(&self, code: &str) -> ServiceResult<Account> {
        Ok(self
            .store
            .account(code)?
            .ok_or_else(|| LedgerError::UnknownAccount(code.to_string()))?)
    }
}

pub(crate) fn ensure_no_overlap(
    periods: &[AccountingPeriod],
    name: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<(), LedgerError> {
    match periods.iter().find(|p| p.overlaps(start, end)) {
        Some(existing) => Err(LedgerError::OverlappingPeriod {
            name: name.to_string(),
            existing: existing.id,
        }),
        None => Ok(()),
    }
}

/// Period check for a new entry dated `date` in period `id`, given the period
/// found under that id.
pub(crate) fn check_entry_period(
    period: Option<&AccountingPeriod>,
    id: PeriodId,
    date: NaiveDate,
    enforce: bool,
) -> Result<(), LedgerError> {
    let period = period.ok_or(LedgerError::UnknownPeriod(id))?;
    if enforce {
        period.ensure_postable(date)?;
    }
    Ok(())
}

/// Checks for a line added to an existing entry of period `id`. The entry's
/// balance is not checked here.
pub(crate) fn check_added_line(
    period: Option<&AccountingPeriod>,
    id: PeriodId,
    line: &NewJournalLine,
    enforce: bool,
) -> Result<(), LedgerError> {
    let period = period.ok_or(LedgerError::UnknownPeriod(id))?;
    if enforce && period.closed {
        return Err(LedgerError::PeriodClosed(period.id));
    }
    validate_line(line.debit, line.credit)
        .map_err(|reason| LedgerError::InvalidLine { index: 0, reason })
}

pub(crate) fn log_audit(report: &AuditReport) {
    if report.is_clean() {
        info!(entries = report.entries_checked, "ledger audit clean");
    } else {
        warn!(
            entries = report.entries_checked,
            findings = report.findings.len(),
            "ledger audit found problems"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger_store::InMemoryLedgerStore;
    use hms_accounting::{AccountKind, LineError};
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn service() -> LedgerService<InMemoryLedgerStore> {
        LedgerService::new(InMemoryLedgerStore::new(), LedgerConfig::default())
    }

    fn seeded() -> (LedgerService<InMemoryLedgerStore>, PeriodId) {
        let svc = service();
        svc.register_account(NewAccount::root("1", "Activo", AccountKind::Asset))
            .unwrap();
        svc.register_account(NewAccount::child("1110", "Caja", AccountKind::Asset, "1"))
            .unwrap();
        svc.register_account(NewAccount::root("4110", "Ingresos por servicios", AccountKind::Income))
            .unwrap();
        let march = svc.open_period("2024-03", d(2024, 3, 1), d(2024, 3, 31)).unwrap();
        (svc, march.id)
    }

    fn cash_sale(period: PeriodId, amount: Decimal) -> NewJournalEntry {
        NewJournalEntry::new("GEN", period, d(2024, 3, 4), "Venta de contado")
            .line(NewJournalLine::debit("1110", amount))
            .line(NewJournalLine::credit("4110", amount))
    }

    #[test]
    fn registered_child_gets_parent_level() {
        let (svc, _) = seeded();
        let caja = svc.store().account("1110").unwrap().unwrap();
        assert_eq!(caja.level, 2);
        assert_eq!(caja.parent.as_deref(), Some("1"));
    }

    #[test]
    fn duplicate_account_is_rejected() {
        let (svc, _) = seeded();
        let err = svc
            .register_account(NewAccount::root("1110", "Otra caja", AccountKind::Asset))
            .unwrap_err();
        assert_eq!(err, ServiceError::Ledger(LedgerError::DuplicateAccount("1110".into())));
    }

    #[test]
    fn reparenting_into_own_subtree_is_rejected() {
        let (svc, _) = seeded();
        let err = svc.reparent_account("1", Some("1110")).unwrap_err();
        assert!(matches!(
            err.as_ledger(),
            Some(LedgerError::ParentCycle { .. })
        ));

        let moved = svc.reparent_account("1110", None).unwrap();
        assert_eq!(moved.level, 1);
        assert_eq!(svc.store().account("1110").unwrap().unwrap().parent, None);
    }

    #[test]
    fn balanced_entry_is_posted_with_sequential_numbers() {
        let (svc, period) = seeded();
        let first = svc.create_automatic_entry(cash_sale(period, dec!(2500000))).unwrap();
        let second = svc.create_automatic_entry(cash_sale(period, dec!(100))).unwrap();

        assert_eq!(first.entry.number, 1);
        assert_eq!(second.entry.number, 2);
        assert_eq!(first.lines.len(), 2);
        assert_eq!(svc.entry_is_balanced(first.entry.id), Ok(true));
        assert_eq!(
            svc.account_balance("1110", &DateRange::all()).unwrap(),
            dec!(2500100)
        );
    }

    #[test]
    fn unbalanced_entry_is_rejected_before_writing() {
        let (svc, period) = seeded();
        let new = NewJournalEntry::new("GEN", period, d(2024, 3, 4), "Descuadrado")
            .line(NewJournalLine::debit("1110", dec!(500)))
            .line(NewJournalLine::credit("4110", dec!(300)));

        let err = svc.create_automatic_entry(new).unwrap_err();
        assert_eq!(
            err,
            ServiceError::Ledger(LedgerError::Unbalanced {
                debit: dec!(500),
                credit: dec!(300),
            })
        );
        assert!(svc.store().entries().unwrap().is_empty());
    }

    #[test]
    fn fractions_of_a_cent_are_rejected_before_writing() {
        let (svc, period) = seeded();
        let new = NewJournalEntry::new("GEN", period, d(2024, 3, 4), "Redondeo")
            .line(NewJournalLine::debit("1110", dec!(0.005)))
            .line(NewJournalLine::debit("1110", dec!(0.005)))
            .line(NewJournalLine::credit("4110", dec!(0.01)));

        let err = svc.create_automatic_entry(new).unwrap_err();
        assert_eq!(
            err,
            ServiceError::Ledger(LedgerError::InvalidLine {
                index: 0,
                reason: LineError::TooPrecise,
            })
        );
        assert!(svc.store().entries().unwrap().is_empty());
    }

    #[test]
    fn unknown_account_rolls_back_the_whole_entry() {
        let (svc, period) = seeded();
        let new = NewJournalEntry::new("GEN", period, d(2024, 3, 4), "Cuenta inexistente")
            .line(NewJournalLine::debit("1110", dec!(10)))
            .line(NewJournalLine::credit("9999", dec!(10)));

        let err = svc.create_automatic_entry(new).unwrap_err();
        assert_eq!(err, ServiceError::Ledger(LedgerError::UnknownAccount("9999".into())));
        assert!(svc.store().entries().unwrap().is_empty());
        assert!(svc.store().all_lines().unwrap().is_empty());

        // The rolled-back entry did not consume a number.
        let posted = svc.create_automatic_entry(cash_sale(period, dec!(10))).unwrap();
        assert_eq!(posted.entry.number, 1);
    }

    #[test]
    fn inactive_account_cannot_receive_lines() {
        let (svc, period) = seeded();
        svc.deactivate_account("4110").unwrap();
        let err = svc.create_automatic_entry(cash_sale(period, dec!(10))).unwrap_err();
        assert_eq!(err, ServiceError::Ledger(LedgerError::InactiveAccount("4110".into())));

        svc.activate_account("4110").unwrap();
        assert!(svc.create_automatic_entry(cash_sale(period, dec!(10))).is_ok());
    }

    #[test]
    fn closed_period_rejects_entries_until_reopened() {
        let (svc, period) = seeded();
        svc.close_period(period).unwrap();
        let err = svc.create_automatic_entry(cash_sale(period, dec!(10))).unwrap_err();
        assert_eq!(err, ServiceError::Ledger(LedgerError::PeriodClosed(period)));

        svc.reopen_period(period).unwrap();
        assert!(svc.create_automatic_entry(cash_sale(period, dec!(10))).is_ok());
    }

    #[test]
    fn closed_periods_are_ignored_when_not_enforced() {
        let svc = LedgerService::new(
            InMemoryLedgerStore::new(),
            LedgerConfig {
                enforce_closed_periods: false,
                ..LedgerConfig::default()
            },
        );
        svc.register_account(NewAccount::root("1110", "Caja", AccountKind::Asset))
            .unwrap();
        svc.register_account(NewAccount::root("4110", "Ingresos", AccountKind::Income))
            .unwrap();
        let period = svc.open_period("2024-03", d(2024, 3, 1), d(2024, 3, 31)).unwrap().id;
        svc.close_period(period).unwrap();

        assert!(svc.create_automatic_entry(cash_sale(period, dec!(10))).is_ok());
        assert_eq!(
            svc.create_automatic_entry(cash_sale(PeriodId::new(42), dec!(10)))
                .unwrap_err(),
            ServiceError::Ledger(LedgerError::UnknownPeriod(PeriodId::new(42)))
        );
    }

    #[test]
    fn overlapping_periods_are_rejected() {
        let (svc, march) = seeded();
        let err = svc
            .open_period("2024-03b", d(2024, 3, 15), d(2024, 4, 15))
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::Ledger(LedgerError::OverlappingPeriod {
                name: "2024-03b".into(),
                existing: march,
            })
        );
        assert!(svc.open_period("2024-04", d(2024, 4, 1), d(2024, 4, 30)).is_ok());
    }

    #[test]
    fn post_line_validates_the_line_but_not_the_entry() {
        let (svc, period) = seeded();
        let posted = svc.create_automatic_entry(cash_sale(period, dec!(100))).unwrap();
        let id = posted.entry.id;

        let err = svc
            .post_line(id, NewJournalLine::new("1110", dec!(5), dec!(5)))
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::Ledger(LedgerError::InvalidLine {
                index: 0,
                reason: LineError::BothSides,
            })
        );

        svc.post_line(id, NewJournalLine::debit("1110", dec!(5))).unwrap();
        assert_eq!(svc.entry_is_balanced(id), Ok(false));
        assert!(matches!(
            svc.validate_entry(id).unwrap_err().as_ledger(),
            Some(LedgerError::Unbalanced { .. })
        ));

        svc.post_line(id, NewJournalLine::credit("4110", dec!(5))).unwrap();
        assert_eq!(svc.validate_entry(id), Ok(()));
    }

    #[test]
    fn balance_check_of_a_missing_entry_is_an_error() {
        let (svc, _) = seeded();
        let missing = EntryId::new(999);
        assert_eq!(
            svc.entry_is_balanced(missing),
            Err(ServiceError::Ledger(LedgerError::UnknownEntry(missing)))
        );
        assert_eq!(
            svc.validate_entry(missing),
            Err(ServiceError::Ledger(LedgerError::UnknownEntry(missing)))
        );
    }

    #[test]
    fn poisoned_store_fails_reads_instead_of_reporting_empty_books() {
        let (svc, period) = seeded();
        let id = svc.create_automatic_entry(cash_sale(period, dec!(100))).unwrap().entry.id;

        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = svc.store().transaction(|_| -> Result<(), StoreError> {
                panic!("writer crashed mid-transaction");
            });
        }));
        assert!(panicked.is_err());

        let poisoned = ServiceError::Store(StoreError::LockPoisoned);
        assert_eq!(svc.entry_is_balanced(id).unwrap_err(), poisoned);
        assert_eq!(
            svc.account_balance("1110", &DateRange::all()).unwrap_err(),
            poisoned
        );
        assert_eq!(svc.trial_balance(&DateRange::all()).unwrap_err(), poisoned);
        assert_eq!(svc.balance_sheet(None).unwrap_err(), poisoned);
    }

    #[test]
    fn post_line_into_closed_period_is_rejected() {
        let (svc, period) = seeded();
        let id = svc.create_automatic_entry(cash_sale(period, dec!(100))).unwrap().entry.id;
        svc.close_period(period).unwrap();

        let err = svc
            .post_line(id, NewJournalLine::debit("1110", dec!(1)))
            .unwrap_err();
        assert_eq!(err, ServiceError::Ledger(LedgerError::PeriodClosed(period)));
        assert_eq!(
            svc.post_line(EntryId::new(77), NewJournalLine::debit("1110", dec!(1)))
                .unwrap_err(),
            ServiceError::Ledger(LedgerError::UnknownEntry(EntryId::new(77)))
        );
    }

    #[test]
    fn reversal_cancels_the_original() {
        let (svc, period) = seeded();
        let original = svc.create_automatic_entry(cash_sale(period, dec!(2500000))).unwrap();

        let reversal = svc
            .reverse_entry(original.entry.id, period, d(2024, 3, 20), "Anulación")
            .unwrap();

        assert_eq!(reversal.entry.number, 2);
        assert_eq!(reversal.entry.source_voucher.as_deref(), Some("reversal:1"));
        assert_eq!(reversal.lines[0].credit, dec!(2500000));
        assert_eq!(svc.account_balance("1110", &DateRange::all()).unwrap(), dec!(0));
        assert_eq!(svc.account_balance("4110", &DateRange::all()).unwrap(), dec!(0));
    }

    #[test]
    fn reports_reflect_posted_entries() {
        let (svc, period) = seeded();
        svc.create_automatic_entry(cash_sale(period, dec!(2500000))).unwrap();

        let sheet = svc.balance_sheet(None).unwrap();
        assert_eq!(sheet.total_assets, dec!(2500000));
        assert_eq!(sheet.unclosed_result(), dec!(2500000));

        let pnl = svc.income_statement(&DateRange::all()).unwrap();
        assert_eq!(pnl.net_result, dec!(2500000));

        let trial = svc.trial_balance(&DateRange::all()).unwrap();
        assert!(trial.is_balanced());

        let rows: Vec<_> = svc.ledger("1110", &DateRange::all()).unwrap().collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].balance, dec!(2500000));

        assert_eq!(
            svc.account_balance("0000", &DateRange::all()).unwrap_err(),
            ServiceError::Ledger(LedgerError::UnknownAccount("0000".into()))
        );
    }

    #[test]
    fn audit_of_service_written_ledger_is_clean() {
        let (svc, period) = seeded();
        svc.create_automatic_entry(cash_sale(period, dec!(10))).unwrap();
        let report = svc.audit().unwrap();
        assert!(report.is_clean());
        assert_eq!(report.entries_checked, 1);
        assert_eq!(report.accounts_checked, 3);
    }

    #[test]
    fn ledger_errors_map_to_domain_errors() {
        let err = ServiceError::Ledger(LedgerError::UnknownEntry(EntryId::new(1)));
        assert!(matches!(err.into_domain(), Some(DomainError::NotFound(_))));
        assert_eq!(ServiceError::Store(StoreError::LockPoisoned).into_domain(), None);
    }
}
