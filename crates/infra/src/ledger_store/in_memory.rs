use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use hms_accounting::{
    Account, AccountingPeriod, DateRange, JournalEntry, JournalLine, NewJournalLine, PostedLine,
};
use hms_core::{EntryId, LineId, PeriodId};

use super::r#trait::{LedgerStore, LedgerTx, StoreError};

/// Whole ledger state. A transaction works on a clone and swaps it in on commit.
#[derive(Debug, Clone, Default)]
struct LedgerState {
    accounts: BTreeMap<String, Account>,
    periods: BTreeMap<PeriodId, AccountingPeriod>,
    entries: BTreeMap<EntryId, JournalEntry>,
    lines: BTreeMap<LineId, JournalLine>,
    last_period: i64,
    last_entry: i64,
    last_line: i64,
    entry_numbers: HashMap<String, u64>,
}

impl LedgerState {
    fn posted_lines<'a>(
        &'a self,
        keep: impl Fn(&JournalEntry, &JournalLine) -> bool + 'a,
    ) -> impl Iterator<Item = PostedLine> + 'a {
        self.lines.values().filter_map(move |line| {
            let entry = self.entries.get(&line.entry)?;
            keep(entry, line).then(|| PostedLine::from_parts(entry, line))
        })
    }
}

impl LedgerTx for LedgerState {
    fn account(&self, code: &str) -> Option<Account> {
        self.accounts.get(code).cloned()
    }

    fn accounts(&self) -> Vec<Account> {
        self.accounts.values().cloned().collect()
    }

    fn period(&self, id: PeriodId) -> Option<AccountingPeriod> {
        self.periods.get(&id).cloned()
    }

    fn periods(&self) -> Vec<AccountingPeriod> {
        self.periods.values().cloned().collect()
    }

    fn entry(&self, id: EntryId) -> Option<JournalEntry> {
        self.entries.get(&id).cloned()
    }

    fn insert_account(&mut self, account: Account) -> Result<(), StoreError> {
        if self.accounts.contains_key(&account.code) {
            return Err(StoreError::Constraint(format!(
                "duplicate account code {}",
                account.code
            )));
        }
        self.accounts.insert(account.code.clone(), account);
        Ok(())
    }

    fn update_account(&mut self, account: Account) -> Result<(), StoreError> {
        match self.accounts.get_mut(&account.code) {
            Some(existing) => {
                *existing = account;
                Ok(())
            }
            None => Err(StoreError::Constraint(format!(
                "account {} does not exist",
                account.code
            ))),
        }
    }

    fn next_period_id(&mut self) -> PeriodId {
        self.last_period += 1;
        PeriodId::new(self.last_period)
    }

    fn insert_period(&mut self, period: AccountingPeriod) -> Result<(), StoreError> {
        if self.periods.contains_key(&period.id) {
            return Err(StoreError::Constraint(format!("duplicate period {}", period.id)));
        }
        self.periods.insert(period.id, period);
        Ok(())
    }

    fn update_period(&mut self, period: AccountingPeriod) -> Result<(), StoreError> {
        match self.periods.get_mut(&period.id) {
            Some(existing) => {
                *existing = period;
                Ok(())
            }
            None => Err(StoreError::Constraint(format!(
                "period {} does not exist",
                period.id
            ))),
        }
    }

    fn next_entry_id(&mut self) -> EntryId {
        self.last_entry += 1;
        EntryId::new(self.last_entry)
    }

    fn next_entry_number(&mut self, journal: &str) -> u64 {
        let number = self.entry_numbers.entry(journal.to_string()).or_insert(0);
        *number += 1;
        *number
    }

    fn insert_entry(&mut self, entry: JournalEntry) -> Result<(), StoreError> {
        if !self.periods.contains_key(&entry.period) {
            return Err(StoreError::Constraint(format!(
                "entry {} references missing period {}",
                entry.id, entry.period
            )));
        }
        if self.entries.contains_key(&entry.id) {
            return Err(StoreError::Constraint(format!("duplicate entry {}", entry.id)));
        }
        self.entries.insert(entry.id, entry);
        Ok(())
    }

    fn insert_line(
        &mut self,
        entry: EntryId,
        line: NewJournalLine,
    ) -> Result<JournalLine, StoreError> {
        if !self.entries.contains_key(&entry) {
            return Err(StoreError::Constraint(format!(
                "line references missing entry {entry}"
            )));
        }
        if !self.accounts.contains_key(&line.account) {
            return Err(StoreError::Constraint(format!(
                "line references missing account {}",
                line.account
            )));
        }
        self.last_line += 1;
        let stored = JournalLine::from_new(LineId::new(self.last_line), entry, line);
        self.lines.insert(stored.id, stored.clone());
        Ok(stored)
    }
}

/// In-memory ledger store.
///
/// Intended for tests/dev. Not optimized for performance: each transaction
/// clones the whole ledger.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    state: RwLock<LedgerState>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&LedgerState) -> T) -> Result<T, StoreError> {
        let state = self.state.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(f(&state))
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn account(&self, code: &str) -> Result<Option<Account>, StoreError> {
        self.read(|s| s.accounts.get(code).cloned())
    }

    fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        self.read(|s| s.accounts.values().cloned().collect())
    }

    fn period(&self, id: PeriodId) -> Result<Option<AccountingPeriod>, StoreError> {
        self.read(|s| s.periods.get(&id).cloned())
    }

    fn periods(&self) -> Result<Vec<AccountingPeriod>, StoreError> {
        self.read(|s| s.periods.values().cloned().collect())
    }

    fn entry(&self, id: EntryId) -> Result<Option<JournalEntry>, StoreError> {
        self.read(|s| s.entries.get(&id).cloned())
    }

    fn entries(&self) -> Result<Vec<JournalEntry>, StoreError> {
        self.read(|s| s.entries.values().cloned().collect())
    }

    fn lines(&self, entry: EntryId) -> Result<Vec<JournalLine>, StoreError> {
        self.read(|s| {
            s.lines
                .values()
                .filter(|l| l.entry == entry)
                .cloned()
                .collect()
        })
    }

    fn all_lines(&self) -> Result<Vec<JournalLine>, StoreError> {
        self.read(|s| s.lines.values().cloned().collect())
    }

    fn account_lines(
        &self,
        account: &str,
        range: &DateRange,
    ) -> Result<Vec<PostedLine>, StoreError> {
        self.read(|s| {
            s.posted_lines(|entry, line| line.account == account && range.contains(entry.date))
                .collect()
        })
    }

    fn posted_lines(&self, range: &DateRange) -> Result<Vec<PostedLine>, StoreError> {
        self.read(|s| s.posted_lines(|entry, _| range.contains(entry.date)).collect())
    }

    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn LedgerTx) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut state = self.state.write().map_err(|_| StoreError::LockPoisoned)?;
        let mut staged = state.clone();
        let out = f(&mut staged)?;
        *state = staged;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use hms_accounting::AccountKind;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn caja() -> Account {
        Account {
            code: "1110".into(),
            name: "Caja".into(),
            kind: AccountKind::Asset,
            parent: None,
            level: 1,
            active: true,
        }
    }

    fn seed(store: &InMemoryLedgerStore) -> EntryId {
        store
            .transaction(|tx| -> Result<EntryId, StoreError> {
                tx.insert_account(caja())?;
                let period_id = tx.next_period_id();
                tx.insert_period(
                    AccountingPeriod::new(period_id, "2024-03", d(2024, 3, 1), d(2024, 3, 31))
                        .unwrap(),
                )?;
                let id = tx.next_entry_id();
                let number = tx.next_entry_number("GEN");
                tx.insert_entry(JournalEntry {
                    id,
                    number,
                    date: d(2024, 3, 4),
                    description: "Apertura de caja".into(),
                    journal: "GEN".into(),
                    period: period_id,
                    counterparty: None,
                    cost_center: None,
                    source_voucher: None,
                    created_at: Utc::now(),
                })?;
                tx.insert_line(id, NewJournalLine::debit("1110", dec!(100)))?;
                Ok(id)
            })
            .unwrap()
    }

    #[test]
    fn committed_writes_are_visible() {
        let store = InMemoryLedgerStore::new();
        let entry = seed(&store);

        assert_eq!(store.accounts().unwrap().len(), 1);
        assert_eq!(store.lines(entry).unwrap().len(), 1);
        assert_eq!(store.entry(entry).unwrap().unwrap().number, 1);
        assert_eq!(
            store.account_lines("1110", &DateRange::all()).unwrap()[0].description,
            "Apertura de caja"
        );
    }

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let store = InMemoryLedgerStore::new();
        let entry = seed(&store);

        let result = store.transaction(|tx| -> Result<(), StoreError> {
            tx.insert_line(entry, NewJournalLine::credit("1110", dec!(60)))?;
            tx.insert_line(entry, NewJournalLine::credit("4110", dec!(40)))?;
            Ok(())
        });

        assert!(matches!(result, Err(StoreError::Constraint(_))));
        assert_eq!(store.lines(entry).unwrap().len(), 1);
        assert_eq!(store.all_lines().unwrap().len(), 1);
    }

    #[test]
    fn entry_numbers_are_sequential_per_journal() {
        let store = InMemoryLedgerStore::new();
        let numbers = store
            .transaction(|tx| -> Result<Vec<u64>, StoreError> {
                Ok(vec![
                    tx.next_entry_number("GEN"),
                    tx.next_entry_number("VEN"),
                    tx.next_entry_number("GEN"),
                ])
            })
            .unwrap();
        assert_eq!(numbers, vec![1, 1, 2]);
    }

    #[test]
    fn date_range_applies_to_entry_dates() {
        let store = InMemoryLedgerStore::new();
        seed(&store);
        assert!(store
            .account_lines("1110", &DateRange::since(d(2024, 3, 5)))
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .account_lines("1110", &DateRange::until(d(2024, 3, 4)))
                .unwrap()
                .len(),
            1
        );
        assert!(store
            .posted_lines(&DateRange::between(d(2024, 4, 1), d(2024, 4, 30)))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn poisoned_lock_is_reported_by_every_read() {
        let store = InMemoryLedgerStore::new();
        let entry = seed(&store);

        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = store.transaction(|_| -> Result<(), StoreError> {
                panic!("writer crashed mid-transaction");
            });
        }));
        assert!(panicked.is_err());

        assert_eq!(store.entries(), Err(StoreError::LockPoisoned));
        assert_eq!(store.lines(entry), Err(StoreError::LockPoisoned));
        assert_eq!(
            store.account_lines("1110", &DateRange::all()),
            Err(StoreError::LockPoisoned)
        );
        assert_eq!(store.posted_lines(&DateRange::all()), Err(StoreError::LockPoisoned));
    }
}
