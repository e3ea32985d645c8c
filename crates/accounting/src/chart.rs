//! Chart of accounts (`plan de cuentas`).
//!
//! Accounts form a tree through their `parent` code. Every write goes through
//! this type so code uniqueness, parent existence and acyclicity are checked
//! before the edge is stored rather than trusted by convention.

use std::collections::BTreeMap;

use crate::account::{Account, NewAccount};
use crate::error::{LedgerError, LedgerResult};

/// In-memory chart of accounts, iterated in code order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartOfAccounts {
    accounts: BTreeMap<String, Account>,
}

impl ChartOfAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a chart from already-validated accounts (e.g. loaded from a store).
    pub fn from_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|a| (a.code.clone(), a))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&Account> {
        self.accounts.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.accounts.contains_key(code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn active(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values().filter(|a| a.active)
    }

    /// Add a new account; the level is derived from the parent.
    pub fn insert(&mut self, new: NewAccount) -> LedgerResult<&Account> {
        let code = new.code.trim().to_string();
        if code.is_empty() {
            return Err(LedgerError::EmptyAccountCode);
        }
        if self.accounts.contains_key(&code) {
            return Err(LedgerError::DuplicateAccount(code));
        }

        let level = match &new.parent {
            Some(parent) => {
                let parent = self
                    .accounts
                    .get(parent)
                    .ok_or_else(|| LedgerError::UnknownAccount(parent.clone()))?;
                parent.level.saturating_add(1)
            }
            None => 1,
        };

        let account = Account {
            code: code.clone(),
            name: new.name,
            kind: new.kind,
            parent: new.parent,
            level,
            active: true,
        };
        Ok(self.accounts.entry(code).or_insert(account))
    }

    /// Move `code` under `parent` (or make it a root).
    ///
    /// Rejects the edge if `parent` is `code` itself or one of its descendants.
    /// Levels of the whole moved subtree are recomputed.
    pub fn set_parent(&mut self, code: &str, parent: Option<&str>) -> LedgerResult<()> {
        if !self.accounts.contains_key(code) {
            return Err(LedgerError::UnknownAccount(code.to_string()));
        }

        let base_level = match parent {
            Some(p) => {
                let parent_account = self
                    .accounts
                    .get(p)
                    .ok_or_else(|| LedgerError::UnknownAccount(p.to_string()))?;
                if p == code || self.ancestors(p).any(|a| a.code == code) {
                    return Err(LedgerError::ParentCycle {
                        account: code.to_string(),
                        parent: p.to_string(),
                    });
                }
                parent_account.level.saturating_add(1)
            }
            None => 1,
        };

        if let Some(account) = self.accounts.get_mut(code) {
            account.parent = parent.map(str::to_string);
            account.level = base_level;
        }
        self.relevel_descendants(code, base_level);
        Ok(())
    }

    pub fn deactivate(&mut self, code: &str) -> LedgerResult<()> {
        self.set_active(code, false)
    }

    pub fn activate(&mut self, code: &str) -> LedgerResult<()> {
        self.set_active(code, true)
    }

    fn set_active(&mut self, code: &str, active: bool) -> LedgerResult<()> {
        let account = self
            .accounts
            .get_mut(code)
            .ok_or_else(|| LedgerError::UnknownAccount(code.to_string()))?;
        account.active = active;
        Ok(())
    }

    /// Direct children of `code`, in code order.
    pub fn children<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a Account> + 'a {
        self.accounts
            .values()
            .filter(move |a| a.parent.as_deref() == Some(code))
    }

    /// Ancestors of `code`, nearest first.
    pub fn ancestors<'a>(&'a self, code: &str) -> Ancestors<'a> {
        Ancestors {
            chart: self,
            next: self.accounts.get(code).and_then(|a| a.parent.as_deref()),
            remaining: self.accounts.len(),
        }
    }

    fn relevel_descendants(&mut self, code: &str, level: u8) {
        let mut stack = vec![(code.to_string(), level)];
        while let Some((current, current_level)) = stack.pop() {
            let children: Vec<String> = self
                .children(&current)
                .map(|a| a.code.clone())
                .collect();
            for child in children {
                let child_level = current_level.saturating_add(1);
                if let Some(account) = self.accounts.get_mut(&child) {
                    account.level = child_level;
                }
                stack.push((child, child_level));
            }
        }
    }
}

/// Iterator over an account's parent chain.
///
/// Bounded by the chart size so a corrupted (cyclic) chart loaded from
/// storage cannot loop forever.
pub struct Ancestors<'a> {
    chart: &'a ChartOfAccounts,
    next: Option<&'a str>,
    remaining: usize,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a Account;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let account = self.chart.accounts.get(self.next?)?;
        self.next = account.parent.as_deref();
        Some(account)
    }
}
