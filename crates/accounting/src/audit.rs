//! Integrity audit over a whole ledger.
//!
//! Re-checks the rules the write path enforces against data as it is stored,
//! which may have been edited after posting. Findings are collected, never
//! raised.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hms_core::{EntryId, LineId, PeriodId, index_by_id};

use crate::account::Account;
use crate::chart::ChartOfAccounts;
use crate::journal::{JournalEntry, JournalLine};
use crate::period::AccountingPeriod;
use crate::validation::{totals, validate_line};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditFinding {
    UnbalancedEntry {
        entry: EntryId,
        debit: Decimal,
        credit: Decimal,
    },
    EmptyEntry {
        entry: EntryId,
    },
    InvalidLine {
        entry: EntryId,
        line: LineId,
        reason: String,
    },
    UnknownAccount {
        entry: EntryId,
        line: LineId,
        account: String,
    },
    OrphanLine {
        entry: EntryId,
        line: LineId,
    },
    UnknownPeriod {
        entry: EntryId,
        period: PeriodId,
    },
    DateOutsidePeriod {
        entry: EntryId,
        date: NaiveDate,
        period: PeriodId,
    },
    AccountCycle {
        account: String,
    },
}

impl core::fmt::Display for AuditFinding {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AuditFinding::UnbalancedEntry {
                entry,
                debit,
                credit,
            } => write!(f, "entry {entry} is unbalanced (debit {debit}, credit {credit})"),
            AuditFinding::EmptyEntry { entry } => write!(f, "entry {entry} has no lines"),
            AuditFinding::InvalidLine {
                entry,
                line,
                reason,
            } => write!(f, "line {line} of entry {entry}: {reason}"),
            AuditFinding::UnknownAccount {
                entry,
                line,
                account,
            } => write!(f, "line {line} of entry {entry} uses unknown account {account}"),
            AuditFinding::OrphanLine { entry, line } => {
                write!(f, "line {line} references missing entry {entry}")
            }
            AuditFinding::UnknownPeriod { entry, period } => {
                write!(f, "entry {entry} references missing period {period}")
            }
            AuditFinding::DateOutsidePeriod {
                entry,
                date,
                period,
            } => write!(f, "entry {entry} dated {date} lies outside period {period}"),
            AuditFinding::AccountCycle { account } => {
                write!(f, "account {account} is its own ancestor")
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    pub accounts_checked: usize,
    pub entries_checked: usize,
    pub lines_checked: usize,
    pub findings: Vec<AuditFinding>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

pub fn audit_ledger(
    accounts: &[Account],
    periods: &[AccountingPeriod],
    entries: &[JournalEntry],
    lines: &[JournalLine],
    tolerance: Decimal,
) -> AuditReport {
    let mut findings = Vec::new();

    let chart = ChartOfAccounts::from_accounts(accounts.iter().cloned());
    for account in chart.iter() {
        if chart.ancestors(&account.code).any(|a| a.code == account.code) {
            findings.push(AuditFinding::AccountCycle {
                account: account.code.clone(),
            });
        }
    }

    let periods = index_by_id(periods);
    let mut by_entry: BTreeMap<EntryId, Vec<&JournalLine>> =
        entries.iter().map(|e| (e.id, Vec::new())).collect();

    for line in lines {
        let Some(bucket) = by_entry.get_mut(&line.entry) else {
            findings.push(AuditFinding::OrphanLine {
                entry: line.entry,
                line: line.id,
            });
            continue;
        };
        bucket.push(line);

        if let Err(reason) = validate_line(line.debit, line.credit) {
            findings.push(AuditFinding::InvalidLine {
                entry: line.entry,
                line: line.id,
                reason: reason.to_string(),
            });
        }
        if !chart.contains(&line.account) {
            findings.push(AuditFinding::UnknownAccount {
                entry: line.entry,
                line: line.id,
                account: line.account.clone(),
            });
        }
    }

    for entry in entries {
        match periods.get(&entry.period) {
            None => findings.push(AuditFinding::UnknownPeriod {
                entry: entry.id,
                period: entry.period,
            }),
            Some(period) if !period.contains(entry.date) => {
                findings.push(AuditFinding::DateOutsidePeriod {
                    entry: entry.id,
                    date: entry.date,
                    period: entry.period,
                })
            }
            Some(_) => {}
        }

        let entry_lines = by_entry.get(&entry.id).map(Vec::as_slice).unwrap_or_default();
        if entry_lines.is_empty() {
            findings.push(AuditFinding::EmptyEntry { entry: entry.id });
            continue;
        }
        let (debit, credit) = totals(entry_lines.iter().copied());
        if (debit - credit).abs() >= tolerance {
            findings.push(AuditFinding::UnbalancedEntry {
                entry: entry.id,
                debit,
                credit,
            });
        }
    }

    AuditReport {
        accounts_checked: accounts.len(),
        entries_checked: entries.len(),
        lines_checked: lines.len(),
        findings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::AccountKind;
    use crate::journal::NewJournalLine;
    use crate::validation::BALANCE_TOLERANCE;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn acc(code: &str, kind: AccountKind, parent: Option<&str>) -> Account {
        Account {
            code: code.into(),
            name: code.into(),
            kind,
            parent: parent.map(str::to_string),
            level: 1,
            active: true,
        }
    }

    fn entry(id: i64, date: NaiveDate) -> JournalEntry {
        JournalEntry {
            id: EntryId::new(id),
            number: id as u64,
            date,
            description: format!("entry {id}"),
            journal: "GEN".into(),
            period: PeriodId::new(1),
            counterparty: None,
            cost_center: None,
            source_voucher: None,
            created_at: Utc::now(),
        }
    }

    fn line(id: i64, entry: i64, new: NewJournalLine) -> JournalLine {
        JournalLine::from_new(LineId::new(id), EntryId::new(entry), new)
    }

    fn march() -> Vec<AccountingPeriod> {
        vec![AccountingPeriod::new(PeriodId::new(1), "2024-03", d(2024, 3, 1), d(2024, 3, 31)).unwrap()]
    }

    #[test]
    fn clean_ledger_has_no_findings() {
        let accounts = vec![
            acc("1110", AccountKind::Asset, None),
            acc("4110", AccountKind::Income, None),
        ];
        let entries = vec![entry(1, d(2024, 3, 4))];
        let lines = vec![
            line(1, 1, NewJournalLine::debit("1110", dec!(2500000))),
            line(2, 1, NewJournalLine::credit("4110", dec!(2500000))),
        ];

        let report = audit_ledger(&accounts, &march(), &entries, &lines, BALANCE_TOLERANCE);
        assert!(report.is_clean(), "{:?}", report.findings);
        assert_eq!(report.lines_checked, 2);
    }

    #[test]
    fn edited_rows_are_reported() {
        let accounts = vec![
            acc("1110", AccountKind::Asset, None),
            acc("4110", AccountKind::Income, None),
        ];
        let entries = vec![entry(1, d(2024, 3, 4)), entry(2, d(2024, 4, 9)), entry(3, d(2024, 3, 5))];
        let lines = vec![
            line(1, 1, NewJournalLine::debit("1110", dec!(500))),
            line(2, 1, NewJournalLine::new("4110", dec!(500), dec!(300))),
            line(3, 2, NewJournalLine::debit("9999", dec!(10))),
            line(4, 2, NewJournalLine::credit("4110", dec!(10))),
            line(5, 7, NewJournalLine::credit("4110", dec!(1))),
        ];

        let report = audit_ledger(&accounts, &march(), &entries, &lines, BALANCE_TOLERANCE);
        let f = &report.findings;

        assert!(f.contains(&AuditFinding::InvalidLine {
            entry: EntryId::new(1),
            line: LineId::new(2),
            reason: "a line cannot carry both a debit and a credit".into(),
        }));
        assert!(f.contains(&AuditFinding::UnbalancedEntry {
            entry: EntryId::new(1),
            debit: dec!(1000),
            credit: dec!(300),
        }));
        assert!(f.contains(&AuditFinding::UnknownAccount {
            entry: EntryId::new(2),
            line: LineId::new(3),
            account: "9999".into(),
        }));
        assert!(f.contains(&AuditFinding::DateOutsidePeriod {
            entry: EntryId::new(2),
            date: d(2024, 4, 9),
            period: PeriodId::new(1),
        }));
        assert!(f.contains(&AuditFinding::EmptyEntry { entry: EntryId::new(3) }));
        assert!(f.contains(&AuditFinding::OrphanLine {
            entry: EntryId::new(7),
            line: LineId::new(5),
        }));
        assert_eq!(f.len(), 6);
    }

    #[test]
    fn cyclic_chart_is_reported() {
        let accounts = vec![
            acc("A", AccountKind::Asset, Some("B")),
            acc("B", AccountKind::Asset, Some("A")),
            acc("C", AccountKind::Asset, None),
        ];
        let report = audit_ledger(&accounts, &[], &[], &[], BALANCE_TOLERANCE);
        assert_eq!(
            report.findings,
            vec![
                AuditFinding::AccountCycle { account: "A".into() },
                AuditFinding::AccountCycle { account: "B".into() },
            ]
        );
    }

    #[test]
    fn findings_render_for_logs() {
        let finding = AuditFinding::EmptyEntry { entry: EntryId::new(4) };
        assert_eq!(finding.to_string(), "entry 4 has no lines");
    }
}
