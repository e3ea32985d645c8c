//! Journal entries (`asientos`) and their lines.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hms_core::{Entity, EntryId, LineId, PeriodId};

/// A book entries are recorded in (e.g. `GEN` general, `VEN` sales).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Journal {
    pub code: String,
    pub name: String,
}

impl Journal {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
        }
    }
}

/// Header of a posted journal entry. Lines are stored separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: EntryId,
    /// Sequential number within `journal`.
    pub number: u64,
    pub date: NaiveDate,
    pub description: String,
    /// Journal code.
    pub journal: String,
    pub period: PeriodId,
    /// Third party (`tercero`) the transaction is with, by document number.
    pub counterparty: Option<String>,
    pub cost_center: Option<String>,
    /// Reference to the business document that originated the entry
    /// (invoice, payroll run, POS ticket...).
    pub source_voucher: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    /// Mirror image of this entry: every line with its sides swapped, posted
    /// into `period` on `date`. The source voucher points back at this entry.
    pub fn reversal(
        &self,
        lines: &[JournalLine],
        period: PeriodId,
        date: NaiveDate,
        description: impl Into<String>,
    ) -> NewJournalEntry {
        NewJournalEntry {
            date,
            description: description.into(),
            journal: self.journal.clone(),
            period,
            counterparty: self.counterparty.clone(),
            cost_center: self.cost_center.clone(),
            source_voucher: Some(format!("reversal:{}", self.id)),
            lines: lines
                .iter()
                .map(|line| NewJournalLine::from(line).reversed())
                .collect(),
        }
    }
}

impl Entity for JournalEntry {
    type Id = EntryId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// One debit-or-credit row of a posted entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalLine {
    pub id: LineId,
    pub entry: EntryId,
    /// Account code.
    pub account: String,
    pub description: Option<String>,
    pub debit: Decimal,
    pub credit: Decimal,
    pub counterparty: Option<String>,
    pub tax_code: Option<String>,
    /// Taxable base the tax amount on this line was computed from.
    pub tax_base: Option<Decimal>,
}

impl JournalLine {
    pub fn from_new(id: LineId, entry: EntryId, line: NewJournalLine) -> Self {
        Self {
            id,
            entry,
            account: line.account,
            description: line.description,
            debit: line.debit,
            credit: line.credit,
            counterparty: line.counterparty,
            tax_code: line.tax_code,
            tax_base: line.tax_base,
        }
    }
}

/// A proposed line, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJournalLine {
    pub account: String,
    pub description: Option<String>,
    pub debit: Decimal,
    pub credit: Decimal,
    pub counterparty: Option<String>,
    pub tax_code: Option<String>,
    pub tax_base: Option<Decimal>,
}

impl NewJournalLine {
    pub fn new(account: impl Into<String>, debit: Decimal, credit: Decimal) -> Self {
        Self {
            account: account.into(),
            description: None,
            debit,
            credit,
            counterparty: None,
            tax_code: None,
            tax_base: None,
        }
    }

    pub fn debit(account: impl Into<String>, amount: Decimal) -> Self {
        Self::new(account, amount, Decimal::ZERO)
    }

    pub fn credit(account: impl Into<String>, amount: Decimal) -> Self {
        Self::new(account, Decimal::ZERO, amount)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = Some(counterparty.into());
        self
    }

    pub fn with_tax(mut self, code: impl Into<String>, base: Decimal) -> Self {
        self.tax_code = Some(code.into());
        self.tax_base = Some(base);
        self
    }

    /// Same line with debit and credit swapped.
    pub fn reversed(mut self) -> Self {
        core::mem::swap(&mut self.debit, &mut self.credit);
        self
    }
}

impl From<&JournalLine> for NewJournalLine {
    fn from(line: &JournalLine) -> Self {
        Self {
            account: line.account.clone(),
            description: line.description.clone(),
            debit: line.debit,
            credit: line.credit,
            counterparty: line.counterparty.clone(),
            tax_code: line.tax_code.clone(),
            tax_base: line.tax_base,
        }
    }
}

/// A proposed entry with its lines, as handed to the write path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJournalEntry {
    pub date: NaiveDate,
    pub description: String,
    pub journal: String,
    pub period: PeriodId,
    pub counterparty: Option<String>,
    pub cost_center: Option<String>,
    pub source_voucher: Option<String>,
    pub lines: Vec<NewJournalLine>,
}

impl NewJournalEntry {
    pub fn new(
        journal: impl Into<String>,
        period: PeriodId,
        date: NaiveDate,
        description: impl Into<String>,
    ) -> Self {
        Self {
            date,
            description: description.into(),
            journal: journal.into(),
            period,
            counterparty: None,
            cost_center: None,
            source_voucher: None,
            lines: Vec::new(),
        }
    }

    pub fn line(mut self, line: NewJournalLine) -> Self {
        self.lines.push(line);
        self
    }

    pub fn counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = Some(counterparty.into());
        self
    }

    pub fn cost_center(mut self, cost_center: impl Into<String>) -> Self {
        self.cost_center = Some(cost_center.into());
        self
    }

    pub fn source_voucher(mut self, voucher: impl Into<String>) -> Self {
        self.source_voucher = Some(voucher.into());
        self
    }
}

/// An entry header together with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedEntry {
    pub entry: JournalEntry,
    pub lines: Vec<JournalLine>,
}

impl PostedEntry {
    pub fn posted_lines(&self) -> Vec<PostedLine> {
        self.lines
            .iter()
            .map(|line| PostedLine::from_parts(&self.entry, line))
            .collect()
    }
}

/// A line joined with the entry header fields the ledger needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostedLine {
    pub entry: EntryId,
    pub line: LineId,
    pub date: NaiveDate,
    pub description: String,
    pub account: String,
    pub debit: Decimal,
    pub credit: Decimal,
}

impl PostedLine {
    pub fn from_parts(entry: &JournalEntry, line: &JournalLine) -> Self {
        Self {
            entry: entry.id,
            line: line.id,
            date: entry.date,
            description: line
                .description
                .clone()
                .unwrap_or_else(|| entry.description.clone()),
            account: line.account.clone(),
            debit: line.debit,
            credit: line.credit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn reversed_line_swaps_sides() {
        let line = NewJournalLine::debit("1110", dec!(2500000)).reversed();
        assert_eq!(line.debit, Decimal::ZERO);
        assert_eq!(line.credit, dec!(2500000));
    }

    fn consulta() -> JournalEntry {
        JournalEntry {
            id: EntryId::new(1),
            number: 1,
            date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            description: "Consulta externa".into(),
            journal: "GEN".into(),
            period: PeriodId::new(1),
            counterparty: None,
            cost_center: None,
            source_voucher: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn reversal_mirrors_every_line() {
        let mut entry = consulta();
        entry.counterparty = Some("900123456".into());
        let lines = [
            JournalLine::from_new(LineId::new(1), entry.id, NewJournalLine::debit("1110", dec!(80))),
            JournalLine::from_new(
                LineId::new(2),
                entry.id,
                NewJournalLine::credit("4110", dec!(80)).with_description("Copago"),
            ),
        ];
        let april = NaiveDate::from_ymd_opt(2024, 4, 2).unwrap();

        let reversal = entry.reversal(&lines, PeriodId::new(2), april, "Reverso consulta");

        assert_eq!(reversal.journal, "GEN");
        assert_eq!(reversal.period, PeriodId::new(2));
        assert_eq!(reversal.date, april);
        assert_eq!(reversal.source_voucher.as_deref(), Some("reversal:1"));
        assert_eq!(reversal.counterparty.as_deref(), Some("900123456"));
        assert_eq!(
            reversal.lines,
            vec![
                NewJournalLine::credit("1110", dec!(80)),
                NewJournalLine::debit("4110", dec!(80)).with_description("Copago"),
            ]
        );
    }

    #[test]
    fn posted_line_falls_back_to_entry_description() {
        let entry = consulta();
        let plain = JournalLine::from_new(
            LineId::new(1),
            entry.id,
            NewJournalLine::debit("1110", dec!(10)),
        );
        let described = JournalLine::from_new(
            LineId::new(2),
            entry.id,
            NewJournalLine::credit("4110", dec!(10)).with_description("Copago"),
        );

        assert_eq!(PostedLine::from_parts(&entry, &plain).description, "Consulta externa");
        assert_eq!(PostedLine::from_parts(&entry, &described).description, "Copago");
    }
}
