//! Accounts (`cuentas contables`) and their classification.

use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use hms_core::{DomainError, Entity};

/// Account classification in the chart of accounts.
///
/// Determines the normal balance side and which financial statement the
/// account feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Asset,
    Liability,
    Equity,
    Income,
    Expense,
    Cost,
    /// Off-balance memorandum accounts (`cuentas de orden`).
    Memo,
}

/// Side on which an account's balance naturally grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormalBalance {
    Debit,
    Credit,
}

impl NormalBalance {
    /// Signed balance of a debit/credit pair from this side's point of view.
    pub fn signed(self, debit: Decimal, credit: Decimal) -> Decimal {
        match self {
            NormalBalance::Debit => debit - credit,
            NormalBalance::Credit => credit - debit,
        }
    }
}

impl AccountKind {
    pub const ALL: [AccountKind; 7] = [
        AccountKind::Asset,
        AccountKind::Liability,
        AccountKind::Equity,
        AccountKind::Income,
        AccountKind::Expense,
        AccountKind::Cost,
        AccountKind::Memo,
    ];

    pub fn normal_balance(self) -> NormalBalance {
        match self {
            AccountKind::Asset | AccountKind::Expense | AccountKind::Cost | AccountKind::Memo => {
                NormalBalance::Debit
            }
            AccountKind::Liability | AccountKind::Equity | AccountKind::Income => {
                NormalBalance::Credit
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AccountKind::Asset => "asset",
            AccountKind::Liability => "liability",
            AccountKind::Equity => "equity",
            AccountKind::Income => "income",
            AccountKind::Expense => "expense",
            AccountKind::Cost => "cost",
            AccountKind::Memo => "memo",
        }
    }
}

impl core::fmt::Display for AccountKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the English names as well as the labels used by the hospital's
/// chart of accounts (`ACTIVO`, `PASIVO`, ...).
impl FromStr for AccountKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "asset" | "activo" => Ok(AccountKind::Asset),
            "liability" | "pasivo" => Ok(AccountKind::Liability),
            "equity" | "patrimonio" => Ok(AccountKind::Equity),
            "income" | "revenue" | "ingreso" => Ok(AccountKind::Income),
            "expense" | "gasto" => Ok(AccountKind::Expense),
            "cost" | "costo" => Ok(AccountKind::Cost),
            "memo" | "orden" => Ok(AccountKind::Memo),
            other => Err(DomainError::validation(format!(
                "unknown account kind '{other}'"
            ))),
        }
    }
}

/// A node of the chart of accounts (`cuenta contable`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub code: String, // e.g. "1110"
    pub name: String, // e.g. "Caja"
    pub kind: AccountKind,
    /// Code of the parent account, `None` for a root class.
    pub parent: Option<String>,
    /// Depth in the tree, roots are level 1.
    pub level: u8,
    pub active: bool,
}

impl Account {
    pub fn normal_balance(&self) -> NormalBalance {
        self.kind.normal_balance()
    }
}

impl Entity for Account {
    type Id = String;

    fn id(&self) -> &Self::Id {
        &self.code
    }
}

/// Request to add an account to the chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAccount {
    pub code: String,
    pub name: String,
    pub kind: AccountKind,
    pub parent: Option<String>,
}

impl NewAccount {
    pub fn root(code: impl Into<String>, name: impl Into<String>, kind: AccountKind) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            kind,
            parent: None,
        }
    }

    pub fn child(
        code: impl Into<String>,
        name: impl Into<String>,
        kind: AccountKind,
        parent: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            kind,
            parent: Some(parent.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn debit_normal_kinds_subtract_credit() {
        for kind in [AccountKind::Asset, AccountKind::Expense, AccountKind::Cost] {
            assert_eq!(kind.normal_balance().signed(dec!(100), dec!(30)), dec!(70));
        }
    }

    #[test]
    fn credit_normal_kinds_subtract_debit() {
        for kind in [AccountKind::Liability, AccountKind::Equity, AccountKind::Income] {
            assert_eq!(kind.normal_balance().signed(dec!(100), dec!(30)), dec!(-70));
        }
    }

    #[test]
    fn parses_local_labels() {
        assert_eq!("ACTIVO".parse::<AccountKind>().unwrap(), AccountKind::Asset);
        assert_eq!("Ingreso".parse::<AccountKind>().unwrap(), AccountKind::Income);
        assert_eq!("orden".parse::<AccountKind>().unwrap(), AccountKind::Memo);
        assert!("cash".parse::<AccountKind>().is_err());
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for kind in AccountKind::ALL {
            assert_eq!(kind.to_string().parse::<AccountKind>().unwrap(), kind);
        }
    }
}
