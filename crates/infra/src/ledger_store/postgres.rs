//! Postgres-backed ledger store.
//!
//! Async counterpart of [`LedgerStore`](super::LedgerStore) and
//! [`LedgerService`](crate::LedgerService): every write runs inside one
//! database transaction together with the checks that guard it, and is rolled
//! back explicitly when a check fails. The checks are the same functions the
//! in-memory write path calls.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) | `23505` | `Constraint` | Duplicate account code, concurrent entry numbering |
//! | Database (foreign key violation) | `23503` | `Constraint` | Line on a missing account or entry |
//! | Database (check constraint violation) | `23514` | `Constraint` | Negative amount, inverted period |
//! | Database (other) | Any other | `Database` | Other database errors |
//! | Other | N/A | `Database` | Pool closed, network errors, etc. |
//!
//! Row decoding failures (unknown account kind, out-of-range level) become
//! `StoreError::Decode`.
//!
//! ## Concurrency
//!
//! Posting takes a `FOR SHARE` lock on the period row, so closing a period
//! waits for in-flight postings into it. Entry numbers come from
//! `MAX(number) + 1` per journal; the `(journal, number)` unique constraint
//! turns a concurrent collision into a `Constraint` error instead of a gap or
//! duplicate.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

use hms_accounting::{
    Account, AccountKind, AccountingPeriod, AuditReport, BalanceSheet, ChartOfAccounts,
    DateRange, IncomeStatement, JournalEntry, JournalLine, LedgerError, LedgerRows, NewAccount,
    NewJournalEntry, NewJournalLine, PostedEntry, PostedLine, TrialBalance, audit_ledger,
    ensure_account_postable, is_balanced, validate_entry_lines, validate_stored_entry,
};
use hms_core::{EntryId, LineId, PeriodId, index_by_id};

use super::r#trait::StoreError;
use crate::config::LedgerConfig;
use crate::ledger_service::{
    ServiceError, ServiceResult, check_added_line, check_entry_period, ensure_no_overlap,
    log_audit,
};

/// DDL for the ledger tables. Idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ledger_accounts (
    code        TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    kind        TEXT NOT NULL,
    parent      TEXT REFERENCES ledger_accounts (code),
    level       SMALLINT NOT NULL CHECK (level > 0),
    active      BOOLEAN NOT NULL DEFAULT TRUE
);

CREATE TABLE IF NOT EXISTS ledger_periods (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    start_date  DATE NOT NULL,
    end_date    DATE NOT NULL,
    closed      BOOLEAN NOT NULL DEFAULT FALSE,
    CHECK (start_date <= end_date)
);

CREATE TABLE IF NOT EXISTS ledger_entries (
    id              BIGSERIAL PRIMARY KEY,
    number          BIGINT NOT NULL,
    date            DATE NOT NULL,
    description     TEXT NOT NULL,
    journal         TEXT NOT NULL,
    period_id       BIGINT NOT NULL REFERENCES ledger_periods (id),
    counterparty    TEXT,
    cost_center     TEXT,
    source_voucher  TEXT,
    created_at      TIMESTAMPTZ NOT NULL DEFAULT now(),
    UNIQUE (journal, number)
);

CREATE TABLE IF NOT EXISTS ledger_lines (
    id              BIGSERIAL PRIMARY KEY,
    entry_id        BIGINT NOT NULL REFERENCES ledger_entries (id),
    account         TEXT NOT NULL REFERENCES ledger_accounts (code),
    description     TEXT,
    debit           NUMERIC(18, 2) NOT NULL DEFAULT 0,
    credit          NUMERIC(18, 2) NOT NULL DEFAULT 0,
    counterparty    TEXT,
    tax_code        TEXT,
    tax_base        NUMERIC(18, 2),
    CHECK (debit >= 0 AND credit >= 0)
);

CREATE INDEX IF NOT EXISTS ledger_lines_account_idx ON ledger_lines (account);
CREATE INDEX IF NOT EXISTS ledger_lines_entry_idx ON ledger_lines (entry_id);
CREATE INDEX IF NOT EXISTS ledger_entries_date_idx ON ledger_entries (date);
"#;

const ACCOUNT_COLUMNS: &str = "code, name, kind, parent, level, active";
const PERIOD_COLUMNS: &str = "id, name, start_date, end_date, closed";
const ENTRY_COLUMNS: &str = "id, number, date, description, journal, period_id, counterparty, \
                             cost_center, source_voucher, created_at";
const LINE_COLUMNS: &str =
    "id, entry_id, account, description, debit, credit, counterparty, tax_code, tax_base";
const POSTED_LINE_SELECT: &str = "SELECT l.entry_id, l.id AS line_id, e.date, \
     COALESCE(l.description, e.description) AS description, l.account, l.debit, l.credit \
     FROM ledger_lines l JOIN ledger_entries e ON e.id = l.entry_id";

/// Postgres ledger store.
///
/// `Clone` is cheap: the pool is reference-counted.
#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the ledger tables if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    // ---- accounts ----

    #[instrument(skip(self, new), fields(code = %new.code), err)]
    pub async fn register_account(&self, new: NewAccount) -> ServiceResult<Account> {
        let mut tx = self.begin().await?;
        let existing = fetch_accounts(&mut tx).await?;
        let mut chart = ChartOfAccounts::from_accounts(existing);
        let account = match chart.insert(new) {
            Ok(account) => account.clone(),
            Err(err) => return rollback(tx, err.into()).await,
        };

        sqlx::query(
            "INSERT INTO ledger_accounts (code, name, kind, parent, level, active) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&account.code)
        .bind(&account.name)
        .bind(account.kind.as_str())
        .bind(account.parent.as_deref())
        .bind(i16::from(account.level))
        .bind(account.active)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_account", e))?;

        commit(tx).await?;
        info!(code = %account.code, kind = %account.kind, "account registered");
        Ok(account)
    }

    /// Move an account and relevel its subtree.
    #[instrument(skip(self), err)]
    pub async fn reparent_account(
        &self,
        code: &str,
        parent: Option<&str>,
    ) -> ServiceResult<Account> {
        let mut tx = self.begin().await?;
        sqlx::query("LOCK TABLE ledger_accounts IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_accounts", e))?;

        let before: BTreeMap<String, Account> = fetch_accounts(&mut tx)
            .await?
            .into_iter()
            .map(|a| (a.code.clone(), a))
            .collect();
        let mut chart = ChartOfAccounts::from_accounts(before.values().cloned());
        if let Err(err) = chart.set_parent(code, parent) {
            return rollback(tx, err.into()).await;
        }

        for account in chart.iter().filter(|a| before.get(&a.code) != Some(*a)) {
            sqlx::query("UPDATE ledger_accounts SET parent = $2, level = $3 WHERE code = $1")
                .bind(&account.code)
                .bind(account.parent.as_deref())
                .bind(i16::from(account.level))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("update_account", e))?;
        }

        let moved = chart.get(code).cloned();
        commit(tx).await?;
        moved.ok_or_else(|| LedgerError::UnknownAccount(code.to_string()).into())
    }

    #[instrument(skip(self), err)]
    pub async fn set_account_active(&self, code: &str, active: bool) -> ServiceResult<Account> {
        let row = sqlx::query(&format!(
            "UPDATE ledger_accounts SET active = $2 WHERE code = $1 RETURNING {ACCOUNT_COLUMNS}"
        ))
        .bind(code)
        .bind(active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_account_active", e))?;

        match row {
            Some(row) => Ok(decode::<AccountRow, Account>(&row, "account")?),
            None => Err(LedgerError::UnknownAccount(code.to_string()).into()),
        }
    }

    #[instrument(skip(self), err)]
    pub async fn load_account(&self, code: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM ledger_accounts WHERE code = $1"
        ))
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_account", e))?;
        row.map(|r| decode::<AccountRow, Account>(&r, "account"))
            .transpose()
    }

    #[instrument(skip(self), err)]
    pub async fn load_accounts(&self) -> Result<Vec<Account>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM ledger_accounts ORDER BY code"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_accounts", e))?;
        decode_all::<AccountRow, Account>(&rows, "account")
    }

    // ---- periods ----

    #[instrument(skip(self), err)]
    pub async fn open_period(
        &self,
        name: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> ServiceResult<AccountingPeriod> {
        if start > end {
            return Err(LedgerError::InvalidPeriodRange { start, end }.into());
        }

        let mut tx = self.begin().await?;
        // Serializes overlap checks between concurrent openers.
        sqlx::query("LOCK TABLE ledger_periods IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_periods", e))?;

        let existing = fetch_periods(&mut tx).await?;
        if let Err(err) = ensure_no_overlap(&existing, name, start, end) {
            return rollback(tx, err.into()).await;
        }

        let row = sqlx::query(&format!(
            "INSERT INTO ledger_periods (name, start_date, end_date) VALUES ($1, $2, $3) \
             RETURNING {PERIOD_COLUMNS}"
        ))
        .bind(name)
        .bind(start)
        .bind(end)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_period", e))?;
        let period = decode::<PeriodRow, AccountingPeriod>(&row, "period")?;

        commit(tx).await?;
        info!(period = %period.id, name = %period.name, "period opened");
        Ok(period)
    }

    #[instrument(skip(self), err)]
    pub async fn set_period_closed(
        &self,
        id: PeriodId,
        closed: bool,
    ) -> ServiceResult<AccountingPeriod> {
        let row = sqlx::query(&format!(
            "UPDATE ledger_periods SET closed = $2 WHERE id = $1 RETURNING {PERIOD_COLUMNS}"
        ))
        .bind(id.get())
        .bind(closed)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_period_closed", e))?;

        match row {
            Some(row) => {
                let period = decode::<PeriodRow, AccountingPeriod>(&row, "period")?;
                info!(period = %period.id, closed, "period updated");
                Ok(period)
            }
            None => Err(LedgerError::UnknownPeriod(id).into()),
        }
    }

    #[instrument(skip(self), err)]
    pub async fn load_periods(&self) -> Result<Vec<AccountingPeriod>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {PERIOD_COLUMNS} FROM ledger_periods ORDER BY start_date"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_periods", e))?;
        decode_all::<PeriodRow, AccountingPeriod>(&rows, "period")
    }

    // ---- entries ----

    /// Create an entry with all its lines in one database transaction.
    ///
    /// Same checks as the in-memory write path: line shape and balance first,
    /// then period and accounts inside the transaction.
    #[instrument(
        skip(self, new, config),
        fields(journal = %new.journal, period = %new.period, lines = new.lines.len()),
        err
    )]
    pub async fn create_entry(
        &self,
        new: &NewJournalEntry,
        config: &LedgerConfig,
    ) -> ServiceResult<PostedEntry> {
        if let Err(err) = validate_entry_lines(&new.lines, config.balance_tolerance) {
            warn!(error = %err, "journal entry rejected");
            return Err(err.into());
        }

        let mut tx = self.begin().await?;
        let written = write_entry(&mut tx, new, config.enforce_closed_periods).await;
        finish_entry(tx, written).await
    }

    /// Post the mirror image of `entry` (debits and credits swapped) into
    /// `period` on `date`. The original is read in the same transaction the
    /// reversal is written in.
    #[instrument(skip(self, description, config), err)]
    pub async fn reverse_entry(
        &self,
        entry: EntryId,
        period: PeriodId,
        date: NaiveDate,
        description: &str,
        config: &LedgerConfig,
    ) -> ServiceResult<PostedEntry> {
        let mut tx = self.begin().await?;
        let Some(original) = fetch_entry(&mut tx, entry).await? else {
            return rollback(tx, LedgerError::UnknownEntry(entry).into()).await;
        };
        let lines = fetch_lines(&mut tx, entry).await?;
        let reversal = original.reversal(&lines, period, date, description);
        if let Err(err) = validate_entry_lines(&reversal.lines, config.balance_tolerance) {
            return rollback(tx, err.into()).await;
        }

        let written = write_entry(&mut tx, &reversal, config.enforce_closed_periods).await;
        finish_entry(tx, written).await
    }

    /// Fail if the stored lines of `entry` are missing or unbalanced.
    #[instrument(skip(self, config), err)]
    pub async fn validate_entry(
        &self,
        entry: EntryId,
        config: &LedgerConfig,
    ) -> ServiceResult<()> {
        let lines = self.entry_lines(entry).await?;
        validate_stored_entry(&lines, config.balance_tolerance)?;
        Ok(())
    }

    /// Whether the stored lines of `entry` balance within one cent.
    pub async fn entry_is_balanced(&self, entry: EntryId) -> ServiceResult<bool> {
        let lines = self.entry_lines(entry).await?;
        Ok(is_balanced(&lines))
    }

    /// Add one line to an existing entry. The entry may be unbalanced
    /// afterwards.
    #[instrument(skip(self, line, config), fields(account = %line.account), err)]
    pub async fn post_line(
        &self,
        entry: EntryId,
        line: NewJournalLine,
        config: &LedgerConfig,
    ) -> ServiceResult<JournalLine> {
        let mut tx = self.begin().await?;
        match write_line(&mut tx, entry, line, config.enforce_closed_periods).await {
            Ok(stored) => {
                commit(tx).await?;
                Ok(stored)
            }
            Err(err) => rollback(tx, err).await,
        }
    }

    #[instrument(skip(self), err)]
    pub async fn load_entry(&self, id: EntryId) -> Result<Option<JournalEntry>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = $1"
        ))
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_entry", e))?;
        row.map(|r| decode::<EntryRow, JournalEntry>(&r, "entry"))
            .transpose()
    }

    #[instrument(skip(self), err)]
    pub async fn load_entries(&self) -> Result<Vec<JournalEntry>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_entries", e))?;
        decode_all::<EntryRow, JournalEntry>(&rows, "entry")
    }

    #[instrument(skip(self), err)]
    pub async fn load_lines(&self, entry: EntryId) -> Result<Vec<JournalLine>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {LINE_COLUMNS} FROM ledger_lines WHERE entry_id = $1 ORDER BY id"
        ))
        .bind(entry.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_lines", e))?;
        decode_all::<LineRow, JournalLine>(&rows, "line")
    }

    #[instrument(skip(self), err)]
    pub async fn load_all_lines(&self) -> Result<Vec<JournalLine>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {LINE_COLUMNS} FROM ledger_lines ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("load_all_lines", e))?;
        decode_all::<LineRow, JournalLine>(&rows, "line")
    }

    /// Lines of `account` whose entry date falls in `range`, oldest first.
    ///
    /// Feed the result to the balance and ledger functions of
    /// `hms-accounting`.
    #[instrument(skip(self), err)]
    pub async fn account_lines(
        &self,
        account: &str,
        range: &DateRange,
    ) -> Result<Vec<PostedLine>, StoreError> {
        let rows = sqlx::query(&format!(
            "{POSTED_LINE_SELECT} WHERE l.account = $1 \
             AND ($2::date IS NULL OR e.date >= $2) \
             AND ($3::date IS NULL OR e.date <= $3) \
             ORDER BY e.date, e.id, l.id"
        ))
        .bind(account)
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("account_lines", e))?;
        decode_all::<PostedLineRow, PostedLine>(&rows, "posted line")
    }

    /// Every line whose entry date falls in `range`, oldest first.
    #[instrument(skip(self), err)]
    pub async fn posted_lines(&self, range: &DateRange) -> Result<Vec<PostedLine>, StoreError> {
        let rows = sqlx::query(&format!(
            "{POSTED_LINE_SELECT} WHERE ($1::date IS NULL OR e.date >= $1) \
             AND ($2::date IS NULL OR e.date <= $2) \
             ORDER BY e.date, e.id, l.id"
        ))
        .bind(range.from)
        .bind(range.to)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("posted_lines", e))?;
        decode_all::<PostedLineRow, PostedLine>(&rows, "posted line")
    }

    /// Read the whole ledger in one read-only repeatable-read transaction, so
    /// the four tables agree with each other.
    #[instrument(skip(self), err)]
    pub async fn load_snapshot(&self) -> Result<LedgerSnapshot, StoreError> {
        let mut tx = self.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;

        let snapshot = LedgerSnapshot {
            accounts: fetch_accounts(&mut tx).await?,
            periods: fetch_periods(&mut tx).await?,
            entries: fetch_entries(&mut tx).await?,
            lines: fetch_all_lines(&mut tx).await?,
        };
        commit(tx).await?;
        Ok(snapshot)
    }

    /// Re-check every stored entry and line. Findings are reported, not raised.
    #[instrument(skip(self, config), err)]
    pub async fn audit(&self, config: &LedgerConfig) -> Result<AuditReport, StoreError> {
        let report = self.load_snapshot().await?.audit(config.balance_tolerance);
        log_audit(&report);
        Ok(report)
    }

    // ---- reports ----

    pub async fn account_balance(&self, code: &str, range: &DateRange) -> ServiceResult<Decimal> {
        let account = self.require_account(code).await?;
        let lines = self.account_lines(code, range).await?;
        Ok(hms_accounting::account_balance(&account, &lines, range))
    }

    pub async fn ledger(&self, code: &str, range: &DateRange) -> ServiceResult<LedgerRows> {
        let account = self.require_account(code).await?;
        let lines = self.account_lines(code, range).await?;
        Ok(hms_accounting::ledger(&account, &lines, range))
    }

    pub async fn balance_sheet(&self, as_of: Option<NaiveDate>) -> ServiceResult<BalanceSheet> {
        let accounts = self.load_accounts().await?;
        let lines = self.posted_lines(&DateRange { from: None, to: as_of }).await?;
        Ok(hms_accounting::balance_sheet(&accounts, &lines, as_of))
    }

    pub async fn income_statement(&self, range: &DateRange) -> ServiceResult<IncomeStatement> {
        let accounts = self.load_accounts().await?;
        let lines = self.posted_lines(range).await?;
        Ok(hms_accounting::income_statement(&accounts, &lines, range))
    }

    pub async fn trial_balance(&self, range: &DateRange) -> ServiceResult<TrialBalance> {
        let accounts = self.load_accounts().await?;
        let lines = self.posted_lines(range).await?;
        Ok(hms_accounting::trial_balance(&accounts, &lines, range))
    }

    async fn require_account(&self, code: &str) -> ServiceResult<Account> {
        Ok(self
            .load_account(code)
            .await?
            .ok_or_else(|| LedgerError::UnknownAccount(code.to_string()))?)
    }

    async fn entry_lines(&self, entry: EntryId) -> ServiceResult<Vec<JournalLine>> {
        if self.load_entry(entry).await?.is_none() {
            return Err(LedgerError::UnknownEntry(entry).into());
        }
        Ok(self.load_lines(entry).await?)
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, StoreError> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

/// Every account, period, entry and line of a ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub accounts: Vec<Account>,
    pub periods: Vec<AccountingPeriod>,
    pub entries: Vec<JournalEntry>,
    pub lines: Vec<JournalLine>,
}

impl LedgerSnapshot {
    pub fn audit(&self, tolerance: Decimal) -> AuditReport {
        audit_ledger(
            &self.accounts,
            &self.periods,
            &self.entries,
            &self.lines,
            tolerance,
        )
    }

    /// Lines joined with their entries. Orphan lines are left out.
    pub fn posted_lines(&self) -> Vec<PostedLine> {
        let entries = index_by_id(&self.entries);
        self.lines
            .iter()
            .filter_map(|line| {
                entries
                    .get(&line.entry)
                    .map(|entry| PostedLine::from_parts(entry, line))
            })
            .collect()
    }
}

async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), StoreError> {
    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_transaction", e))
}

async fn rollback<T>(tx: Transaction<'static, Postgres>, err: ServiceError) -> ServiceResult<T> {
    tx.rollback()
        .await
        .map_err(|e| map_sqlx_error("rollback", e))?;
    Err(err)
}

/// Commit a written entry, or roll back everything it staged.
async fn finish_entry(
    tx: Transaction<'static, Postgres>,
    written: ServiceResult<PostedEntry>,
) -> ServiceResult<PostedEntry> {
    match written {
        Ok(posted) => {
            commit(tx).await?;
            info!(
                entry = %posted.entry.id,
                number = posted.entry.number,
                "journal entry created"
            );
            Ok(posted)
        }
        Err(err) => {
            warn!(error = %err, "journal entry rolled back");
            rollback(tx, err).await
        }
    }
}

async fn write_entry(
    tx: &mut Transaction<'static, Postgres>,
    new: &NewJournalEntry,
    enforce_closed_periods: bool,
) -> ServiceResult<PostedEntry> {
    let period = fetch_period_for_share(tx, new.period).await?;
    check_entry_period(period.as_ref(), new.period, new.date, enforce_closed_periods)?;

    let number: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(number), 0) + 1 FROM ledger_entries WHERE journal = $1",
    )
    .bind(&new.journal)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("next_entry_number", e))?;

    let row = sqlx::query(
        "INSERT INTO ledger_entries \
         (number, date, description, journal, period_id, counterparty, cost_center, source_voucher) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING id, created_at",
    )
    .bind(number)
    .bind(new.date)
    .bind(&new.description)
    .bind(&new.journal)
    .bind(new.period.get())
    .bind(new.counterparty.as_deref())
    .bind(new.cost_center.as_deref())
    .bind(new.source_voucher.as_deref())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::Constraint(format!(
                "concurrent posting detected: {} number {} already exists",
                new.journal, number
            ))
        } else {
            map_sqlx_error("insert_entry", e)
        }
    })?;

    let id: i64 = row.try_get("id").map_err(decode_error("entry"))?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(decode_error("entry"))?;
    let entry = JournalEntry {
        id: EntryId::new(id),
        number: to_u64(number, "entry number")?,
        date: new.date,
        description: new.description.clone(),
        journal: new.journal.clone(),
        period: new.period,
        counterparty: new.counterparty.clone(),
        cost_center: new.cost_center.clone(),
        source_voucher: new.source_voucher.clone(),
        created_at,
    };

    let mut lines = Vec::with_capacity(new.lines.len());
    for line in &new.lines {
        lines.push(insert_line(tx, entry.id, line.clone()).await?);
    }
    Ok(PostedEntry { entry, lines })
}

async fn write_line(
    tx: &mut Transaction<'static, Postgres>,
    entry: EntryId,
    line: NewJournalLine,
    enforce_closed_periods: bool,
) -> ServiceResult<JournalLine> {
    let period_id: Option<i64> =
        sqlx::query_scalar("SELECT period_id FROM ledger_entries WHERE id = $1")
            .bind(entry.get())
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("load_entry", e))?;
    let period_id = PeriodId::new(period_id.ok_or(LedgerError::UnknownEntry(entry))?);

    let period = fetch_period_for_share(tx, period_id).await?;
    check_added_line(period.as_ref(), period_id, &line, enforce_closed_periods)?;

    insert_line(tx, entry, line).await
}

async fn insert_line(
    tx: &mut Transaction<'static, Postgres>,
    entry: EntryId,
    line: NewJournalLine,
) -> ServiceResult<JournalLine> {
    let account = fetch_account(tx, &line.account).await?;
    ensure_account_postable(account.as_ref(), &line.account)?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO ledger_lines \
         (entry_id, account, description, debit, credit, counterparty, tax_code, tax_base) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING id",
    )
    .bind(entry.get())
    .bind(&line.account)
    .bind(line.description.as_deref())
    .bind(line.debit)
    .bind(line.credit)
    .bind(line.counterparty.as_deref())
    .bind(line.tax_code.as_deref())
    .bind(line.tax_base)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_line", e))?;

    Ok(JournalLine::from_new(LineId::new(id), entry, line))
}

async fn fetch_account(
    tx: &mut Transaction<'static, Postgres>,
    code: &str,
) -> Result<Option<Account>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM ledger_accounts WHERE code = $1"
    ))
    .bind(code)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("load_account", e))?;
    row.map(|r| decode::<AccountRow, Account>(&r, "account"))
        .transpose()
}

async fn fetch_accounts(tx: &mut Transaction<'static, Postgres>) -> Result<Vec<Account>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM ledger_accounts ORDER BY code"
    ))
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("load_accounts", e))?;
    decode_all::<AccountRow, Account>(&rows, "account")
}

async fn fetch_periods(
    tx: &mut Transaction<'static, Postgres>,
) -> Result<Vec<AccountingPeriod>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {PERIOD_COLUMNS} FROM ledger_periods ORDER BY start_date"
    ))
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("load_periods", e))?;
    decode_all::<PeriodRow, AccountingPeriod>(&rows, "period")
}

async fn fetch_entry(
    tx: &mut Transaction<'static, Postgres>,
    id: EntryId,
) -> Result<Option<JournalEntry>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE id = $1"
    ))
    .bind(id.get())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("load_entry", e))?;
    row.map(|r| decode::<EntryRow, JournalEntry>(&r, "entry"))
        .transpose()
}

async fn fetch_entries(
    tx: &mut Transaction<'static, Postgres>,
) -> Result<Vec<JournalEntry>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {ENTRY_COLUMNS} FROM ledger_entries ORDER BY id"
    ))
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("load_entries", e))?;
    decode_all::<EntryRow, JournalEntry>(&rows, "entry")
}

async fn fetch_lines(
    tx: &mut Transaction<'static, Postgres>,
    entry: EntryId,
) -> Result<Vec<JournalLine>, StoreError> {
    let rows = sqlx::query(&format!(
        "SELECT {LINE_COLUMNS} FROM ledger_lines WHERE entry_id = $1 ORDER BY id"
    ))
    .bind(entry.get())
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("load_lines", e))?;
    decode_all::<LineRow, JournalLine>(&rows, "line")
}

async fn fetch_all_lines(
    tx: &mut Transaction<'static, Postgres>,
) -> Result<Vec<JournalLine>, StoreError> {
    let rows = sqlx::query(&format!("SELECT {LINE_COLUMNS} FROM ledger_lines ORDER BY id"))
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("load_all_lines", e))?;
    decode_all::<LineRow, JournalLine>(&rows, "line")
}

async fn fetch_period_for_share(
    tx: &mut Transaction<'static, Postgres>,
    id: PeriodId,
) -> Result<Option<AccountingPeriod>, StoreError> {
    let row = sqlx::query(&format!(
        "SELECT {PERIOD_COLUMNS} FROM ledger_periods WHERE id = $1 FOR SHARE"
    ))
    .bind(id.get())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("load_period", e))?;
    row.map(|r| decode::<PeriodRow, AccountingPeriod>(&r, "period"))
        .transpose()
}

/// Map SQLx errors to `StoreError`.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            match db_err.code().as_deref() {
                // unique, foreign key, check
                Some("23505") | Some("23503") | Some("23514") => {
                    StoreError::Constraint(format!("{operation}: {message}"))
                }
                _ => StoreError::Database {
                    operation: operation.to_string(),
                    message,
                },
            }
        }
        other => StoreError::Database {
            operation: operation.to_string(),
            message: other.to_string(),
        },
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        if let Some(code) = db_err.code() {
            return code.as_ref() == "23505";
        }
    }
    false
}

fn decode_error(what: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |e| StoreError::Decode {
        what,
        message: e.to_string(),
    }
}

fn to_u64(value: i64, what: &'static str) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Decode {
        what,
        message: format!("negative value {value}"),
    })
}

fn decode<R, T>(row: &PgRow, what: &'static str) -> Result<T, StoreError>
where
    R: for<'r> FromRow<'r, PgRow>,
    T: TryFrom<R, Error = StoreError>,
{
    let raw = R::from_row(row).map_err(decode_error(what))?;
    T::try_from(raw)
}

fn decode_all<R, T>(rows: &[PgRow], what: &'static str) -> Result<Vec<T>, StoreError>
where
    R: for<'r> FromRow<'r, PgRow>,
    T: TryFrom<R, Error = StoreError>,
{
    rows.iter().map(|row| decode::<R, T>(row, what)).collect()
}

// SQLx row types

#[derive(Debug)]
struct AccountRow {
    code: String,
    name: String,
    kind: String,
    parent: Option<String>,
    level: i16,
    active: bool,
}

impl<'r> FromRow<'r, PgRow> for AccountRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            code: row.try_get("code")?,
            name: row.try_get("name")?,
            kind: row.try_get("kind")?,
            parent: row.try_get("parent")?,
            level: row.try_get("level")?,
            active: row.try_get("active")?,
        })
    }
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let kind: AccountKind = row.kind.parse().map_err(|e| StoreError::Decode {
            what: "account kind",
            message: format!("{e}"),
        })?;
        let level = u8::try_from(row.level).map_err(|_| StoreError::Decode {
            what: "account level",
            message: format!("level {} of {} out of range", row.level, row.code),
        })?;
        Ok(Account {
            code: row.code,
            name: row.name,
            kind,
            parent: row.parent,
            level,
            active: row.active,
        })
    }
}

#[derive(Debug)]
struct PeriodRow {
    id: i64,
    name: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    closed: bool,
}

impl<'r> FromRow<'r, PgRow> for PeriodRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            start_date: row.try_get("start_date")?,
            end_date: row.try_get("end_date")?,
            closed: row.try_get("closed")?,
        })
    }
}

impl TryFrom<PeriodRow> for AccountingPeriod {
    type Error = StoreError;

    fn try_from(row: PeriodRow) -> Result<Self, Self::Error> {
        Ok(AccountingPeriod {
            id: PeriodId::new(row.id),
            name: row.name,
            start: row.start_date,
            end: row.end_date,
            closed: row.closed,
        })
    }
}

#[derive(Debug)]
struct EntryRow {
    id: i64,
    number: i64,
    date: NaiveDate,
    description: String,
    journal: String,
    period_id: i64,
    counterparty: Option<String>,
    cost_center: Option<String>,
    source_voucher: Option<String>,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for EntryRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            number: row.try_get("number")?,
            date: row.try_get("date")?,
            description: row.try_get("description")?,
            journal: row.try_get("journal")?,
            period_id: row.try_get("period_id")?,
            counterparty: row.try_get("counterparty")?,
            cost_center: row.try_get("cost_center")?,
            source_voucher: row.try_get("source_voucher")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl TryFrom<EntryRow> for JournalEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(JournalEntry {
            id: EntryId::new(row.id),
            number: to_u64(row.number, "entry number")?,
            date: row.date,
            description: row.description,
            journal: row.journal,
            period: PeriodId::new(row.period_id),
            counterparty: row.counterparty,
            cost_center: row.cost_center,
            source_voucher: row.source_voucher,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug)]
struct LineRow {
    id: i64,
    entry_id: i64,
    account: String,
    description: Option<String>,
    debit: Decimal,
    credit: Decimal,
    counterparty: Option<String>,
    tax_code: Option<String>,
    tax_base: Option<Decimal>,
}

impl<'r> FromRow<'r, PgRow> for LineRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            entry_id: row.try_get("entry_id")?,
            account: row.try_get("account")?,
            description: row.try_get("description")?,
            debit: row.try_get("debit")?,
            credit: row.try_get("credit")?,
            counterparty: row.try_get("counterparty")?,
            tax_code: row.try_get("tax_code")?,
            tax_base: row.try_get("tax_base")?,
        })
    }
}

impl TryFrom<LineRow> for JournalLine {
    type Error = StoreError;

    fn try_from(row: LineRow) -> Result<Self, Self::Error> {
        Ok(JournalLine {
            id: LineId::new(row.id),
            entry: EntryId::new(row.entry_id),
            account: row.account,
            description: row.description,
            debit: row.debit,
            credit: row.credit,
            counterparty: row.counterparty,
            tax_code: row.tax_code,
            tax_base: row.tax_base,
        })
    }
}

#[derive(Debug)]
struct PostedLineRow {
    entry_id: i64,
    line_id: i64,
    date: NaiveDate,
    description: String,
    account: String,
    debit: Decimal,
    credit: Decimal,
}

impl<'r> FromRow<'r, PgRow> for PostedLineRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            entry_id: row.try_get("entry_id")?,
            line_id: row.try_get("line_id")?,
            date: row.try_get("date")?,
            description: row.try_get("description")?,
            account: row.try_get("account")?,
            debit: row.try_get("debit")?,
            credit: row.try_get("credit")?,
        })
    }
}

impl TryFrom<PostedLineRow> for PostedLine {
    type Error = StoreError;

    fn try_from(row: PostedLineRow) -> Result<Self, Self::Error> {
        Ok(PostedLine {
            entry: EntryId::new(row.entry_id),
            line: LineId::new(row.line_id),
            date: row.date,
            description: row.description,
            account: row.account,
            debit: row.debit,
            credit: row.credit,
        })
    }
}
