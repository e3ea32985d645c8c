//! Ledger audit tool
//!
//! Re-checks every stored journal entry against the double-entry rules and
//! prints a JSON report with the audit findings and the trial balance.
//!
//! # Usage
//! ```bash
//! DATABASE_URL=postgres://... ledger-audit [--from YYYY-MM-DD] [--to YYYY-MM-DD]
//! ```
//!
//! Exits with status 1 when any finding is reported.

use std::env;
use std::process::ExitCode;

use anyhow::{Context, bail};
use chrono::NaiveDate;
use serde::Serialize;

use hms_accounting::{AuditReport, DateRange, TrialBalance, trial_balance};
use hms_infra::{LedgerConfig, PostgresLedgerStore, db};

#[derive(Debug, Serialize)]
struct Output {
    audit: AuditReport,
    trial_balance: TrialBalance,
}

fn parse_range(args: &[String]) -> anyhow::Result<DateRange> {
    let mut range = DateRange::all();
    let mut i = 0;
    while i < args.len() {
        let value = args
            .get(i + 1)
            .with_context(|| format!("{} requires a value", args[i]))?;
        let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .with_context(|| format!("invalid date for {}: {value}", args[i]))?;
        match args[i].as_str() {
            "--from" => range.from = Some(date),
            "--to" => range.to = Some(date),
            other => bail!("unknown argument {other}; usage: ledger-audit [--from YYYY-MM-DD] [--to YYYY-MM-DD]"),
        }
        i += 2;
    }
    Ok(range)
}

async fn run() -> anyhow::Result<bool> {
    let args: Vec<String> = env::args().skip(1).collect();
    let range = parse_range(&args)?;

    let config = LedgerConfig::from_env().context("failed to load configuration")?;
    let url = config.require_database_url()?;

    tracing::info!(max_connections = config.max_connections, "connecting to database");
    let pool = db::init_pool(url, &config)
        .await
        .context("failed to connect to database")?;
    let store = PostgresLedgerStore::new(pool);

    let snapshot = store.load_snapshot().await?;
    let audit = snapshot.audit(config.balance_tolerance);
    for finding in &audit.findings {
        tracing::warn!(%finding, "audit finding");
    }

    let lines = snapshot.posted_lines();
    let trial = trial_balance(&snapshot.accounts, &lines, &range);
    if !trial.is_balanced() {
        tracing::warn!(
            debit = %trial.total_debit,
            credit = %trial.total_credit,
            "trial balance does not balance"
        );
    }

    let clean = audit.is_clean() && trial.is_balanced();
    let output = Output {
        audit,
        trial_balance: trial,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(clean)
}

#[tokio::main]
async fn main() -> ExitCode {
    hms_observability::init();

    match run().await {
        Ok(true) => {
            tracing::info!("ledger audit clean");
            ExitCode::SUCCESS
        }
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "ledger audit failed");
            ExitCode::from(2)
        }
    }
}
