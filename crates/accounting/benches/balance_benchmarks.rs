use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::NaiveDate;
use hms_accounting::{
    Account, AccountKind, DateRange, PostedLine, account_balance, ledger, trial_balance,
};
use hms_core::{EntryId, LineId};
use rust_decimal::Decimal;

fn accounts() -> Vec<Account> {
    ["1110", "1120", "2205", "4110", "5105"]
        .iter()
        .zip([
            AccountKind::Asset,
            AccountKind::Asset,
            AccountKind::Liability,
            AccountKind::Income,
            AccountKind::Expense,
        ])
        .map(|(code, kind)| Account {
            code: code.to_string(),
            name: code.to_string(),
            kind,
            parent: None,
            level: 1,
            active: true,
        })
        .collect()
}

/// `entries` two-line entries spread over one year, cycling through the accounts.
fn journal(entries: usize) -> Vec<PostedLine> {
    let codes = ["1110", "1120", "2205", "4110", "5105"];
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
    let mut lines = Vec::with_capacity(entries * 2);
    for i in 0..entries {
        let date = start + chrono::Days::new((i % 365) as u64);
        let amount = Decimal::new((i as i64 % 97 + 1) * 1000, 2);
        let entry = EntryId::new(i as i64 + 1);
        lines.push(PostedLine {
            entry,
            line: LineId::new(2 * i as i64 + 1),
            date,
            description: "bench".to_string(),
            account: codes[i % codes.len()].to_string(),
            debit: amount,
            credit: Decimal::ZERO,
        });
        lines.push(PostedLine {
            entry,
            line: LineId::new(2 * i as i64 + 2),
            date,
            description: "bench".to_string(),
            account: codes[(i + 1) % codes.len()].to_string(),
            debit: Decimal::ZERO,
            credit: amount,
        });
    }
    lines
}

fn bench_balance(c: &mut Criterion) {
    let accounts = accounts();
    let mut group = c.benchmark_group("account_balance");
    for entries in [1_000usize, 10_000, 50_000] {
        let lines = journal(entries);
        group.throughput(Throughput::Elements((entries * 2) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(entries), &lines, |b, lines| {
            b.iter(|| account_balance(black_box(&accounts[0]), lines, &DateRange::all()))
        });
    }
    group.finish();
}

fn bench_ledger(c: &mut Criterion) {
    let accounts = accounts();
    let mut group = c.benchmark_group("ledger");
    for entries in [1_000usize, 10_000] {
        let lines = journal(entries);
        group.bench_with_input(BenchmarkId::from_parameter(entries), &lines, |b, lines| {
            b.iter(|| ledger(black_box(&accounts[1]), lines, &DateRange::all()).count())
        });
    }
    group.finish();
}

fn bench_trial_balance(c: &mut Criterion) {
    let accounts = accounts();
    let lines = journal(10_000);
    c.bench_function("trial_balance_10k", |b| {
        b.iter(|| trial_balance(black_box(&accounts), &lines, &DateRange::all()))
    });
}

criterion_group!(benches, bench_balance, bench_ledger, bench_trial_balance);
criterion_main!(benches);
