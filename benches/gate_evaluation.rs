// Gate Evaluation Benchmarks
//
// The drain loop evaluates the gate before every dispatch and the stats
// endpoint does the same on each read, so both should stay well under a
// microsecond even with a full day's log.
//
// Key metrics:
// - Gate evaluation against a full daily log
// - Stats computation
// - Ledger snapshot for persistence

use chrono::{TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use genai_gate::rate_limit::gate;
use genai_gate::rate_limit::{RateLimitConfig, UsageLedger, UsageStats};
use std::hint::black_box;
use std::time::Duration;

fn ledger_with(entries: usize) -> UsageLedger {
    let midnight = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();
    let mut ledger = UsageLedger::new();
    for i in 0..entries {
        ledger.record_request(
            midnight + chrono::Duration::seconds(i as i64 * 30),
            "gemini-2.5-flash",
        );
    }
    ledger
}

/// Benchmark: gate evaluation for growing logs
fn bench_gate_evaluate(c: &mut Criterion) {
    let limits = RateLimitConfig::with_limits(8, 10_000, Duration::from_secs(8));
    let mut group = c.benchmark_group("gate_evaluate");

    for entries in [0usize, 50, 200, 2000] {
        let ledger = ledger_with(entries);
        let now = Utc.with_ymd_and_hms(2026, 1, 15, 23, 0, 0).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(entries), &ledger, |b, ledger| {
            b.iter(|| black_box(gate::evaluate(&limits, black_box(ledger), now)));
        });
    }

    group.finish();
}

/// Benchmark: usage stats at the default daily budget
fn bench_usage_stats(c: &mut Criterion) {
    let limits = RateLimitConfig::default();
    let ledger = ledger_with(200);
    let now = Utc.with_ymd_and_hms(2026, 1, 15, 23, 0, 0).unwrap();

    c.bench_function("usage_stats", |b| {
        b.iter(|| black_box(UsageStats::compute(&limits, black_box(&ledger), now, true, 3)));
    });
}

/// Benchmark: snapshot plus JSON encoding of a full day
fn bench_snapshot(c: &mut Criterion) {
    let ledger = ledger_with(200);
    let now = Utc.with_ymd_and_hms(2026, 1, 15, 23, 0, 0).unwrap();

    c.bench_function("ledger_snapshot_json", |b| {
        b.iter(|| {
            let record = ledger.snapshot(now);
            black_box(serde_json::to_vec(&record).unwrap())
        });
    });
}

criterion_group!(benches, bench_gate_evaluate, bench_usage_stats, bench_snapshot);
criterion_main!(benches);
