use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use piggybank_core::{Currency, MovementId};
use piggybank_infra::{InMemoryLedgerStore, LedgerConfig, LedgerService, LedgerStore};
use piggybank_ledger::{LedgerSnapshot, Movement, PiggyBank};

fn in_memory_service() -> LedgerService<InMemoryLedgerStore> {
    LedgerService::in_memory(&LedgerConfig::default()).unwrap()
}

fn bench_deposit_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("deposit_latency");
    group.throughput(Throughput::Elements(1));

    group.bench_function("in_memory_no_subscribers", |b| {
        let service = in_memory_service();
        b.iter(|| {
            black_box(service.deposit(black_box(dec!(1.25))).unwrap());
        });
    });

    // Subscribers are drained by nobody: publish only enqueues, so this should
    // stay close to the no-subscriber case.
    for subscribers in [1usize, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("in_memory_with_subscribers", subscribers),
            &subscribers,
            |b, &n| {
                let service = in_memory_service();
                let _subs: Vec<_> = (0..n).map(|_| service.subscribe()).collect();
                b.iter(|| {
                    black_box(service.deposit(black_box(dec!(1.25))).unwrap());
                });
            },
        );
    }

    group.finish();
}

fn seeded_log(count: u64) -> (Vec<Movement>, LedgerSnapshot) {
    let now = Utc::now();
    let movements: Vec<Movement> = (1..=count)
        .map(|id| Movement::deposit(MovementId::new(id), dec!(0.10), now, "").unwrap())
        .collect();
    let balance = Decimal::new(10 * count as i64, 2);
    let snapshot = LedgerSnapshot::from_parts(balance, Currency::Uah, count).unwrap();
    (movements, snapshot)
}

fn bench_recovery_replay(c: &mut Criterion) {
    let mut group = c.benchmark_group("recovery_replay");
    let supported = LedgerConfig::default().supported_currencies;

    for count in [10u64, 100, 1_000, 10_000] {
        let (movements, snapshot) = seeded_log(count);
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::new("restore", count), &count, |b, _| {
            b.iter(|| {
                black_box(
                    PiggyBank::restore(&snapshot, supported.clone(), black_box(&movements))
                        .unwrap(),
                );
            });
        });
    }

    group.finish();
}

fn bench_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("history_newest_first");

    for count in [100u64, 1_000] {
        let store = InMemoryLedgerStore::new();
        let (movements, snapshot) = seeded_log(count);
        for m in &movements {
            store.append(m).unwrap();
        }
        store.write_current_state(&snapshot).unwrap();
        let service = LedgerService::open(store, &LedgerConfig::default()).unwrap();

        group.bench_with_input(BenchmarkId::new("list_all", count), &count, |b, _| {
            b.iter(|| black_box(service.history().unwrap()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_deposit_latency,
    bench_recovery_replay,
    bench_history
);
criterion_main!(benches);
