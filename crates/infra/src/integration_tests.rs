//! Integration tests for the full ledger pipeline.
//!
//! Tests: LedgerService → LedgerState → MovementLog/LedgerStore → SubscriptionHub
//!
//! Verifies:
//! - The deposit / overdraw / withdraw / relabel walkthrough end to end
//! - No lost updates or overdrafts under concurrent callers
//! - Subscribers see contiguous versions while mutations race
//! - Restart recovery on SQLite, and refusal to start on a tampered store

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use piggybank_core::Currency;
    use piggybank_observability::LogFormat;
    use piggybank_ledger::{LedgerSnapshot, MovementKind, PiggyBank, fold_balance};

    use crate::config::LedgerConfig;
    use crate::error::LedgerError;
    use crate::service::LedgerService;
    use crate::storage::{InMemoryLedgerStore, LedgerStore, SqliteLedgerStore};

    /// Scratch SQLite file, removed (with its WAL side files) on drop.
    struct TempDb {
        path: PathBuf,
    }

    impl TempDb {
        fn new(tag: &str) -> Self {
            piggybank_observability::init_with(LogFormat::Test);
            static COUNTER: AtomicU64 = AtomicU64::new(0);
            let n = COUNTER.fetch_add(1, Ordering::SeqCst);
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_nanos())
                .unwrap_or_default();
            let path = std::env::temp_dir().join(format!(
                "piggybank-{tag}-{}-{nanos}-{n}.db",
                std::process::id()
            ));
            Self { path }
        }

        fn url(&self) -> String {
            format!("sqlite://{}", self.path.display())
        }
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            for suffix in ["", "-wal", "-shm"] {
                let mut file = self.path.clone().into_os_string();
                file.push(suffix);
                let _ = std::fs::remove_file(file);
            }
        }
    }

    fn in_memory_service() -> Arc<LedgerService<InMemoryLedgerStore>> {
        piggybank_observability::init_with(LogFormat::Test);
        Arc::new(LedgerService::in_memory(&LedgerConfig::default()).unwrap())
    }

    #[test]
    fn walkthrough_deposit_overdraw_withdraw_relabel() {
        let service = in_memory_service();
        let start = service.current_snapshot();
        assert_eq!((start.balance(), start.currency(), start.version()), (dec!(0), Currency::Uah, 0));

        let s = service.deposit(dec!(100)).unwrap();
        assert_eq!((s.balance(), s.version()), (dec!(100), 1));

        let err = service.withdraw(dec!(150)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientFunds {
                requested: dec!(150),
                available: dec!(100)
            }
        );
        assert_eq!(service.current_snapshot(), s);

        let s = service.withdraw(dec!(40)).unwrap();
        assert_eq!((s.balance(), s.version()), (dec!(60), 2));

        let s = service.change_currency(Currency::Usd).unwrap();
        assert_eq!((s.balance(), s.currency(), s.version()), (dec!(60), Currency::Usd, 3));
        assert_eq!(s.to_string(), "60.00 $");

        let history = service.history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].kind(), MovementKind::Withdrawal);
        assert_eq!(history[0].signed_amount(), dec!(-40));
        assert_eq!(history[1].kind(), MovementKind::Deposit);
        assert_eq!(history[1].signed_amount(), dec!(100));
    }

    #[test]
    fn hundred_concurrent_deposits_lose_nothing() {
        let service = in_memory_service();
        let barrier = Arc::new(Barrier::new(100));

        let workers: Vec<_> = (0..100)
            .map(|_| {
                let service = service.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    service.deposit(dec!(1)).unwrap();
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let snapshot = service.current_snapshot();
        assert_eq!(snapshot.balance(), dec!(100));
        assert_eq!(snapshot.version(), 100);

        let history = service.history().unwrap();
        assert_eq!(history.len(), 100);
        assert_eq!(fold_balance(&history), dec!(100));

        let mut ids: Vec<u64> = history.iter().map(|m| m.id().value()).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=100).collect::<Vec<_>>());
    }

    #[test]
    fn concurrent_withdrawals_never_overdraw() {
        let service = in_memory_service();
        service.deposit(dec!(10)).unwrap();
        let barrier = Arc::new(Barrier::new(25));

        let workers: Vec<_> = (0..25)
            .map(|_| {
                let service = service.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    service.withdraw(dec!(1))
                })
            })
            .collect();
        let results: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

        let accepted = results.iter().filter(|r| r.is_ok()).count();
        let refused = results
            .iter()
            .filter(|r| matches!(r, Err(LedgerError::InsufficientFunds { .. })))
            .count();
        assert_eq!((accepted, refused), (10, 15));
        assert_eq!(service.current_snapshot().balance(), dec!(0));
        assert_eq!(service.current_snapshot().version(), 11);
    }

    #[test]
    fn subscribers_see_contiguous_versions_under_concurrency() {
        let service = in_memory_service();
        let early = service.subscribe();

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let service = service.clone();
                thread::spawn(move || {
                    for _ in 0..25 {
                        service.deposit(dec!(0.01)).unwrap();
                    }
                })
            })
            .collect();

        // Joins mid-stream: whatever it sees first, the rest must follow on.
        thread::sleep(Duration::from_millis(1));
        let late = service.subscribe();

        for w in writers {
            w.join().unwrap();
        }

        let early_versions: Vec<u64> = early.drain().iter().map(LedgerSnapshot::version).collect();
        assert_eq!(early_versions, (0..=100).collect::<Vec<_>>());

        let late_versions: Vec<u64> = late.drain().iter().map(LedgerSnapshot::version).collect();
        let first = late_versions[0];
        assert_eq!(late_versions, (first..=100).collect::<Vec<_>>());

        let last = service.subscribe().recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(last.balance(), dec!(1.00));
    }

    #[test]
    fn sqlite_restart_recovers_balance_currency_and_history() {
        let db = TempDb::new("restart");
        let config = LedgerConfig::default().with_database_url(db.url());

        {
            let service = LedgerService::open_configured(&config).unwrap();
            service.deposit_with_note(dec!(100), "pocket money").unwrap();
            service.withdraw(dec!(40)).unwrap();
            service.change_currency(Currency::Usd).unwrap();
        }

        let service = LedgerService::open_configured(&config).unwrap();
        let snapshot = service.current_snapshot();
        assert_eq!(
            (snapshot.balance(), snapshot.currency(), snapshot.version()),
            (dec!(60), Currency::Usd, 3)
        );

        let history = service.history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].note(), "pocket money");

        // Ids continue after the highest logged one.
        service.deposit(dec!(0.5)).unwrap();
        assert_eq!(service.history().unwrap()[0].id().value(), 3);
        assert_eq!(service.current_snapshot().version(), 4);
    }

    #[test]
    fn first_run_state_survives_a_restart_without_mutations() {
        let db = TempDb::new("first-run");
        let config = LedgerConfig {
            default_currency: Currency::Rub,
            ..LedgerConfig::default()
        }
        .with_database_url(db.url());

        drop(LedgerService::open_configured(&config).unwrap());

        // A different default must not re-initialise an existing ledger.
        let reopened = LedgerConfig {
            default_currency: Currency::Uah,
            ..config
        };
        let service = LedgerService::open_configured(&reopened).unwrap();
        assert_eq!(service.current_snapshot(), LedgerSnapshot::initial(Currency::Rub));
    }

    #[test]
    fn tampered_sqlite_state_halts_startup() {
        let db = TempDb::new("tampered");
        let config = LedgerConfig::default().with_database_url(db.url());

        {
            let service = LedgerService::open_configured(&config).unwrap();
            service.deposit(dec!(25)).unwrap();
        }
        {
            let store = SqliteLedgerStore::open(&db.url()).unwrap();
            let forged = LedgerSnapshot::from_parts(dec!(2500), Currency::Uah, 1).unwrap();
            store.write_current_state(&forged).unwrap();
        }

        let err = LedgerService::open_configured(&config).err().unwrap();
        assert!(matches!(err, LedgerError::ConsistencyError(_)));
    }

    #[test]
    fn replaying_the_log_reproduces_the_snapshot() {
        let service = in_memory_service();
        for (deposit, withdraw) in [(dec!(10.10), dec!(0.10)), (dec!(5), dec!(7.5)), (dec!(0.01), dec!(0))] {
            service.deposit(deposit).unwrap();
            if withdraw > Decimal::ZERO {
                service.withdraw(withdraw).unwrap();
            }
        }
        service.change_currency(Currency::Rub).unwrap();
        let snapshot = service.current_snapshot();

        let mut history = service.history().unwrap();
        assert_eq!(fold_balance(&history), snapshot.balance());

        history.sort_by_key(|m| m.id());
        let supported = LedgerConfig::default().supported_currencies;
        let once = PiggyBank::restore(&snapshot, supported.clone(), &history).unwrap();
        let twice = PiggyBank::restore(&once.snapshot(), supported, &history).unwrap();
        assert_eq!(once.snapshot(), snapshot);
        assert_eq!(twice, once);
    }
}
