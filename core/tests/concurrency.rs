//! Two connections racing on one investment.
//!
//! Each engine owns its own SQLite connection to the same file. Only one
//! of the two collectors may be paid for the window; the other must see
//! NOTHING_TO_COLLECT and the user's locked pool must hold exactly one
//! day's profit.

use chrono::{TimeZone, Utc};
use minevest_core::{
    clock::ManualClock,
    config::LedgerConfig,
    engine::LedgerEngine,
    rng::CodeRng,
    store::LedgerStore,
    types::Pool,
};
use std::path::PathBuf;
use std::sync::{Arc, Barrier};
use std::thread;

struct TempDb(PathBuf);

impl TempDb {
    fn new() -> Self {
        let name = format!("minevest-race-{}.db", uuid::Uuid::new_v4());
        Self(std::env::temp_dir().join(name))
    }

    fn path(&self) -> &str {
        self.0.to_str().expect("utf-8 temp path")
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", self.path()));
        }
    }
}

fn open_engine(db: &TempDb, clock: &Arc<ManualClock>, seed: u64) -> LedgerEngine {
    let store = LedgerStore::open(db.path()).expect("open file store");
    LedgerEngine::build(
        store,
        LedgerConfig::default_test(),
        clock.clone(),
        CodeRng::seeded(seed),
    )
}

#[test]
fn racing_collectors_pay_the_window_once() {
    let _ = env_logger::builder().is_test(true).try_init();
    let db = TempDb::new();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 4, 1, 10, 0, 0).unwrap(),
    ));

    let mut first = open_engine(&db, &clock, 1);
    first.store.migrate().expect("migration");
    let admin = first.bootstrap_admin("Ops Admin").expect("admin");
    let plan = first
        .create_plan(&admin.id, "Starter Rig", 7, 14.0, true, 500.0, None)
        .expect("plan");
    let user = first.register_user("Racer", None).expect("user");
    first
        .credit_balance(&user.id, Pool::Spendable, 2000.0)
        .expect("fund");
    let inv = first
        .purchase_investment(&user.id, &plan.id, 2000.0)
        .expect("purchase");
    clock.advance_days(1);

    let second = open_engine(&db, &clock, 2);
    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [first, second]
        .into_iter()
        .map(|engine| {
            let barrier = Arc::clone(&barrier);
            let inv_id = inv.id.clone();
            let user_id = user.id.clone();
            thread::spawn(move || {
                barrier.wait();
                let outcome = engine.collect_daily_income(&inv_id, &user_id);
                (engine, outcome)
            })
        })
        .collect();

    let mut engines = Vec::new();
    let mut paid = 0;
    let mut refused = 0;
    for handle in handles {
        let (engine, outcome) = handle.join().expect("collector thread");
        match outcome {
            Ok(receipt) => {
                assert_eq!(receipt.amount_credited, 40.0);
                paid += 1;
            }
            Err(e) => {
                assert_eq!(e.code(), "NOTHING_TO_COLLECT", "unexpected error: {e}");
                refused += 1;
            }
        }
        engines.push(engine);
    }
    assert_eq!((paid, refused), (1, 1));

    let reader = &engines[0];
    let account = reader.user(&user.id).expect("user");
    assert_eq!(account.earned_balance, 40.0);
    let stored = reader.investment(&inv.id).expect("investment");
    assert_eq!(stored.total_days_collected, 1);
    assert_eq!(reader.store.row_count("income_transactions").expect("count"), 1);
}
