//! Daily income collection, maturity and earnings transfer.

use chrono::{DateTime, Duration, TimeZone, Utc};
use minevest_core::{
    clock::ManualClock,
    config::{ExpiryPolicy, LedgerConfig},
    engine::LedgerEngine,
    model::{IncomeSource, InvestmentStatus, Plan, UserAccount},
    types::Pool,
};
use std::sync::Arc;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()
}

struct Fixture {
    engine: LedgerEngine,
    clock: Arc<ManualClock>,
    admin: UserAccount,
    plan: Plan,
}

fn fixture_with(config: LedgerConfig) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = Arc::new(ManualClock::new(start()));
    let mut engine = LedgerEngine::build_test_with(config, clock.clone()).unwrap();
    let admin = engine.bootstrap_admin("Ops Admin").unwrap();
    let plan = engine
        .create_plan(&admin.id, "Starter Rig", 7, 14.0, true, 500.0, None)
        .unwrap();
    Fixture {
        engine,
        clock,
        admin,
        plan,
    }
}

fn fixture() -> Fixture {
    fixture_with(LedgerConfig::default_test())
}

/// Registers a user, funds them with `amount` and buys the 7-day plan with all of it.
fn investor(f: &mut Fixture, amount: f64) -> (UserAccount, String) {
    let user = f.engine.register_user("Investor", None).unwrap();
    f.engine
        .credit_balance(&user.id, Pool::Spendable, amount)
        .unwrap();
    let inv = f
        .engine
        .purchase_investment(&user.id, &f.plan.id, amount)
        .unwrap();
    (user, inv.id)
}

#[test]
fn seven_day_plan_pays_profit_and_capital_on_the_last_day() {
    let mut f = fixture();
    let (user, inv_id) = investor(&mut f, 2000.0);
    assert_eq!(f.engine.user(&user.id).unwrap().balance, 0.0);

    for day in 1..=7 {
        f.clock.advance_days(1);
        let receipt = f.engine.collect_daily_income(&inv_id, &user.id).unwrap();
        assert_eq!(receipt.days_collected, 1);
        assert_eq!(receipt.amount_credited, 40.0, "day {day}");
        assert_eq!(receipt.is_final, day == 7);
        if day == 7 {
            assert_eq!(receipt.capital_returned, 2000.0);
            assert_eq!(receipt.balance, 2000.0);
            assert_eq!(receipt.earned_balance, 280.0);
        }
    }

    let inv = f.engine.investment(&inv_id).unwrap();
    assert_eq!(inv.status, InvestmentStatus::Completed);
    assert_eq!(inv.total_days_collected, 7);
    assert_eq!(inv.profit_collected, 280.0);

    let rows = f.engine.store.income_transactions_for(&inv_id).unwrap();
    assert_eq!(rows.len(), 7);
    let total: f64 = rows.iter().map(|r| r.amount).sum();
    assert!((total - 280.0).abs() < 1e-9);
    assert_eq!(rows.iter().filter(|r| r.is_final_collection).count(), 1);
}

#[test]
fn second_collect_in_the_same_window_finds_nothing() {
    let mut f = fixture();
    let (user, inv_id) = investor(&mut f, 2000.0);
    f.clock.advance(Duration::hours(30));

    let first = f.engine.collect_daily_income(&inv_id, &user.id).unwrap();
    assert_eq!(first.amount_credited, 40.0);

    let err = f.engine.collect_daily_income(&inv_id, &user.id).unwrap_err();
    assert_eq!(err.code(), "NOTHING_TO_COLLECT");
    assert_eq!(f.engine.user(&user.id).unwrap().earned_balance, 40.0);
    assert_eq!(f.engine.store.income_transactions_for(&inv_id).unwrap().len(), 1);
}

#[test]
fn collect_before_a_full_day_changes_nothing() {
    let mut f = fixture();
    let (user, inv_id) = investor(&mut f, 2000.0);
    f.clock.advance(Duration::hours(23));

    let err = f.engine.collect_daily_income(&inv_id, &user.id).unwrap_err();
    assert_eq!(err.code(), "NOTHING_TO_COLLECT");
    let inv = f.engine.investment(&inv_id).unwrap();
    assert_eq!(inv.total_days_collected, 0);
    assert!(inv.last_income_collection_date.is_none());
    assert_eq!(f.engine.store.row_count("income_transactions").unwrap(), 0);
}

#[test]
fn collect_checks_existence_then_ownership() {
    let mut f = fixture();
    let (_owner, inv_id) = investor(&mut f, 2000.0);
    let stranger = f.engine.register_user("Stranger", None).unwrap();
    f.clock.advance_days(1);

    let err = f.engine.collect_daily_income("no-such-investment", &stranger.id).unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
    let err = f.engine.collect_daily_income(&inv_id, &stranger.id).unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");
    assert_eq!(f.engine.user(&stranger.id).unwrap().earned_balance, 0.0);
}

#[test]
fn completed_investment_rejects_collection() {
    let mut f = fixture();
    let (user, inv_id) = investor(&mut f, 2000.0);
    f.clock.advance_days(7);
    f.engine.collect_daily_income(&inv_id, &user.id).unwrap();

    f.clock.advance_days(1);
    let err = f.engine.collect_daily_income(&inv_id, &user.id).unwrap_err();
    assert_eq!(err.code(), "INVESTMENT_NOT_ACTIVE");
}

#[test]
fn late_collection_is_capped_at_the_plan_duration() {
    let mut f = fixture();
    let (user, inv_id) = investor(&mut f, 2000.0);
    f.clock.advance_days(20);

    let receipt = f.engine.collect_daily_income(&inv_id, &user.id).unwrap();
    assert_eq!(receipt.days_collected, 7);
    assert_eq!(receipt.amount_credited, 280.0);
    assert!(receipt.is_final);

    let inv = f.engine.investment(&inv_id).unwrap();
    assert_eq!(inv.total_days_collected, 7);
    assert_eq!(inv.status, InvestmentStatus::Completed);
}

#[test]
fn listing_settles_matured_investments_first() {
    let mut f = fixture();
    let (user, inv_id) = investor(&mut f, 2000.0);
    f.clock.advance_days(2);
    f.engine.collect_daily_income(&inv_id, &user.id).unwrap();
    f.clock.advance_days(6);

    let listed = f.engine.list_investments(&user.id).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, InvestmentStatus::Completed);
    assert_eq!(listed[0].total_days_collected, 7);

    let account = f.engine.user(&user.id).unwrap();
    assert_eq!(account.balance, 2000.0);
    assert_eq!(account.earned_balance, 280.0);
}

#[test]
fn forfeit_policy_expires_and_drops_uncollected_profit() {
    let mut config = LedgerConfig::default_test();
    config.expiry_policy = ExpiryPolicy::Forfeit;
    let mut f = fixture_with(config);
    let (user, inv_id) = investor(&mut f, 2000.0);
    f.clock.advance_days(2);
    f.engine.collect_daily_income(&inv_id, &user.id).unwrap();
    f.clock.advance_days(7);

    let listed = f.engine.list_investments(&user.id).unwrap();
    assert_eq!(listed[0].status, InvestmentStatus::Expired);
    assert_eq!(listed[0].total_days_collected, 2);

    let account = f.engine.user(&user.id).unwrap();
    assert_eq!(account.balance, 2000.0, "capital comes back");
    assert_eq!(account.earned_balance, 80.0);

    let err = f.engine.collect_daily_income(&inv_id, &user.id).unwrap_err();
    assert_eq!(err.code(), "INVESTMENT_NOT_ACTIVE");
}

#[test]
fn forfeit_collect_after_maturity_expires_instead_of_paying() {
    let mut config = LedgerConfig::default_test();
    config.expiry_policy = ExpiryPolicy::Forfeit;
    let mut f = fixture_with(config);
    let (user, inv_id) = investor(&mut f, 2000.0);
    f.clock.advance_days(9);

    // Nothing lists the investment first: the collection itself must expire it.
    let err = f.engine.collect_daily_income(&inv_id, &user.id).unwrap_err();
    assert_eq!(err.code(), "INVESTMENT_NOT_ACTIVE");

    let inv = f.engine.investment(&inv_id).unwrap();
    assert_eq!(inv.status, InvestmentStatus::Expired);
    assert_eq!(inv.total_days_collected, 0);
    let account = f.engine.user(&user.id).unwrap();
    assert_eq!(account.balance, 2000.0);
    assert_eq!(account.earned_balance, 0.0);
    assert!(f.engine.store.income_transactions_for(&inv_id).unwrap().is_empty());

    let err = f.engine.collect_daily_income(&inv_id, &user.id).unwrap_err();
    assert_eq!(err.code(), "INVESTMENT_NOT_ACTIVE");
    assert_eq!(f.engine.events_of_type("investment_closed").unwrap().len(), 1);
    assert_eq!(f.engine.user(&user.id).unwrap().balance, 2000.0);
}

#[test]
fn transfer_moves_only_untransferred_income() {
    let mut f = fixture();
    let (user, inv_id) = investor(&mut f, 2000.0);
    f.clock.advance_days(3);
    f.engine.collect_daily_income(&inv_id, &user.id).unwrap();

    let moved = f.engine.transfer_investment_earnings(&user.id, &inv_id).unwrap();
    assert_eq!(moved, 120.0);
    let account = f.engine.user(&user.id).unwrap();
    assert_eq!(account.earned_balance, 0.0);
    assert_eq!(account.balance, 120.0);

    assert_eq!(f.engine.transfer_investment_earnings(&user.id, &inv_id).unwrap(), 0.0);

    f.clock.advance_days(1);
    f.engine.collect_daily_income(&inv_id, &user.id).unwrap();
    assert_eq!(f.engine.transfer_investment_earnings(&user.id, &inv_id).unwrap(), 40.0);
    assert_eq!(f.engine.user(&user.id).unwrap().balance, 160.0);
}

#[test]
fn transfer_is_scoped_to_one_investment() {
    let mut f = fixture();
    let user = f.engine.register_user("Two Rigs", None).unwrap();
    f.engine.credit_balance(&user.id, Pool::Spendable, 3000.0).unwrap();
    let a = f.engine.purchase_investment(&user.id, &f.plan.id, 2000.0).unwrap();
    let b = f.engine.purchase_investment(&user.id, &f.plan.id, 1000.0).unwrap();
    f.clock.advance_days(1);
    f.engine.collect_daily_income(&a.id, &user.id).unwrap();
    f.engine.collect_daily_income(&b.id, &user.id).unwrap();
    assert_eq!(f.engine.user(&user.id).unwrap().earned_balance, 60.0);

    let moved = f.engine.transfer_investment_earnings(&user.id, &b.id).unwrap();
    assert_eq!(moved, 20.0);
    assert_eq!(f.engine.user(&user.id).unwrap().earned_balance, 40.0);
}

#[test]
fn transfer_never_drives_the_locked_pool_negative() {
    let mut f = fixture();
    let (user, inv_id) = investor(&mut f, 2000.0);
    f.clock.advance_days(2);
    f.engine.collect_daily_income(&inv_id, &user.id).unwrap();
    f.engine
        .adjust_balance(&f.admin.id, &user.id, Pool::Locked, -50.0, "clawback")
        .unwrap();

    let moved = f.engine.transfer_investment_earnings(&user.id, &inv_id).unwrap();
    assert_eq!(moved, 30.0);
    let account = f.engine.user(&user.id).unwrap();
    assert_eq!(account.earned_balance, 0.0);
    assert_eq!(account.balance, 30.0);
}

#[test]
fn manual_earnings_are_transferable_like_income() {
    let mut f = fixture();
    let (user, inv_id) = investor(&mut f, 2000.0);
    let locked = f
        .engine
        .grant_manual_earnings(&f.admin.id, &inv_id, &user.id, 75.0, "outage compensation")
        .unwrap();
    assert_eq!(locked, 75.0);

    let rows = f.engine.store.income_transactions_for(&inv_id).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].source, IncomeSource::Manual);

    assert_eq!(f.engine.transfer_investment_earnings(&user.id, &inv_id).unwrap(), 75.0);
    // Manual income does not count toward the plan's scheduled profit.
    f.clock.advance_days(7);
    let receipt = f.engine.collect_daily_income(&inv_id, &user.id).unwrap();
    assert_eq!(receipt.amount_credited, 280.0);
}

#[test]
fn purchase_checks_balance_and_plan_bounds() {
    let mut f = fixture();
    let user = f.engine.register_user("Short", None).unwrap();
    f.engine.credit_balance(&user.id, Pool::Spendable, 1000.0).unwrap();

    let err = f.engine.purchase_investment(&user.id, &f.plan.id, 1500.0).unwrap_err();
    assert_eq!(err.code(), "INSUFFICIENT_FUNDS");
    let err = f.engine.purchase_investment(&user.id, &f.plan.id, 100.0).unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
    let err = f.engine.purchase_investment(&user.id, "no-plan", 600.0).unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");

    assert_eq!(f.engine.user(&user.id).unwrap().balance, 1000.0);
    assert_eq!(f.engine.store.row_count("investments").unwrap(), 0);
}

#[test]
fn closed_plan_takes_no_new_purchases() {
    let mut f = fixture();
    let (user, inv_id) = investor(&mut f, 1000.0);
    f.engine.credit_balance(&user.id, Pool::Spendable, 800.0).unwrap();

    let outsider = f.engine.register_user("Outsider", None).unwrap();
    let err = f
        .engine
        .set_plan_active(&outsider.id, &f.plan.id, false)
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");
    let err = f
        .engine
        .set_plan_active(&f.admin.id, "no-plan", false)
        .unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");

    let closed = f.engine.set_plan_active(&f.admin.id, &f.plan.id, false).unwrap();
    assert!(!closed.is_active);
    assert!(f.engine.list_plans().unwrap().iter().all(|p| p.id != f.plan.id));

    let err = f.engine.purchase_investment(&user.id, &f.plan.id, 800.0).unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert_eq!(f.engine.user(&user.id).unwrap().balance, 800.0);

    // Running investments keep accruing on a closed plan.
    f.clock.advance_days(1);
    let receipt = f.engine.collect_daily_income(&inv_id, &user.id).unwrap();
    assert_eq!(receipt.amount_credited, 20.0);

    f.engine.set_plan_active(&f.admin.id, &f.plan.id, true).unwrap();
    assert!(f.engine.list_plans().unwrap().iter().any(|p| p.id == f.plan.id));
    f.engine.purchase_investment(&user.id, &f.plan.id, 800.0).unwrap();
    assert_eq!(f.engine.user(&user.id).unwrap().balance, 0.0);
}
