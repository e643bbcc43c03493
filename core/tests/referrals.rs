//! Referral commissions on approved deposits and collected income.

use chrono::{TimeZone, Utc};
use minevest_core::{
    clock::ManualClock,
    engine::LedgerEngine,
    model::{CommissionType, UserAccount},
    types::Pool,
};
use std::sync::Arc;

fn setup() -> (LedgerEngine, Arc<ManualClock>, UserAccount) {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap(),
    ));
    let mut engine = LedgerEngine::build_test(clock.clone()).expect("engine");
    let admin = engine.bootstrap_admin("Ops Admin").expect("admin");
    (engine, clock, admin)
}

/// top <- mid <- low <- investor
fn chain(engine: &mut LedgerEngine) -> [UserAccount; 4] {
    let top = engine.register_user("Top", None).unwrap();
    let mid = engine.register_user("Mid", Some(&top.referral_code)).unwrap();
    let low = engine.register_user("Low", Some(&mid.referral_code)).unwrap();
    let investor = engine
        .register_user("Investor", Some(&low.referral_code))
        .unwrap();
    [top, mid, low, investor]
}

fn spendable(engine: &LedgerEngine, user: &UserAccount) -> f64 {
    engine.user(&user.id).unwrap().balance
}

#[test]
fn approved_deposit_pays_only_the_direct_referrer() {
    let (mut engine, _clock, admin) = setup();
    let [top, mid, low, investor] = chain(&mut engine);

    let deposit = engine
        .request_deposit(&investor.id, 1000.0, "easypaisa")
        .unwrap();
    engine.approve_deposit(&admin.id, &deposit.id).unwrap();

    assert_eq!(spendable(&engine, &investor), 1000.0);
    assert_eq!(spendable(&engine, &low), 50.0);
    assert_eq!(spendable(&engine, &mid), 0.0);
    assert_eq!(spendable(&engine, &top), 0.0);

    let rows = engine.store.commissions_for_referrer(&low.id).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].commission_type, CommissionType::Deposit);
    assert_eq!(rows[0].level, 1);
    assert_eq!(rows[0].referred_user_id, investor.id);
    assert_eq!(rows[0].source_id.as_deref(), Some(deposit.id.as_str()));
}

#[test]
fn daily_income_pays_three_levels_off_the_same_base() {
    let (mut engine, clock, admin) = setup();
    let [top, mid, low, investor] = chain(&mut engine);
    let plan = engine
        .create_plan(&admin.id, "Starter Rig", 7, 14.0, true, 500.0, None)
        .unwrap();
    engine
        .credit_balance(&investor.id, Pool::Spendable, 5000.0)
        .unwrap();
    let inv = engine
        .purchase_investment(&investor.id, &plan.id, 5000.0)
        .unwrap();

    clock.advance_days(1);
    let receipt = engine.collect_daily_income(&inv.id, &investor.id).unwrap();
    assert_eq!(receipt.amount_credited, 100.0);

    assert_eq!(spendable(&engine, &low), 5.0);
    assert_eq!(spendable(&engine, &mid), 3.0);
    assert_eq!(spendable(&engine, &top), 2.0);

    assert_eq!(
        engine
            .store
            .commission_total(&mid.id, CommissionType::Earning)
            .unwrap(),
        3.0
    );
    assert_eq!(engine.events_of_type("commission_paid").unwrap().len(), 3);
}

#[test]
fn short_chain_pays_fewer_levels() {
    let (mut engine, clock, admin) = setup();
    let top = engine.register_user("Top", None).unwrap();
    let investor = engine
        .register_user("Investor", Some(&top.referral_code))
        .unwrap();
    let plan = engine
        .create_plan(&admin.id, "Starter Rig", 7, 14.0, true, 500.0, None)
        .unwrap();
    engine
        .credit_balance(&investor.id, Pool::Spendable, 5000.0)
        .unwrap();
    let inv = engine
        .purchase_investment(&investor.id, &plan.id, 5000.0)
        .unwrap();

    clock.advance_days(2);
    engine.collect_daily_income(&inv.id, &investor.id).unwrap();

    assert_eq!(spendable(&engine, &top), 10.0);
    assert_eq!(engine.store.row_count("referral_commissions").unwrap(), 1);
}

#[test]
fn user_without_referrer_generates_no_commission() {
    let (mut engine, _clock, admin) = setup();
    let loner = engine.register_user("Loner", None).unwrap();
    let deposit = engine.request_deposit(&loner.id, 800.0, "jazzcash").unwrap();
    engine.approve_deposit(&admin.id, &deposit.id).unwrap();

    assert_eq!(spendable(&engine, &loner), 800.0);
    assert_eq!(engine.store.row_count("referral_commissions").unwrap(), 0);
}

#[test]
fn unknown_referral_code_is_rejected_at_signup() {
    let (mut engine, _clock, _admin) = setup();
    let before = engine.store.row_count("user_profiles").unwrap();
    let err = engine.register_user("Nobody", Some("ZZZZZZZZ")).unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert_eq!(engine.store.row_count("user_profiles").unwrap(), before);
}

#[test]
fn odd_amounts_round_each_commission_to_the_paisa() {
    let (mut engine, _clock, admin) = setup();
    let [_top, _mid, low, investor] = chain(&mut engine);
    let deposit = engine
        .request_deposit(&investor.id, 123.45, "bank_transfer")
        .unwrap();
    engine.approve_deposit(&admin.id, &deposit.id).unwrap();
    // 5% of 123.45 = 6.1725
    assert_eq!(spendable(&engine, &low), 6.17);
}
