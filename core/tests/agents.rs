//! Agent eligibility thresholds and the admin-driven agent lifecycle.

use chrono::{Duration, TimeZone, Utc};
use minevest_core::{
    clock::ManualClock,
    config::LedgerConfig,
    engine::LedgerEngine,
    model::{AgentStatus, UserAccount},
};
use std::sync::Arc;

fn setup_with(config: LedgerConfig) -> (LedgerEngine, Arc<ManualClock>, UserAccount) {
    let _ = env_logger::builder().is_test(true).try_init();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap(),
    ));
    let mut engine = LedgerEngine::build_test_with(config, clock.clone()).expect("engine");
    let admin = engine.bootstrap_admin("Ops Admin").expect("admin");
    (engine, clock, admin)
}

fn setup() -> (LedgerEngine, Arc<ManualClock>, UserAccount) {
    setup_with(LedgerConfig::default_test())
}

/// Register a referral under `sponsor` and optionally approve a deposit for them.
fn recruit(
    engine: &mut LedgerEngine,
    admin: &UserAccount,
    sponsor: &UserAccount,
    name: &str,
    deposit: bool,
) -> UserAccount {
    let user = engine
        .register_user(name, Some(&sponsor.referral_code))
        .unwrap();
    if deposit {
        approve_deposit(engine, admin, &user);
    }
    user
}

fn approve_deposit(engine: &LedgerEngine, admin: &UserAccount, user: &UserAccount) {
    let d = engine.request_deposit(&user.id, 500.0, "easypaisa").unwrap();
    engine.approve_deposit(&admin.id, &d.id).unwrap();
}

#[test]
fn activation_waits_for_enough_qualified_referrals() {
    let (mut engine, _clock, admin) = setup();
    let sponsor = engine.register_user("Sponsor", None).unwrap();
    recruit(&mut engine, &admin, &sponsor, "R1", true);
    recruit(&mut engine, &admin, &sponsor, "R2", true);
    let third = recruit(&mut engine, &admin, &sponsor, "R3", false);

    // A referral without an approved deposit does not count.
    let snapshot = engine.evaluate_agent_eligibility(&sponsor.id).unwrap();
    assert_eq!(snapshot.level1_count, 2);
    assert!(!snapshot.eligibility_achieved);
    let err = engine.activate_agent(&admin.id, &sponsor.id).unwrap_err();
    assert_eq!(err.code(), "NOT_ELIGIBLE");
    assert_eq!(engine.user(&sponsor.id).unwrap().agent_status, AgentStatus::Inactive);

    approve_deposit(&engine, &admin, &third);
    let snapshot = engine.evaluate_agent_eligibility(&sponsor.id).unwrap();
    assert_eq!(snapshot.level1_count, 3);
    assert!(snapshot.eligibility_achieved);
    assert_eq!(engine.events_of_type("agent_eligibility_achieved").unwrap().len(), 1);

    let agent = engine.activate_agent(&admin.id, &sponsor.id).unwrap();
    assert!(agent.is_agent);
    assert_eq!(agent.agent_status, AgentStatus::Active);
    assert!(agent.agent_activated_at.is_some());

    // Second activation is a no-op.
    let again = engine.activate_agent(&admin.id, &sponsor.id).unwrap();
    assert_eq!(again.agent_activated_at, agent.agent_activated_at);
    assert_eq!(engine.events_of_type("agent_activated").unwrap().len(), 1);

    let logs = engine.store.admin_logs_for_user(&sponsor.id).unwrap();
    assert_eq!(logs.iter().filter(|l| l.action == "activate_agent").count(), 1);
}

#[test]
fn eligibility_is_never_revoked() {
    let (mut engine, clock, admin) = setup();
    let sponsor = engine.register_user("Sponsor", None).unwrap();
    for name in ["R1", "R2", "R3"] {
        recruit(&mut engine, &admin, &sponsor, name, true);
    }
    let first = engine.evaluate_agent_eligibility(&sponsor.id).unwrap();
    assert!(first.eligibility_achieved);
    let achieved_at = first.achieved_at.expect("achievement time");

    clock.advance(Duration::days(3));
    engine
        .update_setting(&admin.id, "agent_l1_requirement", "10")
        .unwrap();
    let later = engine.evaluate_agent_eligibility(&sponsor.id).unwrap();
    assert!(later.eligibility_achieved);
    assert_eq!(later.achieved_at, Some(achieved_at));
    assert!(later.updated_at > achieved_at);

    engine.activate_agent(&admin.id, &sponsor.id).unwrap();
}

#[test]
fn second_level_referrals_count_toward_level_two() {
    let mut config = LedgerConfig::default_test();
    config.agent_l1_requirement = 1;
    config.agent_l2_requirement = 1;
    let (mut engine, _clock, admin) = setup_with(config);
    let sponsor = engine.register_user("Sponsor", None).unwrap();
    let direct = recruit(&mut engine, &admin, &sponsor, "Direct", true);

    let snapshot = engine.evaluate_agent_eligibility(&sponsor.id).unwrap();
    assert_eq!((snapshot.level1_count, snapshot.level2_count), (1, 0));
    assert!(!snapshot.eligibility_achieved);

    recruit(&mut engine, &admin, &direct, "Indirect", true);
    // Approval of the grandchild's deposit re-evaluated the sponsor already.
    let stored = engine.store.get_eligibility(&sponsor.id).unwrap().unwrap();
    assert_eq!((stored.level1_count, stored.level2_count), (1, 1));
    assert!(stored.eligibility_achieved);
}

#[test]
fn only_admins_manage_agents() {
    let (mut engine, _clock, admin) = setup();
    let sponsor = engine.register_user("Sponsor", None).unwrap();
    for name in ["R1", "R2", "R3"] {
        recruit(&mut engine, &admin, &sponsor, name, true);
    }
    let outsider = engine.register_user("Outsider", None).unwrap();

    let err = engine.activate_agent(&outsider.id, &sponsor.id).unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");
    let err = engine.activate_agent("ghost", &sponsor.id).unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN");
    assert_eq!(engine.user(&sponsor.id).unwrap().agent_status, AgentStatus::Inactive);

    let err = engine.activate_agent(&admin.id, "ghost").unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
}

#[test]
fn suspended_agent_cannot_be_reactivated() {
    let (mut engine, _clock, admin) = setup();
    let sponsor = engine.register_user("Sponsor", None).unwrap();
    for name in ["R1", "R2", "R3"] {
        recruit(&mut engine, &admin, &sponsor, name, true);
    }

    let err = engine
        .deactivate_agent(&admin.id, &sponsor.id, "not yet an agent")
        .unwrap_err();
    assert_eq!(err.code(), "VALIDATION_ERROR");

    engine.activate_agent(&admin.id, &sponsor.id).unwrap();
    let suspended = engine
        .deactivate_agent(&admin.id, &sponsor.id, "policy breach")
        .unwrap();
    assert!(!suspended.is_agent);
    assert_eq!(suspended.agent_status, AgentStatus::Suspended);

    let err = engine.activate_agent(&admin.id, &sponsor.id).unwrap_err();
    assert_eq!(err.code(), "NOT_ELIGIBLE");
    assert_eq!(engine.events_of_type("agent_suspended").unwrap().len(), 1);
}

#[test]
fn activation_bonus_is_credited_and_recorded() {
    let mut config = LedgerConfig::default_test();
    config.agent_activation_bonus = 500.0;
    let (mut engine, _clock, admin) = setup_with(config);
    let sponsor = engine.register_user("Sponsor", None).unwrap();
    for name in ["R1", "R2", "R3"] {
        recruit(&mut engine, &admin, &sponsor, name, true);
    }
    // 3 x 5% deposit commission on 500
    assert_eq!(engine.user(&sponsor.id).unwrap().balance, 75.0);

    let agent = engine.activate_agent(&admin.id, &sponsor.id).unwrap();
    assert_eq!(agent.balance, 575.0);

    let bonuses = engine.store.bonus_transactions_for(&sponsor.id).unwrap();
    assert_eq!(bonuses.len(), 1);
    assert_eq!(bonuses[0].bonus_type, "agent_activation");
    assert_eq!(bonuses[0].amount, 500.0);

    engine.activate_agent(&admin.id, &sponsor.id).unwrap();
    assert_eq!(engine.user(&sponsor.id).unwrap().balance, 575.0);
}
