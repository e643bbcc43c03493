//! The ledger engine: the single entry point for every money operation.
//!
//! RULES:
//!   - Every public operation reads the clock once and runs inside one
//!     store transaction. It either applies completely or not at all.
//!     Collection under the forfeit policy is the one exception: its
//!     expiry sweep commits on its own before the collection runs.
//!   - Investment-bearing operations sweep the caller's matured
//!     investments first (lazy expiry); correctness never depends on the
//!     maintenance pass having run.
//!   - Events are persisted to `event_log` after the transaction commits.
//!     A failed event write is logged and never undoes the operation.
//!
//! MAINTENANCE ORDER (fixed, never reordered):
//!   1. Investment expiry
//!   2. Agent eligibility

use crate::{
    accounts::Accounts,
    admin::{require_admin, AdminAdjustments},
    agent_tracker::{AgentEligibilityTracker, EligibilitySweep},
    balance_ledger::{BalanceLedger, EntryKind},
    cash::CashDesk,
    clock::{Clock, ManualClock},
    config::{ExpiryPolicy, LedgerConfig, PlanSeed},
    error::{LedgerError, LedgerResult},
    event::{EventLogEntry, LedgerEvent},
    income_collector::{CollectionReceipt, DailyIncomeCollector},
    investment_state::{ExpirySweep, InvestmentStateMachine},
    model::{AgentEligibility, Deposit, Investment, Plan, UserAccount, Withdrawal},
    rng::CodeRng,
    store::{LedgerEntryRow, LedgerStore},
    subsystem::{LedgerContext, LedgerSubsystem},
    types::{Money, Pool, ADMIN_LEVEL},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub struct LedgerEngine {
    pub store: LedgerStore,
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
    codes: CodeRng,
    subsystems: Vec<Box<dyn LedgerSubsystem>>,
}

impl LedgerEngine {
    pub fn new(
        store: LedgerStore,
        config: LedgerConfig,
        clock: Arc<dyn Clock>,
        codes: CodeRng,
    ) -> Self {
        Self {
            store,
            config,
            clock,
            codes,
            subsystems: Vec::new(),
        }
    }

    /// Build a fully wired engine with the maintenance sweeps registered.
    /// The store must already be migrated.
    pub fn build(
        store: LedgerStore,
        config: LedgerConfig,
        clock: Arc<dyn Clock>,
        codes: CodeRng,
    ) -> Self {
        let mut engine = LedgerEngine::new(store, config, clock, codes);
        // MAINTENANCE ORDER is fixed. Expiry runs before eligibility.
        engine.register(Box::new(ExpirySweep));
        engine.register(Box::new(EligibilitySweep));
        engine
    }

    /// In-memory engine on the test config, driven by `clock`.
    pub fn build_test(clock: Arc<ManualClock>) -> LedgerResult<Self> {
        Self::build_test_with(LedgerConfig::default_test(), clock)
    }

    pub fn build_test_with(config: LedgerConfig, clock: Arc<ManualClock>) -> LedgerResult<Self> {
        let store = LedgerStore::in_memory()?;
        store.migrate()?;
        Ok(Self::build(store, config, clock, CodeRng::seeded(7)))
    }

    /// Register a maintenance sweep. Call in the documented order.
    pub fn register(&mut self, subsystem: Box<dyn LedgerSubsystem>) {
        self.subsystems.push(subsystem);
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    // ── Accounts ───────────────────────────────────────────────

    pub fn register_user(
        &mut self,
        display_name: &str,
        referrer_code: Option<&str>,
    ) -> LedgerResult<UserAccount> {
        self.register_with_level(display_name, referrer_code, 0)
    }

    /// Create an administrator account. Used when provisioning a database.
    pub fn bootstrap_admin(&mut self, display_name: &str) -> LedgerResult<UserAccount> {
        self.register_with_level(display_name, None, ADMIN_LEVEL)
    }

    fn register_with_level(
        &mut self,
        display_name: &str,
        referrer_code: Option<&str>,
        user_level: i64,
    ) -> LedgerResult<UserAccount> {
        let now = self.clock.now();
        let ctx = LedgerContext::new(&self.store, &self.config, now);
        let codes = &mut self.codes;
        let mut events = Vec::new();
        let user = self.store.in_transaction(|| {
            Accounts::new(ctx).register(
                display_name,
                referrer_code,
                user_level,
                codes,
                &mut events,
            )
        })?;
        self.persist_events("accounts", &events, now);
        Ok(user)
    }

    pub fn user(&self, user_id: &str) -> LedgerResult<UserAccount> {
        self.store
            .get_user(user_id)?
            .ok_or_else(|| LedgerError::not_found("user", user_id))
    }

    // ── Balances ───────────────────────────────────────────────

    /// Credit a pool on behalf of an external collaborator. Returns the new
    /// balance of that pool.
    pub fn credit_balance(
        &self,
        user_id: &str,
        pool: Pool,
        amount: Money,
    ) -> LedgerResult<Money> {
        self.run("ledger", |ctx, _| {
            let ledger = BalanceLedger::new(*ctx);
            ledger.credit(user_id, pool, amount, EntryKind::External, None)?;
            ledger.balance(user_id, pool)
        })
    }

    pub fn ledger_entries(&self, user_id: &str) -> LedgerResult<Vec<LedgerEntryRow>> {
        self.store.ledger_entries_for(user_id)
    }

    // ── Plans ──────────────────────────────────────────────────

    #[allow(clippy::too_many_arguments)]
    pub fn create_plan(
        &self,
        admin_id: &str,
        name: &str,
        duration_days: i64,
        profit_percent: f64,
        capital_return: bool,
        min_amount: Money,
        max_amount: Option<Money>,
    ) -> LedgerResult<Plan> {
        self.run("plans", |ctx, _| {
            require_admin(ctx, admin_id)?;
            let plan = Plan::new(
                uuid::Uuid::new_v4().to_string(),
                name,
                duration_days,
                profit_percent,
                capital_return,
                min_amount,
                max_amount,
            )?;
            ctx.store.insert_plan(&plan, ctx.now)?;
            log::info!("plans: {admin_id} created '{}' ({})", plan.name, plan.id);
            Ok(plan)
        })
    }

    /// Insert catalogue plans that are not in the store yet. Returns how
    /// many were added.
    pub fn seed_plans(&self, seeds: &[PlanSeed]) -> LedgerResult<usize> {
        self.run("plans", |ctx, _| {
            let mut added = 0;
            for seed in seeds {
                if ctx.store.get_plan(&seed.plan_id)?.is_some() {
                    continue;
                }
                let plan = Plan::new(
                    seed.plan_id.clone(),
                    &seed.name,
                    seed.duration_days,
                    seed.profit_percent,
                    seed.capital_return,
                    seed.min_amount,
                    seed.max_amount,
                )?;
                ctx.store.insert_plan(&plan, ctx.now)?;
                added += 1;
            }
            Ok(added)
        })
    }

    pub fn list_plans(&self) -> LedgerResult<Vec<Plan>> {
        self.store.list_plans(true)
    }

    /// Open or close a plan for new purchases. Running investments on the
    /// plan are untouched.
    pub fn set_plan_active(&self, admin_id: &str, plan_id: &str, active: bool) -> LedgerResult<Plan> {
        self.run("plans", |ctx, _| {
            require_admin(ctx, admin_id)?;
            if !ctx.store.set_plan_active(plan_id, active)? {
                return Err(LedgerError::not_found("plan", plan_id));
            }
            log::info!(
                "plans: {admin_id} {} {plan_id}",
                if active { "reopened" } else { "closed" }
            );
            ctx.store
                .get_plan(plan_id)?
                .ok_or_else(|| LedgerError::not_found("plan", plan_id))
        })
    }

    // ── Investments ────────────────────────────────────────────

    pub fn purchase_investment(
        &self,
        user_id: &str,
        plan_id: &str,
        amount: Money,
    ) -> LedgerResult<Investment> {
        self.run("investment", |ctx, out| {
            let machine = InvestmentStateMachine::new(*ctx);
            machine.sweep_user(user_id, out)?;
            machine.purchase(user_id, plan_id, amount, out)
        })
    }

    /// The user's investments, after closing any that have matured.
    pub fn list_investments(&self, user_id: &str) -> LedgerResult<Vec<Investment>> {
        self.run("investment", |ctx, out| {
            InvestmentStateMachine::new(*ctx).sweep_user(user_id, out)?;
            ctx.store.investments_for_user(user_id)
        })
    }

    pub fn investment(&self, investment_id: &str) -> LedgerResult<Investment> {
        self.store
            .get_investment(investment_id)?
            .ok_or_else(|| LedgerError::not_found("investment", investment_id))
    }

    /// Collect accrued income. Under `Settle` a matured investment is settled
    /// by the collection itself. Under `Forfeit` the caller's matured
    /// investments are expired in their own transaction first, so the
    /// expiry sticks even though the collection then fails.
    pub fn collect_daily_income(
        &self,
        investment_id: &str,
        user_id: &str,
    ) -> LedgerResult<CollectionReceipt> {
        if self.config.expiry_policy == ExpiryPolicy::Forfeit {
            self.run("investment", |ctx, out| {
                InvestmentStateMachine::new(*ctx).sweep_user(user_id, out)
            })?;
        }
        self.run("income", |ctx, out| {
            DailyIncomeCollector::new(*ctx).collect(investment_id, user_id, out)
        })
    }

    pub fn transfer_investment_earnings(
        &self,
        user_id: &str,
        investment_id: &str,
    ) -> LedgerResult<Money> {
        self.run("income", |ctx, out| {
            InvestmentStateMachine::new(*ctx).sweep_user(user_id, out)?;
            DailyIncomeCollector::new(*ctx).transfer_earnings(user_id, investment_id, out)
        })
    }

    // ── Agents ─────────────────────────────────────────────────

    pub fn evaluate_agent_eligibility(&self, user_id: &str) -> LedgerResult<AgentEligibility> {
        self.run("agent", |ctx, out| {
            AgentEligibilityTracker::new(*ctx).evaluate(user_id, out)
        })
    }

    pub fn activate_agent(&self, admin_id: &str, user_id: &str) -> LedgerResult<UserAccount> {
        self.run("agent", |ctx, out| {
            AgentEligibilityTracker::new(*ctx).activate(admin_id, user_id, out)
        })
    }

    pub fn deactivate_agent(
        &self,
        admin_id: &str,
        user_id: &str,
        reason: &str,
    ) -> LedgerResult<UserAccount> {
        self.run("agent", |ctx, out| {
            AgentEligibilityTracker::new(*ctx).deactivate(admin_id, user_id, reason, out)
        })
    }

    // ── Cash movements ─────────────────────────────────────────

    pub fn request_deposit(
        &self,
        user_id: &str,
        amount: Money,
        deposit_type: &str,
    ) -> LedgerResult<Deposit> {
        self.run("cash", |ctx, _| {
            CashDesk::new(*ctx).request_deposit(user_id, amount, deposit_type)
        })
    }

    pub fn approve_deposit(&self, admin_id: &str, deposit_id: &str) -> LedgerResult<Deposit> {
        self.run("cash", |ctx, out| {
            CashDesk::new(*ctx).approve_deposit(admin_id, deposit_id, out)
        })
    }

    pub fn reject_deposit(
        &self,
        admin_id: &str,
        deposit_id: &str,
        reason: &str,
    ) -> LedgerResult<Deposit> {
        self.run("cash", |ctx, _| {
            CashDesk::new(*ctx).reject_deposit(admin_id, deposit_id, reason)
        })
    }

    /// Debit `total_deducted` and record a pending withdrawal in one step.
    /// The returned row's `id` is the withdrawal id.
    pub fn create_withdrawal_request(
        &self,
        user_id: &str,
        amount: Money,
        fee_amount: Money,
        fee_percent: f64,
        total_deducted: Money,
    ) -> LedgerResult<Withdrawal> {
        self.run("cash", |ctx, out| {
            CashDesk::new(*ctx).create_withdrawal_request(
                user_id,
                amount,
                fee_amount,
                fee_percent,
                total_deducted,
                out,
            )
        })
    }

    pub fn approve_withdrawal(
        &self,
        admin_id: &str,
        withdrawal_id: &str,
    ) -> LedgerResult<Withdrawal> {
        self.run("cash", |ctx, _| {
            CashDesk::new(*ctx).approve_withdrawal(admin_id, withdrawal_id)
        })
    }

    pub fn reject_withdrawal(
        &self,
        admin_id: &str,
        withdrawal_id: &str,
        reason: &str,
    ) -> LedgerResult<Withdrawal> {
        self.run("cash", |ctx, out| {
            CashDesk::new(*ctx).reject_withdrawal(admin_id, withdrawal_id, reason, out)
        })
    }

    // ── Admin ──────────────────────────────────────────────────

    pub fn grant_bonus(
        &self,
        admin_id: &str,
        user_id: &str,
        amount: Money,
        reason: &str,
    ) -> LedgerResult<Money> {
        self.run("admin", |ctx, out| {
            AdminAdjustments::new(*ctx).grant_bonus(admin_id, user_id, amount, reason, out)
        })
    }

    pub fn grant_manual_earnings(
        &self,
        admin_id: &str,
        investment_id: &str,
        user_id: &str,
        amount: Money,
        reason: &str,
    ) -> LedgerResult<Money> {
        self.run("admin", |ctx, out| {
            AdminAdjustments::new(*ctx).grant_manual_earnings(
                admin_id,
                investment_id,
                user_id,
                amount,
                reason,
                out,
            )
        })
    }

    pub fn adjust_balance(
        &self,
        admin_id: &str,
        user_id: &str,
        pool: Pool,
        delta: Money,
        reason: &str,
    ) -> LedgerResult<Money> {
        self.run("admin", |ctx, out| {
            AdminAdjustments::new(*ctx)
                .adjust_balance(admin_id, user_id, pool, delta, reason, out)
        })
    }

    /// Persist one `admin_settings` row and reload the live config from it.
    pub fn update_setting(
        &mut self,
        admin_id: &str,
        key: &str,
        value: &str,
    ) -> LedgerResult<()> {
        let now = self.clock.now();
        let ctx = LedgerContext::new(&self.store, &self.config, now);
        let updated = self.store.in_transaction(|| {
            require_admin(&ctx, admin_id)?;
            self.store.set_admin_setting(key, value)?;
            // Validate before committing so a bad value never lands.
            self.config.clone().with_store_overrides(&self.store)
        })?;
        log::info!("config: {admin_id} set {key} = {value}");
        self.config = updated;
        Ok(())
    }

    // ── Maintenance ────────────────────────────────────────────

    /// Run every registered sweep in order, each in its own transaction.
    /// Idempotent: a second pass at the same instant changes nothing.
    pub fn run_maintenance(&self) -> LedgerResult<Vec<LedgerEvent>> {
        let now = self.clock.now();
        let ctx = LedgerContext::new(&self.store, &self.config, now);
        let mut all = Vec::new();
        for subsystem in &self.subsystems {
            let events = self.store.in_transaction(|| subsystem.sweep(&ctx))?;
            log::debug!("maintenance: {} emitted {} event(s)", subsystem.name(), events.len());
            self.persist_events(subsystem.name(), &events, now);
            all.extend(events);
        }
        Ok(all)
    }

    /// Persisted events of one type, oldest first.
    pub fn events_of_type(&self, event_type: &str) -> LedgerResult<Vec<EventLogEntry>> {
        self.store.events_of_type(event_type)
    }

    // ── Internals ──────────────────────────────────────────────

    fn run<T>(
        &self,
        component: &str,
        op: impl FnOnce(&LedgerContext<'_>, &mut Vec<LedgerEvent>) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let now = self.clock.now();
        let ctx = LedgerContext::new(&self.store, &self.config, now);
        let mut events = Vec::new();
        let value = self.store.in_transaction(|| op(&ctx, &mut events))?;
        self.persist_events(component, &events, now);
        Ok(value)
    }

    fn persist_events(&self, component: &str, events: &[LedgerEvent], now: DateTime<Utc>) {
        for event in events {
            let entry = match serde_json::to_string(event) {
                Ok(payload) => EventLogEntry {
                    id: None,
                    component: component.to_string(),
                    event_type: event.type_name().to_string(),
                    payload,
                    created_at: now,
                },
                Err(e) => {
                    log::warn!("events: cannot serialise {}: {e}", event.type_name());
                    continue;
                }
            };
            if let Err(e) = self.store.append_event(&entry) {
                log::warn!("events: {} not recorded ({}): {e}", entry.event_type, e.code());
            }
        }
    }
}
