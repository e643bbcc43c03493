//! AdminAdjustmentAPI: manual corrections and bonus grants.
//!
//! Every operation here checks its amount before touching anything, then
//! checks the caller's role, then the target. The credit itself is the
//! primary mutation; the BonusTransaction / AdminLog / IncomeTransaction
//! written after it follow the best-effort audit policy.

use crate::{
    balance_ledger::{BalanceLedger, EntryKind},
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    model::{AdminLog, BonusTransaction, IncomeSource, IncomeTransaction, UserAccount},
    subsystem::LedgerContext,
    types::{round_money, Money, Pool},
};

/// Load the caller and make sure they hold the admin role.
pub(crate) fn require_admin(ctx: &LedgerContext<'_>, admin_id: &str) -> LedgerResult<UserAccount> {
    match ctx.store.get_user(admin_id)? {
        Some(user) if user.is_admin() => Ok(user),
        Some(user) => Err(LedgerError::Forbidden(format!(
            "user {admin_id} (level {}) is not an administrator",
            user.user_level
        ))),
        None => Err(LedgerError::Forbidden(format!("unknown caller {admin_id}"))),
    }
}

/// Append one AdminLog row under the best-effort audit policy.
pub(crate) fn log_admin_action(
    ctx: &LedgerContext<'_>,
    admin_id: &str,
    action: &str,
    user_id: &str,
    target_id: Option<&str>,
    amount: Option<Money>,
    reason: &str,
) -> LedgerResult<()> {
    let entry = AdminLog {
        id: uuid::Uuid::new_v4().to_string(),
        admin_id: admin_id.to_string(),
        action: action.to_string(),
        target_user_id: Some(user_id.to_string()),
        target_id: target_id.map(str::to_string),
        amount,
        reason: reason.to_string(),
        created_at: ctx.now,
    };
    ctx.audit("admin log", ctx.store.insert_admin_log(&entry))
}

fn positive(amount: Money) -> LedgerResult<Money> {
    if !amount.is_finite() || amount <= 0.0 || round_money(amount) <= 0.0 {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(round_money(amount))
}

pub struct AdminAdjustments<'a> {
    ctx: LedgerContext<'a>,
}

impl<'a> AdminAdjustments<'a> {
    pub fn new(ctx: LedgerContext<'a>) -> Self {
        Self { ctx }
    }

    /// Credit a bonus to the target's spendable balance. Returns the new
    /// spendable balance.
    pub fn grant_bonus(
        &self,
        admin_id: &str,
        user_id: &str,
        amount: Money,
        reason: &str,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<Money> {
        let amount = positive(amount)?;
        require_admin(&self.ctx, admin_id)?;
        self.require_user(user_id)?;

        let ledger = BalanceLedger::new(self.ctx);
        ledger.credit(user_id, Pool::Spendable, amount, EntryKind::Bonus, None)?;

        let bonus = BonusTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            admin_id: Some(admin_id.to_string()),
            amount,
            bonus_type: "admin_bonus".into(),
            reason: reason.to_string(),
            created_at: self.ctx.now,
        };
        self.ctx
            .audit("bonus transaction", self.ctx.store.insert_bonus_transaction(&bonus))?;
        log_admin_action(
            &self.ctx,
            admin_id,
            "grant_bonus",
            user_id,
            Some(&bonus.id),
            Some(amount),
            reason,
        )?;

        log::info!("admin: {admin_id} granted {amount:.2} bonus to {user_id} ({reason})");
        out.push(LedgerEvent::AdminAdjustment {
            admin_id: admin_id.to_string(),
            user_id: user_id.to_string(),
            action: "grant_bonus".into(),
            amount,
        });
        ledger.balance(user_id, Pool::Spendable)
    }

    /// Credit earnings against one of the target's investments into the
    /// locked pool, recorded as a manual IncomeTransaction so that it can be
    /// unlocked like any other income. Returns the new locked balance.
    pub fn grant_manual_earnings(
        &self,
        admin_id: &str,
        investment_id: &str,
        user_id: &str,
        amount: Money,
        reason: &str,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<Money> {
        let amount = positive(amount)?;
        require_admin(&self.ctx, admin_id)?;
        self.require_user(user_id)?;
        let inv = self
            .ctx
            .store
            .get_investment(investment_id)?
            .filter(|inv| inv.user_id == user_id)
            .ok_or_else(|| LedgerError::not_found("investment", investment_id))?;

        let ledger = BalanceLedger::new(self.ctx);
        ledger.credit(user_id, Pool::Locked, amount, EntryKind::ManualEarnings, Some(&inv.id))?;

        let tx = IncomeTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            investment_id: inv.id.clone(),
            user_id: user_id.to_string(),
            amount,
            days_collected: 0,
            is_final_collection: false,
            source: IncomeSource::Manual,
            status: "completed".into(),
            transferred_at: None,
            created_at: self.ctx.now,
        };
        self.ctx
            .audit("income transaction", self.ctx.store.insert_income_transaction(&tx))?;
        log_admin_action(
            &self.ctx,
            admin_id,
            "grant_manual_earnings",
            user_id,
            Some(&inv.id),
            Some(amount),
            reason,
        )?;

        log::info!(
            "admin: {admin_id} granted {amount:.2} manual earnings on {} to {user_id} ({reason})",
            inv.id
        );
        out.push(LedgerEvent::AdminAdjustment {
            admin_id: admin_id.to_string(),
            user_id: user_id.to_string(),
            action: "grant_manual_earnings".into(),
            amount,
        });
        ledger.balance(user_id, Pool::Locked)
    }

    /// Signed correction of either pool: a positive delta credits, a negative
    /// one debits (and fails `InsufficientFunds` rather than go below zero).
    /// Returns the new balance of that pool.
    pub fn adjust_balance(
        &self,
        admin_id: &str,
        user_id: &str,
        pool: Pool,
        delta: Money,
        reason: &str,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<Money> {
        let magnitude = positive(delta.abs()).map_err(|_| LedgerError::InvalidAmount(delta))?;
        if reason.trim().is_empty() {
            return Err(LedgerError::Validation("a balance correction needs a reason".into()));
        }
        require_admin(&self.ctx, admin_id)?;
        self.require_user(user_id)?;

        let ledger = BalanceLedger::new(self.ctx);
        let signed = if delta > 0.0 {
            ledger.credit(user_id, pool, magnitude, EntryKind::AdminCorrection, None)?;
            magnitude
        } else {
            ledger.debit(user_id, pool, magnitude, EntryKind::AdminCorrection, None)?;
            -magnitude
        };
        let action = format!("adjust_{}", pool.as_str());
        log_admin_action(&self.ctx, admin_id, &action, user_id, None, Some(signed), reason)?;

        log::info!(
            "admin: {admin_id} adjusted {} of {user_id} by {signed:+.2} ({reason})",
            pool.as_str()
        );
        out.push(LedgerEvent::AdminAdjustment {
            admin_id: admin_id.to_string(),
            user_id: user_id.to_string(),
            action,
            amount: signed,
        });
        ledger.balance(user_id, pool)
    }

    fn require_user(&self, user_id: &str) -> LedgerResult<UserAccount> {
        self.ctx
            .store
            .get_user(user_id)?
            .ok_or_else(|| LedgerError::not_found("user", user_id))
    }
}
