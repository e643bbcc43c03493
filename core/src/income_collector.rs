//! DailyIncomeCollector: turns elapsed investment days into locked income.
//!
//! Accrual window:
//!   elapsed  = whole days since the accrual anchor (last collection, or start)
//!   days     = min(elapsed, duration - days already collected)
//!   once the term is over, every remaining day is collectable at once
//!
//! The final collection pays the exact remainder of the plan's total
//! profit, so per-day rounding never adds up to more or less than promised.
//!
//! Collection is a compare-and-swap on `total_days_collected`: a second
//! collector racing on the same window finds nothing to collect.

use crate::{
    balance_ledger::{BalanceLedger, EntryKind},
    config::ExpiryPolicy,
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    investment_state::InvestmentStateMachine,
    model::{CommissionType, IncomeSource, IncomeTransaction, Investment, InvestmentStatus, Plan},
    referral_engine::ReferralCommissionEngine,
    subsystem::LedgerContext,
    types::{round_money, InvestmentId, Money, Pool},
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// What a collection at a given instant would pay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accrual {
    pub days: i64,
    pub amount: Money,
    pub is_final: bool,
}

impl Accrual {
    const NONE: Accrual = Accrual {
        days: 0,
        amount: 0.0,
        is_final: false,
    };
}

/// Pure accrual math over the investment's own counters.
pub fn compute_accrual(inv: &Investment, plan: &Plan, now: DateTime<Utc>) -> Accrual {
    let remaining = (plan.duration_days - inv.total_days_collected).max(0);
    if remaining == 0 {
        return Accrual::NONE;
    }
    let elapsed = if inv.has_matured(now) {
        remaining
    } else {
        (now - inv.accrual_anchor()).num_days().max(0)
    };
    let days = elapsed.min(remaining);
    if days == 0 {
        return Accrual::NONE;
    }

    let is_final = days == remaining;
    let amount = if is_final {
        round_money((plan.total_profit(inv.amount_invested) - inv.profit_collected).max(0.0))
    } else {
        round_money(plan.profit_per_day(inv.amount_invested) * days as f64)
    };
    Accrual {
        days,
        amount,
        is_final,
    }
}

/// Result of one successful collection.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CollectionReceipt {
    pub investment_id: InvestmentId,
    pub amount_credited: Money,
    pub days_collected: i64,
    pub is_final: bool,
    pub capital_returned: Money,
    pub balance: Money,
    pub earned_balance: Money,
}

pub struct DailyIncomeCollector<'a> {
    ctx: LedgerContext<'a>,
}

impl<'a> DailyIncomeCollector<'a> {
    pub fn new(ctx: LedgerContext<'a>) -> Self {
        Self { ctx }
    }

    /// Collect whatever `user_id` is owed on one of their investments.
    pub fn collect(
        &self,
        investment_id: &str,
        user_id: &str,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<CollectionReceipt> {
        let inv = self
            .ctx
            .store
            .get_investment(investment_id)?
            .ok_or_else(|| LedgerError::not_found("investment", investment_id))?;
        if inv.user_id != user_id {
            return Err(LedgerError::Forbidden(format!(
                "investment {investment_id} does not belong to {user_id}"
            )));
        }
        if inv.status != InvestmentStatus::Active {
            log::debug!("income: {investment_id} is {}", inv.status.as_str());
            return Err(LedgerError::InvestmentNotActive(investment_id.to_string()));
        }
        if self.ctx.config.expiry_policy == ExpiryPolicy::Forfeit && inv.has_matured(self.ctx.now) {
            log::debug!("income: {investment_id} matured under forfeit");
            return Err(LedgerError::InvestmentNotActive(investment_id.to_string()));
        }
        let plan = self
            .ctx
            .store
            .get_plan(&inv.plan_id)?
            .ok_or_else(|| LedgerError::not_found("plan", &inv.plan_id))?;

        self.apply(&inv, &plan, out)?
            .ok_or_else(|| LedgerError::NothingToCollect(investment_id.to_string()))
    }

    /// Pay the current accrual window of an active investment. `None` means
    /// there was nothing to pay, or a concurrent collector won the window.
    pub(crate) fn apply(
        &self,
        inv: &Investment,
        plan: &Plan,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<Option<CollectionReceipt>> {
        let accrual = compute_accrual(inv, plan, self.ctx.now);
        if accrual.days == 0 {
            return Ok(None);
        }
        if !self.ctx.store.advance_collection(
            &inv.id,
            inv.total_days_collected,
            accrual.days,
            accrual.amount,
            self.ctx.now,
        )? {
            log::info!("income: window on {} already collected", inv.id);
            return Ok(None);
        }

        let ledger = BalanceLedger::new(self.ctx);
        if accrual.amount > 0.0 {
            ledger.credit(
                &inv.user_id,
                Pool::Locked,
                accrual.amount,
                EntryKind::DailyIncome,
                Some(&inv.id),
            )?;
        }

        let tx = IncomeTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            investment_id: inv.id.clone(),
            user_id: inv.user_id.clone(),
            amount: accrual.amount,
            days_collected: accrual.days,
            is_final_collection: accrual.is_final,
            source: IncomeSource::Collection,
            status: "completed".into(),
            transferred_at: None,
            created_at: self.ctx.now,
        };
        self.ctx
            .audit("income transaction", self.ctx.store.insert_income_transaction(&tx))?;

        log::info!(
            "income: {} collected {:.2} for {} day(s) on {}{}",
            inv.user_id,
            accrual.amount,
            accrual.days,
            inv.id,
            if accrual.is_final { " (final)" } else { "" }
        );
        out.push(LedgerEvent::IncomeCollected {
            investment_id: inv.id.clone(),
            user_id: inv.user_id.clone(),
            amount: accrual.amount,
            days: accrual.days,
            is_final: accrual.is_final,
        });

        let mut capital_returned = 0.0;
        if accrual.is_final {
            let closed = InvestmentStateMachine::new(self.ctx).close(
                inv,
                plan,
                InvestmentStatus::Completed,
                out,
            )?;
            capital_returned = closed.unwrap_or(0.0);
        }

        if accrual.amount > 0.0 {
            ReferralCommissionEngine::new(self.ctx).pay(
                CommissionType::Earning,
                &inv.user_id,
                accrual.amount,
                Some(&tx.id),
                out,
            )?;
        }

        Ok(Some(CollectionReceipt {
            investment_id: inv.id.clone(),
            amount_credited: accrual.amount,
            days_collected: accrual.days,
            is_final: accrual.is_final,
            capital_returned,
            balance: ledger.balance(&inv.user_id, Pool::Spendable)?,
            earned_balance: ledger.balance(&inv.user_id, Pool::Locked)?,
        }))
    }

    /// Move the not-yet-transferred income of one investment from the locked
    /// pool to the spendable pool. The move is capped at what the locked pool
    /// holds. Returns the amount moved.
    pub fn transfer_earnings(
        &self,
        user_id: &str,
        investment_id: &str,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<Money> {
        let inv = self
            .ctx
            .store
            .get_investment(investment_id)?
            .ok_or_else(|| LedgerError::not_found("investment", investment_id))?;
        if inv.user_id != user_id {
            return Err(LedgerError::Forbidden(format!(
                "investment {investment_id} does not belong to {user_id}"
            )));
        }

        let ledger = BalanceLedger::new(self.ctx);
        let pending = round_money(self.ctx.store.untransferred_income(investment_id, user_id)?);
        if pending <= 0.0 {
            return Ok(0.0);
        }
        let locked = ledger.balance(user_id, Pool::Locked)?;
        let amount = round_money(pending.min(locked));
        if amount < pending {
            log::warn!(
                "income: {user_id} has {pending:.2} untransferred on {investment_id} \
                 but only {locked:.2} locked; moving {amount:.2}"
            );
        }

        if amount > 0.0 {
            ledger.transfer_pool(
                user_id,
                Pool::Locked,
                Pool::Spendable,
                amount,
                EntryKind::EarningsUnlock,
                Some(investment_id),
            )?;
        }
        let rows = self
            .ctx
            .store
            .mark_income_transferred(investment_id, user_id, self.ctx.now)?;

        log::info!("income: {user_id} unlocked {amount:.2} from {rows} row(s) on {investment_id}");
        out.push(LedgerEvent::EarningsTransferred {
            user_id: user_id.to_string(),
            investment_id: investment_id.to_string(),
            amount,
        });
        Ok(amount)
    }
}
