//! InvestmentStateMachine: investment lifecycle.
//!
//!   active ──(final collection / settled by sweep)──▶ completed
//!   active ──(term over, forfeited by sweep)────────▶ expired
//!
//! No transition is reversible. The row itself is the escrow record:
//! purchase moves the principal out of the spendable pool, and closing
//! moves it back when the plan returns capital.
//!
//! The expiry sweep runs lazily at the start of every investment-bearing
//! operation and again in the maintenance pass. It is idempotent: the close
//! is a compare-and-swap on `status = 'active'`.

use crate::{
    balance_ledger::{BalanceLedger, EntryKind},
    config::ExpiryPolicy,
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    income_collector::DailyIncomeCollector,
    model::{Investment, InvestmentStatus, Plan},
    subsystem::{LedgerContext, LedgerSubsystem},
    types::{round_money, Money, Pool},
};

pub struct InvestmentStateMachine<'a> {
    ctx: LedgerContext<'a>,
}

impl<'a> InvestmentStateMachine<'a> {
    pub fn new(ctx: LedgerContext<'a>) -> Self {
        Self { ctx }
    }

    /// Open a new investment: debit the principal and create the escrow row.
    pub fn purchase(
        &self,
        user_id: &str,
        plan_id: &str,
        amount: Money,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<Investment> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let amount = round_money(amount);
        let plan = self
            .ctx
            .store
            .get_plan(plan_id)?
            .ok_or_else(|| LedgerError::not_found("plan", plan_id))?;
        if !plan.is_active {
            return Err(LedgerError::Validation(format!(
                "plan '{plan_id}' is not open for purchase"
            )));
        }
        if !plan.accepts(amount) {
            return Err(LedgerError::Validation(format!(
                "amount {amount:.2} is outside plan '{}' bounds ({:.2} .. {})",
                plan.id,
                plan.min_amount,
                plan.max_amount.map_or("unbounded".to_string(), |m| format!("{m:.2}")),
            )));
        }

        let investment = Investment::open(
            uuid::Uuid::new_v4().to_string(),
            user_id,
            &plan,
            amount,
            self.ctx.now,
        );
        BalanceLedger::new(self.ctx).debit(
            user_id,
            Pool::Spendable,
            amount,
            EntryKind::InvestmentPurchase,
            Some(&investment.id),
        )?;
        self.ctx.store.insert_investment(&investment)?;

        log::info!(
            "investment: {user_id} bought {} for {amount:.2} ({} days, ends {})",
            plan.id,
            plan.duration_days,
            investment.end_date
        );
        out.push(LedgerEvent::InvestmentPurchased {
            investment_id: investment.id.clone(),
            user_id: user_id.to_string(),
            plan_id: plan.id,
            amount,
        });
        Ok(investment)
    }

    /// Expire-or-settle every matured active investment of one user.
    pub fn sweep_user(&self, user_id: &str, out: &mut Vec<LedgerEvent>) -> LedgerResult<usize> {
        let matured: Vec<Investment> = self
            .ctx
            .store
            .investments_for_user(user_id)?
            .into_iter()
            .filter(|inv| inv.status == InvestmentStatus::Active && inv.has_matured(self.ctx.now))
            .collect();
        self.settle_all(matured, out)
    }

    /// Expire-or-settle every matured active investment in the store.
    pub fn sweep_all(&self, out: &mut Vec<LedgerEvent>) -> LedgerResult<usize> {
        let matured: Vec<Investment> = self
            .ctx
            .store
            .active_investments()?
            .into_iter()
            .filter(|inv| inv.has_matured(self.ctx.now))
            .collect();
        self.settle_all(matured, out)
    }

    fn settle_all(
        &self,
        matured: Vec<Investment>,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<usize> {
        let mut closed = 0;
        for inv in matured {
            let mut events = Vec::new();
            let result = self
                .ctx
                .store
                .in_savepoint("expiry_sweep", || self.settle_matured(&inv, &mut events));
            match result {
                Ok(true) => {
                    closed += 1;
                    out.extend(events);
                }
                Ok(false) => {}
                Err(e) if self.ctx.config.strict_audit => return Err(e),
                Err(e) => log::error!("investment: sweep could not close {}: {e}", inv.id),
            }
        }
        Ok(closed)
    }

    /// Close one matured investment under the configured expiry policy.
    /// Returns false if someone else already closed it.
    fn settle_matured(&self, inv: &Investment, out: &mut Vec<LedgerEvent>) -> LedgerResult<bool> {
        let plan = self
            .ctx
            .store
            .get_plan(&inv.plan_id)?
            .ok_or_else(|| LedgerError::not_found("plan", &inv.plan_id))?;

        match self.ctx.config.expiry_policy {
            ExpiryPolicy::Settle => {
                let receipt = DailyIncomeCollector::new(self.ctx).apply(inv, &plan, out)?;
                match receipt {
                    Some(r) => Ok(r.is_final),
                    // Every day was already collected but the row is still
                    // active: close it without another payout.
                    None => Ok(self
                        .close(inv, &plan, InvestmentStatus::Completed, out)?
                        .is_some()),
                }
            }
            ExpiryPolicy::Forfeit => {
                Ok(self.close(inv, &plan, InvestmentStatus::Expired, out)?.is_some())
            }
        }
    }

    /// Move an active investment into a terminal status and return the
    /// principal when the plan says so. Returns the capital paid back, or
    /// `None` if the investment had already left `active`.
    pub fn close(
        &self,
        inv: &Investment,
        plan: &Plan,
        status: InvestmentStatus,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<Option<Money>> {
        if !status.is_terminal() {
            return Err(LedgerError::Validation(format!(
                "cannot move investment {} back to {}",
                inv.id,
                status.as_str()
            )));
        }
        if !self.ctx.store.close_investment(&inv.id, status, self.ctx.now)? {
            return Ok(None);
        }

        let mut capital = 0.0;
        if plan.capital_return {
            capital = inv.amount_invested;
            BalanceLedger::new(self.ctx).credit(
                &inv.user_id,
                Pool::Spendable,
                capital,
                EntryKind::CapitalReturn,
                Some(&inv.id),
            )?;
            out.push(LedgerEvent::CapitalReturned {
                investment_id: inv.id.clone(),
                user_id: inv.user_id.clone(),
                amount: capital,
            });
        }

        log::info!(
            "investment: {} -> {} (capital returned {capital:.2}, days collected {}/{})",
            inv.id,
            status.as_str(),
            inv.total_days_collected,
            plan.duration_days
        );
        out.push(LedgerEvent::InvestmentClosed {
            investment_id: inv.id.clone(),
            status: status.as_str().to_string(),
        });
        Ok(Some(capital))
    }
}

/// Maintenance-pass participant that closes matured investments.
pub struct ExpirySweep;

impl LedgerSubsystem for ExpirySweep {
    fn name(&self) -> &'static str {
        "investment_expiry"
    }

    fn sweep(&self, ctx: &LedgerContext<'_>) -> LedgerResult<Vec<LedgerEvent>> {
        let mut events = Vec::new();
        let closed = InvestmentStateMachine::new(*ctx).sweep_all(&mut events)?;
        if closed > 0 {
            log::info!("investment: maintenance sweep closed {closed} matured investments");
        }
        Ok(events)
    }
}
