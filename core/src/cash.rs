//! Deposits and withdrawals: money entering and leaving the platform.
//!
//! Deposits are requested by users and only touch a balance once an admin
//! approves them. Withdrawals debit the full amount plus fee at request time
//! (an explicit call, never a side effect of inserting the row); rejecting a
//! pending withdrawal refunds that debit.

use crate::{
    admin::{log_admin_action, require_admin},
    agent_tracker::AgentEligibilityTracker,
    balance_ledger::{BalanceLedger, EntryKind},
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    model::{CommissionType, Deposit, DepositType, RequestStatus, Withdrawal},
    referral_engine::ReferralCommissionEngine,
    subsystem::LedgerContext,
    types::{round_money, Money, Pool},
};

/// Fee breakdown of a withdrawal at a given fee percentage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WithdrawalQuote {
    pub amount: Money,
    pub fee_amount: Money,
    pub fee_percent: f64,
    pub total_deducted: Money,
}

impl WithdrawalQuote {
    pub fn compute(amount: Money, fee_percent: f64) -> Self {
        let amount = round_money(amount);
        let fee_amount = round_money(amount * fee_percent / 100.0);
        Self {
            amount,
            fee_amount,
            fee_percent,
            total_deducted: round_money(amount + fee_amount),
        }
    }

    /// Check caller-supplied figures against this quote, to the paisa.
    pub fn verify(
        &self,
        fee_amount: Money,
        fee_percent: f64,
        total_deducted: Money,
    ) -> LedgerResult<()> {
        const TOLERANCE: f64 = 0.005;
        if (fee_percent - self.fee_percent).abs() > 1e-9 {
            return Err(LedgerError::Validation(format!(
                "fee percent {fee_percent} does not match the configured {}",
                self.fee_percent
            )));
        }
        if (fee_amount - self.fee_amount).abs() > TOLERANCE {
            return Err(LedgerError::Validation(format!(
                "fee {fee_amount:.2} does not match {:.2} for amount {:.2}",
                self.fee_amount, self.amount
            )));
        }
        if (total_deducted - self.total_deducted).abs() > TOLERANCE {
            return Err(LedgerError::Validation(format!(
                "total deducted {total_deducted:.2} does not match {:.2}",
                self.total_deducted
            )));
        }
        Ok(())
    }
}

pub struct CashDesk<'a> {
    ctx: LedgerContext<'a>,
}

impl<'a> CashDesk<'a> {
    pub fn new(ctx: LedgerContext<'a>) -> Self {
        Self { ctx }
    }

    // ── Deposits ───────────────────────────────────────────────

    pub fn request_deposit(
        &self,
        user_id: &str,
        amount: Money,
        deposit_type: &str,
    ) -> LedgerResult<Deposit> {
        let deposit_type = DepositType::parse(deposit_type.trim()).ok_or_else(|| {
            LedgerError::Validation(format!("unknown deposit type '{deposit_type}'"))
        })?;
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let amount = round_money(amount);
        if amount < self.ctx.config.min_deposit_amount {
            return Err(LedgerError::Validation(format!(
                "minimum deposit is {:.2}, got {amount:.2}",
                self.ctx.config.min_deposit_amount
            )));
        }
        if self.ctx.store.get_user(user_id)?.is_none() {
            return Err(LedgerError::not_found("user", user_id));
        }

        let deposit = Deposit {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            amount,
            deposit_type,
            status: RequestStatus::Pending,
            reviewed_by: None,
            reviewed_at: None,
            created_at: self.ctx.now,
        };
        self.ctx.store.insert_deposit(&deposit)?;
        log::info!(
            "cash: {user_id} requested a {amount:.2} {} deposit ({})",
            deposit_type.as_str(),
            deposit.id
        );
        Ok(deposit)
    }

    /// Approve a pending deposit: credit it, pay the L1 deposit commission
    /// and refresh the eligibility of everyone above the depositor.
    pub fn approve_deposit(
        &self,
        admin_id: &str,
        deposit_id: &str,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<Deposit> {
        require_admin(&self.ctx, admin_id)?;
        let deposit = self.pending_deposit(deposit_id)?;
        if !self
            .ctx
            .store
            .review_deposit(deposit_id, RequestStatus::Approved, admin_id, self.ctx.now)?
        {
            return Err(already_settled("deposit", deposit_id));
        }

        BalanceLedger::new(self.ctx).credit(
            &deposit.user_id,
            Pool::Spendable,
            deposit.amount,
            EntryKind::Deposit,
            Some(deposit_id),
        )?;
        log_admin_action(
            &self.ctx,
            admin_id,
            "approve_deposit",
            &deposit.user_id,
            Some(deposit_id),
            Some(deposit.amount),
            "",
        )?;
        log::info!(
            "cash: {admin_id} approved deposit {deposit_id} of {:.2} for {}",
            deposit.amount,
            deposit.user_id
        );
        out.push(LedgerEvent::DepositApproved {
            deposit_id: deposit_id.to_string(),
            user_id: deposit.user_id.clone(),
            amount: deposit.amount,
        });

        ReferralCommissionEngine::new(self.ctx).pay(
            CommissionType::Deposit,
            &deposit.user_id,
            deposit.amount,
            Some(deposit_id),
            out,
        )?;

        let mut events = Vec::new();
        let tracker = AgentEligibilityTracker::new(self.ctx);
        let refreshed = self.ctx.store.in_savepoint("eligibility_refresh", || {
            tracker.evaluate_ancestors(&deposit.user_id, &mut events)
        });
        if refreshed.is_ok() {
            out.extend(events);
        }
        self.ctx.audit("agent eligibility", refreshed)?;

        self.ctx
            .store
            .get_deposit(deposit_id)?
            .ok_or_else(|| LedgerError::not_found("deposit", deposit_id))
    }

    pub fn reject_deposit(
        &self,
        admin_id: &str,
        deposit_id: &str,
        reason: &str,
    ) -> LedgerResult<Deposit> {
        require_admin(&self.ctx, admin_id)?;
        let deposit = self.pending_deposit(deposit_id)?;
        if !self
            .ctx
            .store
            .review_deposit(deposit_id, RequestStatus::Rejected, admin_id, self.ctx.now)?
        {
            return Err(already_settled("deposit", deposit_id));
        }
        log_admin_action(
            &self.ctx,
            admin_id,
            "reject_deposit",
            &deposit.user_id,
            Some(deposit_id),
            Some(deposit.amount),
            reason,
        )?;
        log::info!("cash: {admin_id} rejected deposit {deposit_id} ({reason})");
        self.ctx
            .store
            .get_deposit(deposit_id)?
            .ok_or_else(|| LedgerError::not_found("deposit", deposit_id))
    }

    fn pending_deposit(&self, deposit_id: &str) -> LedgerResult<Deposit> {
        let deposit = self
            .ctx
            .store
            .get_deposit(deposit_id)?
            .ok_or_else(|| LedgerError::not_found("deposit", deposit_id))?;
        if deposit.status != RequestStatus::Pending {
            return Err(already_settled("deposit", deposit_id));
        }
        Ok(deposit)
    }

    // ── Withdrawals ────────────────────────────────────────────

    /// Verify the fee figures, debit `total_deducted` and record a pending
    /// withdrawal, all in the caller's transaction.
    pub fn create_withdrawal_request(
        &self,
        user_id: &str,
        amount: Money,
        fee_amount: Money,
        fee_percent: f64,
        total_deducted: Money,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<Withdrawal> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let quote = WithdrawalQuote::compute(amount, self.ctx.config.withdrawal_fee_percent);
        if quote.amount < self.ctx.config.min_withdrawal_amount {
            return Err(LedgerError::Validation(format!(
                "minimum withdrawal is {:.2}, got {:.2}",
                self.ctx.config.min_withdrawal_amount, quote.amount
            )));
        }
        quote.verify(fee_amount, fee_percent, total_deducted)?;

        let withdrawal = Withdrawal {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            amount: quote.amount,
            fee_amount: quote.fee_amount,
            fee_percent: quote.fee_percent,
            total_deducted: quote.total_deducted,
            status: RequestStatus::Pending,
            processed_by: None,
            processed_at: None,
            created_at: self.ctx.now,
        };
        BalanceLedger::new(self.ctx).debit(
            user_id,
            Pool::Spendable,
            quote.total_deducted,
            EntryKind::Withdrawal,
            Some(&withdrawal.id),
        )?;
        self.ctx.store.insert_withdrawal(&withdrawal)?;

        log::info!(
            "cash: {user_id} requested withdrawal {} of {:.2} (fee {:.2}, deducted {:.2})",
            withdrawal.id,
            quote.amount,
            quote.fee_amount,
            quote.total_deducted
        );
        out.push(LedgerEvent::WithdrawalRequested {
            withdrawal_id: withdrawal.id.clone(),
            user_id: user_id.to_string(),
            total_deducted: quote.total_deducted,
        });
        Ok(withdrawal)
    }

    /// Mark a pending withdrawal as paid out. The money already left the
    /// balance when the request was created.
    pub fn approve_withdrawal(
        &self,
        admin_id: &str,
        withdrawal_id: &str,
    ) -> LedgerResult<Withdrawal> {
        require_admin(&self.ctx, admin_id)?;
        let withdrawal = self.pending_withdrawal(withdrawal_id)?;
        if !self.ctx.store.process_withdrawal(
            withdrawal_id,
            RequestStatus::Approved,
            admin_id,
            self.ctx.now,
        )? {
            return Err(already_settled("withdrawal", withdrawal_id));
        }
        log_admin_action(
            &self.ctx,
            admin_id,
            "approve_withdrawal",
            &withdrawal.user_id,
            Some(withdrawal_id),
            Some(withdrawal.amount),
            "",
        )?;
        log::info!("cash: {admin_id} approved withdrawal {withdrawal_id}");
        self.ctx
            .store
            .get_withdrawal(withdrawal_id)?
            .ok_or_else(|| LedgerError::not_found("withdrawal", withdrawal_id))
    }

    /// Reject a pending withdrawal and refund everything it deducted.
    pub fn reject_withdrawal(
        &self,
        admin_id: &str,
        withdrawal_id: &str,
        reason: &str,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<Withdrawal> {
        require_admin(&self.ctx, admin_id)?;
        let withdrawal = self.pending_withdrawal(withdrawal_id)?;
        if !self.ctx.store.process_withdrawal(
            withdrawal_id,
            RequestStatus::Rejected,
            admin_id,
            self.ctx.now,
        )? {
            return Err(already_settled("withdrawal", withdrawal_id));
        }
        BalanceLedger::new(self.ctx).credit(
            &withdrawal.user_id,
            Pool::Spendable,
            withdrawal.total_deducted,
            EntryKind::WithdrawalRefund,
            Some(withdrawal_id),
        )?;
        log_admin_action(
            &self.ctx,
            admin_id,
            "reject_withdrawal",
            &withdrawal.user_id,
            Some(withdrawal_id),
            Some(withdrawal.total_deducted),
            reason,
        )?;

        log::info!(
            "cash: {admin_id} rejected withdrawal {withdrawal_id}, refunded {:.2} ({reason})",
            withdrawal.total_deducted
        );
        out.push(LedgerEvent::WithdrawalRefunded {
            withdrawal_id: withdrawal_id.to_string(),
            user_id: withdrawal.user_id.clone(),
            amount: withdrawal.total_deducted,
        });
        self.ctx
            .store
            .get_withdrawal(withdrawal_id)?
            .ok_or_else(|| LedgerError::not_found("withdrawal", withdrawal_id))
    }

    fn pending_withdrawal(&self, withdrawal_id: &str) -> LedgerResult<Withdrawal> {
        let withdrawal = self
            .ctx
            .store
            .get_withdrawal(withdrawal_id)?
            .ok_or_else(|| LedgerError::not_found("withdrawal", withdrawal_id))?;
        if withdrawal.status != RequestStatus::Pending {
            return Err(already_settled("withdrawal", withdrawal_id));
        }
        Ok(withdrawal)
    }
}

fn already_settled(what: &str, id: &str) -> LedgerError {
    LedgerError::Validation(format!("{what} {id} has already been processed"))
}
