//! BalanceLedger: the only writer of user balances.
//!
//! Two pools per user: `Spendable` (`balance`) and `Locked`
//! (`earned_balance`). Every mutation is a relative increment in a single
//! statement; debits carry their own non-negative guard so concurrent
//! writers can never push a pool below zero.

use crate::{
    error::{LedgerError, LedgerResult},
    subsystem::LedgerContext,
    types::{round_money, Money, Pool},
};

/// Why a balance moved. Stored in `ledger_entries.kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Deposit,
    InvestmentPurchase,
    DailyIncome,
    CapitalReturn,
    EarningsUnlock,
    ReferralCommission,
    Bonus,
    ManualEarnings,
    AdminCorrection,
    Withdrawal,
    WithdrawalRefund,
    External,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::InvestmentPurchase => "investment_purchase",
            Self::DailyIncome => "daily_income",
            Self::CapitalReturn => "capital_return",
            Self::EarningsUnlock => "earnings_unlock",
            Self::ReferralCommission => "referral_commission",
            Self::Bonus => "bonus",
            Self::ManualEarnings => "manual_earnings",
            Self::AdminCorrection => "admin_correction",
            Self::Withdrawal => "withdrawal",
            Self::WithdrawalRefund => "withdrawal_refund",
            Self::External => "external",
        }
    }
}

pub struct BalanceLedger<'a> {
    ctx: LedgerContext<'a>,
}

impl<'a> BalanceLedger<'a> {
    pub fn new(ctx: LedgerContext<'a>) -> Self {
        Self { ctx }
    }

    pub fn credit(
        &self,
        user_id: &str,
        pool: Pool,
        amount: Money,
        kind: EntryKind,
        reference: Option<&str>,
    ) -> LedgerResult<()> {
        let amount = checked_amount(amount)?;
        if !self.ctx.store.credit_pool(user_id, pool, amount)? {
            return Err(LedgerError::not_found("user", user_id));
        }
        self.record(user_id, pool, amount, kind, reference)
    }

    pub fn debit(
        &self,
        user_id: &str,
        pool: Pool,
        amount: Money,
        kind: EntryKind,
        reference: Option<&str>,
    ) -> LedgerResult<()> {
        let amount = checked_amount(amount)?;
        if !self.ctx.store.debit_pool(user_id, pool, amount)? {
            return Err(self.debit_failure(user_id, pool, amount)?);
        }
        self.record(user_id, pool, -amount, kind, reference)
    }

    /// Move `amount` from one pool to the other. Both legs succeed or the
    /// enclosing transaction rolls back.
    pub fn transfer_pool(
        &self,
        user_id: &str,
        from: Pool,
        to: Pool,
        amount: Money,
        kind: EntryKind,
        reference: Option<&str>,
    ) -> LedgerResult<()> {
        if from == to {
            return Err(LedgerError::Validation("transfer needs two different pools".into()));
        }
        self.ctx.store.in_savepoint("pool_transfer", || {
            self.debit(user_id, from, amount, kind, reference)?;
            self.credit(user_id, to, amount, kind, reference)
        })
    }

    pub fn balance(&self, user_id: &str, pool: Pool) -> LedgerResult<Money> {
        self.ctx
            .store
            .pool_balance(user_id, pool)?
            .ok_or_else(|| LedgerError::not_found("user", user_id))
    }

    fn debit_failure(&self, user_id: &str, pool: Pool, amount: Money) -> LedgerResult<LedgerError> {
        match self.ctx.store.pool_balance(user_id, pool)? {
            None => Ok(LedgerError::not_found("user", user_id)),
            Some(available) => Ok(LedgerError::InsufficientFunds {
                needed: amount,
                available,
            }),
        }
    }

    fn record(
        &self,
        user_id: &str,
        pool: Pool,
        delta: Money,
        kind: EntryKind,
        reference: Option<&str>,
    ) -> LedgerResult<()> {
        log::debug!(
            "ledger: {} {delta:+.2} on {user_id} ({})",
            pool.as_str(),
            kind.as_str()
        );
        self.ctx.audit(
            "ledger entry",
            self.ctx
                .store
                .insert_ledger_entry(user_id, pool, delta, kind.as_str(), reference, self.ctx.now),
        )
    }
}

/// Reject non-positive or non-finite amounts; round the rest to paisa.
fn checked_amount(amount: Money) -> LedgerResult<Money> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(LedgerError::InvalidAmount(amount));
    }
    let rounded = round_money(amount);
    if rounded <= 0.0 {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(rounded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_positive_amounts_are_invalid() {
        assert!(matches!(checked_amount(0.0), Err(LedgerError::InvalidAmount(_))));
        assert!(matches!(checked_amount(-5.0), Err(LedgerError::InvalidAmount(_))));
        assert!(matches!(checked_amount(f64::NAN), Err(LedgerError::InvalidAmount(_))));
        assert!(matches!(checked_amount(0.001), Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn amounts_round_to_paisa() {
        assert_eq!(checked_amount(10.006).unwrap(), 10.01);
        assert_eq!(checked_amount(49.999).unwrap(), 50.0);
    }
}
