//! ReferralCommissionEngine: pays up to three referral ancestors.
//!
//! Levels:
//!   L1 = direct referrer, L2 = referrer's referrer, L3 = the next one up.
//!
//! Rules:
//!   - `deposit` events pay L1 only, at `referral_l1_deposit_percent`.
//!   - `earning` events pay every resolved level at its own rate.
//!   - Every level is computed off the same base amount (no compounding).
//!   - A chain shorter than three simply pays fewer levels.
//!
//! A failed cascade is rolled back to its savepoint and logged for
//! reconciliation; the credit that triggered it stays applied.

use crate::{
    balance_ledger::{BalanceLedger, EntryKind},
    config::LedgerConfig,
    error::LedgerResult,
    event::LedgerEvent,
    model::{CommissionType, ReferralCommission},
    subsystem::LedgerContext,
    types::{round_money, Money, Pool, UserId},
};
use std::collections::HashSet;

pub const MAX_LEVELS: usize = 3;

/// One commission owed to one ancestor, before anything is persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct CommissionPayout {
    pub referrer_id: UserId,
    pub level: u8,
    pub rate: f64,
    pub amount: Money,
}

/// Pure commission math. `ancestors[0]` is L1.
pub fn plan_commissions(
    commission_type: CommissionType,
    base: Money,
    ancestors: &[UserId],
    config: &LedgerConfig,
) -> Vec<CommissionPayout> {
    if !base.is_finite() || base <= 0.0 {
        return Vec::new();
    }
    let levels = match commission_type {
        CommissionType::Deposit => 1,
        CommissionType::Earning => MAX_LEVELS,
    };
    ancestors
        .iter()
        .take(levels)
        .enumerate()
        .filter_map(|(idx, referrer_id)| {
            let level = (idx + 1) as u8;
            let rate = match commission_type {
                CommissionType::Deposit => config.referral_l1_deposit_percent,
                CommissionType::Earning => config.earning_rate(level),
            };
            let amount = round_money(base * rate / 100.0);
            (amount > 0.0).then(|| CommissionPayout {
                referrer_id: referrer_id.clone(),
                level,
                rate,
                amount,
            })
        })
        .collect()
}

pub struct ReferralCommissionEngine<'a> {
    ctx: LedgerContext<'a>,
}

impl<'a> ReferralCommissionEngine<'a> {
    pub fn new(ctx: LedgerContext<'a>) -> Self {
        Self { ctx }
    }

    /// Follow `referred_by` links upward, at most three hops. Stops early at
    /// the top of the chain or if a link loops back on itself.
    pub fn resolve_ancestors(&self, user_id: &str) -> LedgerResult<Vec<UserId>> {
        let mut ancestors = Vec::with_capacity(MAX_LEVELS);
        let mut seen: HashSet<UserId> = HashSet::from([user_id.to_string()]);
        let mut current = user_id.to_string();
        while ancestors.len() < MAX_LEVELS {
            let Some(parent) = self.ctx.store.referrer_of(&current)? else {
                break;
            };
            if !seen.insert(parent.clone()) {
                log::warn!("referral: cycle in referral chain of {user_id} at {parent}");
                break;
            }
            ancestors.push(parent.clone());
            current = parent;
        }
        Ok(ancestors)
    }

    /// Pay the cascade for one qualifying event.
    ///
    /// Never fails the caller unless `strict_audit` is set: any error is
    /// logged for reconciliation and an empty list is returned.
    pub fn pay(
        &self,
        commission_type: CommissionType,
        referred_user_id: &str,
        base: Money,
        source_id: Option<&str>,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<Vec<ReferralCommission>> {
        let mut events = Vec::new();
        let result = self.ctx.store.in_savepoint("commission_cascade", || {
            self.cascade(commission_type, referred_user_id, base, source_id, &mut events)
        });
        match result {
            Ok(paid) => {
                out.extend(events);
                Ok(paid)
            }
            Err(e) if self.ctx.config.strict_audit => Err(e),
            Err(e) => {
                log::error!(
                    "reconciliation: {} commission for {referred_user_id} on base {base:.2} \
                     (source {}) not paid: {e}",
                    commission_type.as_str(),
                    source_id.unwrap_or("-"),
                );
                Ok(Vec::new())
            }
        }
    }

    fn cascade(
        &self,
        commission_type: CommissionType,
        referred_user_id: &str,
        base: Money,
        source_id: Option<&str>,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<Vec<ReferralCommission>> {
        let ancestors = self.resolve_ancestors(referred_user_id)?;
        let payouts = plan_commissions(commission_type, base, &ancestors, self.ctx.config);
        let ledger = BalanceLedger::new(self.ctx);

        let mut paid = Vec::with_capacity(payouts.len());
        for payout in payouts {
            ledger.credit(
                &payout.referrer_id,
                Pool::Spendable,
                payout.amount,
                EntryKind::ReferralCommission,
                source_id,
            )?;

            let record = ReferralCommission {
                id: uuid::Uuid::new_v4().to_string(),
                referrer_id: payout.referrer_id.clone(),
                referred_user_id: referred_user_id.to_string(),
                commission_type,
                level: payout.level,
                amount: payout.amount,
                commission_rate: payout.rate,
                source_id: source_id.map(str::to_string),
                created_at: self.ctx.now,
            };
            self.ctx.audit(
                "referral commission",
                self.ctx.store.insert_referral_commission(&record),
            )?;

            log::info!(
                "referral: L{} {} commission {:.2} ({}%) to {} from {referred_user_id}",
                payout.level,
                commission_type.as_str(),
                payout.amount,
                payout.rate,
                payout.referrer_id,
            );
            out.push(LedgerEvent::CommissionPaid {
                referrer_id: payout.referrer_id,
                referred_user_id: referred_user_id.to_string(),
                commission_type: commission_type.as_str().to_string(),
                level: payout.level,
                amount: payout.amount,
            });
            paid.push(record);
        }
        Ok(paid)
    }
}
