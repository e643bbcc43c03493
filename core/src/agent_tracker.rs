//! AgentEligibilityTracker: referral thresholds and the agent flag.
//!
//! A referral counts at level N when it sits N hops below the user and has
//! had at least one deposit approved. Eligibility is sticky: once
//! `eligibility_achieved` is set it never goes back, even if counts drop.
//!
//!   none ──activate──▶ active ──deactivate──▶ suspended
//!
//! There is no path out of `suspended`.

use crate::{
    admin::{log_admin_action, require_admin},
    balance_ledger::{BalanceLedger, EntryKind},
    config::LedgerConfig,
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    model::{AgentEligibility, AgentStatus, BonusTransaction, UserAccount},
    referral_engine::MAX_LEVELS,
    subsystem::{LedgerContext, LedgerSubsystem},
    types::{round_money, Pool, UserId},
};
use std::collections::HashSet;

/// Qualified referral counts per level, L1 first.
pub type LevelCounts = [i64; MAX_LEVELS];

pub fn meets_requirements(counts: &LevelCounts, config: &LedgerConfig) -> bool {
    counts[0] >= config.agent_l1_requirement
        && counts[1] >= config.agent_l2_requirement
        && counts[2] >= config.agent_l3_requirement
}

pub struct AgentEligibilityTracker<'a> {
    ctx: LedgerContext<'a>,
}

impl<'a> AgentEligibilityTracker<'a> {
    pub fn new(ctx: LedgerContext<'a>) -> Self {
        Self { ctx }
    }

    /// Walk the referral tree three levels down, counting referrals with an
    /// approved deposit at each level.
    pub fn count_qualified(&self, user_id: &str) -> LedgerResult<LevelCounts> {
        let mut counts: LevelCounts = [0; MAX_LEVELS];
        let mut seen: HashSet<UserId> = HashSet::from([user_id.to_string()]);
        let mut frontier = vec![user_id.to_string()];
        for count in counts.iter_mut() {
            let mut next = Vec::new();
            for parent in &frontier {
                for row in self.ctx.store.direct_referrals(parent)? {
                    if !seen.insert(row.user_id.clone()) {
                        continue;
                    }
                    if row.has_approved_deposit {
                        *count += 1;
                    }
                    next.push(row.user_id);
                }
            }
            frontier = next;
        }
        Ok(counts)
    }

    /// Recompute and persist the tracking row. Emits
    /// `AgentEligibilityAchieved` the first time the thresholds are met.
    pub fn evaluate(
        &self,
        user_id: &str,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<AgentEligibility> {
        if self.ctx.store.get_user(user_id)?.is_none() {
            return Err(LedgerError::not_found("user", user_id));
        }
        let counts = self.count_qualified(user_id)?;
        let prior = self.ctx.store.get_eligibility(user_id)?;
        let already = prior.as_ref().is_some_and(|p| p.eligibility_achieved);
        let eligible_now = meets_requirements(&counts, self.ctx.config);

        let snapshot = AgentEligibility {
            user_id: user_id.to_string(),
            level1_count: counts[0],
            level2_count: counts[1],
            level3_count: counts[2],
            eligibility_achieved: already || eligible_now,
            achieved_at: match prior.as_ref().and_then(|p| p.achieved_at) {
                Some(at) => Some(at),
                None if eligible_now => Some(self.ctx.now),
                None => None,
            },
            updated_at: self.ctx.now,
        };
        self.ctx.store.upsert_eligibility(&snapshot)?;

        if eligible_now && !already {
            log::info!(
                "agent: {user_id} reached eligibility ({}/{}/{})",
                counts[0],
                counts[1],
                counts[2]
            );
            out.push(LedgerEvent::AgentEligibilityAchieved {
                user_id: user_id.to_string(),
            });
        }
        Ok(snapshot)
    }

    /// Re-evaluate everyone above `user_id` in the referral chain. Called
    /// after a deposit approval or a new signup changes their counts.
    pub fn evaluate_ancestors(
        &self,
        user_id: &str,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<()> {
        let mut seen: HashSet<UserId> = HashSet::from([user_id.to_string()]);
        let mut current = user_id.to_string();
        for _ in 0..MAX_LEVELS {
            let Some(parent) = self.ctx.store.referrer_of(&current)? else {
                break;
            };
            if !seen.insert(parent.clone()) {
                break;
            }
            self.evaluate(&parent, out)?;
            current = parent;
        }
        Ok(())
    }

    /// Admin-only. Turns an eligible user into an active agent; activating
    /// an already active agent is a no-op.
    pub fn activate(
        &self,
        admin_id: &str,
        user_id: &str,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<UserAccount> {
        require_admin(&self.ctx, admin_id)?;
        let user = self.require_user(user_id)?;
        match user.agent_status {
            AgentStatus::Active => return Ok(user),
            AgentStatus::Suspended => {
                log::warn!("agent: refusing to reactivate suspended agent {user_id}");
                return Err(LedgerError::NotEligible(user_id.to_string()));
            }
            AgentStatus::Inactive => {}
        }

        let snapshot = self.evaluate(user_id, out)?;
        if !snapshot.eligibility_achieved {
            return Err(LedgerError::NotEligible(user_id.to_string()));
        }
        if !self.ctx.store.activate_agent_flag(user_id, self.ctx.now)? {
            // Flipped by a concurrent call between our read and write.
            return self.require_user(user_id);
        }

        let bonus = round_money(self.ctx.config.agent_activation_bonus);
        if bonus > 0.0 {
            BalanceLedger::new(self.ctx).credit(
                user_id,
                Pool::Spendable,
                bonus,
                EntryKind::Bonus,
                None,
            )?;
            let record = BonusTransaction {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                admin_id: Some(admin_id.to_string()),
                amount: bonus,
                bonus_type: "agent_activation".into(),
                reason: "agent activation bonus".into(),
                created_at: self.ctx.now,
            };
            self.ctx
                .audit("bonus transaction", self.ctx.store.insert_bonus_transaction(&record))?;
        }
        log_admin_action(
            &self.ctx,
            admin_id,
            "activate_agent",
            user_id,
            None,
            (bonus > 0.0).then_some(bonus),
            "eligibility thresholds met",
        )?;

        log::info!("agent: {admin_id} activated {user_id} (bonus {bonus:.2})");
        out.push(LedgerEvent::AgentActivated {
            user_id: user_id.to_string(),
            admin_id: admin_id.to_string(),
        });
        self.require_user(user_id)
    }

    /// Admin-only. Suspends an active agent.
    pub fn deactivate(
        &self,
        admin_id: &str,
        user_id: &str,
        reason: &str,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<UserAccount> {
        require_admin(&self.ctx, admin_id)?;
        let user = self.require_user(user_id)?;
        if !self.ctx.store.suspend_agent_flag(user_id)? {
            return Err(LedgerError::Validation(format!(
                "user {user_id} is not an active agent (status {})",
                user.agent_status.as_str()
            )));
        }
        log_admin_action(&self.ctx, admin_id, "deactivate_agent", user_id, None, None, reason)?;

        log::info!("agent: {admin_id} suspended {user_id} ({reason})");
        out.push(LedgerEvent::AgentSuspended {
            user_id: user_id.to_string(),
            admin_id: admin_id.to_string(),
        });
        self.require_user(user_id)
    }

    fn require_user(&self, user_id: &str) -> LedgerResult<UserAccount> {
        self.ctx
            .store
            .get_user(user_id)?
            .ok_or_else(|| LedgerError::not_found("user", user_id))
    }
}

/// Maintenance-pass participant that refreshes every tracking row.
pub struct EligibilitySweep;

impl LedgerSubsystem for EligibilitySweep {
    fn name(&self) -> &'static str {
        "agent_eligibility"
    }

    fn sweep(&self, ctx: &LedgerContext<'_>) -> LedgerResult<Vec<LedgerEvent>> {
        let tracker = AgentEligibilityTracker::new(*ctx);
        let mut events = Vec::new();
        for user_id in ctx.store.all_user_ids()? {
            tracker.evaluate(&user_id, &mut events)?;
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_level_must_meet_its_threshold() {
        let mut config = LedgerConfig::default_test();
        config.agent_l1_requirement = 10;
        config.agent_l2_requirement = 5;
        config.agent_l3_requirement = 0;
        assert!(meets_requirements(&[10, 5, 0], &config));
        assert!(meets_requirements(&[12, 9, 3], &config));
        assert!(!meets_requirements(&[9, 5, 0], &config));
        assert!(!meets_requirements(&[10, 4, 100], &config));
    }

    #[test]
    fn zero_requirements_are_always_met() {
        let mut config = LedgerConfig::default_test();
        config.agent_l1_requirement = 0;
        assert!(meets_requirements(&[0, 0, 0], &config));
    }
}
