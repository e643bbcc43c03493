//! User registration and referral-code resolution.

use crate::{
    agent_tracker::AgentEligibilityTracker,
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    model::{AgentStatus, UserAccount},
    rng::CodeRng,
    subsystem::LedgerContext,
};

/// Give up after this many colliding codes in a row.
const MAX_CODE_ATTEMPTS: usize = 16;

pub struct Accounts<'a> {
    ctx: LedgerContext<'a>,
}

impl<'a> Accounts<'a> {
    pub fn new(ctx: LedgerContext<'a>) -> Self {
        Self { ctx }
    }

    /// Create a profile with zero balances and a fresh referral code.
    /// `referrer_code`, when given, must belong to an existing user.
    pub fn register(
        &self,
        display_name: &str,
        referrer_code: Option<&str>,
        user_level: i64,
        codes: &mut CodeRng,
        out: &mut Vec<LedgerEvent>,
    ) -> LedgerResult<UserAccount> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(LedgerError::Validation("display name is required".into()));
        }
        let referred_by = match referrer_code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => Some(
                self.ctx
                    .store
                    .user_by_referral_code(code)?
                    .ok_or_else(|| {
                        LedgerError::Validation(format!("unknown referral code '{code}'"))
                    })?
                    .id,
            ),
            None => None,
        };

        let user = UserAccount {
            id: uuid::Uuid::new_v4().to_string(),
            display_name: display_name.to_string(),
            balance: 0.0,
            earned_balance: 0.0,
            user_level,
            referral_code: self.unique_code(codes)?,
            referred_by: referred_by.clone(),
            is_agent: false,
            agent_status: AgentStatus::Inactive,
            agent_activated_at: None,
            created_at: self.ctx.now,
        };
        self.ctx.store.insert_user(&user)?;

        // A new signup has no approved deposit yet, so ancestor counts do not
        // move; this only makes sure every ancestor has a tracking row.
        let mut events = Vec::new();
        let tracker = AgentEligibilityTracker::new(self.ctx);
        let refreshed = self.ctx.store.in_savepoint("eligibility_refresh", || {
            tracker.evaluate_ancestors(&user.id, &mut events)
        });
        if refreshed.is_ok() {
            out.extend(events);
        }
        self.ctx.audit("agent eligibility", refreshed)?;

        log::info!(
            "accounts: registered {} ({}) referred by {}",
            user.id,
            user.referral_code,
            referred_by.as_deref().unwrap_or("-")
        );
        out.push(LedgerEvent::UserRegistered {
            user_id: user.id.clone(),
            referred_by,
        });
        Ok(user)
    }

    fn unique_code(&self, codes: &mut CodeRng) -> LedgerResult<String> {
        for _ in 0..MAX_CODE_ATTEMPTS {
            let code = codes.next_code();
            if !self.ctx.store.referral_code_taken(&code)? {
                return Ok(code);
            }
            log::debug!("accounts: referral code {code} taken, drawing again");
        }
        Err(LedgerError::Validation(
            "could not allocate a unique referral code".into(),
        ))
    }
}
