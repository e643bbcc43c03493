use super::LedgerStore;
use crate::{
    error::LedgerResult,
    model::{AgentEligibility, CommissionType, ReferralCommission},
    types::Money,
};
use rusqlite::{params, OptionalExtension};

impl LedgerStore {
    // ── Referral commissions ───────────────────────────────────

    pub fn insert_referral_commission(&self, c: &ReferralCommission) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO referral_commissions (
                id, referrer_id, referred_user_id, commission_type, level,
                amount, commission_rate, source_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &c.id,
                &c.referrer_id,
                &c.referred_user_id,
                c.commission_type,
                c.level,
                c.amount,
                c.commission_rate,
                &c.source_id,
                c.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn commissions_for_referrer(&self, referrer_id: &str) -> LedgerResult<Vec<ReferralCommission>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, referrer_id, referred_user_id, commission_type, level,
                    amount, commission_rate, source_id, created_at
             FROM referral_commissions WHERE referrer_id = ?1
             ORDER BY created_at ASC, level ASC",
        )?;
        let rows = stmt.query_map(params![referrer_id], |row| {
            Ok(ReferralCommission {
                id: row.get(0)?,
                referrer_id: row.get(1)?,
                referred_user_id: row.get(2)?,
                commission_type: row.get(3)?,
                level: row.get(4)?,
                amount: row.get(5)?,
                commission_rate: row.get(6)?,
                source_id: row.get(7)?,
                created_at: row.get(8)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn commission_total(
        &self,
        referrer_id: &str,
        commission_type: CommissionType,
    ) -> LedgerResult<Money> {
        let total: Money = self.conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM referral_commissions
             WHERE referrer_id = ?1 AND commission_type = ?2",
            params![referrer_id, commission_type],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    // ── Agent eligibility ──────────────────────────────────────

    pub fn get_eligibility(&self, user_id: &str) -> LedgerResult<Option<AgentEligibility>> {
        let row = self
            .conn
            .query_row(
                "SELECT user_id, level1_count, level2_count, level3_count,
                        eligibility_achieved, achieved_at, updated_at
                 FROM agent_eligibility_tracking WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(AgentEligibility {
                        user_id: row.get(0)?,
                        level1_count: row.get(1)?,
                        level2_count: row.get(2)?,
                        level3_count: row.get(3)?,
                        eligibility_achieved: row.get::<_, i32>(4)? != 0,
                        achieved_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    /// Insert or refresh a tracking row. `eligibility_achieved` only ever
    /// moves from 0 to 1, and the first `achieved_at` is kept.
    pub fn upsert_eligibility(&self, e: &AgentEligibility) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO agent_eligibility_tracking (
                user_id, level1_count, level2_count, level3_count,
                eligibility_achieved, achieved_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(user_id) DO UPDATE SET
                level1_count = excluded.level1_count,
                level2_count = excluded.level2_count,
                level3_count = excluded.level3_count,
                eligibility_achieved = MAX(eligibility_achieved, excluded.eligibility_achieved),
                achieved_at = COALESCE(achieved_at, excluded.achieved_at),
                updated_at = excluded.updated_at",
            params![
                &e.user_id,
                e.level1_count,
                e.level2_count,
                e.level3_count,
                e.eligibility_achieved as i32,
                e.achieved_at,
                e.updated_at,
            ],
        )?;
        Ok(())
    }
}
