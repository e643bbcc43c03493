use super::LedgerStore;
use crate::{
    error::LedgerResult,
    model::{AgentStatus, UserAccount},
    types::{Money, Pool, UserId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const USER_COLUMNS: &str = "id, display_name, balance, earned_balance, user_level, referral_code,
     referred_by, is_agent, agent_status, agent_activated_at, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserAccount> {
    Ok(UserAccount {
        id: row.get(0)?,
        display_name: row.get(1)?,
        balance: row.get(2)?,
        earned_balance: row.get(3)?,
        user_level: row.get(4)?,
        referral_code: row.get(5)?,
        referred_by: row.get(6)?,
        is_agent: row.get::<_, i32>(7)? != 0,
        agent_status: row.get(8)?,
        agent_activated_at: row.get(9)?,
        created_at: row.get(10)?,
    })
}

/// A direct referral and whether it has ever had a deposit approved.
#[derive(Debug, Clone)]
pub struct ReferralRow {
    pub user_id: UserId,
    pub has_approved_deposit: bool,
}

impl LedgerStore {
    // ── User profiles ──────────────────────────────────────────

    pub fn insert_user(&self, user: &UserAccount) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO user_profiles (
                id, display_name, balance, earned_balance, user_level, referral_code,
                referred_by, is_agent, agent_status, agent_activated_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                &user.id,
                &user.display_name,
                user.balance,
                user.earned_balance,
                user.user_level,
                &user.referral_code,
                &user.referred_by,
                user.is_agent as i32,
                user.agent_status,
                user.agent_activated_at,
                user.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, user_id: &str) -> LedgerResult<Option<UserAccount>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM user_profiles WHERE id = ?1"),
                params![user_id],
                user_from_row,
            )
            .optional()?;
        user.map(UserAccount::checked).transpose()
    }

    pub fn user_by_referral_code(&self, code: &str) -> LedgerResult<Option<UserAccount>> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM user_profiles WHERE referral_code = ?1"),
                params![code],
                user_from_row,
            )
            .optional()?;
        user.map(UserAccount::checked).transpose()
    }

    pub fn referral_code_taken(&self, code: &str) -> LedgerResult<bool> {
        let taken: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM user_profiles WHERE referral_code = ?1)",
            params![code],
            |row| row.get(0),
        )?;
        Ok(taken)
    }

    /// The `referred_by` link of a user, if any.
    pub fn referrer_of(&self, user_id: &str) -> LedgerResult<Option<UserId>> {
        let referrer: Option<Option<UserId>> = self
            .conn
            .query_row(
                "SELECT referred_by FROM user_profiles WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(referrer.flatten())
    }

    pub fn direct_referrals(&self, user_id: &str) -> LedgerResult<Vec<ReferralRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT u.id,
                    EXISTS(SELECT 1 FROM deposits d
                           WHERE d.user_id = u.id AND d.status = 'approved')
             FROM user_profiles u
             WHERE u.referred_by = ?1
             ORDER BY u.created_at ASC, u.id ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(ReferralRow {
                user_id: row.get(0)?,
                has_approved_deposit: row.get(1)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn all_user_ids(&self) -> LedgerResult<Vec<UserId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM user_profiles ORDER BY created_at ASC, id ASC")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Balances ───────────────────────────────────────────────

    pub fn pool_balance(&self, user_id: &str, pool: Pool) -> LedgerResult<Option<Money>> {
        let balance = self
            .conn
            .query_row(
                &format!("SELECT {} FROM user_profiles WHERE id = ?1", pool.column()),
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(balance)
    }

    /// Relative increment. Returns false when the user does not exist.
    pub fn credit_pool(&self, user_id: &str, pool: Pool, amount: Money) -> LedgerResult<bool> {
        let col = pool.column();
        let changed = self.conn.execute(
            &format!("UPDATE user_profiles SET {col} = ROUND({col} + ?1, 2) WHERE id = ?2"),
            params![amount, user_id],
        )?;
        Ok(changed == 1)
    }

    /// Relative decrement guarded in the same statement. Returns false when
    /// the user does not exist or the pool holds less than `amount`.
    pub fn debit_pool(&self, user_id: &str, pool: Pool, amount: Money) -> LedgerResult<bool> {
        let col = pool.column();
        let changed = self.conn.execute(
            &format!(
                "UPDATE user_profiles SET {col} = ROUND({col} - ?1, 2)
                 WHERE id = ?2 AND ROUND({col} - ?1, 2) >= 0"
            ),
            params![amount, user_id],
        )?;
        Ok(changed == 1)
    }

    // ── Agent flags ────────────────────────────────────────────

    /// Flip a user to an active agent. Returns false if already active.
    pub fn activate_agent_flag(&self, user_id: &str, at: DateTime<Utc>) -> LedgerResult<bool> {
        let changed = self.conn.execute(
            "UPDATE user_profiles
             SET is_agent = 1, agent_status = ?1, agent_activated_at = ?2
             WHERE id = ?3 AND agent_status = ?4",
            params![AgentStatus::Active, at, user_id, AgentStatus::Inactive],
        )?;
        Ok(changed == 1)
    }

    pub fn suspend_agent_flag(&self, user_id: &str) -> LedgerResult<bool> {
        let changed = self.conn.execute(
            "UPDATE user_profiles SET is_agent = 0, agent_status = ?1
             WHERE id = ?2 AND agent_status = ?3",
            params![AgentStatus::Suspended, user_id, AgentStatus::Active],
        )?;
        Ok(changed == 1)
    }
}
