use super::LedgerStore;
use crate::{
    error::LedgerResult,
    model::{AdminLog, BonusTransaction},
};
use rusqlite::params;

impl LedgerStore {
    // ── Bonus transactions ─────────────────────────────────────

    pub fn insert_bonus_transaction(&self, b: &BonusTransaction) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO bonus_transactions (id, user_id, admin_id, amount, bonus_type, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![&b.id, &b.user_id, &b.admin_id, b.amount, &b.bonus_type, &b.reason, b.created_at],
        )?;
        Ok(())
    }

    pub fn bonus_transactions_for(&self, user_id: &str) -> LedgerResult<Vec<BonusTransaction>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, admin_id, amount, bonus_type, reason, created_at
             FROM bonus_transactions WHERE user_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(BonusTransaction {
                id: row.get(0)?,
                user_id: row.get(1)?,
                admin_id: row.get(2)?,
                amount: row.get(3)?,
                bonus_type: row.get(4)?,
                reason: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Admin log ──────────────────────────────────────────────

    pub fn insert_admin_log(&self, log: &AdminLog) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO admin_logs (id, admin_id, action, target_user_id, target_id, amount, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &log.id,
                &log.admin_id,
                &log.action,
                &log.target_user_id,
                &log.target_id,
                log.amount,
                &log.reason,
                log.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn admin_logs_for_user(&self, user_id: &str) -> LedgerResult<Vec<AdminLog>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, admin_id, action, target_user_id, target_id, amount, reason, created_at
             FROM admin_logs WHERE target_user_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(AdminLog {
                id: row.get(0)?,
                admin_id: row.get(1)?,
                action: row.get(2)?,
                target_user_id: row.get(3)?,
                target_id: row.get(4)?,
                amount: row.get(5)?,
                reason: row.get(6)?,
                created_at: row.get(7)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Admin settings ─────────────────────────────────────────

    pub fn admin_settings(&self) -> LedgerResult<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM admin_settings ORDER BY key ASC")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn set_admin_setting(&self, key: &str, value: &str) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO admin_settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}
