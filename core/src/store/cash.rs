use super::LedgerStore;
use crate::{
    error::LedgerResult,
    model::{Deposit, RequestStatus, Withdrawal},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

impl LedgerStore {
    // ── Deposits ───────────────────────────────────────────────

    pub fn insert_deposit(&self, d: &Deposit) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO deposits (id, user_id, amount, deposit_type, status, reviewed_by, reviewed_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &d.id,
                &d.user_id,
                d.amount,
                d.deposit_type,
                d.status,
                &d.reviewed_by,
                d.reviewed_at,
                d.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_deposit(&self, deposit_id: &str) -> LedgerResult<Option<Deposit>> {
        let d = self
            .conn
            .query_row(
                "SELECT id, user_id, amount, deposit_type, status, reviewed_by, reviewed_at, created_at
                 FROM deposits WHERE id = ?1",
                params![deposit_id],
                |row| {
                    Ok(Deposit {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        amount: row.get(2)?,
                        deposit_type: row.get(3)?,
                        status: row.get(4)?,
                        reviewed_by: row.get(5)?,
                        reviewed_at: row.get(6)?,
                        created_at: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(d)
    }

    /// Settle a pending deposit. Returns false if it was already reviewed.
    pub fn review_deposit(
        &self,
        deposit_id: &str,
        status: RequestStatus,
        admin_id: &str,
        at: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        let changed = self.conn.execute(
            "UPDATE deposits SET status = ?1, reviewed_by = ?2, reviewed_at = ?3
             WHERE id = ?4 AND status = ?5",
            params![status, admin_id, at, deposit_id, RequestStatus::Pending],
        )?;
        Ok(changed == 1)
    }

    // ── Withdrawals ────────────────────────────────────────────

    pub fn insert_withdrawal(&self, w: &Withdrawal) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO withdrawals (
                id, user_id, amount, fee_amount, fee_percent, total_deducted,
                status, processed_by, processed_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &w.id,
                &w.user_id,
                w.amount,
                w.fee_amount,
                w.fee_percent,
                w.total_deducted,
                w.status,
                &w.processed_by,
                w.processed_at,
                w.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_withdrawal(&self, withdrawal_id: &str) -> LedgerResult<Option<Withdrawal>> {
        let w = self
            .conn
            .query_row(
                "SELECT id, user_id, amount, fee_amount, fee_percent, total_deducted,
                        status, processed_by, processed_at, created_at
                 FROM withdrawals WHERE id = ?1",
                params![withdrawal_id],
                |row| {
                    Ok(Withdrawal {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        amount: row.get(2)?,
                        fee_amount: row.get(3)?,
                        fee_percent: row.get(4)?,
                        total_deducted: row.get(5)?,
                        status: row.get(6)?,
                        processed_by: row.get(7)?,
                        processed_at: row.get(8)?,
                        created_at: row.get(9)?,
                    })
                },
            )
            .optional()?;
        Ok(w)
    }

    /// Settle a pending withdrawal. Returns false if it was already processed.
    pub fn process_withdrawal(
        &self,
        withdrawal_id: &str,
        status: RequestStatus,
        admin_id: &str,
        at: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        let changed = self.conn.execute(
            "UPDATE withdrawals SET status = ?1, processed_by = ?2, processed_at = ?3
             WHERE id = ?4 AND status = ?5",
            params![status, admin_id, at, withdrawal_id, RequestStatus::Pending],
        )?;
        Ok(changed == 1)
    }
}
