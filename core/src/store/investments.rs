use super::LedgerStore;
use crate::{
    error::LedgerResult,
    model::{IncomeTransaction, Investment, InvestmentStatus, Plan},
    types::Money,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const PLAN_COLUMNS: &str =
    "id, name, duration_days, profit_percent, capital_return, min_amount, max_amount, is_active";

const INVESTMENT_COLUMNS: &str = "id, user_id, plan_id, amount_invested, status, start_date,
     end_date, last_income_collection_date, total_days_collected, profit_collected";

const INCOME_COLUMNS: &str = "id, investment_id, user_id, amount, days_collected,
     is_final_collection, source, status, transferred_at, created_at";

fn plan_from_row(row: &Row<'_>) -> rusqlite::Result<Plan> {
    Ok(Plan {
        id: row.get(0)?,
        name: row.get(1)?,
        duration_days: row.get(2)?,
        profit_percent: row.get(3)?,
        capital_return: row.get::<_, i32>(4)? != 0,
        min_amount: row.get(5)?,
        max_amount: row.get(6)?,
        is_active: row.get::<_, i32>(7)? != 0,
    })
}

fn investment_from_row(row: &Row<'_>) -> rusqlite::Result<Investment> {
    Ok(Investment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        plan_id: row.get(2)?,
        amount_invested: row.get(3)?,
        status: row.get(4)?,
        start_date: row.get(5)?,
        end_date: row.get(6)?,
        last_income_collection_date: row.get(7)?,
        total_days_collected: row.get(8)?,
        profit_collected: row.get(9)?,
    })
}

fn income_from_row(row: &Row<'_>) -> rusqlite::Result<IncomeTransaction> {
    Ok(IncomeTransaction {
        id: row.get(0)?,
        investment_id: row.get(1)?,
        user_id: row.get(2)?,
        amount: row.get(3)?,
        days_collected: row.get(4)?,
        is_final_collection: row.get::<_, i32>(5)? != 0,
        source: row.get(6)?,
        status: row.get(7)?,
        transferred_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

impl LedgerStore {
    // ── Plans ──────────────────────────────────────────────────

    pub fn insert_plan(&self, plan: &Plan, at: DateTime<Utc>) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO plans (
                id, name, duration_days, profit_percent, capital_return,
                min_amount, max_amount, is_active, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &plan.id,
                &plan.name,
                plan.duration_days,
                plan.profit_percent,
                plan.capital_return as i32,
                plan.min_amount,
                plan.max_amount,
                plan.is_active as i32,
                at,
            ],
        )?;
        Ok(())
    }

    pub fn get_plan(&self, plan_id: &str) -> LedgerResult<Option<Plan>> {
        let plan = self
            .conn
            .query_row(
                &format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = ?1"),
                params![plan_id],
                plan_from_row,
            )
            .optional()?;
        Ok(plan)
    }

    pub fn list_plans(&self, active_only: bool) -> LedgerResult<Vec<Plan>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans
             WHERE (?1 = 0 OR is_active = 1)
             ORDER BY duration_days ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![active_only as i32], plan_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn set_plan_active(&self, plan_id: &str, active: bool) -> LedgerResult<bool> {
        let changed = self.conn.execute(
            "UPDATE plans SET is_active = ?1 WHERE id = ?2",
            params![active as i32, plan_id],
        )?;
        Ok(changed == 1)
    }

    // ── Investments ────────────────────────────────────────────

    pub fn insert_investment(&self, inv: &Investment) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO investments (
                id, user_id, plan_id, amount_invested, status, start_date, end_date,
                last_income_collection_date, total_days_collected, profit_collected
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &inv.id,
                &inv.user_id,
                &inv.plan_id,
                inv.amount_invested,
                inv.status,
                inv.start_date,
                inv.end_date,
                inv.last_income_collection_date,
                inv.total_days_collected,
                inv.profit_collected,
            ],
        )?;
        Ok(())
    }

    pub fn get_investment(&self, investment_id: &str) -> LedgerResult<Option<Investment>> {
        let inv = self
            .conn
            .query_row(
                &format!("SELECT {INVESTMENT_COLUMNS} FROM investments WHERE id = ?1"),
                params![investment_id],
                investment_from_row,
            )
            .optional()?;
        Ok(inv)
    }

    pub fn investments_for_user(&self, user_id: &str) -> LedgerResult<Vec<Investment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INVESTMENT_COLUMNS} FROM investments
             WHERE user_id = ?1
             ORDER BY start_date ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![user_id], investment_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn active_investments(&self) -> LedgerResult<Vec<Investment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INVESTMENT_COLUMNS} FROM investments
             WHERE status = ?1
             ORDER BY start_date ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![InvestmentStatus::Active], investment_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Compare-and-swap on the collection counter: applies only if the row is
    /// still active and still shows `expected_days` collected. The day count
    /// and the profit paid move together. Returns false when another
    /// collector got there first.
    pub fn advance_collection(
        &self,
        investment_id: &str,
        expected_days: i64,
        days: i64,
        amount: Money,
        collected_at: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        let changed = self.conn.execute(
            "UPDATE investments
             SET total_days_collected = total_days_collected + ?1,
                 profit_collected = ROUND(profit_collected + ?2, 2),
                 last_income_collection_date = ?3
             WHERE id = ?4 AND status = ?5 AND total_days_collected = ?6",
            params![
                days,
                amount,
                collected_at,
                investment_id,
                InvestmentStatus::Active,
                expected_days
            ],
        )?;
        Ok(changed == 1)
    }

    /// Move an active investment into a terminal status. Returns false if it
    /// had already left `active`.
    pub fn close_investment(
        &self,
        investment_id: &str,
        status: InvestmentStatus,
        at: DateTime<Utc>,
    ) -> LedgerResult<bool> {
        let changed = self.conn.execute(
            "UPDATE investments SET status = ?1, closed_at = ?2
             WHERE id = ?3 AND status = ?4",
            params![status, at, investment_id, InvestmentStatus::Active],
        )?;
        Ok(changed == 1)
    }

    // ── Income transactions ────────────────────────────────────

    pub fn insert_income_transaction(&self, tx: &IncomeTransaction) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO income_transactions (
                id, investment_id, user_id, amount, days_collected, is_final_collection,
                source, status, transferred_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                &tx.id,
                &tx.investment_id,
                &tx.user_id,
                tx.amount,
                tx.days_collected,
                tx.is_final_collection as i32,
                tx.source,
                &tx.status,
                tx.transferred_at,
                tx.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn income_transactions_for(&self, investment_id: &str) -> LedgerResult<Vec<IncomeTransaction>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INCOME_COLUMNS} FROM income_transactions
             WHERE investment_id = ?1
             ORDER BY created_at ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![investment_id], income_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Income of `user_id` on `investment_id` not yet moved to the spendable pool.
    pub fn untransferred_income(&self, investment_id: &str, user_id: &str) -> LedgerResult<Money> {
        let sum: Money = self.conn.query_row(
            "SELECT COALESCE(SUM(amount), 0) FROM income_transactions
             WHERE investment_id = ?1 AND user_id = ?2 AND transferred_at IS NULL",
            params![investment_id, user_id],
            |row| row.get(0),
        )?;
        Ok(sum)
    }

    pub fn mark_income_transferred(
        &self,
        investment_id: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> LedgerResult<usize> {
        let changed = self.conn.execute(
            "UPDATE income_transactions SET transferred_at = ?1
             WHERE investment_id = ?2 AND user_id = ?3 AND transferred_at IS NULL",
            params![at, investment_id, user_id],
        )?;
        Ok(changed)
    }
}
