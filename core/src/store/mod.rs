//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! Services call store methods and never execute SQL directly.
//!
//! Balance columns are only ever changed with relative `col = col + ?`
//! updates; nothing here writes an absolute balance read earlier.

use crate::{
    error::{LedgerError, LedgerResult},
    event::EventLogEntry,
    types::{Money, Pool, UserId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use std::time::Duration;

mod admin;
mod cash;
mod investments;
mod referrals;
mod users;


pub use users::ReferralRow;

pub struct LedgerStore {
    conn: Connection,
}

/// One row of the balance audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntryRow {
    pub id: i64,
    pub user_id: UserId,
    pub pool: String,
    pub delta: Money,
    pub kind: String,
    pub reference_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// How long a writer waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

impl LedgerStore {
    pub fn open(path: &str) -> LedgerResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> LedgerResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> LedgerResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_foundation.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_investments.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/003_referrals.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/004_cash_movements.sql"))?;
        Ok(())
    }

    // ── Transactions ───────────────────────────────────────────

    /// Run `f` inside one atomic unit of work.
    ///
    /// The outermost call opens `BEGIN IMMEDIATE`, which takes the write
    /// lock up front: two connections racing on the same investment are
    /// serialised here, and the second one reads the first one's commit.
    /// Calls made while a transaction is already open become savepoints.
    pub fn in_transaction<T>(&self, f: impl FnOnce() -> LedgerResult<T>) -> LedgerResult<T> {
        if !self.conn.is_autocommit() {
            return self.in_savepoint("ledger_nested", f);
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f() {
            Ok(value) => match self.conn.execute_batch("COMMIT") {
                Ok(()) => Ok(value),
                Err(e) => {
                    self.rollback();
                    Err(e.into())
                }
            },
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    /// Run `f` so that a failure undoes only its own writes, leaving the
    /// enclosing transaction usable.
    pub fn in_savepoint<T>(
        &self,
        name: &str,
        f: impl FnOnce() -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        self.conn.execute_batch(&format!("SAVEPOINT {name}"))?;
        match f() {
            Ok(value) => {
                self.conn.execute_batch(&format!("RELEASE {name}"))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rb) = self
                    .conn
                    .execute_batch(&format!("ROLLBACK TO {name}; RELEASE {name}"))
                {
                    log::error!("store: rollback to savepoint {name} failed: {rb}");
                }
                Err(e)
            }
        }
    }

    fn rollback(&self) {
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            log::error!("store: rollback failed: {e}");
        }
    }

    // ── Balance audit trail ────────────────────────────────────

    pub fn insert_ledger_entry(
        &self,
        user_id: &str,
        pool: Pool,
        delta: Money,
        kind: &str,
        reference_id: Option<&str>,
        at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO ledger_entries (user_id, pool, delta, kind, reference_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![user_id, pool.as_str(), delta, kind, reference_id, at],
        )?;
        Ok(())
    }

    pub fn ledger_entries_for(&self, user_id: &str) -> LedgerResult<Vec<LedgerEntryRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, pool, delta, kind, reference_id, created_at
             FROM ledger_entries WHERE user_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok(LedgerEntryRow {
                id: row.get(0)?,
                user_id: row.get(1)?,
                pool: row.get(2)?,
                delta: row.get(3)?,
                kind: row.get(4)?,
                reference_id: row.get(5)?,
                created_at: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Event log ──────────────────────────────────────────────

    pub fn append_event(&self, entry: &EventLogEntry) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (component, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![entry.component, entry.event_type, entry.payload, entry.created_at],
        )?;
        Ok(())
    }

    pub fn events_of_type(&self, event_type: &str) -> LedgerResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, component, event_type, payload, created_at
             FROM event_log WHERE event_type = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![event_type], |row| {
                Ok(EventLogEntry {
                    id: Some(row.get(0)?),
                    component: row.get(1)?,
                    event_type: row.get(2)?,
                    payload: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// Raw row count of a known table. Test and tooling helper.
    pub fn row_count(&self, table: &str) -> LedgerResult<i64> {
        const TABLES: &[&str] = &[
            "user_profiles",
            "plans",
            "investments",
            "income_transactions",
            "referral_commissions",
            "agent_eligibility_tracking",
            "bonus_transactions",
            "admin_logs",
            "ledger_entries",
            "event_log",
            "deposits",
            "withdrawals",
        ];
        if !TABLES.contains(&table) {
            return Err(LedgerError::Validation(format!("unknown table '{table}'")));
        }
        let count: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count)
    }
}
