//! Domain events: the ledger's narrative of what happened.
//!
//! Every money-moving operation reports what it did as `LedgerEvent`s.
//! The engine persists them to `event_log` after the primary mutation
//! has been applied; a failed write there never undoes the mutation.

use crate::types::{EntityId, InvestmentId, Money, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Variants are only ever appended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    // ── Accounts ───────────────────────────────────
    UserRegistered {
        user_id: UserId,
        referred_by: Option<UserId>,
    },

    // ── Investments ────────────────────────────────
    InvestmentPurchased {
        investment_id: InvestmentId,
        user_id: UserId,
        plan_id: EntityId,
        amount: Money,
    },
    IncomeCollected {
        investment_id: InvestmentId,
        user_id: UserId,
        amount: Money,
        days: i64,
        is_final: bool,
    },
    CapitalReturned {
        investment_id: InvestmentId,
        user_id: UserId,
        amount: Money,
    },
    InvestmentClosed {
        investment_id: InvestmentId,
        status: String,
    },
    EarningsTransferred {
        investment_id: InvestmentId,
        user_id: UserId,
        amount: Money,
    },

    // ── Referrals and agents ───────────────────────
    CommissionPaid {
        referrer_id: UserId,
        referred_user_id: UserId,
        commission_type: String,
        level: u8,
        amount: Money,
    },
    AgentEligibilityAchieved {
        user_id: UserId,
    },
    AgentActivated {
        user_id: UserId,
        admin_id: UserId,
    },
    AgentSuspended {
        user_id: UserId,
        admin_id: UserId,
    },

    // ── Cash movements ─────────────────────────────
    DepositApproved {
        deposit_id: EntityId,
        user_id: UserId,
        amount: Money,
    },
    WithdrawalRequested {
        withdrawal_id: EntityId,
        user_id: UserId,
        total_deducted: Money,
    },
    WithdrawalRefunded {
        withdrawal_id: EntityId,
        user_id: UserId,
        amount: Money,
    },

    // ── Admin ──────────────────────────────────────
    AdminAdjustment {
        admin_id: UserId,
        user_id: UserId,
        action: String,
        amount: Money,
    },
}

impl LedgerEvent {
    /// Stable string name used for the event_type column in event_log.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::UserRegistered { .. } => "user_registered",
            Self::InvestmentPurchased { .. } => "investment_purchased",
            Self::IncomeCollected { .. } => "income_collected",
            Self::CapitalReturned { .. } => "capital_returned",
            Self::InvestmentClosed { .. } => "investment_closed",
            Self::EarningsTransferred { .. } => "earnings_transferred",
            Self::CommissionPaid { .. } => "commission_paid",
            Self::AgentEligibilityAchieved { .. } => "agent_eligibility_achieved",
            Self::AgentActivated { .. } => "agent_activated",
            Self::AgentSuspended { .. } => "agent_suspended",
            Self::DepositApproved { .. } => "deposit_approved",
            Self::WithdrawalRequested { .. } => "withdrawal_requested",
            Self::WithdrawalRefunded { .. } => "withdrawal_refunded",
            Self::AdminAdjustment { .. } => "admin_adjustment",
        }
    }
}

/// The event log entry as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id: Option<i64>,
    pub component: String,
    pub event_type: String,
    pub payload: String, // JSON-serialized LedgerEvent
    pub created_at: DateTime<Utc>,
}
