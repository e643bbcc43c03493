//! Strongly typed ledger entities.
//!
//! Rows coming back from the store are mapped into these types; enum
//! columns go through `FromSql`, so an unknown status string fails the
//! read instead of leaking a loosely typed value into the services.

use crate::{
    error::{LedgerError, LedgerResult},
    types::{EntityId, InvestmentId, Money, UserId, ADMIN_LEVEL},
};
use chrono::{DateTime, Duration, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

/// Implements text-column conversions for a unit-variant enum.
macro_rules! sql_text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some(Self::$variant),)+
                    _ => None,
                }
            }
        }

        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                let text = value.as_str()?;
                Self::parse(text).ok_or_else(|| {
                    FromSqlError::Other(
                        format!("invalid {} value '{text}'", stringify!($ty)).into(),
                    )
                })
            }
        }
    };
}

// ── Users ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Inactive,
    Active,
    Suspended,
}

sql_text_enum!(AgentStatus {
    Inactive => "none",
    Active => "active",
    Suspended => "suspended",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserAccount {
    pub id: UserId,
    pub display_name: String,
    pub balance: Money,
    pub earned_balance: Money,
    pub user_level: i64,
    pub referral_code: String,
    /// Lookup link to the inviting user. Not an ownership relation.
    pub referred_by: Option<UserId>,
    pub is_agent: bool,
    pub agent_status: AgentStatus,
    pub agent_activated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    /// Checks the balance invariant on a row read back from the store.
    pub fn checked(self) -> LedgerResult<Self> {
        if self.balance < 0.0 || self.earned_balance < 0.0 {
            return Err(LedgerError::Validation(format!(
                "user {} has a negative balance (balance={}, earned={})",
                self.id, self.balance, self.earned_balance
            )));
        }
        Ok(self)
    }

    pub fn is_admin(&self) -> bool {
        self.user_level >= ADMIN_LEVEL
    }
}

// ── Plans and investments ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub id: EntityId,
    pub name: String,
    pub duration_days: i64,
    /// Total profit over the whole duration, not per day.
    pub profit_percent: f64,
    pub capital_return: bool,
    pub min_amount: Money,
    pub max_amount: Option<Money>,
    pub is_active: bool,
}

impl Plan {
    pub fn new(
        id: EntityId,
        name: &str,
        duration_days: i64,
        profit_percent: f64,
        capital_return: bool,
        min_amount: Money,
        max_amount: Option<Money>,
    ) -> LedgerResult<Self> {
        if name.trim().is_empty() {
            return Err(LedgerError::Validation("plan name is required".into()));
        }
        if duration_days <= 0 {
            return Err(LedgerError::Validation(format!(
                "plan duration must be positive, got {duration_days}"
            )));
        }
        if !profit_percent.is_finite() || profit_percent < 0.0 {
            return Err(LedgerError::Validation(format!(
                "plan profit percent must be non-negative, got {profit_percent}"
            )));
        }
        if min_amount < 0.0 {
            return Err(LedgerError::Validation("plan minimum must be non-negative".into()));
        }
        if let Some(max) = max_amount {
            if max < min_amount {
                return Err(LedgerError::Validation(format!(
                    "plan maximum {max} is below minimum {min_amount}"
                )));
            }
        }
        Ok(Self {
            id,
            name: name.trim().to_string(),
            duration_days,
            profit_percent,
            capital_return,
            min_amount,
            max_amount,
            is_active: true,
        })
    }

    /// Total profit owed over the full term for `amount` invested.
    pub fn total_profit(&self, amount: Money) -> Money {
        amount * self.profit_percent / 100.0
    }

    /// Per-day accrual for `amount` invested.
    pub fn profit_per_day(&self, amount: Money) -> Money {
        self.total_profit(amount) / self.duration_days as f64
    }

    pub fn accepts(&self, amount: Money) -> bool {
        amount >= self.min_amount && self.max_amount.map_or(true, |max| amount <= max)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvestmentStatus {
    Active,
    Completed,
    Expired,
}

sql_text_enum!(InvestmentStatus {
    Active => "active",
    Completed => "completed",
    Expired => "expired",
});

impl InvestmentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Investment {
    pub id: InvestmentId,
    pub user_id: UserId,
    pub plan_id: EntityId,
    pub amount_invested: Money,
    pub status: InvestmentStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub last_income_collection_date: Option<DateTime<Utc>>,
    pub total_days_collected: i64,
    /// Profit paid by regular collections so far.
    pub profit_collected: Money,
}

impl Investment {
    /// A fresh escrow record for `amount` placed in `plan` at `now`.
    pub fn open(id: InvestmentId, user_id: &str, plan: &Plan, amount: Money, now: DateTime<Utc>) -> Self {
        Self {
            id,
            user_id: user_id.to_string(),
            plan_id: plan.id.clone(),
            amount_invested: amount,
            status: InvestmentStatus::Active,
            start_date: now,
            end_date: now + Duration::days(plan.duration_days),
            last_income_collection_date: None,
            total_days_collected: 0,
            profit_collected: 0.0,
        }
    }

    /// Where the next accrual window starts.
    pub fn accrual_anchor(&self) -> DateTime<Utc> {
        self.last_income_collection_date.unwrap_or(self.start_date)
    }

    pub fn has_matured(&self, now: DateTime<Utc>) -> bool {
        self.end_date <= now
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IncomeSource {
    /// Regular daily-income collection.
    Collection,
    /// Admin-granted manual earnings.
    Manual,
}

sql_text_enum!(IncomeSource {
    Collection => "collection",
    Manual => "manual",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncomeTransaction {
    pub id: EntityId,
    pub investment_id: InvestmentId,
    pub user_id: UserId,
    pub amount: Money,
    pub days_collected: i64,
    pub is_final_collection: bool,
    pub source: IncomeSource,
    pub status: String,
    pub transferred_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ── Referrals and agents ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommissionType {
    Deposit,
    Earning,
}

sql_text_enum!(CommissionType {
    Deposit => "deposit",
    Earning => "earning",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferralCommission {
    pub id: EntityId,
    pub referrer_id: UserId,
    pub referred_user_id: UserId,
    pub commission_type: CommissionType,
    pub level: u8,
    pub amount: Money,
    pub commission_rate: f64,
    pub source_id: Option<EntityId>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentEligibility {
    pub user_id: UserId,
    pub level1_count: i64,
    pub level2_count: i64,
    pub level3_count: i64,
    pub eligibility_achieved: bool,
    pub achieved_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

// ── Admin audit trail ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BonusTransaction {
    pub id: EntityId,
    pub user_id: UserId,
    pub admin_id: Option<UserId>,
    pub amount: Money,
    pub bonus_type: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminLog {
    pub id: EntityId,
    pub admin_id: UserId,
    pub action: String,
    pub target_user_id: Option<UserId>,
    pub target_id: Option<EntityId>,
    pub amount: Option<Money>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

// ── Deposits and withdrawals ──────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DepositType {
    Easypaisa,
    Jazzcash,
    BankTransfer,
}

sql_text_enum!(DepositType {
    Easypaisa => "easypaisa",
    Jazzcash => "jazzcash",
    BankTransfer => "bank_transfer",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

sql_text_enum!(RequestStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deposit {
    pub id: EntityId,
    pub user_id: UserId,
    pub amount: Money,
    pub deposit_type: DepositType,
    pub status: RequestStatus,
    pub reviewed_by: Option<UserId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Withdrawal {
    pub id: EntityId,
    pub user_id: UserId,
    pub amount: Money,
    pub fee_amount: Money,
    pub fee_percent: f64,
    pub total_deducted: Money,
    pub status: RequestStatus,
    pub processed_by: Option<UserId>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
