//! Shared primitive types used across the entire ledger.

use serde::{Deserialize, Serialize};

/// A stable, unique identifier for any persisted entity (uuid v4 text).
pub type EntityId = String;

pub type UserId = String;

pub type InvestmentId = String;

/// PKR amount. Stored as REAL, rounded to paisa on every write.
pub type Money = f64;

/// Role tier at or above which a user is an administrator.
pub const ADMIN_LEVEL: i64 = 999;

/// Round a PKR amount to two decimal places.
pub fn round_money(amount: Money) -> Money {
    (amount * 100.0).round() / 100.0
}

/// Which of a user's two balances a mutation targets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Pool {
    /// `user_profiles.balance`: withdrawable or reinvestable now.
    Spendable,
    /// `user_profiles.earned_balance`: accrued profit not yet unlocked.
    Locked,
}

impl Pool {
    /// Column backing this pool. Only ever one of two fixed identifiers,
    /// so it is safe to format into SQL.
    pub fn column(self) -> &'static str {
        match self {
            Self::Spendable => "balance",
            Self::Locked => "earned_balance",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Spendable => "spendable",
            Self::Locked => "locked",
        }
    }
}
