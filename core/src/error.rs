use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Amount must be positive, got {0}")]
    InvalidAmount(f64),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Investment '{0}' is not active")]
    InvestmentNotActive(String),

    #[error("Nothing to collect for investment '{0}' yet")]
    NothingToCollect(String),

    #[error("Insufficient funds: needed {needed:.2}, available {available:.2}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error("User '{0}' has not met the agent eligibility requirements")]
    NotEligible(String),

    #[error("Database error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound { entity, id: id.into() }
    }

    /// Stable machine-readable code surfaced to callers alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::InvalidAmount(_) => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::InvestmentNotActive(_) => "INVESTMENT_NOT_ACTIVE",
            Self::NothingToCollect(_) => "NOTHING_TO_COLLECT",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::NotEligible(_) => "NOT_ELIGIBLE",
            Self::Persistence(_) | Self::Serialization(_) | Self::Other(_) => {
                "PERSISTENCE_FAILURE"
            }
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;
