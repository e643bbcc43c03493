//! Shared service context and the sweep contract.
//!
//! RULE: every service borrows one `LedgerContext` for the duration of a
//! single operation. "now" is read once by the engine and carried here,
//! so an operation never observes two different instants.

use crate::{config::LedgerConfig, error::LedgerResult, event::LedgerEvent, store::LedgerStore};
use chrono::{DateTime, Utc};

#[derive(Clone, Copy)]
pub struct LedgerContext<'a> {
    pub store: &'a LedgerStore,
    pub config: &'a LedgerConfig,
    pub now: DateTime<Utc>,
}

impl<'a> LedgerContext<'a> {
    pub fn new(store: &'a LedgerStore, config: &'a LedgerConfig, now: DateTime<Utc>) -> Self {
        Self { store, config, now }
    }

    /// Apply the audit-write policy to a secondary record write.
    ///
    /// By default a failed audit write is logged and swallowed: the primary
    /// balance mutation it describes stays applied. With `strict_audit`
    /// the failure is returned and the enclosing transaction rolls back.
    pub fn audit(&self, what: &str, result: LedgerResult<()>) -> LedgerResult<()> {
        match result {
            Ok(()) => Ok(()),
            Err(e) if self.config.strict_audit => Err(e),
            Err(e) => {
                log::warn!("audit: {what} not recorded ({}): {e}", e.code());
                Ok(())
            }
        }
    }
}

/// A component that takes part in the maintenance pass.
///
/// Sweeps must be idempotent: running one twice in a row at the same
/// instant changes nothing the second time.
pub trait LedgerSubsystem: Send {
    /// Unique stable name for this subsystem.
    fn name(&self) -> &'static str;

    fn sweep(&self, ctx: &LedgerContext<'_>) -> LedgerResult<Vec<LedgerEvent>>;
}
