//! minevest-core: the accounting engine behind the mining-plan platform.
//!
//! Everything that moves money goes through `engine::LedgerEngine`; the
//! service modules below it each own one part of the ledger.

pub mod accounts;
pub mod admin;
pub mod agent_tracker;
pub mod balance_ledger;
pub mod cash;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod event;
pub mod income_collector;
pub mod investment_state;
pub mod model;
pub mod referral_engine;
pub mod rng;
pub mod store;
pub mod subsystem;
pub mod types;
