//! ledger-runner: headless driver for the mining-plan ledger.
//!
//! Usage:
//!   ledger-runner --db ledger.db --data-dir ./data --seed-plans
//!   ledger-runner --db ledger.db --sweep
//!   ledger-runner --db ledger.db --ipc-mode      (JSON lines on stdin/stdout)

use anyhow::Result;
use minevest_core::{
    clock::SystemClock,
    config::LedgerConfig,
    engine::LedgerEngine,
    error::{LedgerError, LedgerResult},
    rng::CodeRng,
    store::LedgerStore,
    types::{Money, Pool},
};
use serde_json::{json, Value};
use std::env;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    RegisterUser {
        display_name: String,
        referrer_code: Option<String>,
    },
    BootstrapAdmin {
        display_name: String,
    },
    GetUser {
        user_id: String,
    },
    CreditBalance {
        user_id: String,
        pool: Pool,
        amount: Money,
    },
    ListPlans,
    SetPlanActive {
        admin_id: String,
        plan_id: String,
        active: bool,
    },
    PurchaseInvestment {
        user_id: String,
        plan_id: String,
        amount: Money,
    },
    ListInvestments {
        user_id: String,
    },
    CollectDailyIncome {
        investment_id: String,
        user_id: String,
    },
    TransferInvestmentEarnings {
        user_id: String,
        investment_id: String,
    },
    EvaluateAgentEligibility {
        user_id: String,
    },
    ActivateAgent {
        admin_id: String,
        user_id: String,
    },
    DeactivateAgent {
        admin_id: String,
        user_id: String,
        reason: String,
    },
    RequestDeposit {
        user_id: String,
        amount: Money,
        deposit_type: String,
    },
    ApproveDeposit {
        admin_id: String,
        deposit_id: String,
    },
    RejectDeposit {
        admin_id: String,
        deposit_id: String,
        reason: String,
    },
    CreateWithdrawalRequest {
        user_id: String,
        amount: Money,
        fee_amount: Money,
        fee_percent: f64,
        total_deducted: Money,
    },
    ApproveWithdrawal {
        admin_id: String,
        withdrawal_id: String,
    },
    RejectWithdrawal {
        admin_id: String,
        withdrawal_id: String,
        reason: String,
    },
    GrantBonus {
        admin_id: String,
        user_id: String,
        amount: Money,
        reason: String,
    },
    GrantManualEarnings {
        admin_id: String,
        investment_id: String,
        user_id: String,
        amount: Money,
        reason: String,
    },
    AdjustBalance {
        admin_id: String,
        user_id: String,
        pool: Pool,
        delta: Money,
        reason: String,
    },
    RunMaintenance,
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = has_flag(&args, "--ipc-mode");
    let seed_plans = has_flag(&args, "--seed-plans");
    let sweep = has_flag(&args, "--sweep");
    let db = string_arg(&args, "--db").unwrap_or(":memory:");
    let data_dir = string_arg(&args, "--data-dir").unwrap_or("./data");
    let code_seed: Option<u64> = string_arg(&args, "--seed").and_then(|s| s.parse().ok());

    if !ipc_mode {
        println!("Minevest ledger-runner");
        println!("  db:        {db}");
        println!("  data_dir:  {data_dir}");
        println!();
    }

    let store = if db == ":memory:" {
        LedgerStore::in_memory()?
    } else {
        LedgerStore::open(db)?
    };
    store.migrate()?;

    let config = LedgerConfig::load(data_dir)?.with_store_overrides(&store)?;
    let codes = match code_seed {
        Some(seed) => CodeRng::seeded(seed),
        None => CodeRng::from_entropy(),
    };
    let mut engine = LedgerEngine::build(store, config, Arc::new(SystemClock), codes);

    if seed_plans {
        let seeds = LedgerConfig::load_plan_catalog(data_dir)?;
        let added = engine.seed_plans(&seeds)?;
        log::info!("runner: seeded {added} of {} catalogue plans", seeds.len());
    }

    if ipc_mode {
        return run_ipc_loop(&mut engine);
    }

    if sweep {
        let events = engine.run_maintenance()?;
        println!("  maintenance events: {}", events.len());
    }
    print_summary(&engine)
}

fn run_ipc_loop(engine: &mut LedgerEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }
        if buffer.trim().is_empty() {
            continue;
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = json!({ "error": { "code": "VALIDATION_ERROR", "message": e.to_string() } });
                writeln!(stdout, "{err_json}")?;
                stdout.flush()?;
                continue;
            }
        };
        if matches!(cmd, IpcCommand::Quit) {
            break;
        }

        let reply = match dispatch(engine, cmd) {
            Ok(value) => json!({ "ok": value }),
            Err(e) => {
                log::warn!("runner: command failed ({}): {e}", e.code());
                json!({ "error": { "code": e.code(), "message": e.to_string() } })
            }
        };
        writeln!(stdout, "{reply}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn dispatch(engine: &mut LedgerEngine, cmd: IpcCommand) -> LedgerResult<Value> {
    let value = match cmd {
        IpcCommand::RegisterUser {
            display_name,
            referrer_code,
        } => to_value(engine.register_user(&display_name, referrer_code.as_deref())?)?,
        IpcCommand::BootstrapAdmin { display_name } => {
            to_value(engine.bootstrap_admin(&display_name)?)?
        }
        IpcCommand::GetUser { user_id } => to_value(engine.user(&user_id)?)?,
        IpcCommand::CreditBalance {
            user_id,
            pool,
            amount,
        } => json!({ "balance": engine.credit_balance(&user_id, pool, amount)? }),
        IpcCommand::ListPlans => to_value(engine.list_plans()?)?,
        IpcCommand::SetPlanActive {
            admin_id,
            plan_id,
            active,
        } => to_value(engine.set_plan_active(&admin_id, &plan_id, active)?)?,
        IpcCommand::PurchaseInvestment {
            user_id,
            plan_id,
            amount,
        } => to_value(engine.purchase_investment(&user_id, &plan_id, amount)?)?,
        IpcCommand::ListInvestments { user_id } => to_value(engine.list_investments(&user_id)?)?,
        IpcCommand::CollectDailyIncome {
            investment_id,
            user_id,
        } => to_value(engine.collect_daily_income(&investment_id, &user_id)?)?,
        IpcCommand::TransferInvestmentEarnings {
            user_id,
            investment_id,
        } => json!({
            "amount_transferred": engine.transfer_investment_earnings(&user_id, &investment_id)?
        }),
        IpcCommand::EvaluateAgentEligibility { user_id } => {
            to_value(engine.evaluate_agent_eligibility(&user_id)?)?
        }
        IpcCommand::ActivateAgent { admin_id, user_id } => {
            to_value(engine.activate_agent(&admin_id, &user_id)?)?
        }
        IpcCommand::DeactivateAgent {
            admin_id,
            user_id,
            reason,
        } => to_value(engine.deactivate_agent(&admin_id, &user_id, &reason)?)?,
        IpcCommand::RequestDeposit {
            user_id,
            amount,
            deposit_type,
        } => to_value(engine.request_deposit(&user_id, amount, &deposit_type)?)?,
        IpcCommand::ApproveDeposit {
            admin_id,
            deposit_id,
        } => to_value(engine.approve_deposit(&admin_id, &deposit_id)?)?,
        IpcCommand::RejectDeposit {
            admin_id,
            deposit_id,
            reason,
        } => to_value(engine.reject_deposit(&admin_id, &deposit_id, &reason)?)?,
        IpcCommand::CreateWithdrawalRequest {
            user_id,
            amount,
            fee_amount,
            fee_percent,
            total_deducted,
        } => {
            let w = engine.create_withdrawal_request(
                &user_id,
                amount,
                fee_amount,
                fee_percent,
                total_deducted,
            )?;
            json!({ "withdrawal_id": w.id })
        }
        IpcCommand::ApproveWithdrawal {
            admin_id,
            withdrawal_id,
        } => to_value(engine.approve_withdrawal(&admin_id, &withdrawal_id)?)?,
        IpcCommand::RejectWithdrawal {
            admin_id,
            withdrawal_id,
            reason,
        } => to_value(engine.reject_withdrawal(&admin_id, &withdrawal_id, &reason)?)?,
        IpcCommand::GrantBonus {
            admin_id,
            user_id,
            amount,
            reason,
        } => json!({ "balance": engine.grant_bonus(&admin_id, &user_id, amount, &reason)? }),
        IpcCommand::GrantManualEarnings {
            admin_id,
            investment_id,
            user_id,
            amount,
            reason,
        } => json!({
            "earned_balance": engine.grant_manual_earnings(
                &admin_id,
                &investment_id,
                &user_id,
                amount,
                &reason,
            )?
        }),
        IpcCommand::AdjustBalance {
            admin_id,
            user_id,
            pool,
            delta,
            reason,
        } => json!({ "balance": engine.adjust_balance(&admin_id, &user_id, pool, delta, &reason)? }),
        IpcCommand::RunMaintenance => to_value(engine.run_maintenance()?)?,
        IpcCommand::Quit => Value::Null,
    };
    Ok(value)
}

fn to_value<T: serde::Serialize>(value: T) -> LedgerResult<Value> {
    serde_json::to_value(value).map_err(LedgerError::from)
}

fn print_summary(engine: &LedgerEngine) -> Result<()> {
    let plans = engine.list_plans()?;
    println!("=== LEDGER SUMMARY ===");
    println!("  users:              {}", engine.store.row_count("user_profiles")?);
    println!("  investments:        {}", engine.store.row_count("investments")?);
    println!("  income rows:        {}", engine.store.row_count("income_transactions")?);
    println!("  commissions:        {}", engine.store.row_count("referral_commissions")?);
    println!("  ledger entries:     {}", engine.store.row_count("ledger_entries")?);
    println!("  active plans:       {}", plans.len());
    for p in &plans {
        println!(
            "    {} | {} days | {:.2}% | capital back: {}",
            p.name, p.duration_days, p.profit_percent, p.capital_return
        );
    }
    Ok(())
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn string_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
