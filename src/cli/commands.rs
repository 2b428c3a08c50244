//! Subcommand implementations.

use serde::Serialize;

use crate::bootstrap;
use crate::cli::{App, Command, print_notice};
use crate::config::helpers::{validate_address, validate_http_url};
use crate::contract::{CaseFilters, ModerationCase, TransactionReceipt};
use crate::format::{DEFAULT_ADDRESS_DISPLAY_LEN, format_address};
use crate::moderation::LeaderboardRow;
use crate::wallet::SessionState;

/// `arbiter init`: persist settings to `~/.arbiter/.env`.
pub fn init(
    contract_address: Option<&str>,
    wallet_rpc_url: Option<&str>,
    rpc_url: Option<&str>,
) -> anyhow::Result<()> {
    let mut vars = Vec::new();
    if let Some(address) = contract_address {
        validate_address("CONTRACT_ADDRESS", address)?;
        vars.push(("CONTRACT_ADDRESS", address));
    }
    if let Some(url) = wallet_rpc_url {
        validate_http_url("WALLET_RPC_URL", url)?;
        vars.push(("WALLET_RPC_URL", url));
    }
    if let Some(url) = rpc_url {
        validate_http_url("GENLAYER_RPC_URL", url)?;
        vars.push(("GENLAYER_RPC_URL", url));
    }
    if vars.is_empty() {
        anyhow::bail!("nothing to write; pass --contract-address, --wallet-rpc-url or --rpc-url");
    }

    bootstrap::save_bootstrap_env(&vars)?;
    println!("Wrote {}", bootstrap::arbiter_env_path().display());
    Ok(())
}

pub async fn dispatch(app: &mut App, command: Command, json: bool) -> anyhow::Result<()> {
    match command {
        Command::Init { .. } | Command::Doctor { .. } => Ok(()),
        Command::Status => {
            print_state(&app.handle().state(), json)?;
            Ok(())
        }
        Command::Connect => {
            let address = app.handle().connect().await?;
            app.flush_notices();
            println!("Connected as {address}");
            print_state(&app.handle().state(), json)
        }
        Command::Disconnect => {
            app.handle().disconnect().await?;
            println!("Disconnected");
            Ok(())
        }
        Command::SwitchAccount => {
            let address = app.handle().switch_account().await?;
            println!("Switched to {address}");
            Ok(())
        }
        Command::Watch => watch(app, json).await,
        Command::Cases {
            resolved,
            open,
            owner,
        } => {
            let filters = CaseFilters {
                resolved: match (resolved, open) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
                owner,
            };
            let cases = app.moderation.cases(&filters).await?;
            print_cases(&cases, json)
        }
        Command::FileReport { report, rules } => {
            let receipt = app.moderation.file_report(&report, &rules).await?;
            print_receipt(&receipt, json)
        }
        Command::Arbitrate { case_id } => {
            let receipt = app.moderation.arbitrate(&case_id).await?;
            print_receipt(&receipt, json)
        }
        Command::Leaderboard { limit } => {
            let rows = app.moderation.leaderboard(limit).await?;
            print_leaderboard(&rows, json)
        }
        Command::Reputation { address } => {
            let points = match address.as_deref() {
                Some(address) => match app.moderation.arbitrator() {
                    Some(arbitrator) => arbitrator.get_arbiter_reputation(Some(address)).await,
                    None => 0,
                },
                None => app.moderation.player_points().await,
            };
            if json {
                print_json(&serde_json::json!({ "address": address, "points": points }))
            } else {
                println!("{points} Rep");
                Ok(())
            }
        }
    }
}

/// Print every state change and notice until Ctrl-C.
async fn watch(app: &mut App, json: bool) -> anyhow::Result<()> {
    let mut states = app.handle().watch();
    print_state(&states.borrow_and_update().clone(), json)?;

    loop {
        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                print_state(&state, json)?;
            }
            notice = app.next_notice() => match notice {
                Some(notice) => print_notice(&notice),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_state(state: &SessionState, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(state);
    }
    let address = match state.address() {
        Some(address) => format_address(Some(address), DEFAULT_ADDRESS_DISPLAY_LEN),
        None => "not connected".to_string(),
    };
    let network = match (state.chain_id(), state.is_on_expected_network()) {
        (Some(chain), true) => format!("{chain} (arbitration network)"),
        (Some(chain), false) => format!("{chain} (wrong network)"),
        (None, _) => "unknown".to_string(),
    };
    println!(
        "{:?}  wallet: {address}  network: {network}{}{}",
        state.phase(),
        if state.is_provider_available() { "" } else { "  [no provider]" },
        if state.is_loading() { "  [busy]" } else { "" },
    );
    Ok(())
}

fn print_cases(cases: &[ModerationCase], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&cases);
    }
    if cases.is_empty() {
        println!("No cases on the ledger");
        return Ok(());
    }
    println!("{} Total Reports", cases.len());
    for case in cases {
        let status = match (case.case_resolved, case.verdict.as_deref()) {
            (true, Some(verdict)) => verdict,
            (true, None) => "Resolved",
            (false, _) => "Pending",
        };
        println!(
            "  #{:<6} {:<16} {:<14} {}",
            case.id,
            status,
            format_address(case.owner.as_deref(), DEFAULT_ADDRESS_DISPLAY_LEN),
            case.incident_report
        );
    }
    Ok(())
}

fn print_receipt(receipt: &TransactionReceipt, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(receipt);
    }
    println!("{} {}", receipt.status, receipt.hash);
    Ok(())
}

fn print_leaderboard(rows: &[LeaderboardRow], json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("No active arbiters yet");
        return Ok(());
    }
    for row in rows {
        println!(
            "  #{:<3} {:<13} {:>6} Rep{}",
            row.rank,
            format_address(Some(&row.address), 10),
            row.points,
            if row.is_current_user { "  (you)" } else { "" }
        );
    }
    Ok(())
}
