//! `boardhub status [--json]`

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde_json::json;
use tabled::{settings::Style, Table, Tabled};

use boardhub_runtime::{BoardState, HubError, HubStatus};

use super::{display, print_json, ConfigArg};

/// Query a running orchestrator.
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Emit JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "board")]
    board: String,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "port")]
    port: String,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let Some(client) = self.config.broker_client()? else {
            let message = self.config.broker_disabled()?;
            if self.json {
                return print_json(&json!({
                    "running": null,
                    "broker": "disabled",
                    "message": message,
                }));
            }
            println!("{message}");
            return Ok(());
        };
        let status = match client.status() {
            Ok(status) => status,
            Err(HubError::BrokerNotRunning { socket }) => {
                let payload = json!({ "running": false, "socket": display(&socket) });
                if self.json {
                    return print_json(&payload);
                }
                println!("orchestrator is not running (no broker at {})", display(&socket));
                return Ok(());
            }
            Err(err) => return Err(err).context("failed to query orchestrator status"),
        };

        if self.json {
            return print_json(&status);
        }
        print_table(&status);
        Ok(())
    }
}

fn print_table(status: &HubStatus) {
    println!(
        "Boardhub v{} | {} boards | {} ready",
        env!("CARGO_PKG_VERSION"),
        status.boards.len(),
        status
            .boards
            .iter()
            .filter(|b| b.state == BoardState::Ready)
            .count(),
    );
    if status.boards.is_empty() {
        println!("No boards registered.");
        return;
    }

    let rows: Vec<StatusRow> = status
        .boards
        .iter()
        .map(|board| StatusRow {
            board: board.id.to_string(),
            state: state_label(board.state),
            port: board
                .port
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string()),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn state_label(state: BoardState) -> String {
    let label = format!("■ {state}");
    match state {
        BoardState::Ready => label.green().bold().to_string(),
        BoardState::Starting => label.yellow().bold().to_string(),
        BoardState::Failed => label.red().bold().to_string(),
        BoardState::Stopped => label.bright_black().bold().to_string(),
        BoardState::NotStarted => label,
    }
}
