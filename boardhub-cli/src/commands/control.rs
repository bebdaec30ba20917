//! `boardhub start [<board>...]` and `boardhub stop`.

use anyhow::{bail, Context, Result};
use clap::Args;

use boardhub_core::BoardId;
use boardhub_runtime::HubError;

use super::{print_json, ConfigArg};

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Board ids to start. Omit to start every registered board.
    pub boards: Vec<String>,

    #[command(flatten)]
    pub config: ConfigArg,
}

impl StartArgs {
    pub fn run(self) -> Result<()> {
        let Some(client) = self.config.broker_client()? else {
            bail!(self.config.broker_disabled()?);
        };
        let label = if self.boards.is_empty() {
            "all boards".to_string()
        } else {
            self.boards.join(", ")
        };
        let ids = self.boards.into_iter().map(BoardId::from).collect();
        let started = client
            .start(ids)
            .with_context(|| format!("failed to start {label}"))?;
        print_json(&started)?;

        let failed: Vec<String> = started
            .iter()
            .filter_map(|b| b.error.as_ref().map(|err| format!("{} ({err})", b.id)))
            .collect();
        if !failed.is_empty() {
            bail!(
                "{} board(s) failed to start: {}",
                failed.len(),
                failed.join("; ")
            );
        }
        Ok(())
    }
}

#[derive(Args, Debug)]
pub struct StopArgs {
    #[command(flatten)]
    pub config: ConfigArg,
}

impl StopArgs {
    pub fn run(self) -> Result<()> {
        let Some(client) = self.config.broker_client()? else {
            println!("{}", self.config.broker_disabled()?);
            return Ok(());
        };
        match client.stop() {
            Ok(()) => println!("stop requested"),
            Err(HubError::BrokerNotRunning { .. }) => println!("orchestrator is not running"),
            Err(err) => return Err(err).context("failed to stop orchestrator"),
        }
        Ok(())
    }
}
