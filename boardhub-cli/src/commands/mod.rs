pub mod boards;
pub mod control;
pub mod init;
pub mod run;
pub mod status;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use boardhub_core::config;
use boardhub_runtime::BrokerClient;

/// How long control commands wait for a just-launched orchestrator's socket.
const CONNECT_PATIENCE: Duration = Duration::from_millis(500);

/// `--config` shared by every command that reads the hub config.
#[derive(Args, Debug, Clone)]
pub struct ConfigArg {
    /// Path to the hub config (default: ~/.boardhub/boards.yaml).
    #[arg(long, short = 'c', value_name = "PATH")]
    pub config: Option<PathBuf>,
}

impl ConfigArg {
    pub fn path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => config::config_path().context("could not determine home directory"),
        }
    }

    /// Client for the orchestrator's broker socket.
    ///
    /// `None` when the config exists but configures no broker socket: such an
    /// orchestrator runs without a control endpoint. Without a config file the
    /// default `~/.boardhub/broker.sock` is tried.
    pub fn broker_client(&self) -> Result<Option<BrokerClient>> {
        let path = self.path()?;
        let socket = if path.exists() {
            let cfg = config::load_from(&path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            match cfg.broker.and_then(|b| b.socket) {
                Some(socket) => socket,
                None => return Ok(None),
            }
        } else {
            let home = dirs::home_dir().context("could not determine home directory")?;
            config::broker_socket_at(&home)
        };
        Ok(Some(BrokerClient::new(socket).with_patience(CONNECT_PATIENCE)))
    }

    /// Message for commands that need a broker the config does not declare.
    pub fn broker_disabled(&self) -> Result<String> {
        Ok(format!(
            "broker disabled in config {} (no broker.socket)",
            display(&self.path()?)
        ))
    }
}

pub fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("failed to render JSON")?
    );
    Ok(())
}

pub fn display(path: &Path) -> String {
    path.display().to_string()
}
