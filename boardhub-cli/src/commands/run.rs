//! `boardhub run`: foreground orchestrator.

use anyhow::{Context, Result};
use clap::Args;

use boardhub_runtime::{start_blocking, LogFormat};

use super::ConfigArg;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Log one JSON object per line instead of human-readable text.
    #[arg(long)]
    pub log_json: bool,
}

impl RunArgs {
    pub fn run(self) -> Result<()> {
        let path = self.config.path()?;
        let format = if self.log_json {
            LogFormat::Json
        } else {
            LogFormat::Text
        };
        start_blocking(&path, format).context("orchestrator exited with error")
    }
}
