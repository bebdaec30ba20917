//! `boardhub init`

use anyhow::{Context, Result};
use clap::Args;

use boardhub_core::config;

use super::display;

/// Write a sample hub config.
#[derive(Args, Debug)]
pub struct InitArgs {}

impl InitArgs {
    pub fn run(self) -> Result<()> {
        let path = config::config_path().context("could not determine home directory")?;
        let existed = path.exists();
        let cfg = config::init().context("failed to initialize hub config")?;
        let boards = config::resolve_boards(&cfg)
            .map(|r| r.entries.len())
            .unwrap_or(0);

        if existed {
            println!("✓ Config already present at {}", display(&path));
        } else {
            println!("✓ Wrote sample config to {}", display(&path));
        }
        println!("  {boards} board(s) defined");
        Ok(())
    }
}
