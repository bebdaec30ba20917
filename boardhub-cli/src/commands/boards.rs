//! `boardhub boards [--config <path>] [--json]`

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use boardhub_core::config;

use super::{print_json, ConfigArg};

/// List the boards a config would register.
#[derive(Args, Debug)]
pub struct BoardsArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Emit JSON instead of a table.
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize, Tabled)]
struct BoardRow {
    #[tabled(rename = "board")]
    id: String,
    #[tabled(rename = "type")]
    kind: String,
    #[tabled(rename = "settings")]
    settings: String,
}

#[derive(Serialize)]
struct BoardsJson {
    boards: Vec<BoardRow>,
    duplicates: Vec<String>,
    skipped: usize,
}

impl BoardsArgs {
    pub fn run(self) -> Result<()> {
        let path = self.config.path()?;
        let cfg = config::load_from(&path)
            .with_context(|| format!("failed to load config {}", path.display()))?;
        let filtered = config::board_entries(&cfg).len();
        let total = cfg.boards.as_ref().map(|b| b.len()).unwrap_or(0);
        let resolved = config::resolve_boards(&cfg).context("invalid board configuration")?;

        let rows: Vec<BoardRow> = resolved
            .entries
            .iter()
            .map(|(id, definition)| BoardRow {
                id: id.0.clone(),
                kind: definition.get_str("type").unwrap_or("-").to_string(),
                settings: definition
                    .as_map()
                    .iter()
                    .filter(|(key, _)| key.as_str() != "id" && key.as_str() != "type")
                    .map(|(key, value)| format!("{key}={value}"))
                    .collect::<Vec<_>>()
                    .join(" "),
            })
            .collect();
        let skipped = (total - filtered) + resolved.unnamed;

        if self.json {
            return print_json(&BoardsJson {
                boards: rows,
                duplicates: resolved.duplicates.iter().map(|id| id.0.clone()).collect(),
                skipped,
            });
        }

        if rows.is_empty() {
            println!("No boards defined in {}.", path.display());
        } else {
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
        if skipped > 0 {
            println!("{skipped} non-board entr(ies) ignored.");
        }
        for id in &resolved.duplicates {
            println!("warning: board id '{id}' defined more than once; last definition wins");
        }
        Ok(())
    }
}
