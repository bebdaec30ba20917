//! Boardhub: board-collection orchestrator CLI.
//!
//! # Usage
//!
//! ```text
//! boardhub init
//! boardhub boards [--config <path>] [--json]
//! boardhub run [--config <path>] [--log-json]
//! boardhub status [--config <path>] [--json]
//! boardhub start [<board>...] [--config <path>]
//! boardhub stop [--config <path>]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    boards::BoardsArgs,
    control::{StartArgs, StopArgs},
    init::InitArgs,
    run::RunArgs,
    status::StatusArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "boardhub",
    version,
    about = "Start and supervise a collection of board controllers",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a sample ~/.boardhub/boards.yaml if none exists.
    Init(InitArgs),

    /// List the boards a config would register, without starting them.
    Boards(BoardsArgs),

    /// Run the orchestrator in the foreground until ctrl-c or `boardhub stop`.
    Run(RunArgs),

    /// Query a running orchestrator for board states.
    Status(StatusArgs),

    /// Ask a running orchestrator to start some boards, or all of them.
    Start(StartArgs),

    /// Ask a running orchestrator to shut down.
    Stop(StopArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Boards(args) => args.run(),
        Commands::Run(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Start(args) => args.run(),
        Commands::Stop(args) => args.run(),
    }
}
