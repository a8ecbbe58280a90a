//! CLI command definitions and dispatch.

pub mod decode;
pub mod run;

use clap::{Parser, Subcommand};

/// envguard: runtime protection of process environments in containers.
#[derive(Parser, Debug)]
#[command(name = "envguard", version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    pub log_json: bool,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Attach the hook and report alerts until interrupted.
    Run(run::RunArgs),
    /// Decode a dump of raw event records.
    Decode(decode::DecodeArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run(args) => run::execute(args),
        Command::Decode(args) => decode::execute(&args),
    }
}
