use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "sweep",
    about = "Sequential bulk deletion over a live, re-rendering UI",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Delete the selected items of a scenario, one at a time
    Run {
        /// YAML scenario describing the list and its selected items
        scenario: PathBuf,

        /// Do not write a JSONL execution log for this batch
        #[arg(long)]
        no_log: bool,

        /// Override the batch watchdog timeout
        #[arg(long, value_name = "SECS")]
        watchdog_secs: Option<u64>,
    },

    /// Show project configuration
    Config {
        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a shell completion script
    Completions {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
