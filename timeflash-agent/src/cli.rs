use std::path::PathBuf;

use clap::{Parser, Subcommand};

const HELP_EPILOG: &str = r#"Config resolution order:
  1) --config/-c PATH
  2) $TIMEFLASH_CONFIG
  3) XDG default: ~/.config/timeflash/client.yaml
"#;

#[derive(Debug, Parser)]
#[command(
    name = "timeflash-agent",
    version,
    about = "Session agent that flashes the screen when time budgets run out",
    long_about = None,
    after_long_help = HELP_EPILOG,
)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Optional subcommand. Without one, runs the agent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show a single flash with the configured backend and exit
    Flash {
        /// How long the flash stays open
        #[arg(long, default_value_t = 2.0)]
        seconds: f64,
    },
    /// Print current metrics computed from the persisted state
    Status,
    /// Ask the running agent to stop monitoring
    Pause,
    /// Ask the running agent to resume monitoring
    Resume,
}
