//! CLI command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Twocker - post a message to a Twitch channel on a schedule
#[derive(Parser, Debug)]
#[command(name = "twocker")]
#[command(about = "Post a message to a Twitch channel on a schedule", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file to read instead of ./twocker.toml
    #[arg(short, long, global = true, env = "TWOCKER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "TWOCKER_JSON_LOGS")]
    pub json_logs: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Run the bot and the control API (default)
    Serve,

    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_is_default() {
        let cli = Cli::try_parse_from(["twocker"]).expect("parses");
        assert_eq!(cli.command, None);
        assert!(!cli.verbose);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["twocker", "check-config", "-v", "--config", "bot.toml"])
            .expect("parses");
        assert_eq!(cli.command, Some(Commands::CheckConfig));
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("bot.toml")));
    }
}
