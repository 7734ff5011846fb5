//! Twocker binary.
//!
//! Loads configuration from `twocker.toml`, `.env` and the environment, then
//! either validates it or runs the bot with its control API.

use clap::Parser;
use tracing::info;
use twocker_bot::TwockerConfig;

mod cli;
mod logging;
mod serve;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    use cli::{Cli, Commands};

    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.json_logs)?;

    let config = match &cli.config {
        Some(path) => TwockerConfig::load_from(Some(path.as_path()), None)?,
        None => TwockerConfig::load()?,
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            info!(
                channel = %config.twitch_channel(),
                active = *config.bot_active(),
                "Starting Twocker"
            );
            serve::serve(config).await?;
        }
        Commands::CheckConfig => {
            info!(config = ?config, "Configuration is valid");
        }
    }

    Ok(())
}
