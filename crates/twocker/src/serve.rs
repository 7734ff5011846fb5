//! Wiring for the long-running process.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use twocker_bot::{
    ApiState, BotService, BotState, TwockerConfig, create_router, spawn_maintenance,
};
use twocker_error::ConfigError;
use twocker_rate_limit::{RateWindow, SlidingWindowLimiter, UpstreamThrottle};
use twocker_twitch::{CachedTwitchApi, ChatSender, HelixClient, IrcChatSender, TwitchApi};

const MAINTENANCE_EVERY: Duration = Duration::from_secs(5 * 60);

/// Run the bot and the control API until a shutdown signal arrives.
pub async fn serve(config: TwockerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let throttle = UpstreamThrottle::new(config.throttle_config());
    let helix: Arc<dyn TwitchApi> = Arc::new(HelixClient::new(
        config.credentials(),
        config.helix_config(),
        throttle,
    )?);
    let twitch = Arc::new(CachedTwitchApi::new(helix, &config.status_cache_config()));

    let bot_account = match config.bot_username() {
        Some(name) => name.clone(),
        None => twitch.bot_login().await.map_err(|e| {
            ConfigError::new(format!(
                "Could not resolve the bot account from TWITCH_TOKEN ({}); set BOT_USERNAME",
                e
            ))
        })?,
    };
    info!(bot = %bot_account, "Bot account resolved");

    let chat: Arc<dyn ChatSender> = Arc::new(IrcChatSender::new(config.irc_config(&bot_account)));

    let state = BotState::new(config.initial_bot_config()?)?;
    let service = BotService::new(
        state,
        twitch,
        chat,
        bot_account,
        config.status_window(),
    );
    service.start().await;

    let login_limiter = Arc::new(SlidingWindowLimiter::new("login", RateWindow::login()));
    let cancel = CancellationToken::new();
    let maintenance = spawn_maintenance(
        service.clone(),
        Arc::clone(&login_limiter),
        MAINTENANCE_EVERY,
        cancel.clone(),
    );

    if !config.auth_config().enabled() {
        warn!("Control API authentication is disabled");
    }
    let router = create_router(ApiState::new(
        service.clone(),
        config.auth_config(),
        login_limiter,
    ));

    info!(%addr, "Control API listening");
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Shutdown signal received, stopping gracefully...");
    cancel.cancel();
    if let Err(e) = maintenance.await {
        error!(error = %e, "Maintenance task failed");
    }
    service.shutdown().await;
    info!("Twocker stopped");

    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for CTRL+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
