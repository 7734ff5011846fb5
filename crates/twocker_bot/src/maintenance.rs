//! Periodic housekeeping.

use crate::service::BotService;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use twocker_rate_limit::SlidingWindowLimiter;

/// Sweep expired cache entries and idle limiter identities every `every`
/// until `cancel` fires.
pub fn spawn_maintenance(
    service: BotService,
    login_limiter: Arc<SlidingWindowLimiter>,
    every: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(every);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        timer.tick().await;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {
                    let removed = service.sweep() + login_limiter.sweep();
                    debug!(removed, "Maintenance sweep");
                }
            }
        }
        info!("Maintenance stopped");
    })
}
