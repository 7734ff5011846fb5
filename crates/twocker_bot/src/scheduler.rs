//! The cancellable post loop.

use crate::poster::Poster;
use crate::state::{BotState, ConfigChange};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

struct PostLoop {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns the post loop. At most one loop exists at any time.
///
/// Starting while running replaces the loop: the old one is cancelled and
/// awaited before the new one is spawned, so two loops never overlap. A new
/// loop always waits a full interval before its first fire.
pub struct Scheduler {
    state: BotState,
    poster: Arc<Poster>,
    running: Mutex<Option<PostLoop>>,
}

impl Scheduler {
    /// Create a stopped scheduler.
    pub fn new(state: BotState, poster: Arc<Poster>) -> Self {
        Self {
            state,
            poster,
            running: Mutex::new(None),
        }
    }

    /// Whether a loop is armed.
    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Start a fresh loop, replacing any existing one.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        let mut running = self.running.lock().await;
        if let Some(previous) = running.take() {
            shut_down(previous).await;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            self.state.clone(),
            Arc::clone(&self.poster),
            cancel.clone(),
        ));
        *running = Some(PostLoop { cancel, handle });
        info!("Post loop started");
    }

    /// Cancel the loop and wait for it to finish. Returns whether one was
    /// running.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> bool {
        let previous = self.running.lock().await.take();
        match previous {
            Some(previous) => {
                shut_down(previous).await;
                info!("Post loop stopped");
                true
            }
            None => false,
        }
    }

    /// Bring the loop in line with a config change.
    ///
    /// Deactivation stops the loop. Activation, or any change while active,
    /// starts a fresh loop so the next fire is a full interval away.
    pub async fn reconcile(&self, change: &ConfigChange) {
        let current = change.current();
        if !current.active() {
            self.stop().await;
        } else if !change.previous().active() || change.changed() || !self.is_running().await {
            self.start().await;
        }
    }
}

async fn shut_down(post_loop: PostLoop) {
    post_loop.cancel.cancel();
    if let Err(e) = post_loop.handle.await
        && e.is_panic()
    {
        tracing::error!(error = %e, "Post loop panicked");
    }
}

async fn run(state: BotState, poster: Arc<Poster>, cancel: CancellationToken) {
    loop {
        let wait = state.snapshot().next_wait();
        debug!(wait_secs = wait.as_secs(), "Waiting for next post");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let config = state.snapshot();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = poster.fire(&config) => {}
        }
    }
    debug!("Post loop exited");
}
