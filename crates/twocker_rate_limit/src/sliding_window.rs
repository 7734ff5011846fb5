//! Sliding window request counting per identity.

use derive_getters::Getters;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};
use twocker_error::RateLimitError;

/// Allowance for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct RateWindow {
    /// Requests allowed inside the window
    max_requests: u32,
    /// Window length in seconds
    window_secs: u64,
}

impl RateWindow {
    /// Create a new window allowance.
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    /// Five failed logins per fifteen minutes.
    pub fn login() -> Self {
        Self::new(5, 15 * 60)
    }

    /// `max_requests` per minute.
    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, 60)
    }
}

/// Counts requests per identity and refuses them past the allowance.
///
/// Each identity keeps the timestamps of its requests inside the current
/// window. Timestamps older than the window are discarded on every access and
/// by [`SlidingWindowLimiter::sweep`].
///
/// # Example
///
/// ```
/// use twocker_rate_limit::{RateWindow, SlidingWindowLimiter};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let limiter = SlidingWindowLimiter::new("status", RateWindow::per_minute(2));
/// assert!(limiter.allow("10.0.0.1"));
/// assert!(limiter.allow("10.0.0.1"));
/// assert!(!limiter.allow("10.0.0.1"));
/// assert!(limiter.allow("10.0.0.2"));
/// # }
/// ```
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    name: String,
    window: RateWindow,
    requests: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl SlidingWindowLimiter {
    /// Create a new limiter.
    pub fn new(name: impl Into<String>, window: RateWindow) -> Self {
        let name = name.into();
        debug!(
            limiter = %name,
            max_requests = window.max_requests,
            window_secs = window.window_secs,
            "Creating sliding window limiter"
        );
        Self {
            name,
            window,
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Configured allowance.
    pub fn window(&self) -> RateWindow {
        self.window
    }

    fn span(&self) -> Duration {
        Duration::from_secs(self.window.window_secs)
    }

    /// Record a request and report whether it fits in the allowance.
    ///
    /// Refused requests are not recorded.
    pub fn allow(&self, identity: &str) -> bool {
        self.check(identity).is_ok()
    }

    /// Record a request, or return an error carrying the retry delay.
    #[instrument(skip(self), fields(limiter = %self.name))]
    pub fn check(&self, identity: &str) -> Result<(), RateLimitError> {
        let now = Instant::now();
        let mut requests = self.requests.lock();
        let recent = requests.entry(identity.to_string()).or_default();
        prune(recent, now, self.span());

        if recent.len() >= self.window.max_requests as usize {
            let retry_after = self.retry_after(recent, now);
            debug!(retry_after_secs = retry_after.as_secs(), "Rate limit exceeded");
            return Err(RateLimitError::new(
                identity,
                self.window.max_requests,
                self.window.window_secs,
                retry_after.as_secs().max(1),
            ));
        }

        recent.push_back(now);
        debug!(
            remaining = self.window.max_requests as usize - recent.len(),
            "Rate limit check passed"
        );
        Ok(())
    }

    /// Whether the identity has used up its allowance, without recording.
    pub fn is_limited(&self, identity: &str) -> bool {
        let now = Instant::now();
        let mut requests = self.requests.lock();
        match requests.get_mut(identity) {
            Some(recent) => {
                prune(recent, now, self.span());
                recent.len() >= self.window.max_requests as usize
            }
            None => false,
        }
    }

    /// Record an event unconditionally (a failed login, for example).
    pub fn record(&self, identity: &str) {
        let now = Instant::now();
        let mut requests = self.requests.lock();
        let recent = requests.entry(identity.to_string()).or_default();
        prune(recent, now, self.span());
        recent.push_back(now);
    }

    /// Forget everything recorded for the identity.
    pub fn clear(&self, identity: &str) {
        self.requests.lock().remove(identity);
    }

    /// Requests left in the current window.
    pub fn remaining(&self, identity: &str) -> u32 {
        let now = Instant::now();
        let mut requests = self.requests.lock();
        let used = match requests.get_mut(identity) {
            Some(recent) => {
                prune(recent, now, self.span());
                recent.len()
            }
            None => 0,
        };
        (self.window.max_requests as usize).saturating_sub(used) as u32
    }

    /// Drop stale timestamps and identities with nothing left in the window.
    ///
    /// Returns the number of identities removed.
    #[instrument(skip(self), fields(limiter = %self.name))]
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let span = self.span();
        let mut requests = self.requests.lock();
        let before = requests.len();
        requests.retain(|_, recent| {
            prune(recent, now, span);
            !recent.is_empty()
        });
        let removed = before - requests.len();
        if removed > 0 {
            debug!(removed, remaining = requests.len(), "Swept idle identities");
        }
        removed
    }

    /// Number of identities currently tracked.
    pub fn tracked(&self) -> usize {
        self.requests.lock().len()
    }

    fn retry_after(&self, recent: &VecDeque<Instant>, now: Instant) -> Duration {
        recent
            .front()
            .map(|oldest| (*oldest + self.span()).saturating_duration_since(now))
            .unwrap_or_default()
    }
}

fn prune(recent: &mut VecDeque<Instant>, now: Instant, span: Duration) {
    while let Some(oldest) = recent.front() {
        if now.saturating_duration_since(*oldest) >= span {
            recent.pop_front();
        } else {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_refused_requests_are_not_recorded() {
        let limiter = SlidingWindowLimiter::new("test", RateWindow::per_minute(1));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(!limiter.allow("a"));

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(limiter.allow("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_counts_from_oldest() {
        let limiter = SlidingWindowLimiter::new("test", RateWindow::per_minute(1));
        assert!(limiter.check("a").is_ok());
        tokio::time::advance(Duration::from_secs(20)).await;
        let err = limiter.check("a").unwrap_err();
        assert_eq!(err.retry_after_secs, 40);
        assert_eq!(err.limit, 1);
        assert_eq!(err.window_secs, 60);
    }
}
