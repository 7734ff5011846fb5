//! Outbound request pacing using governor and a Tokio semaphore.
//!
//! The GCRA quota keeps the bot under the platform's per-minute budget, the
//! semaphore bounds how many requests are open at once.

use derive_getters::Getters;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

type DirectRateLimiter = GovernorRateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Budget for outbound platform calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Getters)]
pub struct ThrottleConfig {
    /// Requests per minute, 0 disables pacing
    #[serde(default = "default_requests_per_minute")]
    requests_per_minute: u32,
    /// Requests open at once
    #[serde(default = "default_max_concurrent")]
    max_concurrent: u32,
}

fn default_requests_per_minute() -> u32 {
    800
}

fn default_max_concurrent() -> u32 {
    30
}

impl ThrottleConfig {
    /// Create a new budget.
    pub fn new(requests_per_minute: u32, max_concurrent: u32) -> Self {
        Self {
            requests_per_minute,
            max_concurrent,
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self::new(default_requests_per_minute(), default_max_concurrent())
    }
}

/// Paces outbound requests.
///
/// # Example
///
/// ```
/// use twocker_rate_limit::{ThrottleConfig, UpstreamThrottle};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let throttle = UpstreamThrottle::new(ThrottleConfig::default());
/// let permit = throttle.acquire().await;
/// // issue the request...
/// drop(permit);
/// # }
/// ```
#[derive(Clone)]
pub struct UpstreamThrottle {
    rpm_limiter: Option<Arc<DirectRateLimiter>>,
    concurrent: Arc<Semaphore>,
}

impl std::fmt::Debug for UpstreamThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamThrottle")
            .field("paced", &self.rpm_limiter.is_some())
            .field("available_slots", &self.concurrent.available_permits())
            .finish()
    }
}

/// Holds a concurrency slot until dropped.
#[derive(Debug)]
pub struct ThrottlePermit {
    _permit: Option<OwnedSemaphorePermit>,
}

impl UpstreamThrottle {
    /// Create a throttle from a budget.
    pub fn new(config: ThrottleConfig) -> Self {
        let rpm_limiter = NonZeroU32::new(config.requests_per_minute)
            .map(|n| Arc::new(GovernorRateLimiter::direct(Quota::per_minute(n))));
        let max_concurrent = config.max_concurrent.max(1) as usize;
        tracing::debug!(
            requests_per_minute = config.requests_per_minute,
            max_concurrent,
            "Creating upstream throttle"
        );
        Self {
            rpm_limiter,
            concurrent: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Wait until the quota and a concurrency slot allow another request.
    pub async fn acquire(&self) -> ThrottlePermit {
        if let Some(limiter) = &self.rpm_limiter {
            limiter.until_ready().await;
        }
        // The semaphore is never closed, so a failed acquire only means no slot.
        let permit = self.concurrent.clone().acquire_owned().await.ok();
        ThrottlePermit { _permit: permit }
    }

    /// Free concurrency slots.
    pub fn available_slots(&self) -> usize {
        self.concurrent.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn acquire_within(throttle: &UpstreamThrottle, ms: u64) -> Option<ThrottlePermit> {
        tokio::time::timeout(Duration::from_millis(ms), throttle.acquire())
            .await
            .ok()
    }

    #[tokio::test]
    async fn test_concurrency_cap() {
        let throttle = UpstreamThrottle::new(ThrottleConfig::new(0, 2));
        let first = acquire_within(&throttle, 50).await;
        let second = acquire_within(&throttle, 50).await;
        assert!(first.is_some());
        assert!(second.is_some());
        assert!(acquire_within(&throttle, 50).await.is_none());

        drop(first);
        assert_eq!(throttle.available_slots(), 1);
    }

    #[tokio::test]
    async fn test_quota_exhaustion() {
        let throttle = UpstreamThrottle::new(ThrottleConfig::new(2, 10));
        assert!(acquire_within(&throttle, 50).await.is_some());
        assert!(acquire_within(&throttle, 50).await.is_some());
        assert!(acquire_within(&throttle, 50).await.is_none());
        assert_eq!(throttle.available_slots(), 10);
    }
}
