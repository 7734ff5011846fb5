//! Metrics collection for scheduled posts.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::Instant;

/// Counters for post loop fires.
#[derive(Debug, Clone)]
pub struct PostMetrics {
    inner: Arc<PostMetricsInner>,
}

#[derive(Debug)]
struct PostMetricsInner {
    executions: AtomicU64,
    sent: AtomicU64,
    skips: AtomicU64,
    failures: AtomicU64,
    last_success: parking_lot::Mutex<Option<Instant>>,
}

impl Default for PostMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PostMetrics {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PostMetricsInner {
                executions: AtomicU64::new(0),
                sent: AtomicU64::new(0),
                skips: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                last_success: parking_lot::Mutex::new(None),
            }),
        }
    }

    /// Records a fire of the post loop.
    pub fn record_execution(&self) {
        self.inner.executions.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a delivered message.
    pub fn record_success(&self) {
        self.inner.sent.fetch_add(1, Ordering::Relaxed);
        *self.inner.last_success.lock() = Some(Instant::now());
    }

    /// Records a fire that decided not to send.
    pub fn record_skip(&self) {
        self.inner.skips.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed send.
    pub fn record_failure(&self) {
        self.inner.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets fire count.
    pub fn executions(&self) -> u64 {
        self.inner.executions.load(Ordering::Relaxed)
    }

    /// Gets delivered count.
    pub fn sent(&self) -> u64 {
        self.inner.sent.load(Ordering::Relaxed)
    }

    /// Gets skip count.
    pub fn skips(&self) -> u64 {
        self.inner.skips.load(Ordering::Relaxed)
    }

    /// Gets failure count.
    pub fn failures(&self) -> u64 {
        self.inner.failures.load(Ordering::Relaxed)
    }

    /// Gets time since the last delivered message.
    pub fn time_since_success(&self) -> Option<std::time::Duration> {
        self.inner
            .last_success
            .lock()
            .map(|instant| instant.elapsed())
    }

    /// Creates a serializable snapshot of current metrics.
    pub fn snapshot(&self) -> PostMetricsSnapshot {
        PostMetricsSnapshot {
            executions: self.executions(),
            sent: self.sent(),
            skips: self.skips(),
            failures: self.failures(),
            seconds_since_success: self.time_since_success().map(|d| d.as_secs()),
        }
    }
}

/// Serializable post metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostMetricsSnapshot {
    /// Number of fires
    pub executions: u64,
    /// Messages delivered
    pub sent: u64,
    /// Fires that decided not to send
    pub skips: u64,
    /// Failed sends
    pub failures: u64,
    /// Seconds since the last delivered message
    pub seconds_since_success: Option<u64>,
}
