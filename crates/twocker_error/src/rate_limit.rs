//! Rate limit rejection.

/// A caller exceeded its allowance inside the sliding window.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display(
    "Rate Limit Error: '{}' exceeded {} requests per {}s (retry after {}s) at line {} in {}",
    identity,
    limit,
    window_secs,
    retry_after_secs,
    line,
    file
)]
pub struct RateLimitError {
    /// Identity that was limited
    pub identity: String,
    /// Requests allowed per window
    pub limit: u32,
    /// Window length in seconds
    pub window_secs: u64,
    /// Seconds until the oldest request leaves the window
    pub retry_after_secs: u64,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl RateLimitError {
    /// Create a new RateLimitError at the current location.
    #[track_caller]
    pub fn new(identity: impl Into<String>, limit: u32, window_secs: u64, retry_after_secs: u64) -> Self {
        let location = std::panic::Location::caller();
        Self {
            identity: identity.into(),
            limit,
            window_secs,
            retry_after_secs,
            line: location.line(),
            file: location.file(),
        }
    }
}
