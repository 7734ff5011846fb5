//! Top-level error wrapper types.

use crate::{ConfigError, RateLimitError, SendError, UpstreamError, ValidationError};

/// All error conditions surfaced by the Twocker crates.
///
/// # Examples
///
/// ```
/// use twocker_error::{TwockerError, TwockerErrorKind, ValidationError};
///
/// let err: TwockerError = ValidationError::new("interval_minutes", "must be between 1 and 60").into();
/// assert!(matches!(err.kind(), TwockerErrorKind::Validation(_)));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum TwockerErrorKind {
    /// Rejected setting
    #[from(ValidationError)]
    Validation(ValidationError),
    /// Twitch API failure
    #[from(UpstreamError)]
    Upstream(UpstreamError),
    /// Caller exceeded its allowance
    #[from(RateLimitError)]
    RateLimit(RateLimitError),
    /// Chat delivery failure
    #[from(SendError)]
    Send(SendError),
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
}

/// Twocker error with kind discrimination.
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Twocker Error: {}", _0)]
pub struct TwockerError(Box<TwockerErrorKind>);

impl TwockerError {
    /// Create a new error from a kind.
    pub fn new(kind: TwockerErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &TwockerErrorKind {
        &self.0
    }
}

// Generic From implementation for any type that converts to TwockerErrorKind
impl<T> From<T> for TwockerError
where
    T: Into<TwockerErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for Twocker operations.
///
/// # Examples
///
/// ```
/// use twocker_error::{ConfigError, TwockerResult};
///
/// fn load() -> TwockerResult<String> {
///     Err(ConfigError::new("API_PASSWORD must be at least 8 characters"))?
/// }
///
/// assert!(load().is_err());
/// ```
pub type TwockerResult<T> = std::result::Result<T, TwockerError>;
