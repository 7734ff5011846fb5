//! Errors from the Twitch platform API.

/// Classified upstream failure conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum UpstreamErrorKind {
    /// The request did not finish within the configured timeout
    #[display("Request timed out: {}", _0)]
    Timeout(String),
    /// Connection failure, 5xx or 429 from the platform
    #[display("Upstream unavailable: {}", _0)]
    Unavailable(String),
    /// Credentials were rejected
    #[display("Authentication rejected (HTTP {}): {}", status_code, message)]
    Auth {
        /// HTTP status code
        status_code: u16,
        /// Error message
        message: String,
    },
    /// The platform refused the request itself (4xx other than auth)
    #[display("Request rejected (HTTP {}): {}", status_code, message)]
    Rejected {
        /// HTTP status code
        status_code: u16,
        /// Error message
        message: String,
    },
    /// The platform has no record of the requested resource
    #[display("Not found: {}", _0)]
    NotFound(String),
    /// The response body did not have the expected shape
    #[display("Malformed upstream response: {}", _0)]
    Malformed(String),
}

/// Errors that may resolve on their own if the call is repeated later.
pub trait TransientError {
    /// Whether a later attempt could succeed without operator action.
    fn is_transient(&self) -> bool;
}

impl TransientError for UpstreamErrorKind {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            UpstreamErrorKind::Timeout(_) | UpstreamErrorKind::Unavailable(_)
        )
    }
}

/// Upstream error with source location.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Upstream Error: {} at line {} in {}", kind, line, file)]
pub struct UpstreamError {
    /// Error kind
    pub kind: UpstreamErrorKind,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl UpstreamError {
    /// Create a new UpstreamError with the given kind at the current location.
    ///
    /// # Examples
    ///
    /// ```
    /// use twocker_error::{TransientError, UpstreamError, UpstreamErrorKind};
    ///
    /// let err = UpstreamError::new(UpstreamErrorKind::Unavailable("HTTP 503".into()));
    /// assert!(err.is_transient());
    /// ```
    #[track_caller]
    pub fn new(kind: UpstreamErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &UpstreamErrorKind {
        &self.kind
    }
}

impl TransientError for UpstreamError {
    fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(UpstreamErrorKind::Timeout("is_live".into()).is_transient());
        assert!(UpstreamErrorKind::Unavailable("HTTP 502".into()).is_transient());
        assert!(
            !UpstreamErrorKind::Auth {
                status_code: 401,
                message: "invalid token".into()
            }
            .is_transient()
        );
        assert!(!UpstreamErrorKind::Malformed("missing data".into()).is_transient());
        assert!(!UpstreamErrorKind::NotFound("nosuchuser".into()).is_transient());
        assert!(
            !UpstreamErrorKind::Rejected {
                status_code: 400,
                message: "missing broadcaster_id".into()
            }
            .is_transient()
        );
    }
}
