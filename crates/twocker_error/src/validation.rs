//! Validation errors for operator supplied settings.

/// A setting was rejected. The configuration it targeted is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("Validation Error: {} {} at line {} in {}", field, reason, line, file)]
pub struct ValidationError {
    /// Name of the offending field
    pub field: String,
    /// Human readable reason
    pub reason: String,
    /// Line number where the error occurred
    pub line: u32,
    /// File where the error occurred
    pub file: &'static str,
}

impl ValidationError {
    /// Create a new ValidationError for `field` at the current location.
    ///
    /// # Examples
    ///
    /// ```
    /// use twocker_error::ValidationError;
    ///
    /// let err = ValidationError::new("channel", "must not be empty");
    /// assert_eq!(err.field, "channel");
    /// assert!(err.to_string().contains("must not be empty"));
    /// ```
    #[track_caller]
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let location = std::panic::Location::caller();
        Self {
            field: field.into(),
            reason: reason.into(),
            line: location.line(),
            file: location.file(),
        }
    }
}
