//! Error types for the Twocker chat bot.
//!
//! This crate provides the foundation error types used throughout the Twocker workspace.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! # Examples
//!
//! ```
//! use twocker_error::{TwockerResult, ValidationError};
//!
//! fn check_interval(minutes: u64) -> TwockerResult<u64> {
//!     if minutes == 0 {
//!         Err(ValidationError::new("interval_minutes", "must be at least 1"))?
//!     }
//!     Ok(minutes)
//! }
//!
//! assert!(check_interval(0).is_err());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod rate_limit;
mod send;
mod upstream;
mod validation;

pub use config::ConfigError;
pub use error::{TwockerError, TwockerErrorKind, TwockerResult};
pub use rate_limit::RateLimitError;
pub use send::{SendError, SendErrorKind};
pub use upstream::{TransientError, UpstreamError, UpstreamErrorKind};
pub use validation::ValidationError;
