//! Rate limiting for the Twocker control surface and upstream calls.
//!
//! Two limiters live here:
//! - [`SlidingWindowLimiter`] counts requests per caller identity inside a
//!   sliding window. It guards the login check and the status endpoints.
//! - [`UpstreamThrottle`] paces outbound platform API calls with a GCRA quota
//!   and a concurrency cap.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod sliding_window;
mod throttle;

pub use sliding_window::{RateWindow, SlidingWindowLimiter};
pub use throttle::{ThrottleConfig, ThrottlePermit, UpstreamThrottle};
