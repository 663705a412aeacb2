//! Utility modules for honeyscope
//!
//! Time parsing/formatting and log suppression helpers.

pub mod log_rate_limiter;
pub mod time;

pub use log_rate_limiter::LogRateLimiter;
pub use time::{format_timestamp, parse_event_timestamp};
