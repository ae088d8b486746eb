//! Media fetching: HTTP client, filename rules, retry policy, global pacing.

mod client;
mod error;
mod filename;
mod rate_limiter;
mod retry;

pub use client::HttpClient;
pub use error::DownloadError;
pub use filename::{extension_from_name, filename_from_url, is_excluded_extension};
pub use rate_limiter::RateLimiter;
pub use retry::{
    classify_error, FailureType, RetryDecision, RetryPolicy, DEFAULT_MAX_RETRIES,
};
