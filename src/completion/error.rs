//! Error types for the completion client.

use thiserror::Error;

/// Failures when calling the completion service.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The server returned HTTP 429. `retry_after_ms` says how long to wait
    /// before retrying.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Any other HTTP error (e.g. 401 invalid key, 500 internal error).
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Underlying network failure (DNS, refused connection, timeout).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The service answered, but not with the structured text we asked for.
    #[error("failed to parse completion response: {0}")]
    Parse(String),
}
