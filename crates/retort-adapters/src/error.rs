//! Adapter error types.
//!
//! All adapter subsystems surface errors through [`AdapterError`].  The
//! conversions at the bottom map them onto the kernel's taxonomy, keeping
//! rate limits distinct from every other failure.

use std::time::Duration;

use retort_kernel::KernelError;

/// Unified error type for the retort adapters.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The provider answered 429.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// The HTTP request could not be completed.
    #[error("request to `{endpoint}` failed: {reason}")]
    RequestFailed { endpoint: String, reason: String },

    /// An operation exceeded its time limit.
    #[error("timeout after {seconds}s: {reason}")]
    Timeout { seconds: u64, reason: String },

    /// The provider answered with a non-success status.
    #[error("`{endpoint}` returned {status}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// The requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The response body did not have the expected shape.
    #[error("unexpected response from `{endpoint}`: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error in adapter setup.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Catch-all for unexpected internal errors.  Prefer a typed variant
    /// whenever possible.
    #[error("internal adapter error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the adapters crate.
pub type Result<T> = std::result::Result<T, AdapterError>;

// ---------------------------------------------------------------------------
// Kernel mapping
// ---------------------------------------------------------------------------

impl AdapterError {
    /// Map a failure to resolve `handle`.
    pub fn into_lookup_error(self, handle: &str) -> KernelError {
        match self {
            Self::RateLimited { retry_after } => KernelError::RateLimited { retry_after },
            other => KernelError::AccountLookup {
                handle: handle.to_owned(),
                reason: other.to_string(),
            },
        }
    }

    /// Map a failure to read posts or comments.
    pub fn into_fetch_error(self) -> KernelError {
        match self {
            Self::RateLimited { retry_after } => KernelError::RateLimited { retry_after },
            other => KernelError::Fetch {
                reason: other.to_string(),
            },
        }
    }

    /// Map a failure to post a reply to `comment_id`.
    pub fn into_dispatch_error(self, comment_id: &str) -> KernelError {
        match self {
            Self::RateLimited { retry_after } => KernelError::RateLimited { retry_after },
            other => KernelError::Dispatch {
                comment_id: comment_id.to_owned(),
                reason: other.to_string(),
            },
        }
    }
}
