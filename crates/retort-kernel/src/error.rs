//! Kernel error types.
//!
//! Every collaborator behind the kernel's traits reports failures as a
//! [`KernelError`].  The variants mirror how the control loop reacts:
//! a rate limit aborts the whole cycle, an account lookup failure ends the
//! cycle early, and everything else is isolated to one post or comment.

use std::time::Duration;

/// Unified error type for the Retort control loop.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    /// The monitored account handle did not resolve to an account.
    #[error("account lookup failed for `{handle}`: {reason}")]
    AccountLookup { handle: String, reason: String },

    /// The provider throttled us.  `retry_after` is the provider's hint, if
    /// it sent one.
    #[error("rate limited by provider (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// Retrieving posts or comments failed for a reason other than a rate
    /// limit.
    #[error("fetch failed: {reason}")]
    Fetch { reason: String },

    /// Posting a reply failed; nothing was posted.
    #[error("dispatch failed for comment {comment_id}: {reason}")]
    Dispatch { comment_id: String, reason: String },
}

impl KernelError {
    /// Returns `true` for the one error class that aborts a cycle.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// The provider's retry hint, if this is a rate-limit error carrying one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Convenience alias used throughout the kernel crate.
pub type Result<T> = std::result::Result<T, KernelError>;
