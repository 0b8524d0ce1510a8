//! Seams between the control loop and its external collaborators.
//!
//! The adapters crate implements [`CommentSource`] and [`ReplyDispatcher`]
//! against the social platform; the agent crate implements
//! [`ReplyGenerator`] against a text-generation service.  Tests substitute
//! in-memory fakes.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{AccountHandle, AccountId, Comment, CommentId, Post, PostId};

/// Read side of the social platform.
///
/// Retrieval methods must report throttling as
/// [`KernelError::RateLimited`](crate::KernelError::RateLimited), never as a
/// generic fetch error: the controller aborts the cycle only for the former.
#[async_trait]
pub trait CommentSource: Send + Sync {
    /// Resolve the configured handle to the provider's account identifier.
    ///
    /// Implementations may cache the result for the process lifetime.
    async fn resolve_account(&self, handle: &AccountHandle) -> Result<AccountId>;

    /// Up to `limit` of the account's most recent posts, newest first.
    async fn recent_posts(&self, account: &AccountId, limit: u32) -> Result<Vec<Post>>;

    /// Up to `limit` comments attached to `post`, in provider order.
    async fn candidate_comments(&self, post: &PostId, limit: u32) -> Result<Vec<Comment>>;
}

/// Turns a comment into reply text.
///
/// Generation cannot fail from the caller's point of view: implementations
/// substitute a fallback reply when the underlying service errors.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, comment_text: &str) -> String;
}

/// Write side of the social platform.
#[async_trait]
pub trait ReplyDispatcher: Send + Sync {
    /// Post `reply_text` as a reply to `in_reply_to`.
    ///
    /// An `Err` means no reply was posted.
    async fn post_reply(&self, reply_text: &str, in_reply_to: &CommentId) -> Result<()>;
}
