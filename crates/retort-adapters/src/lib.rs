//! Platform adapters for retort.
//!
//! The only platform is the X API v2.  [`TwitterAdapter`] implements the
//! kernel's [`CommentSource`](retort_kernel::CommentSource) and
//! [`ReplyDispatcher`](retort_kernel::ReplyDispatcher) traits; [`oauth`]
//! signs its write requests.

pub mod error;
pub mod oauth;
pub mod twitter;

pub use error::{AdapterError, Result};
pub use oauth::OAuth1Credentials;
pub use twitter::{DEFAULT_BASE_URL, TwitterAdapter};
