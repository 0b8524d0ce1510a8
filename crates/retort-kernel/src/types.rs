//! Data model for the control loop.
//!
//! Identifiers are opaque strings issued by the social platform.  Posts and
//! comments are read-only snapshots; a [`Reply`] only lives for the duration
//! of one comment's processing.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum length of a reply post, in characters.
pub const MAX_REPLY_CHARS: usize = 280;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// The monitored account's public handle (username), as configured.
    AccountHandle
);

string_id!(
    /// The provider's internal identifier for an account.
    AccountId
);

string_id!(
    /// Identifier of a post authored by the monitored account.
    PostId
);

string_id!(
    /// Identifier of a comment (a reply or mention).
    ///
    /// Comments are processed in ascending [`Ord`] order: decimal identifiers
    /// compare numerically, which follows creation order for snowflake IDs;
    /// anything else compares lexicographically after all numeric IDs.
    CommentId
);

impl CommentId {
    fn numeric(&self) -> Option<u128> {
        if self.0.is_empty() || !self.0.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        self.0.parse().ok()
    }
}

impl Ord for CommentId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            // Tie-break on the raw string so "007" and "7" stay distinct.
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for CommentId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A post authored by the monitored account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// A reply or mention attached to one of the account's posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    /// The post whose conversation this comment belongs to.
    pub post_id: PostId,
    /// Provider identifier of the comment's author.
    pub author_id: String,
    /// The author's handle, when the provider included it.
    #[serde(default)]
    pub author_handle: Option<String>,
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Reply text addressed to one comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub in_reply_to: CommentId,
    pub text: String,
}

impl Reply {
    /// Build the reply for `comment` from generated text.
    ///
    /// The commenter is mentioned when their handle is known, and the
    /// result is cut to [`MAX_REPLY_CHARS`] characters.
    pub fn for_comment(comment: &Comment, generated: &str) -> Self {
        let generated = generated.trim();
        let text = match comment.author_handle.as_deref() {
            Some(handle) if !handle.is_empty() => {
                let mention = format!("@{handle}");
                if generated.starts_with(&mention) {
                    generated.to_owned()
                } else {
                    format!("{mention} {generated}")
                }
            }
            _ => generated.to_owned(),
        };

        Self {
            in_reply_to: comment.id.clone(),
            text: truncate_chars(&text, MAX_REPLY_CHARS),
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end().to_owned(),
        None => text.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: &str, handle: Option<&str>) -> Comment {
        Comment {
            id: CommentId::new(id),
            post_id: PostId::new("1"),
            author_id: "99".into(),
            author_handle: handle.map(str::to_owned),
            text: "nice!".into(),
            created_at: None,
        }
    }

    #[test]
    fn comment_ids_sort_numerically() {
        let mut ids: Vec<CommentId> = ["100", "9", "1790000000000000001", "10"]
            .into_iter()
            .map(CommentId::from)
            .collect();
        ids.sort();
        let sorted: Vec<&str> = ids.iter().map(CommentId::as_str).collect();
        assert_eq!(sorted, ["9", "10", "100", "1790000000000000001"]);
    }

    #[test]
    fn non_numeric_ids_sort_after_numeric() {
        let mut ids = vec![
            CommentId::from("b"),
            CommentId::from("20"),
            CommentId::from("a"),
            CommentId::from("3"),
        ];
        ids.sort();
        let sorted: Vec<&str> = ids.iter().map(CommentId::as_str).collect();
        assert_eq!(sorted, ["3", "20", "a", "b"]);
    }

    #[test]
    fn leading_zeros_do_not_collide() {
        let a = CommentId::from("007");
        let b = CommentId::from("7");
        assert_ne!(a.cmp(&b), Ordering::Equal);
        assert_ne!(a, b);
    }

    #[test]
    fn reply_mentions_known_author() {
        let reply = Reply::for_comment(&comment("5", Some("alice")), "  sure thing  ");
        assert_eq!(reply.text, "@alice sure thing");
        assert_eq!(reply.in_reply_to.as_str(), "5");
    }

    #[test]
    fn reply_does_not_double_mention() {
        let reply = Reply::for_comment(&comment("5", Some("alice")), "@alice hi");
        assert_eq!(reply.text, "@alice hi");
    }

    #[test]
    fn reply_without_handle_is_plain() {
        let reply = Reply::for_comment(&comment("5", None), "hi");
        assert_eq!(reply.text, "hi");
    }

    #[test]
    fn reply_is_truncated_on_char_boundary() {
        let long = "é".repeat(400);
        let reply = Reply::for_comment(&comment("5", None), &long);
        assert_eq!(reply.text.chars().count(), MAX_REPLY_CHARS);
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&CommentId::from("42")).unwrap();
        assert_eq!(json, "\"42\"");
    }
}
