//! Poll cycle controller.
//!
//! One cycle walks the account's most recent posts, collects the candidate
//! comments on each, and replies to every comment that is not yet recorded
//! in the [`ProcessedStore`].
//!
//! # Cycle lifecycle
//!
//! ```text
//! Idle --> FetchingPosts --> FetchingComments --> ProcessingComment* --+--> Complete
//!               |                   ^                                  |
//!               |                   +---------- next post -------------+
//!               +--> EndedEarly (account lookup / post fetch failure)
//!
//! any RateLimited signal ----------------------------------------------> AbortedRateLimited
//! ```
//!
//! # Failure handling
//!
//! - A rate limit from any collaborator aborts the rest of the cycle.
//! - Failing to resolve the account or list posts ends the cycle early.
//! - Failing to list one post's comments skips that post.
//! - Failing to dispatch one reply skips that comment without recording it,
//!   so it is retried the next time it is seen.
//!
//! A processed marker is written only after the dispatcher reports success.

use std::sync::Arc;
use std::time::Duration;

use retort_store::ProcessedStore;
use tracing::{debug, error, info, warn};

use crate::error::{KernelError, Result};
use crate::traits::{CommentSource, ReplyDispatcher, ReplyGenerator};
use crate::types::{AccountHandle, AccountId, Comment, Reply};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Fetch window for one cycle.
#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// The monitored account.
    pub account: AccountHandle,
    /// How many of the most recent posts to examine.
    pub post_limit: u32,
    /// How many candidate comments to fetch per post.
    pub comment_limit: u32,
}

/// Where the controller is within the current (or last) cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// No cycle has run yet.
    Idle,
    FetchingPosts,
    FetchingComments,
    ProcessingComment,
    /// The last cycle walked every post.
    Complete,
    /// The last cycle stopped on a provider rate limit.
    AbortedRateLimited,
    /// The last cycle stopped before reaching any comment.
    EndedEarly,
}

/// Counters for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub posts_scanned: usize,
    pub comments_seen: usize,
    pub already_processed: usize,
    pub self_authored: usize,
    pub replies_dispatched: usize,
    pub failures: usize,
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every post in the window was examined.
    Completed(CycleReport),
    /// A collaborator signalled a rate limit; the rest of the cycle was
    /// skipped.
    RateLimited {
        retry_after: Option<Duration>,
        report: CycleReport,
    },
    /// The account handle did not resolve.
    AccountLookupFailed { reason: String },
    /// The post listing failed for a reason other than a rate limit.
    PostsUnavailable { reason: String },
}

impl CycleOutcome {
    /// The cycle's counters, when it got far enough to have any.
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            Self::Completed(report) | Self::RateLimited { report, .. } => Some(report),
            Self::AccountLookupFailed { .. } | Self::PostsUnavailable { .. } => None,
        }
    }
}

/// What happened to a single comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommentStatus {
    Dispatched,
    AlreadyProcessed,
    SelfAuthored,
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Runs poll cycles against the configured collaborators.
///
/// The controller owns the [`ProcessedStore`]; all membership checks and
/// marker writes go through it, one comment at a time.
pub struct PollCycleController {
    config: CycleConfig,
    source: Arc<dyn CommentSource>,
    generator: Arc<dyn ReplyGenerator>,
    dispatcher: Arc<dyn ReplyDispatcher>,
    store: ProcessedStore,
    state: CycleState,
}

impl PollCycleController {
    /// Create a controller.  `store` should already be loaded.
    pub fn new(
        config: CycleConfig,
        source: Arc<dyn CommentSource>,
        generator: Arc<dyn ReplyGenerator>,
        dispatcher: Arc<dyn ReplyDispatcher>,
        store: ProcessedStore,
    ) -> Self {
        Self {
            config,
            source,
            generator,
            dispatcher,
            store,
            state: CycleState::Idle,
        }
    }

    /// The processed-marker store.
    pub fn store(&self) -> &ProcessedStore {
        &self.store
    }

    /// Current (or final) state of the most recent cycle.
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Run one full cycle.
    ///
    /// Never returns an error: every failure is classified into a
    /// [`CycleOutcome`] or counted in the [`CycleReport`].
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let mut report = CycleReport::default();

        let account = match self.source.resolve_account(&self.config.account).await {
            Ok(account) => account,
            Err(KernelError::RateLimited { retry_after }) => {
                return self.abort_rate_limited(retry_after, report);
            }
            Err(e) => {
                warn!(account = %self.config.account, error = %e, "account lookup failed");
                self.enter(CycleState::EndedEarly);
                return CycleOutcome::AccountLookupFailed {
                    reason: e.to_string(),
                };
            }
        };

        self.enter(CycleState::FetchingPosts);
        let posts = match self
            .source
            .recent_posts(&account, self.config.post_limit)
            .await
        {
            Ok(posts) => posts,
            Err(KernelError::RateLimited { retry_after }) => {
                return self.abort_rate_limited(retry_after, report);
            }
            Err(e) => {
                warn!(account = %self.config.account, error = %e, "failed to fetch recent posts");
                self.enter(CycleState::EndedEarly);
                return CycleOutcome::PostsUnavailable {
                    reason: e.to_string(),
                };
            }
        };

        if posts.is_empty() {
            info!(account = %self.config.account, "no posts found");
        }

        for post in &posts {
            report.posts_scanned += 1;
            self.enter(CycleState::FetchingComments);

            let mut comments = match self
                .source
                .candidate_comments(&post.id, self.config.comment_limit)
                .await
            {
                Ok(comments) => comments,
                Err(KernelError::RateLimited { retry_after }) => {
                    return self.abort_rate_limited(retry_after, report);
                }
                Err(e) => {
                    warn!(post_id = %post.id, error = %e, "failed to fetch comments, skipping post");
                    report.failures += 1;
                    continue;
                }
            };

            if comments.is_empty() {
                debug!(post_id = %post.id, "no comments found");
                continue;
            }

            comments.sort_by(|a, b| a.id.cmp(&b.id));
            comments.dedup_by(|a, b| a.id == b.id);

            for comment in &comments {
                report.comments_seen += 1;
                self.enter(CycleState::ProcessingComment);

                match self.process_comment(&account, comment).await {
                    Ok(CommentStatus::Dispatched) => report.replies_dispatched += 1,
                    Ok(CommentStatus::AlreadyProcessed) => report.already_processed += 1,
                    Ok(CommentStatus::SelfAuthored) => report.self_authored += 1,
                    Err(KernelError::RateLimited { retry_after }) => {
                        return self.abort_rate_limited(retry_after, report);
                    }
                    Err(e) => {
                        warn!(
                            comment_id = %comment.id,
                            post_id = %post.id,
                            error = %e,
                            "failed to process comment, will retry next cycle"
                        );
                        report.failures += 1;
                    }
                }
            }
        }

        self.enter(CycleState::Complete);
        info!(
            posts = report.posts_scanned,
            comments = report.comments_seen,
            replied = report.replies_dispatched,
            skipped = report.already_processed,
            self_authored = report.self_authored,
            failures = report.failures,
            "cycle complete"
        );
        CycleOutcome::Completed(report)
    }

    // -----------------------------------------------------------------------
    // Per-comment critical section
    // -----------------------------------------------------------------------

    /// Check, generate, dispatch, record.
    async fn process_comment(
        &mut self,
        account: &AccountId,
        comment: &Comment,
    ) -> Result<CommentStatus> {
        if self.store.contains(comment.id.as_str()) {
            debug!(comment_id = %comment.id, "already processed");
            return Ok(CommentStatus::AlreadyProcessed);
        }

        if comment.author_id == account.as_str() {
            debug!(comment_id = %comment.id, "comment authored by the monitored account");
            return Ok(CommentStatus::SelfAuthored);
        }

        // A marker that cannot be written would let the same comment be
        // answered again on every cycle.
        if !ProcessedStore::accepts(comment.id.as_str()) {
            return Err(KernelError::Dispatch {
                comment_id: comment.id.to_string(),
                reason: "comment id cannot be recorded".into(),
            });
        }

        info!(
            comment_id = %comment.id,
            author_id = %comment.author_id,
            text = %comment.text,
            "found new comment"
        );

        let generated = self.generator.generate(&comment.text).await;
        let reply = Reply::for_comment(comment, &generated);

        self.dispatcher
            .post_reply(&reply.text, &reply.in_reply_to)
            .await?;
        info!(comment_id = %comment.id, reply = %reply.text, "reply dispatched");

        if let Err(e) = self.store.record(comment.id.as_str()).await {
            error!(
                comment_id = %comment.id,
                error = %e,
                "reply posted but processed marker was not persisted"
            );
        }

        Ok(CommentStatus::Dispatched)
    }

    // -----------------------------------------------------------------------
    // State helpers
    // -----------------------------------------------------------------------

    fn enter(&mut self, state: CycleState) {
        debug!(from = ?self.state, to = ?state, "cycle state");
        self.state = state;
    }

    fn abort_rate_limited(
        &mut self,
        retry_after: Option<Duration>,
        report: CycleReport,
    ) -> CycleOutcome {
        warn!(
            retry_after_secs = retry_after.map(|d| d.as_secs()),
            replied = report.replies_dispatched,
            "rate limited, aborting cycle"
        );
        self.enter(CycleState::AbortedRateLimited);
        CycleOutcome::RateLimited {
            retry_after,
            report,
        }
    }
}
