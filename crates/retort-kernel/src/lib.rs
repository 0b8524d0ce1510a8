//! Retort control loop.
//!
//! This crate holds everything between the external collaborators and the
//! processed-marker store:
//!
//! - **[`types`]** -- Account, post, comment and reply data model.
//! - **[`traits`]** -- The [`CommentSource`], [`ReplyGenerator`] and
//!   [`ReplyDispatcher`] seams implemented by the adapter and agent crates.
//! - **[`controller`]** -- [`PollCycleController`], which runs one
//!   fetch → filter → generate → dispatch → record cycle.
//! - **[`scheduler`]** -- [`Scheduler`], which repeats cycles forever with a
//!   fixed interval and rate-limit backoff.
//! - **[`error`]** -- The [`KernelError`] taxonomy.
//!
//! Exactly one cycle runs at a time: [`PollCycleController::run_cycle`] takes
//! `&mut self` and the scheduler owns the controller.

pub mod controller;
pub mod error;
pub mod scheduler;
pub mod traits;
pub mod types;

// Re-export the most commonly used types at the crate root for convenience.
pub use controller::{CycleConfig, CycleOutcome, CycleReport, CycleState, PollCycleController};
pub use error::{KernelError, Result};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use traits::{CommentSource, ReplyDispatcher, ReplyGenerator};
pub use types::{
    AccountHandle, AccountId, Comment, CommentId, MAX_REPLY_CHARS, Post, PostId, Reply,
};
