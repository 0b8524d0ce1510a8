//! Text generation for retort.
//!
//! This crate turns a comment into a reply.  It has two layers:
//!
//! ```text
//! ┌──────────────────────┐     ┌─────────────┐     ┌─────────────────────┐
//! │  LlmReplyGenerator   │────>│  LlmClient  │────>│ OpenAI / Anthropic  │
//! │ (prompt + fallback)  │     │ (HTTP, JSON)│     │      HTTP APIs      │
//! └──────────────────────┘     └─────────────┘     └─────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`llm`] -- LLM client and wire types.
//! - [`reply`] -- The [`ReplyGenerator`](retort_kernel::ReplyGenerator)
//!   implementation used by the poll cycle.
//! - [`error`] -- Agent error types.

pub mod error;
pub mod llm;
pub mod reply;

pub use error::{AgentError, Result};
pub use llm::{ChatRequest, LlmClient, LlmClientConfig, LlmProvider, LlmResponse, Message, Role};
pub use reply::{FALLBACK_REPLY, LlmReplyGenerator, REPLY_MAX_TOKENS, REPLY_TEMPERATURE};
