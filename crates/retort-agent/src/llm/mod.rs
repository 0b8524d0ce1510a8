//! LLM integration layer.
//!
//! - [`types`] -- Provider-agnostic request and response types.
//! - [`client`] -- HTTP client for the Anthropic and OpenAI APIs.

pub mod client;
pub mod types;

pub use client::{LlmClient, LlmClientConfig, LlmProvider};
pub use types::{ChatRequest, LlmResponse, Message, Role, Usage};
