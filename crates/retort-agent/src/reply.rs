//! Reply generator backed by an [`LlmClient`].
//!
//! Generation never fails from the caller's point of view: any provider
//! error, or an empty completion, yields [`FALLBACK_REPLY`].

use async_trait::async_trait;
use retort_kernel::ReplyGenerator;
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::llm::{ChatRequest, LlmClient};

/// Output budget for one reply.
pub const REPLY_MAX_TOKENS: u32 = 50;

/// Sampling temperature for replies.
pub const REPLY_TEMPERATURE: f32 = 0.8;

/// Returned whenever the provider cannot produce a reply.
pub const FALLBACK_REPLY: &str = "Oops! My sarcasm circuits are overloaded! 😂";

/// The prompt sent for `comment_text`.
pub fn build_prompt(comment_text: &str) -> String {
    format!("Reply with a funny and sarcastic comment to: '{comment_text}'")
}

/// The full completion request for `comment_text`.
pub fn reply_request(comment_text: &str) -> ChatRequest {
    ChatRequest {
        temperature: Some(REPLY_TEMPERATURE),
        max_tokens: Some(REPLY_MAX_TOKENS),
        ..ChatRequest::single_turn(build_prompt(comment_text))
    }
}

/// Trim the completion and drop one pair of wrapping quotes.
fn clean_completion(text: &str) -> Option<String> {
    let mut text = text.trim();
    for (open, close) in [('"', '"'), ('\'', '\''), ('“', '”')] {
        if let Some(inner) = text
            .strip_prefix(open)
            .and_then(|rest| rest.strip_suffix(close))
        {
            text = inner.trim();
            break;
        }
    }
    (!text.is_empty()).then(|| text.to_owned())
}

/// [`ReplyGenerator`] that asks an LLM for a sarcastic one-liner.
#[derive(Debug, Clone)]
pub struct LlmReplyGenerator {
    client: LlmClient,
}

impl LlmReplyGenerator {
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    /// Ask the provider for a reply, surfacing every failure.
    pub async fn try_generate(&self, comment_text: &str) -> Result<String> {
        let response = self.client.chat(&reply_request(comment_text)).await?;
        debug!(
            provider = %self.client.provider(),
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            stop_reason = ?response.stop_reason,
            "completion received"
        );
        clean_completion(&response.text).ok_or(AgentError::EmptyCompletion)
    }
}

#[async_trait]
impl ReplyGenerator for LlmReplyGenerator {
    async fn generate(&self, comment_text: &str) -> String {
        match self.try_generate(comment_text).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "reply generation failed, using fallback");
                FALLBACK_REPLY.to_owned()
            }
        }
    }
}
