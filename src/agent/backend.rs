//! Backend-agnostic model request and response types

use async_trait::async_trait;
use serde_json::Value;

use crate::config::LlmConfig;
use crate::context::{ContentBlock, ConversationTurn};
use crate::error::TurnError;
use crate::tools::ToolDefinition;

/// Why the model stopped generating
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Natural end of the answer
    EndTurn,
    /// The model needs tool results before it can answer
    ToolUse,
    /// Token budget exhausted
    MaxTokens,
    /// A stop sequence was produced
    StopSequence,
    /// Anything the adapter does not recognize
    Other(String),
}

impl StopReason {
    /// Map a Messages-style stop reason
    #[must_use]
    pub fn from_wire(reason: &str) -> Self {
        match reason {
            "end_turn" | "stop" => Self::EndTurn,
            "tool_use" | "tool_calls" => Self::ToolUse,
            "max_tokens" | "length" => Self::MaxTokens,
            "stop_sequence" => Self::StopSequence,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Sampling parameters sent with every request
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Ignored by backends without top-k sampling
    pub top_k: Option<u32>,
    pub stop_sequences: Vec<String>,
}

impl From<&LlmConfig> for SamplingParams {
    fn from(config: &LlmConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
            top_k: Some(config.top_k),
            stop_sequences: config.stop_sequences.clone(),
        }
    }
}

/// One request to the model
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    /// Ordered history, oldest first, ending with the newest user entry
    pub messages: Vec<ConversationTurn>,
    /// Empty when tool use is disabled
    pub tools: Vec<ToolDefinition>,
    pub sampling: SamplingParams,
}

/// A tool invocation extracted from a model response
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// The model's reply to one request
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
}

impl ModelResponse {
    /// A text-only response
    #[must_use]
    pub fn text_only(text: impl Into<String>, stop_reason: StopReason) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            stop_reason,
        }
    }

    /// Text blocks joined with spaces, empty blocks skipped
    #[must_use]
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } if !text.trim().is_empty() => Some(text.trim()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Every tool invocation in the response, in order
    #[must_use]
    pub fn tool_invocations(&self) -> Vec<ToolInvocation> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ToolInvocation {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                }),
                _ => None,
            })
            .collect()
    }
}

/// A language-model backend
///
/// One call is one blocking round trip. Implementations never retry: a
/// failure aborts the current turn.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Send a request and wait for the full response
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` when the backend cannot be reached or
    /// answers with a failure status, `MalformedResponse` when the payload
    /// cannot be interpreted
    async fn invoke(&self, request: &ModelRequest) -> Result<ModelResponse, TurnError>;
}
