//! Wire adapters, one per model backend family
//!
//! An adapter turns a [`ModelRequest`] into a vendor request body and parses
//! the vendor response back. Everything above this layer is vendor-agnostic.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::backend::{ModelRequest, ModelResponse, StopReason};
use crate::context::{ContentBlock, ConversationTurn, MessageContent, Role};
use crate::error::TurnError;

/// Maximum raw payload kept in a `MalformedResponse`
const RAW_EXCERPT: usize = 2048;

/// Request/response translation for one backend family
pub trait ProviderAdapter: Send + Sync {
    /// Short family name for logs
    fn name(&self) -> &'static str;

    /// Base URL used when none is configured
    fn default_base_url(&self) -> &'static str;

    /// Path appended to the base URL
    fn endpoint_path(&self) -> &'static str;

    /// Authentication and version headers
    fn headers(&self, api_key: &SecretString) -> Vec<(&'static str, String)>;

    /// Vendor request body
    fn build_body(&self, model: &str, request: &ModelRequest) -> Value;

    /// Parse a successful response body
    ///
    /// # Errors
    ///
    /// Returns `MalformedResponse` when the body does not have the expected shape
    fn parse_response(&self, body: &[u8]) -> Result<ModelResponse, TurnError>;
}

fn malformed(reason: impl std::fmt::Display, body: &[u8]) -> TurnError {
    let raw = String::from_utf8_lossy(body);
    let raw: String = raw.chars().take(RAW_EXCERPT).collect();
    TurnError::malformed(reason.to_string(), raw)
}

/// Anthropic Messages API
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicAdapter;

/// Messages API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
}

impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn default_base_url(&self) -> &'static str {
        "https://api.anthropic.com"
    }

    fn endpoint_path(&self) -> &'static str {
        "/v1/messages"
    }

    fn headers(&self, api_key: &SecretString) -> Vec<(&'static str, String)> {
        vec![
            ("x-api-key", api_key.expose_secret().to_string()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ]
    }

    fn build_body(&self, model: &str, request: &ModelRequest) -> Value {
        let sampling = &request.sampling;
        let mut body = json!({
            "model": model,
            "system": request.system,
            "messages": request.messages,
            "max_tokens": sampling.max_tokens,
            "temperature": sampling.temperature,
            "top_p": sampling.top_p,
        });

        if let Some(top_k) = sampling.top_k {
            body["top_k"] = json!(top_k);
        }
        if !sampling.stop_sequences.is_empty() {
            body["stop_sequences"] = json!(sampling.stop_sequences);
        }
        if !request.tools.is_empty() {
            body["tools"] = json!(request.tools);
        }
        body
    }

    fn parse_response(&self, body: &[u8]) -> Result<ModelResponse, TurnError> {
        let response: AnthropicResponse =
            serde_json::from_slice(body).map_err(|e| malformed(e, body))?;

        let stop_reason = response
            .stop_reason
            .as_deref()
            .map_or(StopReason::EndTurn, StopReason::from_wire);

        Ok(ModelResponse {
            content: response.content,
            stop_reason,
        })
    }
}

/// OpenAI-compatible chat completions API
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiAdapter;

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ChatToolCall>,
}

#[derive(Deserialize)]
struct ChatToolCall {
    id: String,
    function: ChatFunction,
}

#[derive(Deserialize)]
struct ChatFunction {
    name: String,
    arguments: String,
}

impl OpenAiAdapter {
    /// Flatten one turn into chat messages
    ///
    /// Tool results become `tool` role messages; tool uses become
    /// `tool_calls` on the assistant message.
    fn chat_messages(turn: &ConversationTurn, out: &mut Vec<Value>) {
        let blocks = match &turn.content {
            MessageContent::Text(text) => {
                out.push(json!({ "role": turn.role.as_str(), "content": text }));
                return;
            }
            MessageContent::Blocks(blocks) => blocks,
        };

        match turn.role {
            Role::User => {
                let mut text = Vec::new();
                for block in blocks {
                    match block {
                        ContentBlock::ToolResult {
                            tool_use_id,
                            content,
                            ..
                        } => out.push(json!({
                            "role": "tool",
                            "tool_call_id": tool_use_id,
                            "content": content,
                        })),
                        ContentBlock::Text { text: t } => text.push(t.as_str()),
                        ContentBlock::ToolUse { .. } => {}
                    }
                }
                if !text.is_empty() {
                    out.push(json!({ "role": "user", "content": text.join(" ") }));
                }
            }
            Role::Assistant => {
                let text = turn.text();
                let tool_calls: Vec<Value> = blocks
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::ToolUse { id, name, input } => Some(json!({
                            "id": id,
                            "type": "function",
                            "function": { "name": name, "arguments": input.to_string() },
                        })),
                        _ => None,
                    })
                    .collect();

                let mut message = Map::new();
                message.insert("role".to_string(), json!("assistant"));
                message.insert(
                    "content".to_string(),
                    if text.is_empty() { Value::Null } else { json!(text) },
                );
                if !tool_calls.is_empty() {
                    message.insert("tool_calls".to_string(), Value::Array(tool_calls));
                }
                out.push(Value::Object(message));
            }
        }
    }
}

impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn default_base_url(&self) -> &'static str {
        "https://api.openai.com"
    }

    fn endpoint_path(&self) -> &'static str {
        "/v1/chat/completions"
    }

    fn headers(&self, api_key: &SecretString) -> Vec<(&'static str, String)> {
        vec![(
            "Authorization",
            format!("Bearer {}", api_key.expose_secret()),
        )]
    }

    fn build_body(&self, model: &str, request: &ModelRequest) -> Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if !request.system.is_empty() {
            messages.push(json!({ "role": "system", "content": request.system }));
        }
        for turn in &request.messages {
            Self::chat_messages(turn, &mut messages);
        }

        let sampling = &request.sampling;
        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": sampling.max_tokens,
            "temperature": sampling.temperature,
            "top_p": sampling.top_p,
        });

        if !sampling.stop_sequences.is_empty() {
            body["stop"] = json!(sampling.stop_sequences);
        }
        if !request.tools.is_empty() {
            let tools: Vec<Value> = request
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool.input_schema,
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(tools);
        }
        body
    }

    fn parse_response(&self, body: &[u8]) -> Result<ModelResponse, TurnError> {
        let completion: ChatCompletion =
            serde_json::from_slice(body).map_err(|e| malformed(e, body))?;

        let Some(choice) = completion.choices.into_iter().next() else {
            return Err(malformed("response has no choices", body));
        };

        let mut content = Vec::new();
        if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
            content.push(ContentBlock::Text { text });
        }
        for call in choice.message.tool_calls {
            let input: Value = if call.function.arguments.trim().is_empty() {
                Value::Object(Map::new())
            } else {
                serde_json::from_str(&call.function.arguments).map_err(|e| {
                    malformed(
                        format!("tool call {} has invalid arguments: {e}", call.function.name),
                        body,
                    )
                })?
            };
            content.push(ContentBlock::ToolUse {
                id: call.id,
                name: call.function.name,
                input,
            });
        }

        let stop_reason = choice
            .finish_reason
            .as_deref()
            .map_or(StopReason::EndTurn, StopReason::from_wire);

        Ok(ModelResponse {
            content,
            stop_reason,
        })
    }
}
