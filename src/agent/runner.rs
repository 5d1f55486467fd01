//! Tool-calling loop for one user turn
//!
//! Each round sends the system prompt, the stored context and this turn's
//! entries so far to the model. A `tool_use` stop reason fans the requested
//! tools out concurrently, records the invocations and their results as one
//! assistant entry and one user entry, and goes around again. Any other stop
//! reason ends the turn. The turn's entries reach the context only once the
//! answer is in, so context eviction never drops the question mid-turn.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::sync::Semaphore;
use tokio::task::AbortHandle;
use tokio_util::sync::CancellationToken;

use super::backend::{ModelBackend, ModelRequest, SamplingParams, StopReason, ToolInvocation};
use crate::config::LlmConfig;
use crate::context::{ContentBlock, ConversationContext, ConversationTurn, Role};
use crate::error::{ToolError, TurnError};
use crate::tools::{LoopDetector, LoopVerdict, ToolDispatcher};

/// Receives text the model says alongside a tool request
pub type FillerSink<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// Tool-calling loop settings
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub system_prompt: String,
    pub sampling: SamplingParams,
    /// Advertise tools to the model
    pub tools_enabled: bool,
    /// Tool rounds allowed per turn
    pub max_rounds: usize,
    /// Identical invocations allowed before the turn is stopped
    pub repeat_limit: usize,
    /// Tool calls running at once
    pub max_concurrency: usize,
}

impl LoopSettings {
    /// Settings from the model section of the config
    #[must_use]
    pub fn from_config(llm: &LlmConfig, tools_enabled: bool, max_concurrency: usize) -> Self {
        Self {
            system_prompt: llm.system_prompt.clone(),
            sampling: SamplingParams::from(llm),
            tools_enabled,
            max_rounds: llm.max_tool_rounds,
            repeat_limit: llm.repeat_limit,
            max_concurrency,
        }
    }
}

/// Drives one user turn to a final answer
pub struct ToolLoop {
    backend: Arc<dyn ModelBackend>,
    tools: Arc<dyn ToolDispatcher>,
    settings: LoopSettings,
    permits: Arc<Semaphore>,
}

/// Aborts spawned tool workers when the round is abandoned
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

impl ToolLoop {
    #[must_use]
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        tools: Arc<dyn ToolDispatcher>,
        settings: LoopSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrency.max(1)));
        Self {
            backend,
            tools,
            settings,
            permits,
        }
    }

    /// Run one turn and return the final answer text
    ///
    /// On success the user entry, any tool exchanges and the answer are
    /// committed to the context together. On failure or cancellation the
    /// context is left untouched.
    ///
    /// # Errors
    ///
    /// Returns the [`TurnError`] that ended the turn
    pub async fn run_turn(
        &self,
        context: &mut ConversationContext,
        user_text: &str,
        filler: FillerSink<'_>,
        cancel: &CancellationToken,
    ) -> Result<String, TurnError> {
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(TurnError::Interrupted),
            outcome = self.drive(context, user_text, filler) => outcome,
        };

        match outcome {
            Ok((answer, exchange)) => {
                tracing::debug!(entries = exchange.len(), "committing turn");
                context.commit(exchange);
                Ok(answer)
            }
            Err(e) => {
                match &e {
                    TurnError::MalformedResponse { reason, raw } => {
                        tracing::error!(reason = %reason, raw = %raw, "malformed model response");
                    }
                    TurnError::Interrupted => tracing::info!("turn interrupted, context unchanged"),
                    other => tracing::warn!(error = %other, "turn failed, context unchanged"),
                }
                Err(e)
            }
        }
    }

    /// Run rounds until an answer; returns it with every entry of the turn
    async fn drive(
        &self,
        context: &ConversationContext,
        user_text: &str,
        filler: FillerSink<'_>,
    ) -> Result<(String, Vec<ConversationTurn>), TurnError> {
        let mut exchange = vec![ConversationTurn::user(user_text)];
        let mut guard = LoopDetector::new(self.settings.max_rounds, self.settings.repeat_limit);

        loop {
            let request = self.request(context, &exchange);
            let response = self.backend.invoke(&request).await?;

            if response.stop_reason != StopReason::ToolUse {
                let answer = response.text();
                if answer.is_empty() {
                    return Err(TurnError::NoFinalAnswer(format!(
                        "empty answer with stop reason {:?}",
                        response.stop_reason
                    )));
                }
                exchange.push(ConversationTurn::assistant(answer.clone()));
                return Ok((answer, exchange));
            }

            let invocations = response.tool_invocations();
            if invocations.is_empty() {
                tracing::error!("tool_use stop reason without any tool invocation");
                return Err(TurnError::NoFinalAnswer(
                    "tool_use stop reason without any tool invocation".to_string(),
                ));
            }

            match guard.record_round(invocations.iter().map(|i| (i.name.as_str(), &i.input))) {
                LoopVerdict::Continue => {}
                LoopVerdict::RoundLimit(rounds) => {
                    return Err(TurnError::NoFinalAnswer(format!(
                        "still requesting tools after {} rounds",
                        rounds - 1
                    )));
                }
                LoopVerdict::Repeating { tool, count } => {
                    return Err(TurnError::NoFinalAnswer(format!(
                        "{tool} requested with the same input {count} times"
                    )));
                }
            }

            let filler_text = response.text();
            if !filler_text.is_empty() {
                filler(&filler_text);
            }

            tracing::debug!(
                round = guard.rounds(),
                tools = ?invocations.iter().map(|i| i.name.as_str()).collect::<Vec<_>>(),
                "running tool round"
            );

            exchange.push(ConversationTurn::blocks(Role::Assistant, response.content));
            let results = self.dispatch_round(&invocations).await?;
            exchange.push(ConversationTurn::blocks(Role::User, results));
        }
    }

    fn request(&self, context: &ConversationContext, exchange: &[ConversationTurn]) -> ModelRequest {
        ModelRequest {
            system: self.settings.system_prompt.clone(),
            messages: context.turns().chain(exchange).cloned().collect(),
            tools: if self.settings.tools_enabled {
                self.tools.definitions()
            } else {
                Vec::new()
            },
            sampling: self.settings.sampling.clone(),
        }
    }

    /// Run every invocation of a round concurrently and wait for all of them
    ///
    /// Results come back in invocation order. A tool error becomes an error
    /// payload; only a worker that dies without a result fails the turn.
    async fn dispatch_round(
        &self,
        invocations: &[ToolInvocation],
    ) -> Result<Vec<ContentBlock>, TurnError> {
        let handles: Vec<_> = invocations
            .iter()
            .map(|invocation| {
                let tools = Arc::clone(&self.tools);
                let permits = Arc::clone(&self.permits);
                let name = invocation.name.clone();
                let input = invocation.input.clone();
                tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await;
                    tools.dispatch(&name, &input).await
                })
            })
            .collect();

        let _abort = AbortOnDrop(handles.iter().map(tokio::task::JoinHandle::abort_handle).collect());
        let joined = futures::future::join_all(handles).await;

        invocations
            .iter()
            .zip(joined)
            .map(|(invocation, joined)| match joined {
                Ok(result) => Ok(result_block(invocation, result)),
                Err(e) => {
                    tracing::error!(tool = %invocation.name, error = %e, "tool worker died");
                    Err(TurnError::ToolExecutionFailed(invocation.name.clone()))
                }
            })
            .collect()
    }
}

fn result_block(invocation: &ToolInvocation, result: Result<Value, ToolError>) -> ContentBlock {
    match result {
        Ok(value) => ContentBlock::ToolResult {
            tool_use_id: invocation.id.clone(),
            content: value.to_string(),
            is_error: false,
        },
        Err(e) => {
            tracing::warn!(tool = %invocation.name, error = %e, "tool failed");
            ContentBlock::ToolResult {
                tool_use_id: invocation.id.clone(),
                content: json!({ "error": e.to_string() }).to_string(),
                is_error: true,
            }
        }
    }
}
