//! Conversational turn orchestrator
//!
//! Wires the turn detector, the tool-calling loop and the speech queue. Turns
//! run one at a time: the context lock is held from the first model request
//! until the answer has been spoken, so a new turn never starts while the
//! previous one or its speech is still in flight.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agent::{LoopSettings, ModelBackend, ToolLoop};
use crate::config::{Config, TurnConfig};
use crate::context::ConversationContext;
use crate::error::TurnError;
use crate::tools::ToolDispatcher;
use crate::voice::{
    QueueSettings, SinkFactory, SpeakingState, SpeechHandle, SpeechQueue, SpeechSynthesizer,
    TranscriptionBackend, TurnDetector, speaking_state,
};
use crate::Result;

/// Everything the orchestrator needs besides its collaborators
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub tool_loop: LoopSettings,
    pub queue: QueueSettings,
    pub turn: TurnConfig,
    pub context_capacity: usize,
    /// Turns included in the per-turn debug history
    pub history_turns: usize,
    /// Spoken when a turn fails
    pub apology: String,
    /// Spoken on shutdown
    pub farewell: String,
    /// Where the context is loaded from and saved to, if persisted
    pub context_path: Option<PathBuf>,
}

impl OrchestratorSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            tool_loop: LoopSettings::from_config(
                &config.llm,
                config.tools.enabled,
                config.tools.max_concurrency,
            ),
            queue: QueueSettings::from(&config.speech),
            turn: config.turn.clone(),
            context_capacity: config.context.capacity,
            history_turns: config.context.history_turns,
            apology: config.speech.apology.clone(),
            farewell: config.speech.farewell.clone(),
            context_path: config.context.persist.then(|| config.context_path()),
        }
    }
}

/// Drives a voice session
pub struct Orchestrator {
    tool_loop: ToolLoop,
    /// Written only while a turn holds the lock
    context: tokio::sync::Mutex<ConversationContext>,
    queue: SpeechQueue,
    speech: SpeechHandle,
    speaking: SpeakingState,
    session: CancellationToken,
    turn_cancel: Mutex<CancellationToken>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    /// Build an orchestrator and start its speech queue
    ///
    /// Must be called inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns error if the speech queue cannot be started
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        tools: Arc<dyn ToolDispatcher>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        sink: SinkFactory,
        settings: OrchestratorSettings,
    ) -> Result<Self> {
        let (writer, speaking) = speaking_state();
        let queue = SpeechQueue::spawn(synthesizer, sink, settings.queue.clone(), writer)?;
        let speech = queue.handle();

        let context = match &settings.context_path {
            Some(path) => load_context(path, settings.context_capacity).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable context");
                ConversationContext::new(settings.context_capacity)
            }),
            None => ConversationContext::new(settings.context_capacity),
        };
        tracing::debug!(turns = context.len(), "conversation context ready");

        let session = CancellationToken::new();
        let turn_cancel = Mutex::new(session.child_token());

        Ok(Self {
            tool_loop: ToolLoop::new(backend, tools, settings.tool_loop.clone()),
            context: tokio::sync::Mutex::new(context),
            queue,
            speech,
            speaking,
            session,
            turn_cancel,
            settings,
        })
    }

    /// Run one user turn to completion, including its speech
    ///
    /// Text the model says before calling tools is spoken right away; the
    /// final answer is spoken when the loop ends. Every failure except an
    /// interrupt is followed by the apology line.
    ///
    /// # Errors
    ///
    /// Returns the [`TurnError`] that ended the turn
    pub async fn submit_turn(&self, text: &str) -> std::result::Result<String, TurnError> {
        let mut context = self.context.lock().await;
        let cancel = self.current_turn_token();

        tracing::debug!(
            history = %context.recent_history(self.settings.history_turns),
            "starting turn"
        );

        let filler = |text: &str| self.say(text);
        let outcome = self
            .tool_loop
            .run_turn(&mut context, text, &filler, &cancel)
            .await;

        match &outcome {
            Ok(answer) => self.say(answer),
            Err(TurnError::Interrupted) => {}
            Err(e) => {
                tracing::warn!(error = %e, "turn failed, apologizing");
                self.say(&self.settings.apology);
            }
        }

        tokio::select! {
            () = self.speech.wait_until_done() => {}
            () = cancel.cancelled() => tracing::debug!("speech interrupted"),
        }

        if outcome.is_ok() {
            self.persist(&context);
        }
        outcome
    }

    /// True while the speech queue is playing a segment
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.speaking.is_speaking()
    }

    /// Barge-in: stop speech, drop queued speech and abandon the current turn
    ///
    /// The abandoned turn never reaches the context; the orchestrator is
    /// ready for the next turn right away.
    pub fn interrupt(&self) {
        let mut token = self.lock_turn_token();
        token.cancel();
        *token = self.session.child_token();
        drop(token);

        self.speech.cancel();
        tracing::info!("interrupted");
    }

    /// Listen on a transcription backend and answer each detected turn
    ///
    /// Returns when [`Orchestrator::stop`] is called.
    pub async fn run_session(&self, transcription: Arc<dyn TranscriptionBackend>) {
        let (turn_tx, mut turn_rx) = mpsc::channel(4);
        let detector = TurnDetector::new(&self.settings.turn, self.speaking.clone());
        let detector_task = tokio::spawn(detector.run(transcription, turn_tx, self.session.clone()));

        tracing::info!("listening");
        loop {
            let turn = tokio::select! {
                () = self.session.cancelled() => break,
                turn = turn_rx.recv() => match turn {
                    Some(turn) => turn,
                    None => break,
                },
            };

            match self.submit_turn(&turn).await {
                Ok(answer) => tracing::info!(answer = %answer, "turn answered"),
                Err(e) => tracing::info!(error = %e, "turn ended without answer"),
            }
        }

        let _ = detector_task.await;
        tracing::info!("session ended");
    }

    /// End the session loop and cancel the turn in flight
    pub fn stop(&self) {
        self.session.cancel();
        self.speech.cancel();
    }

    /// Speak the farewell, save the context and close the speech queue
    pub async fn shutdown(self) {
        if !self.settings.farewell.is_empty() {
            self.say(&self.settings.farewell);
        }

        let context = self.context.into_inner();
        if let Some(path) = &self.settings.context_path {
            if let Err(e) = save_context(path, &context) {
                tracing::warn!(path = %path.display(), error = %e, "failed to save context");
            }
        }

        self.queue.close().await;
        tracing::info!("orchestrator shut down");
    }

    /// Snapshot of the conversation context
    ///
    /// Waits for a turn in flight to finish.
    pub async fn context(&self) -> ConversationContext {
        self.context.lock().await.clone()
    }

    /// Producer handle of the speech queue
    #[must_use]
    pub fn speech(&self) -> SpeechHandle {
        self.speech.clone()
    }

    fn say(&self, text: &str) {
        if text.trim().is_empty() {
            return;
        }
        if let Err(e) = self.speech.speak(text) {
            tracing::warn!(error = %e, "speech queue unavailable");
        }
    }

    fn persist(&self, context: &ConversationContext) {
        if let Some(path) = &self.settings.context_path
            && let Err(e) = save_context(path, context)
        {
            tracing::warn!(path = %path.display(), error = %e, "failed to save context");
        }
    }

    fn current_turn_token(&self) -> CancellationToken {
        self.lock_turn_token().clone()
    }

    fn lock_turn_token(&self) -> MutexGuard<'_, CancellationToken> {
        self.turn_cancel
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Load a persisted context; a missing file gives an empty context
///
/// # Errors
///
/// Returns error if the file exists but cannot be read or parsed
pub fn load_context(path: &Path, capacity: usize) -> Result<ConversationContext> {
    match std::fs::read_to_string(path) {
        Ok(json) => ConversationContext::from_json(&json, capacity),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConversationContext::new(capacity)),
        Err(e) => Err(e.into()),
    }
}

/// Write a context to disk
///
/// # Errors
///
/// Returns error if the file cannot be written
pub fn save_context(path: &Path, context: &ConversationContext) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, context.to_json()?)?;
    tracing::debug!(path = %path.display(), turns = context.len(), "context saved");
    Ok(())
}
