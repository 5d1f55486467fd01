//! Transcript stream types and the transcription backend seam

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TranscriptionError;

/// One piece of recognized speech
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFragment {
    pub text: String,
    /// False for interim hypotheses that may still change
    pub is_final: bool,
}

impl TranscriptFragment {
    #[must_use]
    pub fn interim(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: false,
        }
    }

    #[must_use]
    pub fn final_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_final: true,
        }
    }
}

/// One event on a live transcription stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    /// A recognized fragment
    Fragment(TranscriptFragment),
    /// The backend answered without results (silence)
    NoResult,
    /// The stream broke; it will be reopened
    Failed(TranscriptionError),
}

/// Source of live transcript streams
///
/// A stream is not restartable: when it ends or fails the consumer opens a
/// new one.
#[async_trait]
pub trait TranscriptionBackend: Send + Sync {
    /// Open a stream; events arrive in order until the sender is dropped
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be opened
    async fn open(&self) -> Result<mpsc::Receiver<TranscriptEvent>, TranscriptionError>;
}
