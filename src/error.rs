//! Error types for Summoner voice

use thiserror::Error;

/// Result type alias for Summoner operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice companion
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Transcription stream error
    #[error(transparent)]
    Transcription(#[from] TranscriptionError),

    /// A conversational turn failed
    #[error(transparent)]
    Turn(#[from] TurnError),

    /// Tool lookup or execution failed
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// The orchestrator is no longer running
    #[error("orchestrator stopped")]
    Stopped,

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Why a single user turn could not produce an answer
///
/// Every variant is terminal for the current turn only; the orchestrator
/// speaks a fallback utterance and stays ready for the next turn.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TurnError {
    /// The model backend could not be reached or returned a failure status
    #[error("model backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The model backend answered with a payload that could not be interpreted
    #[error("malformed model response: {reason}")]
    MalformedResponse {
        /// What was wrong with the payload
        reason: String,
        /// Raw payload, kept for diagnosis
        raw: String,
    },

    /// A tool worker died without producing a result
    #[error("tool execution failed: {0}")]
    ToolExecutionFailed(String),

    /// The loop ended without a usable final answer
    #[error("no final answer: {0}")]
    NoFinalAnswer(String),

    /// The user interrupted the turn
    #[error("turn interrupted")]
    Interrupted,
}

impl TurnError {
    /// Build a [`TurnError::MalformedResponse`] from a reason and the raw body
    #[must_use]
    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::MalformedResponse {
            reason: reason.into(),
            raw: raw.into(),
        }
    }
}

/// Tool dispatch failures
///
/// These never abort a turn: the loop turns them into error payloads the model
/// can read and explain to the user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    /// No tool is registered under this name
    #[error("tool not found: {0}")]
    NotFound(String),

    /// The tool rejected its input
    #[error("invalid input for {tool}: {reason}")]
    InvalidInput {
        /// Tool name
        tool: String,
        /// Validation failure
        reason: String,
    },

    /// The tool ran and failed
    #[error("{tool} failed: {reason}")]
    Execution {
        /// Tool name
        tool: String,
        /// Failure description
        reason: String,
    },
}

/// Failure of the live transcription stream
///
/// Recovered by reopening the stream; the pending turn buffer survives.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranscriptionError {
    /// The stream could not be opened
    #[error("failed to open transcription stream: {0}")]
    Connect(String),

    /// The stream broke while running
    #[error("transcription stream failed: {0}")]
    Stream(String),
}
