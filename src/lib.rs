//! Summoner Voice - spoken game companion with tool-augmented answers
//!
//! This library provides the conversational turn orchestrator:
//! - Turn detection over a live transcript stream
//! - Bounded, self-repairing conversation context
//! - Tool-calling loop against a chat model with champion lookup tools
//! - Serialized, interruptible speech playback
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Microphone                        │
//! │   Capture  │  Energy gate  │  Whisper transcription  │
//! └────────────────────┬────────────────────────────────┘
//!                      │ fragments
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Orchestrator                        │
//! │   Turn detector  │  Context  │  Tool-calling loop    │
//! └──────────┬─────────────────────────────┬────────────┘
//!            │ answers, filler             │ tool calls
//! ┌──────────▼──────────┐       ┌──────────▼────────────┐
//! │    Speech queue     │       │   Lookup tools        │
//! │   TTS  │  Speaker   │       │   SQLite database     │
//! └─────────────────────┘       └───────────────────────┘
//! ```

pub mod agent;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod orchestrator;
pub mod tools;
pub mod voice;

pub use agent::{ModelBackend, ModelRequest, ModelResponse, StopReason, ToolLoop};
pub use config::Config;
pub use context::{ContentBlock, ConversationContext, ConversationTurn, Role};
pub use db::{DbConn, DbPool, LookupStore};
pub use error::{Error, Result, ToolError, TranscriptionError, TurnError};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use tools::{LookupTool, ToolDefinition, ToolDispatcher, ToolRegistry};
pub use voice::{
    SpeechHandle, SpeechQueue, SpeechSegment, SpeechSynthesizer, TranscriptionBackend,
    TurnDetector,
};
