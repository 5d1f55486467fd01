//! Conversation context for model requests
//!
//! Holds the role-tagged history of a session and keeps it structurally valid
//! for tool-augmented exchanges.

mod conversation;
mod message;

pub use conversation::{ConversationContext, DEFAULT_CAPACITY};
pub use message::{ContentBlock, ConversationTurn, MessageContent, Role};
