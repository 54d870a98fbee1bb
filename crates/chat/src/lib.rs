#![deny(unsafe_code)]

/// Terminal front-end for a conversation.
///
/// Reads prompts from stdin and redraws the conversation log as it changes.
pub mod app;
/// Conversation controller: message log, reveal animation and proof polling.
pub mod chat;
/// Settings persistence.
pub mod settings;
