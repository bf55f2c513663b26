//! Errors surfaced by the drivers.

use ironloop_core::ChatError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("couldn't write to {chat}: {source}")]
    Write { chat: String, source: ChatError },

    #[error("couldn't read from {chat}: {source}")]
    Read { chat: String, source: ChatError },

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("bulk input {path}: {reason}")]
    BulkInput { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AgentError {
    /// Whether the underlying chat failure was a cancellation or an exit
    /// request rather than a real fault.
    pub fn is_shutdown(&self) -> bool {
        match self {
            AgentError::Write { source, .. }
            | AgentError::Read { source, .. }
            | AgentError::Chat(source) => source.is_terminal(),
            _ => false,
        }
    }
}
