//! Error types for the ironloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all ironloop operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Chat backend errors ---
    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    // --- Memory errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Command errors ---
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    // --- Parse errors ---
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of a duplex chat backend.
#[derive(Debug, Clone, Error)]
pub enum ChatError {
    #[error("operation cancelled")]
    Cancelled,

    #[error("chat is closed")]
    Closed,

    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by backend, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("message too long: {length} characters, max {max}")]
    MessageTooLong { length: usize, max: usize },

    #[error("exit condition detected")]
    ExitRequested,

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Session error: {0}")]
    Session(String),
}

impl ChatError {
    /// Whether this error ends the conversation rather than a single exchange.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChatError::Cancelled | ChatError::Closed | ChatError::ExitRequested
        )
    }
}

#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("prompt too long ({tokens} tokens)")]
    PromptTooLong { tokens: usize },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<MemoryError> for ChatError {
    fn from(err: MemoryError) -> Self {
        ChatError::Memory(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("missing {command} argument: {what}")]
    MissingArgument { command: String, what: String },

    #[error("empty {command} argument: {what}")]
    EmptyArgument { command: String, what: String },

    #[error("{command} failed: {reason}")]
    ExecutionFailed { command: String, reason: String },

    #[error("{0} is not available")]
    NotAvailable(String),

    #[error("operation cancelled")]
    Cancelled,
}

/// Failure to extract any command from model output.
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("no json array found: {0}")]
    NoArray(String),

    #[error("couldn't unmarshal json array ({fragment}): {reason}")]
    InvalidArray { fragment: String, reason: String },
}
