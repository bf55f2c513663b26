//! Memory trait — the context window a backend replays on every request.
//!
//! Backends that are stateless on the server side (hosted completion APIs)
//! must resend the conversation on each call. A `ConversationMemory` owns the
//! full history and decides which view of it fits the model's token budget.

use crate::error::MemoryError;
use crate::message::Message;

/// Tokens reserved for the model's answer when fitting a request.
pub const RESPONSE_RESERVE_TOKENS: usize = 1000;

/// Fixed per-message overhead approximating role and framing tokens.
pub const MESSAGE_OVERHEAD_TOKENS: usize = 8;

/// The core ConversationMemory trait.
///
/// Implementations: fixed sliding window (`ironloop-memory`).
pub trait ConversationMemory: Send + Sync {
    /// Append a message to the history.
    fn add(&mut self, message: Message) -> Result<(), MemoryError>;

    /// The ordered view of the history to send with the next request.
    fn sum(&self) -> Result<Vec<Message>, MemoryError>;

    /// Number of messages recorded so far.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
