//! Fixed sliding-window memory.
//!
//! The first `keep_first` messages (typically the system prompt and goal) are
//! pinned; the rest form a window that slides forward, dropping the oldest
//! messages until the replayed view plus the response reserve fits
//! `max_tokens`.

use ironloop_core::{ConversationMemory, Message, MemoryError, RESPONSE_RESERVE_TOKENS};
use tracing::debug;

use crate::tokens::estimate_tokens;

/// A sliding window over an append-only message history.
#[derive(Debug, Clone)]
pub struct FixedWindowMemory {
    keep_first: usize,
    max_tokens: usize,
    messages: Vec<Message>,
}

impl FixedWindowMemory {
    /// `max_tokens == 0` disables pruning.
    pub fn new(keep_first: usize, max_tokens: usize) -> Self {
        Self {
            keep_first,
            max_tokens,
            messages: Vec::new(),
        }
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// The full, unpruned history.
    pub fn history(&self) -> &[Message] {
        &self.messages
    }
}

impl ConversationMemory for FixedWindowMemory {
    fn add(&mut self, message: Message) -> Result<(), MemoryError> {
        self.messages.push(message);
        Ok(())
    }

    fn sum(&self) -> Result<Vec<Message>, MemoryError> {
        if self.max_tokens == 0 {
            return Ok(self.messages.clone());
        }

        // Pinning starts once the history outgrows the prefix; until then
        // every message is prunable.
        let keep = if self.messages.len() > self.keep_first {
            self.keep_first
        } else {
            0
        };
        let (first, mut rest) = self.messages.split_at(keep);

        let fits = |first: &[Message], rest: &[Message]| -> (bool, usize) {
            let view: Vec<Message> = first.iter().chain(rest).cloned().collect();
            let tokens = estimate_tokens(&view);
            (tokens + RESPONSE_RESERVE_TOKENS <= self.max_tokens, tokens)
        };

        let (mut ok, mut tokens) = fits(first, rest);
        while !ok && rest.len() > 1 {
            rest = &rest[1..];
            (ok, tokens) = fits(first, rest);
        }
        if !ok {
            return Err(MemoryError::PromptTooLong { tokens });
        }

        debug!(
            kept = keep,
            window = rest.len(),
            dropped = self.messages.len() - keep - rest.len(),
            tokens,
            "Memory window computed"
        );
        Ok(first.iter().chain(rest).cloned().collect())
    }

    fn len(&self) -> usize {
        self.messages.len()
    }
}
