//! ChatStream trait — the duplex contract every chat backend implements.
//!
//! `write` sends one prompt and performs the whole backend round trip before
//! returning; the reply is staged and handed out by the next `read`. Keeping
//! the two directions separate lets decorators (transcript logging, exit
//! detection) wrap either side independently.

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::ChatError;

/// The core ChatStream trait.
///
/// Implementations: hosted completion API, real-time socket backend,
/// unavailable placeholder, plus decorators over any of them.
#[async_trait]
pub trait ChatStream: Send + Sync {
    /// A human-readable backend name (e.g., "openai", "realtime").
    fn name(&self) -> &str;

    /// Send one prompt and complete the round trip. Returns the number of
    /// bytes accepted.
    async fn write(&self, prompt: &str) -> Result<usize, ChatError>;

    /// Take the next staged reply, waiting for one if necessary.
    async fn read(&self) -> Result<String, ChatError>;

    /// Cancel the chat and release its transport.
    async fn close(&self) -> Result<(), ChatError> {
        Ok(())
    }
}

/// Fail fast once the owning token has been cancelled.
pub fn ensure_open(cancel: &CancellationToken) -> Result<(), ChatError> {
    if cancel.is_cancelled() {
        Err(ChatError::Cancelled)
    } else {
        Ok(())
    }
}

/// Single-reader queue that a backend's `write` stages replies into.
///
/// Replies are pushed synchronously by the writer, so nothing is left running
/// in the background when a chat is dropped or cancelled.
pub struct ReplyQueue {
    tx: mpsc::UnboundedSender<String>,
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
    cancel: CancellationToken,
}

impl ReplyQueue {
    pub fn new(cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            cancel,
        }
    }

    /// Stage a completed reply for the reader.
    pub fn push(&self, reply: String) -> Result<(), ChatError> {
        self.tx.send(reply).map_err(|_| ChatError::Closed)
    }

    /// Wait for the next staged reply.
    pub async fn next(&self) -> Result<String, ChatError> {
        ensure_open(&self.cancel)?;
        let mut rx = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ChatError::Cancelled),
            guard = self.rx.lock() => guard,
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ChatError::Cancelled),
            reply = rx.recv() => reply.ok_or(ChatError::Closed),
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
