//! Shared test helpers for the drivers.

use async_trait::async_trait;
use ironloop_core::{ChatError, ChatStream, ReplyQueue};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// A chat that answers each write with the next scripted reply.
///
/// Writes after the script runs out fail with `ChatError::Closed`.
pub struct ScriptedChat {
    name: String,
    script: Mutex<VecDeque<String>>,
    written: Mutex<Vec<String>>,
    replies: ReplyQueue,
}

impl ScriptedChat {
    pub fn new(name: &str, script: &[&str]) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(script.iter().map(|s| s.to_string()).collect()),
            written: Mutex::new(Vec::new()),
            replies: ReplyQueue::new(CancellationToken::new()),
        }
    }

    /// Every prompt written so far.
    pub fn written(&self) -> Vec<String> {
        self.written.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatStream for ScriptedChat {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, prompt: &str) -> Result<usize, ChatError> {
        self.written.lock().unwrap().push(prompt.to_string());
        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(ChatError::Closed)?;
        self.replies.push(reply)?;
        Ok(prompt.len())
    }

    async fn read(&self) -> Result<String, ChatError> {
        self.replies.next().await
    }
}
