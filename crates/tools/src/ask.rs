//! Ask command — forward a question to a secondary chat.

use async_trait::async_trait;
use ironloop_core::{ChatStream, Command, CommandError, CommandValue, text_arg};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// One write/read round trip on a secondary `ChatStream`.
pub struct AskCommand {
    chat: Arc<dyn ChatStream>,
}

impl AskCommand {
    pub fn new(chat: Arc<dyn ChatStream>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl Command for AskCommand {
    fn name(&self) -> &str {
        "ask"
    }

    fn description(&self) -> &str {
        "Ask an AI model with internet access"
    }

    fn usage(&self) -> String {
        r#"{"ask": "question"}"#.into()
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        args: &[CommandValue],
    ) -> Result<Option<Value>, CommandError> {
        let question = text_arg(self.name(), args, 0, "ask message")?;
        debug!(backend = self.chat.name(), "Forwarding question");

        let failed = |what: &str, e: ironloop_core::ChatError| CommandError::ExecutionFailed {
            command: "ask".into(),
            reason: format!("couldn't {what} {}: {e}", self.chat.name()),
        };

        let answer = tokio::select! {
            _ = cancel.cancelled() => return Err(CommandError::Cancelled),
            r = async {
                self.chat.write(&question).await.map_err(|e| failed("write message to", e))?;
                self.chat.read().await.map_err(|e| failed("read message from", e))
            } => r?,
        };
        Ok(Some(Value::String(answer)))
    }
}
