//! The autonomous reasoning loop.

use ironloop_core::ChatStream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dispatcher::CommandDispatcher;
use crate::error::AgentError;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured step bound was reached.
    StepLimit,
    /// The caller's token was cancelled.
    Cancelled,
    /// A command fired the exit signal.
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOutcome {
    /// Prompts written to the chat.
    pub steps: usize,
    pub reason: StopReason,
}

/// Write prompt, read reply, dispatch the commands in it, and feed the
/// pretty-printed results back as the next prompt.
pub struct AgentLoop {
    chat: Arc<dyn ChatStream>,
    dispatcher: CommandDispatcher,
    exit: CancellationToken,
    max_steps: usize,
}

impl AgentLoop {
    /// `exit` is the token the `exit` command fires.
    pub fn new(
        chat: Arc<dyn ChatStream>,
        dispatcher: CommandDispatcher,
        exit: CancellationToken,
    ) -> Self {
        Self {
            chat,
            dispatcher,
            exit,
            max_steps: 0,
        }
    }

    /// Bound the number of prompts written. `0` means unbounded.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    fn stop_reason(&self, cancel: &CancellationToken, steps: usize) -> Option<StopReason> {
        if cancel.is_cancelled() {
            Some(StopReason::Cancelled)
        } else if self.exit.is_cancelled() {
            Some(StopReason::Exit)
        } else if self.max_steps > 0 && steps >= self.max_steps {
            Some(StopReason::StepLimit)
        } else {
            None
        }
    }

    /// Run until the step bound, cancellation, or the exit signal.
    ///
    /// Chat failures end the loop with an error unless they were caused by
    /// the cancellation itself.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        prompt: impl Into<String>,
    ) -> Result<LoopOutcome, AgentError> {
        let mut send = prompt.into();
        let mut steps = 0;
        info!(chat = self.chat.name(), max_steps = self.max_steps, "Starting auto mode");

        loop {
            if let Some(reason) = self.stop_reason(cancel, steps) {
                info!(steps, ?reason, "Auto mode finished");
                return Ok(LoopOutcome { steps, reason });
            }
            steps += 1;
            debug!(step = steps, chars = send.len(), "Writing prompt");

            let reply = tokio::select! {
                _ = cancel.cancelled() => {
                    return Ok(LoopOutcome { steps, reason: StopReason::Cancelled });
                }
                r = self.exchange(&send) => r,
            };
            let reply = match reply {
                Ok(reply) => reply,
                Err(e) if cancel.is_cancelled() && e.is_shutdown() => {
                    return Ok(LoopOutcome {
                        steps,
                        reason: StopReason::Cancelled,
                    });
                }
                Err(e) => return Err(e),
            };

            let results = self.dispatcher.run(cancel, &reply).await;
            send = match serde_json::to_string_pretty(&results) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "Couldn't encode command results");
                    e.to_string()
                }
            };
        }
    }

    async fn exchange(&self, prompt: &str) -> Result<String, AgentError> {
        self.chat
            .write(prompt)
            .await
            .map_err(|source| AgentError::Write {
                chat: self.chat.name().to_string(),
                source,
            })?;
        self.chat.read().await.map_err(|source| AgentError::Read {
            chat: self.chat.name().to_string(),
            source,
        })
    }
}
