//! Pair mode: two chats talking to each other.
//!
//! The leader gets the opening prompt; from then on every reply of one chat
//! is written to the other. Wrap the leader in an `ExitDetector` so the run
//! ends when it prints its exit phrase.

use ironloop_core::{ChatError, ChatStream};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::AgentError;
use crate::loop_runner::{LoopOutcome, StopReason};

pub struct PairRelay {
    leader: Arc<dyn ChatStream>,
    follower: Arc<dyn ChatStream>,
    max_turns: usize,
}

impl PairRelay {
    pub fn new(leader: Arc<dyn ChatStream>, follower: Arc<dyn ChatStream>) -> Self {
        Self {
            leader,
            follower,
            max_turns: 0,
        }
    }

    /// Bound the number of messages relayed to the follower. `0` means
    /// unbounded.
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Relay until the leader asks to exit, the turn bound is reached, or
    /// `cancel` fires. `steps` in the outcome counts completed turns.
    pub async fn run(
        &self,
        cancel: &CancellationToken,
        prompt: &str,
    ) -> Result<LoopOutcome, AgentError> {
        info!(leader = self.leader.name(), follower = self.follower.name(), "Starting pair mode");
        let mut turns = 0;
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(ChatError::Cancelled),
            r = self.relay(prompt, &mut turns) => r,
        };

        let reason = match result {
            Ok(()) => StopReason::StepLimit,
            Err(ChatError::ExitRequested) => StopReason::Exit,
            Err(e) if cancel.is_cancelled() && e.is_terminal() => StopReason::Cancelled,
            Err(e) => return Err(AgentError::Chat(e)),
        };
        info!(turns, ?reason, "Pair mode finished");
        Ok(LoopOutcome {
            steps: turns,
            reason,
        })
    }

    async fn relay(&self, prompt: &str, turns: &mut usize) -> Result<(), ChatError> {
        self.leader.write(prompt).await?;
        loop {
            let advice_request = self.leader.read().await?;
            if self.max_turns > 0 && *turns >= self.max_turns {
                return Ok(());
            }
            debug!(turn = *turns + 1, "Relaying leader to follower");
            self.follower.write(&advice_request).await?;
            let advice = self.follower.read().await?;
            self.leader.write(&advice).await?;
            *turns += 1;
        }
    }
}
