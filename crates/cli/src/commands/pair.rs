//! `ironloop pair` — Two chats collaborating on a goal.

use ironloop_agent::{PAIR_EXIT_TRIGGER, PairRelay, StopReason, pair_prompt};
use ironloop_config::AppConfig;
use ironloop_core::{ChatStream, Role};
use ironloop_providers::{ChatFactory, ExitDetector, TranscriptLogger};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::require_goal;

pub async fn run(
    config: &AppConfig,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    require_goal(config)?;

    let factory = ChatFactory::from_config(config)?;
    let leader = factory.open(cancel, Role::User, 1).await?;
    let follower = factory.open(cancel, Role::User, 1).await?;

    let leader: Arc<dyn ChatStream> = Arc::new(ExitDetector::new(leader, PAIR_EXIT_TRIGGER));
    let leader: Arc<dyn ChatStream> =
        Arc::new(TranscriptLogger::new(leader, config.log_dir.as_deref())?.with_echo(true));

    let prompt = match config.prompt.as_deref().filter(|p| !p.is_empty()) {
        Some(prompt) => prompt.to_string(),
        None => pair_prompt(&config.goal),
    };

    let relay = PairRelay::new(leader.clone(), follower.clone()).with_max_turns(config.steps);
    let outcome = relay.run(cancel, &prompt).await;

    for chat in [&leader, &follower] {
        if let Err(e) = chat.close().await {
            warn!(chat = chat.name(), error = %e, "Couldn't close chat");
        }
    }
    let outcome = outcome?;
    if outcome.reason == StopReason::Exit {
        info!(turns = outcome.steps, "Leader reported the goal reached");
    }
    Ok(())
}
