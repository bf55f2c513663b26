//! `ironloop auto` — Autonomous command loop.

use ironloop_agent::{AgentLoop, CommandDispatcher, StopReason, auto_prompt};
use ironloop_config::{AppConfig, BackendKind};
use ironloop_core::{ChatStream, Role};
use ironloop_providers::{ChatFactory, RealtimeClient, TranscriptLogger, UnavailableChat};
use ironloop_tools::{CommandContext, HttpPageFetcher, OutputRoot, default_registry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{require_goal, searcher};

pub async fn run(
    config: &AppConfig,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    if config.backend == BackendKind::Realtime {
        return Err("auto mode needs the openai backend as its main chat".into());
    }
    require_goal(config)?;
    std::fs::create_dir_all(&config.output)?;

    let factory = ChatFactory::from_config(config)?;
    let chat = factory.open(cancel, Role::System, 1).await?;
    let chat: Arc<dyn ChatStream> =
        Arc::new(TranscriptLogger::new(chat, config.log_dir.as_deref())?.with_echo(true));

    let (ask, with_ask) = ask_chat(config, cancel).await;
    let exit = cancel.child_token();
    let registry = default_registry(CommandContext {
        root: OutputRoot::new(&config.output),
        ask,
        searcher: searcher(config)?,
        fetcher: Arc::new(HttpPageFetcher::new(config.proxy.as_deref())?),
        exit: exit.clone(),
    });
    let dispatcher = CommandDispatcher::new(registry, &config.debug_dir);

    let prompt = match config.prompt.as_deref().filter(|p| !p.is_empty()) {
        Some(prompt) => prompt.to_string(),
        None => auto_prompt(&config.goal, dispatcher.registry(), with_ask),
    };

    let agent = AgentLoop::new(chat.clone(), dispatcher, exit).with_max_steps(config.steps);
    let outcome = agent.run(cancel, prompt).await;

    if let Err(e) = chat.close().await {
        warn!(error = %e, "Couldn't close chat");
    }
    let outcome = outcome?;
    match outcome.reason {
        StopReason::Exit => info!(steps = outcome.steps, "Goal reported done"),
        StopReason::StepLimit => info!(steps = outcome.steps, "Step budget used up"),
        StopReason::Cancelled => info!(steps = outcome.steps, "Cancelled"),
    }
    Ok(())
}

/// The chat behind `ask`: the real-time backend when a session cookie is on
/// file, otherwise a stand-in that declines every question.
async fn ask_chat(config: &AppConfig, cancel: &CancellationToken) -> (Arc<dyn ChatStream>, bool) {
    let client = match RealtimeClient::from_config(&config.realtime, config.proxy.as_deref()) {
        Ok(client) => client,
        Err(e) => {
            info!(error = %e, "No real-time session, ask is unavailable");
            return (Arc::new(UnavailableChat), false);
        }
    };
    let has_cookie = client
        .session_store()
        .snapshot()
        .is_ok_and(|s| s.has_cookie());
    if !has_cookie {
        info!("Real-time session has no cookie, ask is unavailable");
        return (Arc::new(UnavailableChat), false);
    }

    match client.chat(cancel).await {
        Ok(chat) => (Arc::new(chat), true),
        Err(e) => {
            warn!(error = %e, "Couldn't open real-time chat, ask is unavailable");
            (Arc::new(UnavailableChat), false)
        }
    }
}
