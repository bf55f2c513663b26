//! `ironloop cmd` — Parse and run the commands in one prompt.

use ironloop_agent::CommandDispatcher;
use ironloop_config::AppConfig;
use ironloop_providers::UnavailableChat;
use ironloop_tools::{CommandContext, HttpPageFetcher, OutputRoot, default_registry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::searcher;

pub async fn run(
    config: &AppConfig,
    cancel: &CancellationToken,
    prompt: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = default_registry(CommandContext {
        root: OutputRoot::new(&config.output),
        ask: Arc::new(UnavailableChat),
        searcher: searcher(config)?,
        fetcher: Arc::new(HttpPageFetcher::new(config.proxy.as_deref())?),
        exit: CancellationToken::new(),
    });
    let dispatcher = CommandDispatcher::new(registry, &config.debug_dir);

    let results = dispatcher.run(cancel, prompt).await;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
