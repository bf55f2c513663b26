//! Subcommand implementations and the setup they share.

pub mod auto;
pub mod bulk;
pub mod chat;
pub mod cmd;
pub mod init;
pub mod pair;

use clap::Args;
use ironloop_config::AppConfig;
use ironloop_tools::{GoogleSearch, WebSearch};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Flags that override the config file and environment.
#[derive(Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Main chat backend (openai or realtime)
    #[arg(long, global = true)]
    pub backend: Option<String>,

    /// Model requested from the hosted API
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// HTTP proxy for outbound requests
    #[arg(long, global = true)]
    pub proxy: Option<String>,

    /// Root directory for command side effects
    #[arg(long, global = true)]
    pub output: Option<PathBuf>,

    /// Transcript directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Step budget, 0 runs until exit
    #[arg(long, global = true)]
    pub steps: Option<usize>,
}

impl Overrides {
    pub fn apply(&self, config: &mut AppConfig) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(backend) = &self.backend {
            config.backend = backend.parse()?;
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(proxy) = &self.proxy {
            config.proxy = Some(proxy.clone()).filter(|p| !p.is_empty());
        }
        if let Some(output) = &self.output {
            config.output = output.clone();
        }
        if let Some(log_dir) = &self.log_dir {
            config.log_dir = Some(log_dir.clone()).filter(|d| !d.as_os_str().is_empty());
        }
        if let Some(steps) = self.steps {
            config.steps = steps;
        }
        Ok(())
    }
}

/// Load the file (explicit path or the default location), apply environment
/// and flag overrides, then validate the result.
pub fn load_config(
    path: Option<&Path>,
    overrides: &Overrides,
) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    }
    .map_err(|e| format!("Failed to load config: {e}"))?;

    overrides.apply(&mut config)?;
    config.validate()?;
    Ok(config)
}

pub fn set_goal(config: &mut AppConfig, goal: Option<String>, prompt: Option<String>) {
    if let Some(goal) = goal {
        config.goal = goal;
    }
    if prompt.is_some() {
        config.prompt = prompt;
    }
}

/// The goal-or-prompt text a templated mode starts from.
pub fn require_goal(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.has_goal_or_prompt() {
        Ok(())
    } else {
        Err("a goal or a prompt is required (set --goal, --prompt, or goal in config)".into())
    }
}

/// The configured web search, or `None` when no key and cx are set.
pub fn searcher(
    config: &AppConfig,
) -> Result<Option<Arc<dyn WebSearch>>, Box<dyn std::error::Error>> {
    let search = &config.search;
    let (Some(key), Some(cx)) = (&search.key, &search.cx) else {
        return Ok(None);
    };
    if !search.is_configured() {
        return Ok(None);
    }
    let google: Arc<dyn WebSearch> = Arc::new(GoogleSearch::new(
        &search.endpoint,
        key,
        cx,
        config.proxy.as_deref(),
    )?);
    Ok(Some(google))
}

/// A token cancelled on Ctrl-C.
pub fn shutdown_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, shutting down");
            token.cancel();
        }
    });
    cancel
}
