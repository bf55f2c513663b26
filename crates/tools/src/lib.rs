//! Built-in command implementations for ironloop.
//!
//! Commands give the agent the ability to interact with the world:
//! run shell snippets, manage files under the output root, search the web,
//! read pages, consult a second model, and end the run.

pub mod ask;
pub mod control;
pub mod files;
pub mod sandbox;
pub mod search;
pub mod shell;
pub mod web;

use ironloop_core::{ChatStream, CommandRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub use ask::AskCommand;
pub use control::{AcknowledgeCommand, ExitCommand};
pub use files::{DeleteFileCommand, ListFilesCommand, ReadFileCommand, WriteFileCommand};
pub use sandbox::{OutputRoot, PathError};
pub use search::{GoogleSearch, SearchCommand, SearchHit, WebSearch};
pub use shell::BashCommand;
pub use web::{HttpPageFetcher, MAX_PAGE_CHARS, PageFetcher, WebCommand};

/// Collaborators the built-in commands are wired to.
pub struct CommandContext {
    /// Directory file and shell commands operate in.
    pub root: OutputRoot,
    /// Secondary chat behind `ask`.
    pub ask: Arc<dyn ChatStream>,
    /// `None` when no search backend is configured.
    pub searcher: Option<Arc<dyn WebSearch>>,
    pub fetcher: Arc<dyn PageFetcher>,
    /// Fired by `exit`.
    pub exit: CancellationToken,
}

/// Create a registry with all built-in commands.
pub fn default_registry(ctx: CommandContext) -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    registry.register(Box::new(BashCommand::new(ctx.root.clone())));
    registry.register(Box::new(AskCommand::new(ctx.ask)));
    registry.register(Box::new(SearchCommand::new(ctx.searcher)));
    registry.register(Box::new(WebCommand::new(ctx.fetcher)));
    registry.register(Box::new(AcknowledgeCommand::new("talk")));
    registry.register(Box::new(AcknowledgeCommand::new("think")));
    registry.register(Box::new(ReadFileCommand::new(ctx.root.clone())));
    registry.register(Box::new(WriteFileCommand::new(ctx.root.clone())));
    registry.register(Box::new(DeleteFileCommand::new(ctx.root.clone())));
    registry.register(Box::new(ListFilesCommand::new(ctx.root)));
    registry.register(Box::new(ExitCommand::new(ctx.exit)));
    registry
}
