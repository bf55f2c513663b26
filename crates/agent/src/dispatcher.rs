//! Command dispatcher — run parsed requests against a registry.

use ironloop_core::{CommandRegistry, CommandRequest, CommandResult};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::parser;

/// Name of the synthetic result reported when a reply has no usable commands.
pub const PARSE_ERROR_KEY: &str = "error";

/// Maps requests to registered commands and collects their results.
pub struct CommandDispatcher {
    registry: CommandRegistry,
    debug_dir: PathBuf,
}

impl CommandDispatcher {
    /// Unparseable replies are saved under `debug_dir` for inspection.
    pub fn new(registry: CommandRegistry, debug_dir: impl Into<PathBuf>) -> Self {
        Self {
            registry,
            debug_dir: debug_dir.into(),
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Parse `text` and execute every command in it.
    ///
    /// A parse failure is reported as a single `{"error": message}` result.
    pub async fn run(&self, cancel: &CancellationToken, text: &str) -> Vec<CommandResult> {
        match parser::parse(text) {
            Ok(requests) => self.execute(cancel, &requests).await,
            Err(e) => {
                let message = format!("couldn't parse commands: {e}");
                warn!(error = %e, "Couldn't parse commands");
                if let Err(io) = save_debug_input(&self.debug_dir, text) {
                    warn!(error = %io, "Couldn't save unparseable reply");
                }
                vec![CommandResult::new(PARSE_ERROR_KEY, message)]
            }
        }
    }

    /// Execute requests in order. Unknown names are skipped, failures become
    /// string results, and commands with nothing to report are omitted.
    pub async fn execute(
        &self,
        cancel: &CancellationToken,
        requests: &[CommandRequest],
    ) -> Vec<CommandResult> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let Some(command) = self.registry.get(&request.name) else {
                info!(command = %request.name, "Unknown command, skipping");
                continue;
            };

            debug!(command = %request.name, args = request.args.len(), "Running command");
            let value = match command.run(cancel, &request.args).await {
                Ok(Some(value)) => value,
                Ok(None) => continue,
                Err(e) => {
                    warn!(command = %request.name, error = %e, "Command failed");
                    Value::String(e.to_string())
                }
            };
            results.push(CommandResult::new(request.name.clone(), value));
        }
        results
    }
}

/// Write `text` to `<dir>/error_<unix-seconds>.json`.
fn save_debug_input(dir: &Path, text: &str) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("error_{}.json", chrono::Utc::now().timestamp()));
    std::fs::write(&path, text)?;
    debug!(path = %path.display(), "Saved unparseable reply");
    Ok(path)
}
