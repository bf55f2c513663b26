//! Bash command — run a shell snippet inside the output root.

use async_trait::async_trait;
use ironloop_core::{Command, CommandError, CommandValue, text_arg};
use serde_json::Value;
use tokio::process::Command as Process;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::sandbox::OutputRoot;

/// Runs `bash -c <snippet>` with the output root as working directory and
/// returns stdout followed by stderr, whatever the exit status.
pub struct BashCommand {
    root: OutputRoot,
}

impl BashCommand {
    pub fn new(root: OutputRoot) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Command for BashCommand {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute bash command"
    }

    fn usage(&self) -> String {
        r#"{"bash": "command"}"#.into()
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        args: &[CommandValue],
    ) -> Result<Option<Value>, CommandError> {
        let snippet = text_arg(self.name(), args, 0, "bash command")?;

        tokio::fs::create_dir_all(self.root.path())
            .await
            .map_err(|e| CommandError::ExecutionFailed {
                command: "bash".into(),
                reason: format!("couldn't create output directory: {e}"),
            })?;

        debug!(command = %snippet, "Executing bash command");

        let mut process = if cfg!(target_os = "windows") {
            let mut p = Process::new("cmd");
            p.args(["/C", &snippet]);
            p
        } else {
            let mut p = Process::new("bash");
            p.args(["-c", &snippet]);
            p
        };
        process.current_dir(self.root.path()).kill_on_drop(true);

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(CommandError::Cancelled),
            out = process.output() => out.map_err(|e| CommandError::ExecutionFailed {
                command: "bash".into(),
                reason: e.to_string(),
            })?,
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            warn!(command = %snippet, exit_code = code, "Command failed");
        }

        Ok(Some(Value::String(combined)))
    }
}
