//! Commands that steer the loop rather than touch the world.

use async_trait::async_trait;
use ironloop_core::{Command, CommandError, CommandValue};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Accepts anything and acknowledges it (`talk`, `think`).
pub struct AcknowledgeCommand {
    name: String,
}

impl AcknowledgeCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Command for AcknowledgeCommand {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Note to self"
    }

    fn usage(&self) -> String {
        format!(r#"{{"{}": "text"}}"#, self.name)
    }

    async fn run(
        &self,
        _cancel: &CancellationToken,
        _args: &[CommandValue],
    ) -> Result<Option<Value>, CommandError> {
        Ok(Some(Value::String(format!("received {} command", self.name))))
    }
}

/// Signals the loop to stop once the current batch is done.
pub struct ExitCommand {
    exit: CancellationToken,
}

impl ExitCommand {
    pub fn new(exit: CancellationToken) -> Self {
        Self { exit }
    }
}

#[async_trait]
impl Command for ExitCommand {
    fn name(&self) -> &str {
        "exit"
    }

    fn description(&self) -> &str {
        "Exit (task completed)"
    }

    fn usage(&self) -> String {
        r#"{"exit": "reason"}"#.into()
    }

    async fn run(
        &self,
        _cancel: &CancellationToken,
        args: &[CommandValue],
    ) -> Result<Option<Value>, CommandError> {
        let reason = args.first().map(CommandValue::to_text).unwrap_or_default();
        info!(reason = %reason, "Exit requested");
        self.exit.cancel();
        Ok(Some(Value::String("exit".into())))
    }
}
