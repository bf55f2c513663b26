//! Command trait — the actions a model can request in its replies.
//!
//! A model asks for actions by emitting `[{"name": args}, ...]`. The parser
//! turns that text into `CommandRequest`s, the dispatcher looks each name up
//! in a `CommandRegistry`, runs it, and reports the results back to the model
//! as the next prompt.

use async_trait::async_trait;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use crate::error::CommandError;

/// A loosely-typed argument as written by the model.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
    List(Vec<CommandValue>),
    Object(Vec<(String, CommandValue)>),
}

impl CommandValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CommandValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value as text: strings verbatim, everything else as JSON.
    pub fn to_text(&self) -> String {
        match self {
            CommandValue::Text(s) => s.clone(),
            other => Value::from(other.clone()).to_string(),
        }
    }

    /// Coerce a request payload into an argument list: arrays are kept,
    /// anything else becomes a one-element list.
    pub fn into_args(value: Value) -> Vec<CommandValue> {
        match value {
            Value::Array(items) => items.into_iter().map(CommandValue::from).collect(),
            other => vec![CommandValue::from(other)],
        }
    }
}

impl From<Value> for CommandValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => CommandValue::Null,
            Value::Bool(b) => CommandValue::Bool(b),
            Value::Number(n) => CommandValue::Number(n),
            Value::String(s) => CommandValue::Text(s),
            Value::Array(items) => {
                CommandValue::List(items.into_iter().map(CommandValue::from).collect())
            }
            Value::Object(map) => CommandValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, CommandValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<CommandValue> for Value {
    fn from(value: CommandValue) -> Self {
        match value {
            CommandValue::Null => Value::Null,
            CommandValue::Bool(b) => Value::Bool(b),
            CommandValue::Number(n) => Value::Number(n),
            CommandValue::Text(s) => Value::String(s),
            CommandValue::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            CommandValue::Object(entries) => Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for CommandValue {
    fn from(s: &str) -> Self {
        CommandValue::Text(s.to_string())
    }
}

/// A single command request extracted from model output.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    /// Normalized command name
    pub name: String,

    /// Ordered arguments
    pub args: Vec<CommandValue>,
}

impl CommandRequest {
    pub fn new(name: impl Into<String>, args: Vec<CommandValue>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// The outcome of one command, reported to the model as `{name: value}`.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandResult {
    pub name: String,
    pub value: Value,
}

impl CommandResult {
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Serialize for CommandResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.name, &self.value)?;
        map.end()
    }
}

/// The core Command trait.
///
/// Each handler (bash, ask, search, web, file commands, exit, ...) implements
/// this trait and is registered in a `CommandRegistry`.
#[async_trait]
pub trait Command: Send + Sync {
    /// The canonical name the model uses (e.g., "bash", "write").
    fn name(&self) -> &str;

    /// Short human description, used when listing commands in prompts.
    fn description(&self) -> &str;

    /// Example invocation in the command grammar, e.g. `{"read": "filename"}`.
    fn usage(&self) -> String;

    /// Execute the command. `Ok(None)` means there is nothing to report.
    async fn run(
        &self,
        cancel: &CancellationToken,
        args: &[CommandValue],
    ) -> Result<Option<Value>, CommandError>;
}

/// Fetch a required, non-empty text argument.
pub fn text_arg(
    command: &str,
    args: &[CommandValue],
    index: usize,
    what: &str,
) -> Result<String, CommandError> {
    let value = args.get(index).ok_or_else(|| CommandError::MissingArgument {
        command: command.into(),
        what: what.into(),
    })?;
    let text = value.to_text();
    if text.is_empty() || matches!(value, CommandValue::Null) {
        return Err(CommandError::EmptyArgument {
            command: command.into(),
            what: what.into(),
        });
    }
    Ok(text)
}

/// A registry of available commands.
///
/// Built once per dispatcher; registration order is kept so prompts list
/// commands deterministically.
pub struct CommandRegistry {
    commands: HashMap<String, Box<dyn Command>>,
    order: Vec<String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a command. Replaces any existing command with the same name.
    pub fn register(&mut self, command: Box<dyn Command>) {
        let name = command.name().to_string();
        if self.commands.insert(name.clone(), command).is_none() {
            self.order.push(name);
        }
    }

    /// Get a command by name.
    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.commands.get(name).map(|c| c.as_ref())
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    /// Registered commands in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Command> {
        self.order
            .iter()
            .filter_map(|name| self.commands.get(name).map(|c| c.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}
