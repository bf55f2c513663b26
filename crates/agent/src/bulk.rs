//! Bulk mode: run groups of prompts, one fresh chat per group.
//!
//! Input is either a `.json` list whose items are strings or lists of
//! strings, or plain text where blank lines separate groups and each line is
//! one prompt. Output is `[[{"in": ..., "out": ...}]]`, one inner list per
//! group.

use async_trait::async_trait;
use ironloop_core::{ChatError, ChatStream, Role};
use ironloop_providers::ChatFactory;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AgentError;

/// One prompt and the reply it got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkExchange {
    #[serde(rename = "in")]
    pub input: String,
    #[serde(rename = "out")]
    pub output: String,
}

/// Opens a fresh chat for each group.
#[async_trait]
pub trait ChatSource: Send + Sync {
    async fn open(&self, cancel: &CancellationToken) -> Result<Arc<dyn ChatStream>, ChatError>;
}

/// Chats from a backend factory, all opened with the same role and pinning.
pub struct FactoryChats {
    factory: Arc<ChatFactory>,
    role: Role,
    keep_first: usize,
}

impl FactoryChats {
    pub fn new(factory: Arc<ChatFactory>, role: Role, keep_first: usize) -> Self {
        Self {
            factory,
            role,
            keep_first,
        }
    }
}

#[async_trait]
impl ChatSource for FactoryChats {
    async fn open(&self, cancel: &CancellationToken) -> Result<Arc<dyn ChatStream>, ChatError> {
        self.factory.open(cancel, self.role, self.keep_first).await
    }
}

fn bad_input(path: &Path, reason: impl Into<String>) -> AgentError {
    AgentError::BulkInput {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Read prompt groups from `path`. Empty prompts and empty groups are
/// dropped.
pub fn load_groups(path: &Path) -> Result<Vec<Vec<String>>, AgentError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| bad_input(path, format!("couldn't read file: {e}")))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        parse_json_groups(path, &content)
    } else {
        Ok(parse_text_groups(&content))
    }
}

fn parse_json_groups(path: &Path, content: &str) -> Result<Vec<Vec<String>>, AgentError> {
    let list: Vec<Value> = serde_json::from_str(content)
        .map_err(|e| bad_input(path, format!("couldn't unmarshal: {e}")))?;
    if list.is_empty() {
        return Err(bad_input(path, "no inputs found"));
    }

    let shape_error = || bad_input(path, "must contain strings or arrays of strings");
    let mut groups = Vec::new();
    for item in list {
        let group = match item {
            Value::String(s) => vec![s],
            Value::Array(items) => items
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s),
                    _ => Err(shape_error()),
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(shape_error()),
        };
        let group: Vec<String> = group.into_iter().filter(|s| !s.is_empty()).collect();
        if !group.is_empty() {
            groups.push(group);
        }
    }
    Ok(groups)
}

fn parse_text_groups(content: &str) -> Vec<Vec<String>> {
    content
        .replace("\r\n", "\n")
        .split("\n\n")
        .map(|block| {
            block
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|group| !group.is_empty())
        .collect()
}

/// Run every group. Cancellation stops early and returns what was collected.
pub async fn run_groups(
    cancel: &CancellationToken,
    source: &dyn ChatSource,
    groups: &[Vec<String>],
) -> Result<Vec<Vec<BulkExchange>>, AgentError> {
    let mut output = Vec::with_capacity(groups.len());
    'groups: for (index, prompts) in groups.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }
        debug!(group = index, prompts = prompts.len(), "Opening chat for group");
        let chat = source.open(cancel).await?;

        let mut exchanges = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            if cancel.is_cancelled() {
                output.push(exchanges);
                break 'groups;
            }
            info!(prompt = %prompt, "Bulk prompt");
            let reply = async {
                chat.write(prompt).await.map_err(|source| AgentError::Write {
                    chat: chat.name().to_string(),
                    source,
                })?;
                chat.read().await.map_err(|source| AgentError::Read {
                    chat: chat.name().to_string(),
                    source,
                })
            };
            let reply = match reply.await {
                Ok(reply) => reply,
                Err(e) if cancel.is_cancelled() && e.is_shutdown() => {
                    output.push(exchanges);
                    break 'groups;
                }
                Err(e) => return Err(e),
            };
            info!(reply = %reply, "Bulk reply");
            exchanges.push(BulkExchange {
                input: prompt.clone(),
                output: reply,
            });
        }

        if let Err(e) = chat.close().await {
            warn!(error = %e, "Couldn't close chat");
        }
        output.push(exchanges);
    }
    Ok(output)
}

/// Write the results as pretty JSON, creating the parent directory.
pub fn write_output(path: &Path, output: &[Vec<BulkExchange>]) -> Result<(), AgentError> {
    let json = serde_json::to_string_pretty(output)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)?;
    info!(path = %path.display(), groups = output.len(), "Bulk output written");
    Ok(())
}
