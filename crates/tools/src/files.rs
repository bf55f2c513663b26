//! File commands scoped to the output root: read, write, delete, list.

use async_trait::async_trait;
use ironloop_core::{Command, CommandError, CommandValue, text_arg};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use walkdir::WalkDir;

use crate::sandbox::OutputRoot;

fn failed(command: &str, reason: String) -> CommandError {
    CommandError::ExecutionFailed {
        command: command.into(),
        reason,
    }
}

fn resolve(root: &OutputRoot, command: &str, path: &str) -> Result<PathBuf, CommandError> {
    root.resolve(path).map_err(|e| failed(command, e.to_string()))
}

pub struct ReadFileCommand {
    root: OutputRoot,
}

impl ReadFileCommand {
    pub fn new(root: OutputRoot) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Command for ReadFileCommand {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read file"
    }

    fn usage(&self) -> String {
        r#"{"read": "filename"}"#.into()
    }

    async fn run(
        &self,
        _cancel: &CancellationToken,
        args: &[CommandValue],
    ) -> Result<Option<Value>, CommandError> {
        let path = text_arg(self.name(), args, 0, "read file path")?;
        let path = resolve(&self.root, "read", &path)?;
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| failed("read", format!("couldn't read file: {e}")))?;
        Ok(Some(Value::String(String::from_utf8_lossy(&data).into_owned())))
    }
}

/// Writes `[path, contents]`, creating intermediate directories.
pub struct WriteFileCommand {
    root: OutputRoot,
}

impl WriteFileCommand {
    pub fn new(root: OutputRoot) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Command for WriteFileCommand {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Write to file"
    }

    fn usage(&self) -> String {
        r#"{"write": ["filename", "contents"]}"#.into()
    }

    async fn run(
        &self,
        _cancel: &CancellationToken,
        args: &[CommandValue],
    ) -> Result<Option<Value>, CommandError> {
        let path = text_arg(self.name(), args, 0, "write file path")?;
        let content = args.get(1).map(CommandValue::to_text).unwrap_or_default();

        let path = resolve(&self.root, "write", &path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| failed("write", format!("couldn't create directory: {e}")))?;
        }
        tokio::fs::write(&path, content.as_bytes())
            .await
            .map_err(|e| failed("write", format!("couldn't write file: {e}")))?;
        debug!(path = %path.display(), bytes = content.len(), "File written");
        Ok(Some(Value::String("write file success".into())))
    }
}

pub struct DeleteFileCommand {
    root: OutputRoot,
}

impl DeleteFileCommand {
    pub fn new(root: OutputRoot) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Command for DeleteFileCommand {
    fn name(&self) -> &str {
        "delete"
    }

    fn description(&self) -> &str {
        "Delete file"
    }

    fn usage(&self) -> String {
        r#"{"delete": "filename"}"#.into()
    }

    async fn run(
        &self,
        _cancel: &CancellationToken,
        args: &[CommandValue],
    ) -> Result<Option<Value>, CommandError> {
        let path = text_arg(self.name(), args, 0, "delete file path")?;
        let path = resolve(&self.root, "delete", &path)?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| failed("delete", format!("couldn't delete file: {e}")))?;
        Ok(Some(Value::String("delete file success".into())))
    }
}

/// Lists a directory tree; directories carry a trailing `/`.
pub struct ListFilesCommand {
    root: OutputRoot,
}

impl ListFilesCommand {
    pub fn new(root: OutputRoot) -> Self {
        Self { root }
    }
}

fn walk(dir: &Path) -> Result<Vec<String>, CommandError> {
    let mut items = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| failed("list", format!("couldn't list files: {e}")))?;
        let relative = entry
            .path()
            .strip_prefix(dir)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        if entry.file_type().is_dir() {
            items.push(format!("{relative}/"));
        } else {
            items.push(relative);
        }
    }
    Ok(items)
}

#[async_trait]
impl Command for ListFilesCommand {
    fn name(&self) -> &str {
        "list"
    }

    fn description(&self) -> &str {
        "List files"
    }

    fn usage(&self) -> String {
        r#"{"list": "directory"}"#.into()
    }

    async fn run(
        &self,
        _cancel: &CancellationToken,
        args: &[CommandValue],
    ) -> Result<Option<Value>, CommandError> {
        let path = text_arg(self.name(), args, 0, "list_files path")?;
        let dir = resolve(&self.root, "list", &path)?;
        if !dir.exists() {
            return Err(failed(
                "list",
                format!("couldn't list files: {path} does not exist"),
            ));
        }

        let items = tokio::task::spawn_blocking(move || walk(&dir))
            .await
            .map_err(|e| failed("list", e.to_string()))??;
        Ok(Some(Value::from(items)))
    }
}
