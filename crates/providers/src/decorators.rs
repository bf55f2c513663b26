//! ChatStream decorators and placeholder chats.
//!
//! Decorators wrap any `Arc<dyn ChatStream>` and intercept one direction of
//! traffic without the inner backend knowing about it.

use async_trait::async_trait;
use chrono::Local;
use ironloop_core::{ChatError, ChatStream};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

const READ_MARKER: &str = ">>>>>>>>>>>>>>>>>>>>";
const WRITE_MARKER: &str = "<<<<<<<<<<<<<<<<<<<<";

/// Records every prompt and reply, to the log and optionally to a
/// `log_<YYYYmmdd_HHMMSS>.txt` transcript file.
pub struct TranscriptLogger {
    inner: Arc<dyn ChatStream>,
    file: Option<Mutex<File>>,
    path: Option<PathBuf>,
    echo: bool,
}

impl TranscriptLogger {
    /// Wrap `inner`. With a `log_dir`, the directory is created and a fresh
    /// transcript file opened in it.
    pub fn new(inner: Arc<dyn ChatStream>, log_dir: Option<&Path>) -> std::io::Result<Self> {
        let (file, path) = match log_dir.filter(|d| !d.as_os_str().is_empty()) {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let name = format!("log_{}.txt", Local::now().format("%Y%m%d_%H%M%S"));
                let path = dir.join(name);
                let file = OpenOptions::new().create(true).append(true).open(&path)?;
                info!(path = %path.display(), "Transcript file opened");
                (Some(Mutex::new(File::from_std(file))), Some(path))
            }
            None => (None, None),
        };
        Ok(Self {
            inner,
            file,
            path,
            echo: false,
        })
    }

    /// Also print each exchange to stdout.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn record(&self, marker: &str, text: &str) {
        info!(chat = self.inner.name(), direction = marker, bytes = text.len(), "{marker}");
        if self.echo {
            println!("{text}");
        }
        let Some(file) = &self.file else {
            return;
        };
        let entry = format!("{}: {marker}\n{text}\n", Local::now().format("%Y-%m-%d %H-%M-%S"));
        let mut f = file.lock().await;
        let written = async {
            f.write_all(entry.as_bytes()).await?;
            f.flush().await
        };
        if let Err(e) = written.await {
            warn!(error = %e, "Couldn't append to transcript");
        }
    }
}

#[async_trait]
impl ChatStream for TranscriptLogger {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn write(&self, prompt: &str) -> Result<usize, ChatError> {
        let n = self.inner.write(prompt).await?;
        self.record(WRITE_MARKER, prompt).await;
        Ok(n)
    }

    async fn read(&self) -> Result<String, ChatError> {
        let reply = self.inner.read().await?;
        self.record(READ_MARKER, &reply).await;
        Ok(reply)
    }

    async fn close(&self) -> Result<(), ChatError> {
        self.inner.close().await
    }
}

/// Turns a reply containing the trigger phrase into `ChatError::ExitRequested`.
pub struct ExitDetector {
    inner: Arc<dyn ChatStream>,
    trigger: String,
}

impl ExitDetector {
    pub fn new(inner: Arc<dyn ChatStream>, trigger: impl Into<String>) -> Self {
        Self {
            inner,
            trigger: trigger.into().to_lowercase(),
        }
    }
}

#[async_trait]
impl ChatStream for ExitDetector {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn write(&self, prompt: &str) -> Result<usize, ChatError> {
        self.inner.write(prompt).await
    }

    async fn read(&self) -> Result<String, ChatError> {
        let reply = self.inner.read().await?;
        if reply.to_lowercase().contains(&self.trigger) {
            info!(trigger = %self.trigger, "Exit phrase detected");
            return Err(ChatError::ExitRequested);
        }
        Ok(reply)
    }

    async fn close(&self) -> Result<(), ChatError> {
        self.inner.close().await
    }
}

/// Stand-in for a backend that is not configured. Accepts every prompt and
/// answers each read with a fixed apology.
#[derive(Debug, Default, Clone)]
pub struct UnavailableChat;

pub const UNAVAILABLE_REPLY: &str = "sorry, not available";

#[async_trait]
impl ChatStream for UnavailableChat {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn write(&self, prompt: &str) -> Result<usize, ChatError> {
        Ok(prompt.len())
    }

    async fn read(&self) -> Result<String, ChatError> {
        Ok(UNAVAILABLE_REPLY.into())
    }
}
