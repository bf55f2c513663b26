//! Backend selection: one factory per run, many chats per factory.
//!
//! Chats opened from the same factory share the backend's rate limiter, so
//! a pair relay or a bulk run paces all of its conversations together.

use ironloop_config::{AppConfig, BackendKind};
use ironloop_core::{ChatError, ChatStream, Role};
use ironloop_memory::FixedWindowMemory;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::openai_compat::OpenAiClient;
use crate::realtime::RealtimeClient;

/// Opens chats on the configured backend.
pub enum ChatFactory {
    OpenAi {
        client: OpenAiClient,
        model: String,
        max_tokens: usize,
    },
    Realtime(RealtimeClient),
}

impl ChatFactory {
    pub fn from_config(config: &AppConfig) -> Result<Self, ChatError> {
        let proxy = config.proxy.as_deref();
        match config.backend {
            BackendKind::OpenAi => {
                let api_key = config
                    .openai
                    .api_key
                    .clone()
                    .filter(|k| !k.is_empty())
                    .ok_or_else(|| {
                        ChatError::Session(
                            "no OpenAI API key (set openai.api_key or IRONLOOP_OPENAI_KEY)".into(),
                        )
                    })?;
                let client = OpenAiClient::new(
                    &config.openai.base_url,
                    api_key,
                    Duration::from_secs(config.openai.wait_secs),
                    proxy,
                )?
                .with_retry_wait(Duration::from_secs(config.openai.retry_wait_secs));
                info!(model = %config.model, "Using OpenAI-compatible backend");
                Ok(Self::OpenAi {
                    client,
                    model: config.model.clone(),
                    max_tokens: config.openai.max_tokens,
                })
            }
            BackendKind::Realtime => {
                let client = RealtimeClient::from_config(&config.realtime, proxy)?;
                info!(style = ?config.realtime.style, "Using real-time backend");
                Ok(Self::Realtime(client))
            }
        }
    }

    pub fn backend(&self) -> BackendKind {
        match self {
            Self::OpenAi { .. } => BackendKind::OpenAi,
            Self::Realtime(_) => BackendKind::Realtime,
        }
    }

    /// Open a fresh chat.
    ///
    /// `role` and `keep_first` only matter for the stateless API backend:
    /// prompts are recorded under `role`, and the first `keep_first`
    /// messages are pinned when the history is pruned.
    pub async fn open(
        &self,
        cancel: &CancellationToken,
        role: Role,
        keep_first: usize,
    ) -> Result<Arc<dyn ChatStream>, ChatError> {
        match self {
            Self::OpenAi {
                client,
                model,
                max_tokens,
            } => {
                let memory = FixedWindowMemory::new(keep_first, *max_tokens);
                Ok(Arc::new(client.chat(
                    cancel,
                    model.clone(),
                    role,
                    Box::new(memory),
                )))
            }
            Self::Realtime(client) => Ok(Arc::new(client.chat(cancel).await?)),
        }
    }
}
