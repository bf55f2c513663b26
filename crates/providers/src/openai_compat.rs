//! OpenAI-compatible chat backend.
//!
//! Works with any endpoint exposing `/chat/completions` (OpenAI, OpenRouter,
//! Ollama, vLLM, ...). The server keeps no state between calls, so every
//! write replays the conversation window chosen by a `ConversationMemory`.

use async_trait::async_trait;
use ironloop_core::{
    ChatError, ChatStream, ConversationMemory, Message, ReplyQueue, Role, ensure_open,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ratelimit::RateLimiter;

/// Default back-off after a 429 response.
pub const DEFAULT_RETRY_WAIT: Duration = Duration::from_secs(30);

/// Shared HTTP client, credentials, and pacing for OpenAI-compatible chats.
///
/// Chats opened from the same client share one `RateLimiter`.
#[derive(Clone)]
pub struct OpenAiClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    limiter: RateLimiter,
    retry_wait: Duration,
}

impl OpenAiClient {
    /// Create a client. A zero `wait` falls back to the limiter default.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        wait: Duration,
        proxy: Option<&str>,
    ) -> Result<Self, ChatError> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(300));
        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| ChatError::Network(format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| ChatError::Network(format!("couldn't build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
            limiter: RateLimiter::new(wait),
            retry_wait: DEFAULT_RETRY_WAIT,
        })
    }

    /// Override the back-off applied after a 429.
    pub fn with_retry_wait(mut self, retry_wait: Duration) -> Self {
        self.retry_wait = retry_wait;
        self
    }

    /// Open a chat. Prompts are recorded under `role` (`user` for
    /// interactive chats, `system` for driven ones).
    pub fn chat(
        &self,
        cancel: &CancellationToken,
        model: impl Into<String>,
        role: Role,
        memory: Box<dyn ConversationMemory>,
    ) -> OpenAiChat {
        let cancel = cancel.child_token();
        OpenAiChat {
            client: self.clone(),
            model: model.into(),
            role,
            memory: Mutex::new(memory),
            replies: ReplyQueue::new(cancel.clone()),
            cancel,
        }
    }

    async fn complete(
        &self,
        cancel: &CancellationToken,
        model: &str,
        messages: &[Message],
    ) -> Result<String, ChatError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ApiRequest {
            model,
            messages: messages
                .iter()
                .map(|m| ApiMessage {
                    role: m.role.as_str().into(),
                    content: m.content.clone(),
                })
                .collect(),
        };

        loop {
            debug!(model = %model, messages = messages.len(), "Sending completion request");

            let send = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send();
            let response = tokio::select! {
                _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                r = send => r.map_err(|e| ChatError::Network(e.to_string()))?,
            };

            let status = response.status().as_u16();

            if status == 429 {
                warn!(
                    retry_after_secs = self.retry_wait.as_secs(),
                    "Too many requests, backing off"
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(ChatError::Cancelled),
                    _ = tokio::time::sleep(self.retry_wait) => continue,
                }
            }

            if !response.status().is_success() {
                let error_body = response.text().await.unwrap_or_default();
                warn!(status, body = %error_body, "Completion request failed");
                return Err(ChatError::ApiError {
                    status_code: status,
                    message: error_body,
                });
            }

            let api_response: ApiResponse =
                response.json().await.map_err(|e| ChatError::ApiError {
                    status_code: status,
                    message: format!("Failed to parse response: {e}"),
                })?;

            if let Some(usage) = &api_response.usage {
                info!(total_tokens = usage.total_tokens, "Completion received");
            }

            return api_response
                .choices
                .into_iter()
                .next()
                .map(|c| c.message.content.unwrap_or_default())
                .ok_or_else(|| ChatError::ApiError {
                    status_code: status,
                    message: "No choices in response".into(),
                });
        }
    }
}

/// One conversation against an OpenAI-compatible endpoint.
pub struct OpenAiChat {
    client: OpenAiClient,
    model: String,
    role: Role,
    memory: Mutex<Box<dyn ConversationMemory>>,
    replies: ReplyQueue,
    cancel: CancellationToken,
}

#[async_trait]
impl ChatStream for OpenAiChat {
    fn name(&self) -> &str {
        "openai"
    }

    async fn write(&self, prompt: &str) -> Result<usize, ChatError> {
        ensure_open(&self.cancel)?;
        let mut memory = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ChatError::Cancelled),
            guard = self.memory.lock() => guard,
        };

        memory.add(Message::new(self.role, prompt))?;
        let messages = memory.sum()?;

        let permit = self.client.limiter.acquire(&self.cancel).await?;
        let result = self
            .client
            .complete(&self.cancel, &self.model, &messages)
            .await;
        permit.release().await;
        let reply = result?;

        memory.add(Message::assistant(reply.clone()))?;
        self.replies.push(format!("{reply}\n"))?;
        Ok(prompt.len())
    }

    async fn read(&self) -> Result<String, ChatError> {
        self.replies.next().await
    }

    async fn close(&self) -> Result<(), ChatError> {
        self.cancel.cancel();
        Ok(())
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::post;
    use axum::{Json, Router};
    use ironloop_memory::FixedWindowMemory;
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockApi {
        calls: AtomicUsize,
        rate_limit_first: bool,
        bodies: std::sync::Mutex<Vec<Value>>,
    }

    async fn completions(State(api): State<Arc<MockApi>>, Json(body): Json<Value>) -> Response {
        let n = api.calls.fetch_add(1, Ordering::SeqCst);
        if api.rate_limit_first && n == 0 {
            return (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response();
        }
        api.bodies.lock().unwrap().push(body);
        Json(json!({
            "model": "gpt-test",
            "choices": [{"message": {"role": "assistant", "content": format!("reply {n}")}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
        }))
        .into_response()
    }

    async fn spawn_api(api: Arc<MockApi>) -> String {
        let app = Router::new()
            .route("/chat/completions", post(completions))
            .with_state(api);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base_url: &str) -> OpenAiClient {
        OpenAiClient::new(base_url, "sk-test", Duration::from_millis(1), None)
            .unwrap()
            .with_retry_wait(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn write_then_read_returns_reply_with_newline() {
        let api = Arc::new(MockApi::default());
        let url = spawn_api(api.clone()).await;
        let chat = client(&url).chat(
            &CancellationToken::new(),
            "gpt-test",
            Role::User,
            Box::new(FixedWindowMemory::new(0, 0)),
        );

        assert_eq!(chat.write("hello").await.unwrap(), 5);
        assert_eq!(chat.read().await.unwrap(), "reply 0\n");
    }

    #[tokio::test]
    async fn memory_is_replayed_on_each_request() {
        let api = Arc::new(MockApi::default());
        let url = spawn_api(api.clone()).await;
        let chat = client(&url).chat(
            &CancellationToken::new(),
            "gpt-test",
            Role::System,
            Box::new(FixedWindowMemory::new(1, 0)),
        );

        chat.write("goal").await.unwrap();
        chat.read().await.unwrap();
        chat.write("results").await.unwrap();
        chat.read().await.unwrap();

        let bodies = api.bodies.lock().unwrap();
        let messages = bodies[1]["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[0]["content"], "goal");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[1]["content"], "reply 0");
        assert_eq!(messages[2]["content"], "results");
        assert_eq!(bodies[1]["model"], "gpt-test");
    }

    #[tokio::test]
    async fn rate_limited_request_is_retried() {
        let api = Arc::new(MockApi {
            rate_limit_first: true,
            ..MockApi::default()
        });
        let url = spawn_api(api.clone()).await;
        let chat = client(&url).chat(
            &CancellationToken::new(),
            "gpt-test",
            Role::User,
            Box::new(FixedWindowMemory::new(0, 0)),
        );

        chat.write("hi").await.unwrap();
        assert_eq!(chat.read().await.unwrap(), "reply 1\n");
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn over_budget_prompt_fails_before_any_request() {
        let api = Arc::new(MockApi::default());
        let url = spawn_api(api.clone()).await;
        let chat = client(&url).chat(
            &CancellationToken::new(),
            "gpt-test",
            Role::User,
            Box::new(FixedWindowMemory::new(0, 1001)),
        );

        let err = chat.write(&"many words ".repeat(100)).await.unwrap_err();
        assert!(matches!(err, ChatError::Memory(_)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn closed_chat_rejects_io() {
        let chat = client("http://127.0.0.1:9").chat(
            &CancellationToken::new(),
            "gpt-test",
            Role::User,
            Box::new(FixedWindowMemory::new(0, 0)),
        );
        chat.close().await.unwrap();
        assert!(matches!(chat.write("x").await, Err(ChatError::Cancelled)));
        assert!(matches!(chat.read().await, Err(ChatError::Cancelled)));
    }

    #[tokio::test]
    async fn server_error_is_reported() {
        async fn failing() -> Response {
            (StatusCode::UNAUTHORIZED, "bad key").into_response()
        }
        let app = Router::new().route("/chat/completions", post(failing));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let chat = client(&format!("http://{addr}/")).chat(
            &CancellationToken::new(),
            "gpt-test",
            Role::User,
            Box::new(FixedWindowMemory::new(0, 0)),
        );
        match chat.write("hi").await {
            Err(ChatError::ApiError {
                status_code,
                message,
            }) => {
                assert_eq!(status_code, 401);
                assert_eq!(message, "bad key");
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }
}
