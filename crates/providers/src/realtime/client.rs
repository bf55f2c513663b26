//! Session bootstrap and connection setup for the real-time backend.

use ironloop_config::{ConversationStyle, RealtimeConfig};
use ironloop_core::ChatError;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::Url;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::tungstenite::http::HeaderMap as SocketHeaderMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::chat::RealtimeChat;
use super::protocol::Conversation;
use super::session::{Session, SessionStore};
use super::socket;
use crate::ratelimit::RateLimiter;

/// Creates conversations on the chat hub. Chats opened from one client share
/// its session, cookie jar, and rate limiter.
pub struct RealtimeClient {
    http: reqwest::Client,
    jar: Arc<Jar>,
    origin: Url,
    bootstrap_url: String,
    socket_url: String,
    style: ConversationStyle,
    store: SessionStore,
    limiter: RateLimiter,
}

impl RealtimeClient {
    /// Build a client from configuration, loading the session file.
    pub fn from_config(config: &RealtimeConfig, proxy: Option<&str>) -> Result<Self, ChatError> {
        let store = SessionStore::open(&config.session_file)?;
        Self::new(config, store, proxy)
    }

    pub fn new(
        config: &RealtimeConfig,
        store: SessionStore,
        proxy: Option<&str>,
    ) -> Result<Self, ChatError> {
        let origin = Url::parse(&config.origin)
            .map_err(|e| ChatError::Protocol(format!("invalid origin {}: {e}", config.origin)))?;

        let session = store.snapshot()?;
        let jar = Arc::new(Jar::default());
        for piece in session.cookie.split(';') {
            let piece = piece.trim();
            if !piece.is_empty() {
                jar.add_cookie_str(piece, &origin);
            }
        }

        let mut builder = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .timeout(Duration::from_secs(300));
        if !session.user_agent.is_empty() {
            builder = builder.user_agent(session.user_agent.clone());
        }
        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| ChatError::Network(format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let http = builder
            .build()
            .map_err(|e| ChatError::Network(format!("couldn't build HTTP client: {e}")))?;

        if !session.ja3.is_empty() {
            debug!("Session carries a TLS fingerprint; it is not replayed");
        }

        Ok(Self {
            http,
            jar,
            origin,
            bootstrap_url: config.bootstrap_url.clone(),
            socket_url: config.socket_url.clone(),
            style: config.style,
            store,
            limiter: RateLimiter::new(Duration::from_secs(config.wait_secs)),
        })
    }

    pub fn session_store(&self) -> &SessionStore {
        &self.store
    }

    /// Current cookies for the origin, as a `Cookie` header value.
    fn cookie_header(&self) -> String {
        self.jar
            .cookies(&self.origin)
            .and_then(|v| v.to_str().ok().map(str::to_string))
            .unwrap_or_default()
    }

    /// Bootstrap a conversation, persist the refreshed cookie, and open the
    /// socket. The whole setup runs under the rate limiter.
    pub async fn chat(&self, cancel: &CancellationToken) -> Result<RealtimeChat, ChatError> {
        let cancel = cancel.child_token();
        let permit = self.limiter.acquire(&cancel).await?;
        let result = self.connect(&cancel).await;
        permit.release().await;
        let (socket, conversation) = result?;

        Ok(RealtimeChat::new(
            socket,
            conversation,
            self.style,
            self.limiter.clone(),
            cancel,
        ))
    }

    async fn connect(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(socket::Socket, Conversation), ChatError> {
        let session = self.store.snapshot()?;
        let conversation = self.bootstrap(&session, cancel).await?;

        let cookie = self.cookie_header();
        self.store.update_cookie(cookie.clone())?;

        let headers = socket_headers(&session, &cookie, self.origin.as_str());
        let socket = socket::connect(&self.socket_url, headers, cancel).await?;
        info!(conversation_id = %conversation.conversation_id, "Realtime chat connected");
        Ok((socket, conversation))
    }

    async fn bootstrap(
        &self,
        session: &Session,
        cancel: &CancellationToken,
    ) -> Result<Conversation, ChatError> {
        debug!(url = %self.bootstrap_url, "Creating conversation");
        let send = self
            .http
            .get(&self.bootstrap_url)
            .headers(bootstrap_headers(session, self.origin.as_str()))
            .send();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            r = send => r.map_err(|e| ChatError::Network(format!("bootstrap request failed: {e}")))?,
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChatError::Network(format!("couldn't read bootstrap response: {e}")))?;
        if !status.is_success() {
            warn!(status = status.as_u16(), "Bootstrap rejected");
            return Err(ChatError::ApiError {
                status_code: status.as_u16(),
                message: body,
            });
        }

        let conversation: Conversation = serde_json::from_str(&body).map_err(|e| {
            ChatError::Protocol(format!("couldn't decode bootstrap response ({body}): {e}"))
        })?;
        conversation.ensure_success()?;
        Ok(conversation)
    }
}

/// Emulated browser headers for the bootstrap request, in send order.
fn bootstrap_headers(session: &Session, origin: &str) -> HeaderMap {
    let referer = format!(
        "{}/search?q=Bing+AI&showconv=1&FORM=hpcodx",
        origin.trim_end_matches('/')
    );
    let request_id = uuid::Uuid::new_v4().to_string();
    let ordered: [(&str, &str); 22] = [
        ("accept", "application/json"),
        ("accept-encoding", "gzip, deflate, br"),
        ("accept-language", session.language.as_str()),
        ("referer", referer.as_str()),
        (
            "sec-ch-ua",
            r#""Chromium";v="112", "Microsoft Edge";v="112", "Not:A-Brand";v="99""#,
        ),
        ("sec-ch-ua-arch", "x86"),
        ("sec-ch-ua-bitness", "64"),
        ("sec-ch-ua-full-version", "112.0.1722.39"),
        (
            "sec-ch-ua-full-version-list",
            r#""Chromium";v="112.0.5615.49", "Microsoft Edge";v="112.0.1722.39", "Not:A-Brand";v="99.0.0.0""#,
        ),
        ("sec-ch-ua-mobile", "?0"),
        ("sec-ch-ua-model", ""),
        ("sec-ch-ua-platform", "Windows"),
        ("sec-ch-ua-platform-version", "10.0.0"),
        ("sec-fetch-dest", "empty"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-site", "same-origin"),
        ("sec-ms-gec", session.sec_ms_gec.as_str()),
        ("sec-ms-gec-version", session.sec_ms_gec_version.as_str()),
        ("user-agent", session.user_agent.as_str()),
        ("x-client-data", session.x_client_data.as_str()),
        ("x-ms-client-request-id", request_id.as_str()),
        ("x-ms-useragent", session.x_ms_user_agent.as_str()),
    ];

    let mut headers = HeaderMap::new();
    for (name, value) in ordered {
        if value.is_empty() && name != "sec-ch-ua-model" {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.append(name, value);
            }
            _ => warn!(header = name, "Skipping invalid header value"),
        }
    }
    headers
}

/// Headers sent with the socket upgrade.
fn socket_headers(session: &Session, cookie: &str, origin: &str) -> SocketHeaderMap {
    use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};

    let pairs = [
        ("pragma", "no-cache"),
        ("cache-control", "no-cache"),
        ("cookie", cookie),
        ("user-agent", session.user_agent.as_str()),
        ("origin", origin.trim_end_matches('/')),
        ("accept-language", session.language.as_str()),
    ];
    let mut headers = SocketHeaderMap::new();
    for (name, value) in pairs {
        if value.is_empty() {
            continue;
        }
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.append(HeaderName::from_static(name), value);
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::SET_COOKIE;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use futures::{SinkExt, StreamExt};
    use ironloop_core::ChatStream;
    use serde_json::json;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;

    #[test]
    fn bootstrap_headers_keep_order_and_session_values() {
        let session = Session {
            language: "en-US".into(),
            sec_ms_gec: "gec".into(),
            user_agent: "agent/1.0".into(),
            ..Session::default()
        };
        let headers = bootstrap_headers(&session, "https://www.example.com/");
        let names: Vec<&str> = headers.keys().map(|k| k.as_str()).collect();

        assert_eq!(names.first(), Some(&"accept"));
        assert_eq!(names.last(), Some(&"x-ms-client-request-id"));
        let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();
        assert!(pos("accept-language") < pos("referer"));
        assert!(pos("sec-ms-gec") < pos("user-agent"));
        assert_eq!(headers["sec-ms-gec"], "gec");
        assert!(
            headers["referer"]
                .to_str()
                .unwrap()
                .starts_with("https://www.example.com/search")
        );
        // Empty session fields are not sent.
        assert!(!headers.contains_key("x-client-data"));
    }

    #[test]
    fn socket_headers_carry_cookie_and_origin() {
        let session = Session {
            user_agent: "agent/1.0".into(),
            ..Session::default()
        };
        let headers = socket_headers(&session, "a=1; b=2", "https://www.example.com/");
        assert_eq!(headers["cookie"], "a=1; b=2");
        assert_eq!(headers["origin"], "https://www.example.com");
        assert!(!headers.contains_key("accept-language"));
    }

    async fn spawn_bootstrap(success: bool) -> String {
        async fn create_ok() -> impl IntoResponse {
            (
                [(SET_COOKIE, "fresh=server; Path=/")],
                Json(json!({
                    "conversationId": "conv-42",
                    "clientId": "client-7",
                    "conversationSignature": "sig",
                    "result": {"value": "Success", "message": null}
                })),
            )
        }
        async fn create_denied() -> impl IntoResponse {
            Json(json!({"result": {"value": "Forbidden", "message": "no access"}}))
        }
        let app = if success {
            Router::new().route("/create", get(create_ok))
        } else {
            Router::new().route("/create", get(create_denied))
        };
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn spawn_socket() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.next().await.unwrap().unwrap();
            ws.send(Message::Text("{}\u{1e}".to_string().into()))
                .await
                .unwrap();
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let req: serde_json::Value =
                    serde_json::from_str(text.trim_end_matches('\u{1e}')).unwrap();
                let id = req["invocationId"].as_str().unwrap().to_string();
                let frame = json!({
                    "type": 2,
                    "invocationId": id,
                    "item": {
                        "messages": [{"text": "hi from the hub", "author": "bot"}],
                        "result": {"value": "Success"}
                    }
                });
                ws.send(Message::Text(format!("{frame}\u{1e}").into()))
                    .await
                    .unwrap();
            }
        });
        format!("ws://{addr}")
    }

    fn config(http: &str, ws: &str, dir: &std::path::Path) -> RealtimeConfig {
        RealtimeConfig {
            wait_secs: 0,
            session_file: dir.join("session.toml"),
            bootstrap_url: format!("{http}/create"),
            socket_url: ws.to_string(),
            origin: http.to_string(),
            style: ConversationStyle::Creative,
        }
    }

    #[tokio::test]
    async fn bootstrap_persists_cookie_and_chats() {
        let http = spawn_bootstrap(true).await;
        let ws = spawn_socket().await;
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&http, &ws, dir.path());

        let store = SessionStore::with_session(
            &cfg.session_file,
            Session {
                cookie: "initial=1".into(),
                user_agent: "agent/1.0".into(),
                ..Session::default()
            },
        );
        let mut client = RealtimeClient::new(&cfg, store, None).unwrap();
        client.limiter = RateLimiter::new(Duration::from_millis(1));

        let chat = client.chat(&CancellationToken::new()).await.unwrap();
        assert_eq!(chat.conversation_id(), "conv-42");

        let persisted = SessionStore::open(&cfg.session_file)
            .unwrap()
            .snapshot()
            .unwrap();
        assert!(persisted.cookie.contains("initial=1"));
        assert!(persisted.cookie.contains("fresh=server"));
        assert_eq!(persisted.user_agent, "agent/1.0");

        chat.write("hello").await.unwrap();
        assert_eq!(chat.read().await.unwrap(), "hi from the hub");
    }

    #[tokio::test]
    async fn unsuccessful_bootstrap_is_rejected() {
        let http = spawn_bootstrap(false).await;
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&http, "ws://127.0.0.1:9", dir.path());
        let mut client =
            RealtimeClient::new(&cfg, SessionStore::with_session(&cfg.session_file, Session::default()), None)
                .unwrap();
        client.limiter = RateLimiter::new(Duration::from_millis(1));

        let err = match client.chat(&CancellationToken::new()).await {
            Err(e) => e,
            Ok(_) => panic!("bootstrap should fail"),
        };
        assert!(err.to_string().contains("Forbidden"));
        assert!(!cfg.session_file.exists());
    }
}
