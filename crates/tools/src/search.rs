//! Search command and the web-search collaborator behind it.

use async_trait::async_trait;
use ironloop_core::{Command, CommandError, CommandValue, text_arg};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// One search hit as reported to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub link: String,
}

/// A web search backend.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, CommandError>;
}

/// Google Custom Search JSON API.
pub struct GoogleSearch {
    client: reqwest::Client,
    endpoint: String,
    key: String,
    cx: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchHit>,
}

impl GoogleSearch {
    /// Requests go through `proxy` when one is set.
    pub fn new(
        endpoint: impl Into<String>,
        key: impl Into<String>,
        cx: impl Into<String>,
        proxy: Option<&str>,
    ) -> Result<Self, CommandError> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(30));
        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| failed(format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| failed(format!("couldn't build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            key: key.into(),
            cx: cx.into(),
        })
    }
}

fn failed(reason: String) -> CommandError {
    CommandError::ExecutionFailed {
        command: "search".into(),
        reason,
    }
}

#[async_trait]
impl WebSearch for GoogleSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>, CommandError> {
        debug!(query, "Searching");
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("key", &self.key), ("cx", &self.cx), ("q", &query.to_string())])
            .send()
            .await
            .map_err(|e| failed(format!("error making HTTP request: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| failed(format!("error reading response body: {e}")))?;
        if !status.is_success() {
            return Err(failed(format!("search API returned {status}: {body}")));
        }

        let parsed: SearchResponse = serde_json::from_str(&body)
            .map_err(|e| failed(format!("error unmarshaling JSON response: {e}")))?;
        info!(query, hits = parsed.items.len(), "Search completed");
        Ok(parsed.items)
    }
}

/// Reports `[{title, link}]` for a query.
pub struct SearchCommand {
    searcher: Option<Arc<dyn WebSearch>>,
}

impl SearchCommand {
    /// `None` makes the command answer that search is not available.
    pub fn new(searcher: Option<Arc<dyn WebSearch>>) -> Self {
        Self { searcher }
    }
}

#[async_trait]
impl Command for SearchCommand {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Web search"
    }

    fn usage(&self) -> String {
        r#"{"search": "query"}"#.into()
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        args: &[CommandValue],
    ) -> Result<Option<Value>, CommandError> {
        let query = text_arg(self.name(), args, 0, "search query")?;
        let searcher = self
            .searcher
            .as_ref()
            .ok_or_else(|| CommandError::NotAvailable("search".into()))?;

        let hits = tokio::select! {
            _ = cancel.cancelled() => return Err(CommandError::Cancelled),
            r = searcher.search(&query) => r?,
        };
        let value = serde_json::to_value(hits).map_err(|e| failed(e.to_string()))?;
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;

    /// Returns the server address; the API lives at `/customsearch/v1`.
    async fn spawn_server() -> std::net::SocketAddr {
        async fn handler(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
            assert_eq!(params.get("key").map(String::as_str), Some("k"));
            assert_eq!(params.get("cx").map(String::as_str), Some("c"));
            let q = params.get("q").cloned().unwrap_or_default();
            Json(json!({
                "kind": "customsearch#search",
                "items": [
                    {"title": format!("About {q}"), "link": "https://example.com/1", "snippet": "x"},
                    {"title": "Second", "link": "https://example.com/2"}
                ]
            }))
        }
        let app = Router::new().route("/customsearch/v1", get(handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        addr
    }

    async fn spawn_api() -> String {
        format!("http://{}/customsearch/v1", spawn_server().await)
    }

    #[tokio::test]
    async fn google_results_are_title_and_link() {
        let endpoint = spawn_api().await;
        let google = GoogleSearch::new(endpoint, "k", "c", None).unwrap();
        let cmd = SearchCommand::new(Some(Arc::new(google)));

        let out = cmd
            .run(&CancellationToken::new(), &["rust & tokio".into()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            out,
            json!([
                {"title": "About rust & tokio", "link": "https://example.com/1"},
                {"title": "Second", "link": "https://example.com/2"}
            ])
        );
    }

    #[tokio::test]
    async fn requests_go_through_the_proxy() {
        // The host does not resolve; only the proxy can answer.
        let proxy = format!("http://{}", spawn_server().await);
        let google = GoogleSearch::new(
            "http://search.invalid/customsearch/v1",
            "k",
            "c",
            Some(&proxy),
        )
        .unwrap();

        let hits = google.search("proxied").await.unwrap();
        assert_eq!(hits[0].title, "About proxied");
    }

    #[tokio::test]
    async fn unconfigured_search_is_not_available() {
        let cmd = SearchCommand::new(None);
        let result = cmd.run(&CancellationToken::new(), &["q".into()]).await;
        assert!(matches!(result, Err(CommandError::NotAvailable(_))));
    }
}
