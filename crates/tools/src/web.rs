//! Web command and the page-fetch collaborator behind it.

use async_trait::async_trait;
use ironloop_core::{Command, CommandError, CommandValue, text_arg};
use scraper::Html;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Maximum characters of page text handed back to the model.
pub const MAX_PAGE_CHARS: usize = 1000;

/// Fetches a page and reduces it to plain text.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, CommandError>;
}

/// Plain HTTP GET plus HTML text extraction.
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(proxy: Option<&str>) -> Result<Self, CommandError> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(30));
        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| failed(format!("invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| failed(format!("couldn't build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

fn failed(reason: String) -> CommandError {
    CommandError::ExecutionFailed {
        command: "web".into(),
        reason,
    }
}

/// Add `https://` when the model left the scheme out.
pub fn with_scheme(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{url}")
    }
}

/// Document text with whitespace runs collapsed, cut to `MAX_PAGE_CHARS`.
pub fn page_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let raw: String = doc.root_element().text().collect::<Vec<_>>().join(" ");
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_PAGE_CHARS)
        .collect()
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, CommandError> {
        let url = with_scheme(url);
        debug!(url = %url, "Fetching page");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| failed(format!("couldn't get response: {e}")))?;
        let body = response
            .text()
            .await
            .map_err(|e| failed(format!("couldn't read response: {e}")))?;
        Ok(page_text(&body))
    }
}

/// Reports the condensed text of a page.
pub struct WebCommand {
    fetcher: Arc<dyn PageFetcher>,
}

impl WebCommand {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Command for WebCommand {
    fn name(&self) -> &str {
        "web"
    }

    fn description(&self) -> &str {
        "Browse website"
    }

    fn usage(&self) -> String {
        r#"{"web": "url"}"#.into()
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        args: &[CommandValue],
    ) -> Result<Option<Value>, CommandError> {
        let url = text_arg(self.name(), args, 0, "web url")?;
        let text = tokio::select! {
            _ = cancel.cancelled() => return Err(CommandError::Cancelled),
            r = self.fetcher.fetch_text(&url) => r?,
        };
        Ok(Some(Value::String(text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::response::Html as HtmlBody;
    use axum::routing::get;

    #[test]
    fn scheme_added_when_missing() {
        assert_eq!(with_scheme("example.com/a"), "https://example.com/a");
        assert_eq!(with_scheme("http://example.com"), "http://example.com");
        assert_eq!(with_scheme("https://example.com"), "https://example.com");
    }

    #[test]
    fn text_is_condensed() {
        let html = "<html><head><title>T</title></head>\
                    <body><h1>Hello</h1>\n\n\t<p>big   \r\n world</p></body></html>";
        assert_eq!(page_text(html), "T Hello big world");
    }

    #[test]
    fn text_is_truncated_on_char_boundary() {
        let html = format!("<p>{}</p>", "ñ".repeat(MAX_PAGE_CHARS + 50));
        let text = page_text(&html);
        assert_eq!(text.chars().count(), MAX_PAGE_CHARS);
    }

    #[tokio::test]
    async fn fetches_page_over_http() {
        let app = Router::new().route(
            "/page",
            get(|| async { HtmlBody("<body><p>served   text</p></body>") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let cmd = WebCommand::new(Arc::new(HttpPageFetcher::new(None).unwrap()));
        let out = cmd
            .run(
                &CancellationToken::new(),
                &[format!("http://{addr}/page").as_str().into()],
            )
            .await
            .unwrap();
        assert_eq!(out, Some(Value::String("served text".into())));
    }
}
