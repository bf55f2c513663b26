//! One live conversation over the chat hub socket.

use async_trait::async_trait;
use futures::SinkExt;
use ironloop_config::ConversationStyle;
use ironloop_core::{ChatError, ChatStream, ReplyQueue, ensure_open};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::protocol::{
    Conversation, MAX_MESSAGE_CHARS, StreamAggregator, chat_request, encode_frame,
};
use super::socket::{FrameReceiver, FrameSink, Socket};
use crate::ratelimit::RateLimiter;

/// State owned by the exchange in flight.
struct Exchange {
    sink: FrameSink,
    frames: FrameReceiver,
    invocation_id: u64,
}

/// A `ChatStream` over an open hub connection.
///
/// One exchange runs at a time; concurrent writes queue on the exchange lock.
pub struct RealtimeChat {
    exchange: Mutex<Exchange>,
    conversation: Conversation,
    style: ConversationStyle,
    limiter: RateLimiter,
    replies: ReplyQueue,
    cancel: CancellationToken,
}

impl RealtimeChat {
    /// Wrap a connected socket. `cancel` must be the token the socket's
    /// listener was started with.
    pub fn new(
        socket: Socket,
        conversation: Conversation,
        style: ConversationStyle,
        limiter: RateLimiter,
        cancel: CancellationToken,
    ) -> Self {
        // The listener stops on cancellation; nothing needs to join it.
        drop(socket.listener);
        Self {
            exchange: Mutex::new(Exchange {
                sink: socket.sink,
                frames: socket.frames,
                invocation_id: 0,
            }),
            conversation,
            style,
            limiter,
            replies: ReplyQueue::new(cancel.clone()),
            cancel,
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation.conversation_id
    }

    async fn exchange(&self, text: &str) -> Result<String, ChatError> {
        let mut exchange = tokio::select! {
            _ = self.cancel.cancelled() => return Err(ChatError::Cancelled),
            guard = self.exchange.lock() => guard,
        };

        // Drop leftovers of the previous exchange (e.g. a trailing completion).
        while let Ok(stale) = exchange.frames.try_recv() {
            if let Err(e) = stale {
                return Err(e);
            }
        }

        let invocation_id = exchange.invocation_id;
        let request = chat_request(invocation_id, text, &self.conversation, self.style);
        exchange.invocation_id += 1;
        let invocation = invocation_id.to_string();

        debug!(invocation_id, chars = text.chars().count(), "Sending chat request");
        exchange
            .sink
            .send(Message::Text(encode_frame(&request).into()))
            .await
            .map_err(|e| ChatError::Network(format!("couldn't write socket message: {e}")))?;

        let mut aggregator = StreamAggregator::new();
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => return Err(ChatError::Cancelled),
                f = exchange.frames.recv() => f,
            };
            let frame = match next {
                Some(frame) => frame?,
                None => return Err(ChatError::Closed),
            };
            if !frame.belongs_to(&invocation) {
                debug!(kind = frame.kind, "Skipping frame from an earlier invocation");
                continue;
            }
            if let Some(answer) = aggregator.push(&frame)? {
                info!(invocation_id, chars = answer.chars().count(), "Answer received");
                return Ok(answer);
            }
        }
    }
}

#[async_trait]
impl ChatStream for RealtimeChat {
    fn name(&self) -> &str {
        "realtime"
    }

    async fn write(&self, prompt: &str) -> Result<usize, ChatError> {
        ensure_open(&self.cancel)?;
        let length = prompt.chars().count();
        if length > MAX_MESSAGE_CHARS {
            return Err(ChatError::MessageTooLong {
                length,
                max: MAX_MESSAGE_CHARS,
            });
        }

        let permit = self.limiter.acquire(&self.cancel).await?;
        let result = self.exchange(prompt).await;
        permit.release().await;

        self.replies.push(result?)?;
        Ok(prompt.len())
    }

    async fn read(&self) -> Result<String, ChatError> {
        self.replies.next().await
    }

    async fn close(&self) -> Result<(), ChatError> {
        self.cancel.cancel();
        let mut exchange = self.exchange.lock().await;
        exchange
            .sink
            .close()
            .await
            .map_err(|e| ChatError::Network(format!("couldn't close socket: {e}")))
    }
}

impl Drop for RealtimeChat {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::socket;
    use futures::StreamExt;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use tokio_tungstenite::tungstenite::http::HeaderMap;

    const SEP: char = '\u{1e}';

    /// Serve one connection: ack the handshake, then answer each request
    /// with streamed updates, a final result, and a trailing completion.
    async fn spawn_hub() -> (String, tokio::sync::mpsc::UnboundedReceiver<Value>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (seen_tx, seen_rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();

            let hs = ws.next().await.unwrap().unwrap();
            assert!(hs.to_text().unwrap().contains(r#""protocol":"json""#));
            ws.send(Message::Text(format!("{{}}{SEP}").into()))
                .await
                .unwrap();

            while let Some(Ok(msg)) = ws.next().await {
                let Message::Text(text) = msg else { continue };
                let raw = text.trim_end_matches(SEP);
                let request: Value = serde_json::from_str(raw).unwrap();
                let id = request["invocationId"].as_str().unwrap().to_string();
                let prompt = request["arguments"][0]["message"]["text"]
                    .as_str()
                    .unwrap()
                    .to_string();
                seen_tx.send(request).unwrap();

                let update = |t: &str| {
                    format!(
                        r#"{{"type":1,"target":"update","arguments":[{{"messages":[{{"text":"{t}","author":"bot"}}]}}]}}{SEP}"#
                    )
                };
                // Two frames in one socket message, then the rest separately.
                let first = format!("{}{}", update("echo"), update("echo: "));
                ws.send(Message::Text(first.into())).await.unwrap();
                let done = format!(
                    r#"{{"type":2,"invocationId":"{id}","item":{{"messages":[{{"text":"echo: {prompt}","author":"bot"}}],"result":{{"value":"Success"}}}}}}{SEP}"#
                );
                ws.send(Message::Text(done.into())).await.unwrap();
                let complete = format!(r#"{{"type":3,"invocationId":"{id}"}}{SEP}"#);
                ws.send(Message::Text(complete.into())).await.unwrap();
            }
        });

        (format!("ws://{addr}"), seen_rx)
    }

    /// Like `spawn_hub`, but holds invocation 0's final frame until `release`
    /// fires. Returns the hub's view of events in the order they happened.
    async fn spawn_gated_hub(
        release: tokio::sync::oneshot::Receiver<()>,
    ) -> (String, std::sync::Arc<std::sync::Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let events = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = events.clone();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            ws.next().await.unwrap().unwrap();
            ws.send(Message::Text(format!("{{}}{SEP}").into()))
                .await
                .unwrap();

            let mut release = Some(release);
            while let Some(Ok(msg)) = ws.next().await {
                let Message::Text(text) = msg else { continue };
                let request: Value = serde_json::from_str(text.trim_end_matches(SEP)).unwrap();
                let id = request["invocationId"].as_str().unwrap().to_string();
                let prompt = request["arguments"][0]["message"]["text"]
                    .as_str()
                    .unwrap()
                    .to_string();
                log.lock().unwrap().push(format!("request {id}"));

                if id == "0" {
                    if let Some(release) = release.take() {
                        release.await.unwrap();
                    }
                }
                let done = format!(
                    r#"{{"type":2,"invocationId":"{id}","item":{{"messages":[{{"text":"echo: {prompt}","author":"bot"}}],"result":{{"value":"Success"}}}}}}{SEP}"#
                );
                log.lock().unwrap().push(format!("final {id}"));
                ws.send(Message::Text(done.into())).await.unwrap();
            }
        });

        (format!("ws://{addr}"), events)
    }

    async fn open_chat(url: &str) -> RealtimeChat {
        let cancel = CancellationToken::new();
        let socket = socket::connect(url, HeaderMap::new(), &cancel).await.unwrap();
        let conversation = Conversation {
            conversation_id: "conv".into(),
            client_id: "client".into(),
            conversation_signature: "sig".into(),
            result: None,
        };
        RealtimeChat::new(
            socket,
            conversation,
            ConversationStyle::Balanced,
            RateLimiter::new(Duration::from_millis(1)),
            cancel,
        )
    }

    #[tokio::test]
    async fn exchange_returns_final_answer() {
        let (url, mut seen) = spawn_hub().await;
        let chat = open_chat(&url).await;

        chat.write("ping").await.unwrap();
        assert_eq!(chat.read().await.unwrap(), "echo: ping");

        let request = seen.recv().await.unwrap();
        assert_eq!(request["invocationId"], "0");
        assert_eq!(request["arguments"][0]["isStartOfSession"], true);
        assert_eq!(request["arguments"][0]["conversationId"], "conv");
    }

    #[tokio::test]
    async fn invocation_ids_increase_and_stale_frames_are_ignored() {
        let (url, mut seen) = spawn_hub().await;
        let chat = open_chat(&url).await;

        chat.write("one").await.unwrap();
        assert_eq!(chat.read().await.unwrap(), "echo: one");
        chat.write("two").await.unwrap();
        assert_eq!(chat.read().await.unwrap(), "echo: two");

        seen.recv().await.unwrap();
        let second = seen.recv().await.unwrap();
        assert_eq!(second["invocationId"], "1");
        assert_eq!(second["arguments"][0]["isStartOfSession"], false);
    }

    #[tokio::test]
    async fn concurrent_writes_run_one_exchange_at_a_time() {
        let (release_tx, release_rx) = tokio::sync::oneshot::channel();
        let (url, events) = spawn_gated_hub(release_rx).await;
        let chat = open_chat(&url).await;

        let hold = async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let seen = events.lock().unwrap().clone();
            release_tx.send(()).unwrap();
            seen
        };
        let (first, second, seen_while_held) =
            tokio::join!(chat.write("one"), chat.write("two"), hold);
        first.unwrap();
        second.unwrap();

        assert_eq!(seen_while_held, vec!["request 0"]);
        assert_eq!(
            *events.lock().unwrap(),
            vec!["request 0", "final 0", "request 1", "final 1"]
        );
        assert_eq!(chat.read().await.unwrap(), "echo: one");
        assert_eq!(chat.read().await.unwrap(), "echo: two");
    }

    #[tokio::test]
    async fn long_message_rejected_before_io() {
        let (url, mut seen) = spawn_hub().await;
        let chat = open_chat(&url).await;

        let long = "é".repeat(MAX_MESSAGE_CHARS + 1);
        match chat.write(&long).await {
            Err(ChatError::MessageTooLong { length, max }) => {
                assert_eq!(length, MAX_MESSAGE_CHARS + 1);
                assert_eq!(max, MAX_MESSAGE_CHARS);
            }
            other => panic!("expected MessageTooLong, got {other:?}"),
        }
        // Exactly at the limit is fine.
        chat.write(&"a".repeat(MAX_MESSAGE_CHARS)).await.unwrap();
        let request = seen.recv().await.unwrap();
        assert_eq!(request["invocationId"], "0");
    }

    #[tokio::test]
    async fn close_cancels_pending_read() {
        let (url, _seen) = spawn_hub().await;
        let chat = std::sync::Arc::new(open_chat(&url).await);

        let reader = {
            let chat = chat.clone();
            tokio::spawn(async move { chat.read().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        chat.close().await.unwrap();

        assert!(matches!(reader.await.unwrap(), Err(ChatError::Cancelled)));
        assert!(matches!(chat.write("late").await, Err(ChatError::Cancelled)));
    }
}
