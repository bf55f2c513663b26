//! Wire format of the real-time chat hub.
//!
//! Every message on the socket is one or more JSON frames, each terminated by
//! the record separator `0x1E`. Outbound requests are type 4 invocations;
//! inbound answers stream in as type 1 updates and end with a type 2 result
//! or a type 3 completion.

use ironloop_config::ConversationStyle;
use ironloop_core::ChatError;
use serde::Deserialize;
use serde_json::{Value, json};

/// Frame terminator.
pub const DELIMITER: char = '\u{1e}';

/// Longest message the hub accepts, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// First frame sent after the socket opens.
pub fn handshake_frame() -> String {
    format!(r#"{{"protocol":"json","version":1}}{DELIMITER}"#)
}

/// Split a socket message into its non-empty frames.
pub fn split_frames(message: &str) -> impl Iterator<Item = &str> {
    message
        .split(DELIMITER)
        .map(str::trim)
        .filter(|f| !f.is_empty())
}

/// Bootstrap response: identifiers for a fresh server-side conversation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(default)]
    pub conversation_id: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub conversation_signature: String,
    pub result: Option<ResultStatus>,
}

impl Conversation {
    /// The conversation is usable only when the server reports `Success`.
    pub fn ensure_success(&self) -> Result<(), ChatError> {
        match &self.result {
            Some(r) if r.is_success() => Ok(()),
            Some(r) => Err(ChatError::Protocol(format!(
                "invalid conversation result: {} ({})",
                r.value.as_deref().unwrap_or("none"),
                r.message.as_deref().unwrap_or("")
            ))),
            None => Err(ChatError::Protocol(
                "conversation result missing from bootstrap response".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultStatus {
    pub value: Option<String>,
    pub message: Option<String>,
}

impl ResultStatus {
    pub fn is_success(&self) -> bool {
        self.value.as_deref() == Some("Success")
    }
}

fn style_option(style: ConversationStyle) -> &'static str {
    match style {
        ConversationStyle::Creative => "h3relaxedimg",
        ConversationStyle::Balanced => "galileo",
        ConversationStyle::Precise => "h3precise",
    }
}

/// Build the type 4 invocation frame for one user message.
pub fn chat_request(
    invocation_id: u64,
    text: &str,
    conversation: &Conversation,
    style: ConversationStyle,
) -> Value {
    let trace_id = hex::encode(rand::random::<[u8; 16]>());
    json!({
        "invocationId": invocation_id.to_string(),
        "target": "chat",
        "type": 4,
        "arguments": [{
            "source": "cib",
            "optionsSets": [
                "nlu_direct_response_filter",
                "deepleo",
                "disable_emoji_spoken_text",
                "responsible_ai_policy_235",
                "enablemm",
                style_option(style),
                "dtappid",
                "cricinfo",
                "cricinfov2",
                "dv3sugg",
            ],
            "sliceIds": ["222dtappid", "225cricinfo", "224locals0"],
            "traceId": trace_id,
            "isStartOfSession": invocation_id == 0,
            "message": {
                "author": "user",
                "inputMethod": "Keyboard",
                "text": text,
                "messageType": "Chat",
            },
            "conversationSignature": conversation.conversation_signature,
            "participant": { "id": conversation.client_id },
            "conversationId": conversation.conversation_id,
        }],
    })
}

/// Encode a frame with its terminator.
pub fn encode_frame(frame: &Value) -> String {
    format!("{frame}{DELIMITER}")
}

/// An inbound frame. Only the fields the aggregator needs are decoded.
#[derive(Debug, Clone, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(rename = "invocationId")]
    pub invocation_id: Option<String>,
    #[serde(default)]
    pub arguments: Vec<UpdateArguments>,
    pub item: Option<FinalItem>,
    pub error: Option<String>,
}

impl Frame {
    pub fn decode(raw: &str) -> Result<Self, ChatError> {
        serde_json::from_str(raw)
            .map_err(|e| ChatError::Protocol(format!("couldn't decode frame ({raw}): {e}")))
    }

    /// Whether this frame may belong to the given invocation. Frames without
    /// an id (streamed updates, pings) are attributed to the one in flight.
    pub fn belongs_to(&self, invocation_id: &str) -> bool {
        self.invocation_id
            .as_deref()
            .is_none_or(|id| id == invocation_id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateArguments {
    #[serde(default)]
    pub messages: Vec<BotMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalItem {
    #[serde(default)]
    pub messages: Vec<BotMessage>,
    pub result: Option<ResultStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotMessage {
    #[serde(default)]
    pub text: String,
    pub author: Option<String>,
    /// Set on side-channel messages (search progress, suggestions)
    pub message_type: Option<String>,
}

impl BotMessage {
    fn is_answer(&self) -> bool {
        self.author.as_deref().is_none_or(|a| a == "bot")
            && self.message_type.is_none()
            && !self.text.is_empty()
    }
}

fn last_answer(messages: &[BotMessage]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .find(|m| m.is_answer())
        .map(|m| m.text.as_str())
}

/// Accumulates streamed partial answers and releases the full text only on
/// a terminal frame.
#[derive(Debug, Default)]
pub struct StreamAggregator {
    partial: String,
}

impl StreamAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The latest partial answer seen so far.
    pub fn partial(&self) -> &str {
        &self.partial
    }

    /// Feed one frame. Returns the complete answer once the exchange ends.
    pub fn push(&mut self, frame: &Frame) -> Result<Option<String>, ChatError> {
        match frame.kind {
            // Update: each snapshot carries the answer so far.
            1 => {
                let latest = frame
                    .arguments
                    .iter()
                    .rev()
                    .find_map(|a| last_answer(&a.messages));
                if let Some(text) = latest {
                    self.partial = text.to_string();
                }
                Ok(None)
            }
            2 => {
                let item = frame.item.clone().unwrap_or_default();
                if let Some(result) = &item.result
                    && !result.is_success()
                {
                    return Err(ChatError::Protocol(format!(
                        "chat failed: {} ({})",
                        result.value.as_deref().unwrap_or("none"),
                        result.message.as_deref().unwrap_or("")
                    )));
                }
                let answer = last_answer(&item.messages)
                    .map(str::to_string)
                    .unwrap_or_else(|| std::mem::take(&mut self.partial));
                Ok(Some(answer))
            }
            3 => Ok(Some(std::mem::take(&mut self.partial))),
            7 => Err(ChatError::Protocol(format!(
                "connection closed by server: {}",
                frame.error.as_deref().unwrap_or("no reason given")
            ))),
            // Pings (6) and anything else carry no answer text.
            _ => Ok(None),
        }
    }
}
