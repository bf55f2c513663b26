//! Real-time chat backend.
//!
//! Connection lifecycle: an HTTP bootstrap creates a server-side
//! conversation (emulating the browser that captured the `Session`), the
//! refreshed cookie is persisted, then a socket is opened and handshaken.
//! Each write is one framed invocation whose streamed answer is aggregated
//! until a terminal frame arrives.

pub mod chat;
pub mod client;
pub mod protocol;
pub mod session;
pub mod socket;

pub use chat::RealtimeChat;
pub use client::RealtimeClient;
pub use protocol::{Conversation, Frame, MAX_MESSAGE_CHARS, StreamAggregator};
pub use session::{Session, SessionStore};
