//! # Ironloop Core
//!
//! Domain types, traits, and error definitions for the ironloop
//! conversational driver. This crate defines the seams every other crate
//! implements against: chat backends, conversation memory, and commands.
//!
//! ## Design Philosophy
//!
//! Every subsystem is defined as a trait here. Implementations live in their
//! respective crates, which keeps the dependency graph pointing inward and
//! lets tests swap in scripted chats and commands.

pub mod chat;
pub mod command;
pub mod error;
pub mod memory;
pub mod message;

// Re-export key types at crate root for ergonomics
pub use chat::{ChatStream, ReplyQueue, ensure_open};
pub use command::{
    Command, CommandRegistry, CommandRequest, CommandResult, CommandValue, text_arg,
};
pub use error::{ChatError, CommandError, Error, MemoryError, ParseError, Result};
pub use memory::{ConversationMemory, MESSAGE_OVERHEAD_TOKENS, RESPONSE_RESERVE_TOKENS};
pub use message::{Message, Role};
