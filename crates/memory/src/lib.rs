//! Conversation memory implementations for ironloop.

pub mod fixed_window;
pub mod tokens;

pub use fixed_window::FixedWindowMemory;
pub use tokens::{count_tokens, estimate_tokens};
