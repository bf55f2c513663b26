//! Chat backends for ironloop.
//!
//! Every backend implements `ironloop_core::ChatStream`. The factory picks
//! one from configuration; decorators wrap any of them.

pub mod decorators;
pub mod factory;
pub mod openai_compat;
pub mod ratelimit;
pub mod realtime;

pub use decorators::{ExitDetector, TranscriptLogger, UNAVAILABLE_REPLY, UnavailableChat};
pub use factory::ChatFactory;
pub use openai_compat::{OpenAiChat, OpenAiClient};
pub use ratelimit::{Permit, RateLimiter};
pub use realtime::{RealtimeChat, RealtimeClient, Session, SessionStore};
