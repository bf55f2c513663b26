//! The drivers of ironloop — the loops that keep a conversation going.
//!
//! The autonomous loop follows a **Write → Read → Dispatch** cycle:
//!
//! 1. **Write** the prompt to the chat
//! 2. **Read** the model's reply
//! 3. **Parse** the command array out of the reply
//! 4. **Dispatch** each command and collect its result
//! 5. **Feed back** the pretty-printed result list as the next prompt
//!
//! The loop continues until a command fires the exit signal, the step bound
//! is reached, or the run is cancelled. Pair mode relays between two chats;
//! bulk mode runs fixed prompt groups.

pub mod bulk;
pub mod dispatcher;
pub mod error;
pub mod loop_runner;
pub mod parser;
pub mod prompt;
pub mod relay;

#[cfg(test)]
mod test_helpers;

pub use bulk::{BulkExchange, ChatSource, FactoryChats, load_groups, run_groups, write_output};
pub use dispatcher::{CommandDispatcher, PARSE_ERROR_KEY};
pub use error::AgentError;
pub use loop_runner::{AgentLoop, LoopOutcome, StopReason};
pub use parser::{normalize_name, parse};
pub use prompt::{PAIR_EXIT_TRIGGER, auto_prompt, pair_prompt};
pub use relay::PairRelay;
