//! Token estimation for budgeting the replayed context.
//!
//! Uses the cl100k_base BPE (GPT-3.5/GPT-4) via tiktoken-rs. The BPE tables
//! are built once and cached; if they cannot be built, a 4-characters-per-token
//! heuristic is used instead so budgeting never fails outright.

use ironloop_core::{MESSAGE_OVERHEAD_TOKENS, Message};
use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;

static CL100K_BASE: OnceLock<Option<CoreBPE>> = OnceLock::new();

fn cl100k_base() -> Option<&'static CoreBPE> {
    CL100K_BASE
        .get_or_init(|| match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                tracing::warn!(error = %e, "cl100k_base unavailable, using character heuristic");
                None
            }
        })
        .as_ref()
}

/// Count tokens in a piece of text.
pub fn count_tokens(text: &str) -> usize {
    match cl100k_base() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => heuristic_tokens(text),
    }
}

fn heuristic_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Estimate the prompt size of a message list: the token count of all
/// contents joined with trailing newlines, plus a fixed overhead per message.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    let mut joined = String::new();
    for message in messages {
        joined.push_str(&message.content);
        joined.push('\n');
    }
    count_tokens(&joined) + MESSAGE_OVERHEAD_TOKENS * messages.len()
}
