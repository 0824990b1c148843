//! Heuristic token estimation for messages and their content blocks.
//!
//! Exact tokenizer fidelity is a non-goal: the estimator only has to be
//! cheap, deterministic, and close enough for budget decisions. The
//! default assumes ~4 characters per token, which tracks English text and
//! source code within the error margin the thresholds tolerate.

use crate::{ContentBlock, Message, MessageRole};

/// Default characters per token.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;

/// Fixed token cost charged for an image block.
const IMAGE_TOKENS: usize = 1500;

/// Pluggable token estimator over messages.
///
/// Implementations must be pure and thread-safe: the agent loop, the
/// context manager, and UI snapshots all estimate concurrently.
pub trait TokenEstimator: Send + Sync {
    /// Estimate tokens for a plain string.
    fn estimate_text(&self, text: &str) -> usize;

    /// Estimate tokens for a whole message, with per-block accounting.
    fn estimate_message(&self, msg: &Message) -> usize;

    /// Estimate tokens for a message slice.
    fn estimate_messages(&self, msgs: &[Message]) -> usize {
        msgs.iter().map(|m| self.estimate_message(m)).sum()
    }
}

/// The default chars-per-token estimator.
///
/// Per-message accounting: a base of 4 tokens per message, plus per-block
/// costs — text at the raw ratio, tool use at 20 + name + serialized
/// input, tool results at 10 + content, images at a fixed 1500.
#[derive(Debug, Clone)]
pub struct SimpleEstimator {
    pub chars_per_token: f64,
}

impl Default for SimpleEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl SimpleEstimator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenEstimator for SimpleEstimator {
    fn estimate_text(&self, text: &str) -> usize {
        let ratio = if self.chars_per_token > 0.0 {
            self.chars_per_token
        } else {
            DEFAULT_CHARS_PER_TOKEN
        };
        (text.chars().count() as f64 / ratio) as usize
    }

    fn estimate_message(&self, msg: &Message) -> usize {
        let mut total = 4;

        for block in &msg.content {
            match block {
                ContentBlock::Text { text } => total += self.estimate_text(text),
                ContentBlock::ToolUse(tu) => {
                    total += 20;
                    total += self.estimate_text(&tu.name);
                    if let Ok(input_json) = serde_json::to_string(&tu.input) {
                        total += self.estimate_text(&input_json);
                    }
                }
                ContentBlock::ToolResult(tr) => {
                    total += 10;
                    total += self.estimate_text(&tr.content);
                }
                ContentBlock::Image { .. } => total += IMAGE_TOKENS,
            }
        }

        total
    }
}

/// Estimate the token cost of a system prompt (raw text plus framing).
pub fn estimate_system_prompt(prompt: &str) -> usize {
    SimpleEstimator::new().estimate_text(prompt) + 10
}

/// Per-message token index entry, kept by
/// [`Memory`](crate::agent::Memory) in parallel with the message log.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub message_index: usize,
    pub tokens: usize,
    pub role: MessageRole,
    /// True iff the message is tool-role or contains a tool-result block.
    pub is_prunable: bool,
    /// Name of the tool involved, when the message carries a tool use.
    pub tool_name: String,
    /// Id linkage for tool-result messages.
    pub tool_use_id: String,
}

impl TokenInfo {
    /// Build the index entry for a message at `index`.
    pub fn for_message(index: usize, msg: &Message, estimator: &dyn TokenEstimator) -> Self {
        Self {
            message_index: index,
            tokens: estimator.estimate_message(msg),
            role: msg.role,
            is_prunable: is_prunable_message(msg),
            tool_name: extract_tool_name(msg),
            tool_use_id: extract_tool_use_id(msg),
        }
    }
}

/// A message is prunable iff it is tool-role or carries any tool-result
/// block.
pub fn is_prunable_message(msg: &Message) -> bool {
    if msg.role == MessageRole::Tool {
        return true;
    }
    msg.content
        .iter()
        .any(|b| matches!(b, ContentBlock::ToolResult(_)))
}

fn extract_tool_name(msg: &Message) -> String {
    for block in &msg.content {
        if let ContentBlock::ToolUse(tu) = block {
            return tu.name.clone();
        }
    }
    String::new()
}

fn extract_tool_use_id(msg: &Message) -> String {
    for block in &msg.content {
        if let ContentBlock::ToolResult(tr) = block {
            return tr.tool_use_id.clone();
        }
    }
    String::new()
}
