//! Events emitted by the [`Agent`](super::Agent) during a turn.
//!
//! A frontend consumes these from the channel returned by
//! [`Agent::process()`](super::Agent::process) and renders them in
//! arrival order. Unlike context events, agent events are never dropped —
//! the UI depends on seeing every one.

use crate::{ToolResult, ToolUse, Usage};

/// One event in the agent's output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Incremental assistant text.
    TextDelta { content: String },
    /// The model requested a tool invocation.
    ToolCall { tool_use: ToolUse },
    /// A tool invocation completed (successfully or not).
    ToolResult { tool_result: ToolResult },
    /// A destructive tool call awaits confirmation; `content` is the
    /// plain-text preview for the prompt.
    ToolPreview { content: String, tool_use: ToolUse },
    /// The provider finished one completion.
    MessageDone { usage: Option<Usage> },
    /// The turn failed; no further events follow.
    Error { message: String },
    /// Token accounting changed (after user input, assistant output, tool
    /// results, or a context rewrite).
    TokenUpdate(TokenUpdate),
    /// The conversation history was rewritten by the context manager.
    ContextUpdate { content: String },
}

/// Budget numbers for the status line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenUpdate {
    pub current_tokens: usize,
    pub max_tokens: usize,
    pub usage_percent: f64,
    /// Session total (input + output) reported by providers so far.
    pub session_tokens: u64,
    pub cost: f64,
    pub at_warning: bool,
}
