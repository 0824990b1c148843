//! Terminal coding assistant engine: an LLM agent loop with tools,
//! context management, and streaming providers.
//!
//! `potus` drives a large language model through a tool-augmented
//! conversation against a working directory. The user types a request; the
//! [`Agent`](agent::Agent) streams a chat completion from a provider,
//! executes any requested tools (gated behind an interactive confirmation
//! for destructive operations), feeds results back, and iterates until the
//! model stops asking for tools.
//!
//! # Where to find things
//!
//! If you're looking for how to...
//!
//! - **Run the conversation loop:** see [`Agent`](agent::Agent) and
//!   [`AgentConfig`](agent::AgentConfig). `Agent::process()` returns a
//!   stream of [`AgentEvent`](agent::AgentEvent)s a frontend renders.
//! - **Talk to an LLM:** see the [`Provider`](providers::Provider) trait
//!   and its three adapters — [`providers::anthropic`],
//!   [`providers::openai`], [`providers::ollama`] — all normalized to the
//!   same [`ChatEvent`] stream.
//! - **Define tools for the model to call:** see the
//!   [`Tool`](tools::Tool) trait, [`ToolRegistry`](tools::ToolRegistry),
//!   and the built-in file/search/shell tools in [`tools`].
//! - **Keep the context window under control:** see
//!   [`context::Manager`], which combines the token
//!   [`Budget`](context::Budget), the [`Pruner`](context::Pruner), and
//!   the LLM-backed [`Compactor`](context::Compactor).
//! - **Gate destructive tool calls:** see
//!   [`Executor`](agent::Executor) and the
//!   [`Settings`](permissions::Settings) document at
//!   `.potus/settings.json`.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`agent`] | [`Agent`](agent::Agent) loop, conversation [`Memory`](agent::Memory), [`Executor`](agent::Executor), agent events |
//! | [`providers`] | [`Provider`](providers::Provider) trait, Anthropic/OpenAI/Ollama adapters, [`ProviderRegistry`](providers::ProviderRegistry) |
//! | [`context`] | Token estimation, budget/cost accounting, pruning, compaction, project-context files |
//! | [`tools`] | [`Tool`](tools::Tool) trait, registry, built-in tools, diff previews |
//! | [`permissions`] | Persisted always-allow decisions |
//!
//! # Design principles
//!
//! 1. **One event stream per concern.** Providers normalize three
//!    incompatible wire protocols into a single [`ChatEvent`] sequence;
//!    the agent normalizes its whole turn into a single
//!    [`AgentEvent`](agent::AgentEvent) sequence. Frontends only ever
//!    consume channels.
//!
//! 2. **Never panic across the loop boundary.** Anything survivable
//!    becomes either a tool result with `is_error = true` (so the model
//!    can react) or an `Error` event (so the UI can display it).
//!
//! 3. **Context is the scarcest resource.** Every message carries a token
//!    estimate; the context manager prunes stale tool results and
//!    compacts old history before the window overflows.

pub mod agent;
pub mod context;
pub mod permissions;
pub mod prelude;
pub mod providers;
pub mod tools;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// Re-export schemars for downstream crates defining tools.
pub use schemars;

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`. This is the bridge between strong Rust types
/// and the loose JSON object every provider's function-calling API expects.
///
/// # Example
///
/// ```
/// use potus::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct ReadArgs {
///     path: String,
/// }
///
/// let schema = json_schema_for::<ReadArgs>();
/// assert_eq!(schema["type"], "object");
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message in the conversation: a role plus an ordered sequence of
/// content blocks.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![ContentBlock::text(text)],
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: vec![ContentBlock::text(text)],
        }
    }

    /// A tool-role message carrying one result block per executed call.
    pub fn tool_results(results: Vec<ToolResult>) -> Self {
        Self {
            role: MessageRole::Tool,
            content: results.into_iter().map(ContentBlock::ToolResult).collect(),
        }
    }

    /// Concatenated text of all `Text` blocks.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if let ContentBlock::Text { text } = block {
                out.push_str(text);
            }
        }
        out
    }

    /// All tool-use blocks in this message, in order.
    pub fn tool_uses(&self) -> Vec<&ToolUse> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse(tu) => Some(tu),
                _ => None,
            })
            .collect()
    }

    /// All tool-result blocks in this message, in order.
    pub fn tool_results_blocks(&self) -> Vec<&ToolResult> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult(tr) => Some(tr),
                _ => None,
            })
            .collect()
    }
}

/// One block of message content.
///
/// Memory, the token estimator, and every provider adapter branch on this
/// tag. `ToolUse` blocks appear only in assistant messages; `ToolResult`
/// blocks only in tool-role messages.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { source: ImageSource },
    ToolUse(ToolUse),
    ToolResult(ToolResult),
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }
}

/// A base64-encoded image payload.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ImageSource {
    /// Encoding type, e.g. `"base64"`.
    pub encoding: String,
    /// Media type, e.g. `"image/png"`.
    pub media_type: String,
    pub data: String,
}

/// An assistant-side request to invoke a named tool.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    /// Always a JSON object; tools do their own field validation.
    pub input: serde_json::Value,
}

/// The orchestrator's reply to a tool call, fed back to the model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolResult {
    pub tool_use_id: String,
    pub content: String,
    pub is_error: bool,
}

// ── Chat request / stream events ───────────────────────────────────

/// A provider-neutral chat completion request.
///
/// The system prompt is carried separately from `messages`; each adapter
/// places it wherever its wire protocol expects.
#[derive(Clone, Debug, Default)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub system: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// A provider-neutral tool advertisement: the [`tools::Tool`] capability
/// with the action stripped.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// One event from a provider's normalized completion stream.
///
/// Every adapter emits, per completion: exactly one `MessageStart`, then
/// any number of `TextDelta` / `ToolUse` events in arrival order, then
/// exactly one `MessageDone` — or an `Error` that terminates the stream
/// in place of whatever remained.
#[derive(Clone, Debug, PartialEq)]
pub enum ChatEvent {
    MessageStart,
    TextDelta(String),
    ToolUse(ToolUse),
    MessageDone(Option<Usage>),
    Error(String),
}

/// Token usage reported by a provider for one completion.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

// ── Model metadata ─────────────────────────────────────────────────

/// Metadata for a model a provider can serve.
#[derive(Clone, Debug, PartialEq)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub provider: String,
    /// Context window in tokens; 0 when unknown.
    pub context_size: u32,
    pub pricing: ModelPricing,
}

/// Per-model pricing in USD per million tokens.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ModelPricing {
    pub input_per_1m: f64,
    pub output_per_1m: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_constructors() {
        let user = Message::user("hello");
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(user.text(), "hello");

        let assist = Message::assistant_text("world");
        assert_eq!(assist.role, MessageRole::Assistant);

        let tool = Message::tool_results(vec![ToolResult {
            tool_use_id: "t1".into(),
            content: "ok".into(),
            is_error: false,
        }]);
        assert_eq!(tool.role, MessageRole::Tool);
        assert_eq!(tool.tool_results_blocks().len(), 1);
        assert_eq!(tool.tool_results_blocks()[0].tool_use_id, "t1");
    }

    #[test]
    fn text_concatenates_only_text_blocks() {
        let msg = Message {
            role: MessageRole::Assistant,
            content: vec![
                ContentBlock::text("reading"),
                ContentBlock::ToolUse(ToolUse {
                    id: "t1".into(),
                    name: "file_read".into(),
                    input: serde_json::json!({"path": "foo"}),
                }),
                ContentBlock::text(" done"),
            ],
        };
        assert_eq!(msg.text(), "reading done");
        assert_eq!(msg.tool_uses().len(), 1);
        assert_eq!(msg.tool_uses()[0].name, "file_read");
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MessageRole::Assistant).unwrap(),
            "\"assistant\""
        );
        assert_eq!(MessageRole::Tool.to_string(), "tool");
    }

    #[test]
    fn json_schema_for_typed_args() {
        use schemars::JsonSchema;

        #[derive(serde::Deserialize, JsonSchema)]
        #[allow(dead_code)]
        struct Args {
            path: String,
        }

        let schema = json_schema_for::<Args>();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"].get("path").is_some());
    }
}
