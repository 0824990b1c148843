//! Convenience re-exports for building on the engine.
//!
//! ```ignore
//! use potus::prelude::*;
//! ```

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{
    json_schema_for, ChatEvent, ChatRequest, ContentBlock, ImageSource, Message, MessageRole,
    Model, ModelPricing, ToolResult, ToolSchema, ToolUse, Usage,
};

// ── Agent runtime ───────────────────────────────────────────────────
pub use crate::agent::{
    Agent, AgentConfig, AgentEvent, ConfirmHandler, ContextOptions, Decision, Executor, Memory,
    TokenUpdate,
};

// ── Providers ───────────────────────────────────────────────────────
pub use crate::providers::{
    parse_model_string, AnthropicClient, ChatStream, OllamaClient, OpenAiClient, Provider,
    ProviderRegistry,
};

// ── Context management ──────────────────────────────────────────────
pub use crate::context::{Budget, ContextEvent, Manager, SimpleEstimator, TokenEstimator};

// ── Tools ───────────────────────────────────────────────────────────
pub use crate::tools::{
    parse_args, register_builtin_tools, Tool, ToolOutcome, ToolRegistry,
};

// ── Permissions ─────────────────────────────────────────────────────
pub use crate::permissions::Settings;
