//! LLM providers: one uniform streaming chat interface over three
//! incompatible wire protocols.
//!
//! Every adapter normalizes its protocol into the same [`ChatEvent`]
//! sequence — exactly one `MessageStart`, then text deltas and tool uses
//! in arrival order, then exactly one `MessageDone` (or an in-stream
//! `Error` that terminates early). The agent loop consumes the events
//! without knowing which protocol produced them.
//!
//! - [`anthropic`] — Anthropic Messages API, SSE framing.
//! - [`openai`] — OpenAI chat completions, SSE framing with tool-call
//!   fragments accumulated across chunks.
//! - [`ollama`] — local Ollama, NDJSON framing, no authentication.
//!
//! Transport errors before the stream starts (non-2xx statuses, failed
//! connections) fail the [`Provider::chat`] call itself; anything after
//! that arrives as an in-stream [`ChatEvent::Error`].

pub mod anthropic;
pub mod ollama;
pub mod openai;
pub mod registry;
pub mod stream;
pub mod testing;

pub use anthropic::AnthropicClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;
pub use registry::{parse_model_string, ProviderRegistry};

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::{ChatEvent, ChatRequest, Model};

/// Channel buffer for provider event streams.
pub(crate) const CHAT_EVENT_BUFFER: usize = 10;

/// Boxed future returned by [`Provider`] operations.
///
/// Keeps the trait dyn-compatible so adapters can live behind
/// `Arc<dyn Provider>` handles.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send + 'a>>;

/// The receiving half of a normalized completion stream.
///
/// Lazy and finite: events arrive as the wire produces them and the
/// channel closes when the completion (or its error) is fully delivered.
/// Dropping the receiver cancels the underlying transfer.
pub type ChatStream = mpsc::Receiver<ChatEvent>;

/// A streaming chat provider.
pub trait Provider: Send + Sync {
    /// Stable lower-case provider name (registry key).
    fn name(&self) -> &str;

    fn supports_tools(&self) -> bool;

    fn supports_vision(&self) -> bool;

    /// Start a streaming completion.
    ///
    /// Resolves to the event stream once the response status is known;
    /// non-2xx statuses resolve to `Err` without producing any events.
    fn chat(&self, req: ChatRequest) -> ProviderFuture<'_, ChatStream>;

    /// Models this provider can serve.
    fn list_models(&self) -> ProviderFuture<'_, Vec<Model>>;
}
