//! The agent loop: turn orchestration, tool dispatch, bounded iteration.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::agent::events::{AgentEvent, TokenUpdate};
use crate::agent::executor::{ConfirmFuture, ConfirmHandler, Decision, Executor};
use crate::agent::memory::Memory;
use crate::context::estimator::estimate_system_prompt;
use crate::context::events::ContextEvent;
use crate::context::manager::{Manager, ManagerConfig};
use crate::permissions::Settings;
use crate::providers::Provider;
use crate::tools::core::ToolRegistry;
use crate::{ChatEvent, ChatRequest, ContentBlock, Message, MessageRole, Model, ToolResult, ToolUse};

/// Upper bound on model→tool→model iterations per user turn. Reaching
/// the cap exits silently; the next user turn continues the session.
pub const MAX_TOOL_ITERATIONS: usize = 10;

/// Buffer for the agent-event channel. Events are never dropped; a slow
/// consumer backpressures the loop instead.
const AGENT_EVENT_BUFFER: usize = 100;

/// Context-management settings for a session.
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub max_tokens: usize,
    pub reserve_for_response: usize,
    /// Fractional thresholds; non-positive selects the defaults
    /// (0.80 / 0.90).
    pub warn_threshold: f64,
    pub compact_threshold: f64,
    pub auto_compact: bool,
    pub auto_prune: bool,
    pub protected_tools: Vec<String>,
    pub load_project_context: bool,
    pub project_context_files: Vec<String>,
    pub max_project_tokens: usize,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            max_tokens: 100_000,
            reserve_for_response: 4_096,
            warn_threshold: 0.0,
            compact_threshold: 0.0,
            auto_compact: true,
            auto_prune: true,
            protected_tools: Vec::new(),
            load_project_context: true,
            project_context_files: Vec::new(),
            max_project_tokens: 8_192,
        }
    }
}

/// Everything needed to construct an [`Agent`].
pub struct AgentConfig {
    pub provider: Arc<dyn Provider>,
    pub tools: Arc<ToolRegistry>,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub model: String,
    /// `None` disables context management entirely.
    pub context: Option<ContextOptions>,
    /// Metadata for the active model (context size, pricing).
    pub model_info: Option<Model>,
    pub workdir: PathBuf,
    /// Receiving half of the confirmation channel; `None` auto-approves
    /// by skipping the gate.
    pub confirm_rx: Option<mpsc::Receiver<Decision>>,
    pub settings: Option<Arc<Settings>>,
    /// Optional subscriber for droppable context events.
    pub context_event_tx: Option<mpsc::Sender<ContextEvent>>,
}

/// The conversational engine: drives one provider, one tool registry,
/// and one conversation memory through tool-augmented turns.
///
/// `Agent` is a cheap handle over shared session state; clone it freely.
/// Each [`process()`](Agent::process) call runs its loop on a dedicated
/// task.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    memory: Arc<Memory>,
    executor: Executor,
    context_manager: Option<Arc<Manager>>,
    system_prompt: String,
    max_tokens: u32,
    temperature: f64,
    model: String,
    confirm_rx: Option<tokio::sync::Mutex<mpsc::Receiver<Decision>>>,
}

impl Agent {
    pub fn new(cfg: AgentConfig) -> Self {
        let context_manager = cfg.context.as_ref().map(|ctx| {
            let manager = Manager::new(ManagerConfig {
                provider: Some(cfg.provider.clone()),
                model: cfg.model.clone(),
                max_tokens: ctx.max_tokens,
                reserve_for_response: ctx.reserve_for_response,
                model_context_size: cfg
                    .model_info
                    .as_ref()
                    .map(|m| m.context_size as usize)
                    .unwrap_or(0),
                warn_threshold: ctx.warn_threshold,
                compact_threshold: ctx.compact_threshold,
                auto_compact: ctx.auto_compact,
                auto_prune: ctx.auto_prune,
                protected_tools: ctx.protected_tools.clone(),
                project_context_files: ctx.project_context_files.clone(),
                max_project_tokens: ctx.max_project_tokens,
                event_tx: cfg.context_event_tx.clone(),
            });

            if let Some(info) = &cfg.model_info {
                manager.set_pricing(info.pricing.input_per_1m, info.pricing.output_per_1m);
            }
            if ctx.load_project_context {
                manager.load_project_context(&cfg.workdir);
            }

            Arc::new(manager)
        });

        // Project context rides inside the system prompt.
        let mut system_prompt = cfg.system_prompt;
        if let Some(manager) = &context_manager {
            system_prompt.push_str(&manager.project_context_for_prompt());
        }

        let memory = match &context_manager {
            Some(manager) => Arc::new(Memory::new(manager.estimator())),
            None => Arc::new(Memory::with_default_estimator()),
        };
        memory.set_system_tokens(estimate_system_prompt(&system_prompt));

        let executor = Executor::new(cfg.tools.clone(), cfg.settings, cfg.workdir);

        Self {
            inner: Arc::new(AgentInner {
                provider: cfg.provider,
                tools: cfg.tools,
                memory,
                executor,
                context_manager,
                system_prompt,
                max_tokens: cfg.max_tokens,
                temperature: cfg.temperature,
                model: cfg.model,
                confirm_rx: cfg.confirm_rx.map(tokio::sync::Mutex::new),
            }),
        }
    }

    /// Process one user message.
    ///
    /// Returns the event stream for the turn. The loop runs on its own
    /// task and closes the channel when the turn completes (or errors,
    /// or hits the iteration cap). Dropping the receiver cancels the
    /// turn at its next suspension point.
    pub fn process(&self, user_text: impl Into<String>) -> mpsc::Receiver<AgentEvent> {
        let (tx, rx) = mpsc::channel(AGENT_EVENT_BUFFER);
        let inner = self.inner.clone();
        let text = user_text.into();
        tokio::spawn(async move {
            inner.process_loop(text, tx).await;
        });
        rx
    }

    pub fn memory(&self) -> Arc<Memory> {
        self.inner.memory.clone()
    }

    pub fn context_manager(&self) -> Option<Arc<Manager>> {
        self.inner.context_manager.clone()
    }

    pub fn token_summary(&self) -> crate::agent::memory::TokenSummary {
        self.inner.memory.token_summary()
    }
}

impl AgentInner {
    async fn process_loop(self: Arc<Self>, user_text: String, tx: mpsc::Sender<AgentEvent>) {
        self.memory.add_user(user_text);
        if !self.emit_token_update(&tx).await {
            return;
        }

        let confirm = self.confirm_rx.as_ref().map(|rx| ChannelConfirm {
            event_tx: &tx,
            confirm_rx: rx,
        });

        for iteration in 0..MAX_TOOL_ITERATIONS {
            let mut messages = self.memory.get_messages();
            let token_info = self.memory.get_token_info();

            // Context policy runs once per iteration, before the request.
            if let Some(manager) = &self.context_manager {
                match manager.prepare(&messages, &token_info).await {
                    Err(e) => {
                        // Compaction failure is turn-survivable: report it
                        // and proceed with the unmodified history.
                        if !send(&tx, AgentEvent::Error {
                            message: format!("context management failed: {e}"),
                        })
                        .await
                        {
                            return;
                        }
                    }
                    Ok(prepared) => {
                        if prepared != messages {
                            self.memory.replace(prepared.clone());
                            messages = prepared;

                            if !send(&tx, AgentEvent::ContextUpdate {
                                content:
                                    "Conversation history was optimized to manage context size."
                                        .to_string(),
                            })
                            .await
                            {
                                return;
                            }
                            if !self.emit_token_update(&tx).await {
                                return;
                            }
                        }
                    }
                }
            }

            let request = ChatRequest {
                model: self.model.clone(),
                messages,
                tools: self.tools.to_provider_tools(),
                system: self.system_prompt.clone(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            };

            let mut events = match self.provider.chat(request).await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = send(&tx, AgentEvent::Error {
                        message: format!("failed to call provider: {e}"),
                    })
                    .await;
                    return;
                }
            };

            // ── Consume the completion stream ──
            let mut assistant_blocks: Vec<ContentBlock> = Vec::new();
            let mut text_buffer = String::new();
            let mut tool_calls: Vec<ToolUse> = Vec::new();

            while let Some(event) = events.recv().await {
                match event {
                    ChatEvent::MessageStart => {}

                    ChatEvent::TextDelta(delta) => {
                        text_buffer.push_str(&delta);
                        if !send(&tx, AgentEvent::TextDelta { content: delta }).await {
                            return;
                        }
                    }

                    ChatEvent::ToolUse(tool_use) => {
                        flush_text(&mut text_buffer, &mut assistant_blocks);
                        assistant_blocks.push(ContentBlock::ToolUse(tool_use.clone()));
                        tool_calls.push(tool_use.clone());
                        if !send(&tx, AgentEvent::ToolCall { tool_use }).await {
                            return;
                        }
                    }

                    ChatEvent::MessageDone(usage) => {
                        flush_text(&mut text_buffer, &mut assistant_blocks);
                        if let (Some(usage), Some(manager)) = (usage, &self.context_manager) {
                            manager.record_usage(usage.input_tokens, usage.output_tokens);
                        }
                        if !send(&tx, AgentEvent::MessageDone { usage }).await {
                            return;
                        }
                    }

                    ChatEvent::Error(message) => {
                        let _ = send(&tx, AgentEvent::Error { message }).await;
                        return;
                    }
                }
            }

            self.memory.add(Message {
                role: MessageRole::Assistant,
                content: assistant_blocks,
            });
            if !self.emit_token_update(&tx).await {
                return;
            }

            if tool_calls.is_empty() {
                debug!("no tool calls; turn complete after {} iteration(s)", iteration + 1);
                break;
            }

            // ── Execute queued tool calls in emission order ──
            let mut results: Vec<ToolResult> = Vec::new();
            for call in &tool_calls {
                let handler = confirm.as_ref().map(|c| c as &dyn ConfirmHandler);
                let outcome = self.executor.execute(call, handler).await;

                let tool_result = ToolResult {
                    tool_use_id: call.id.clone(),
                    content: outcome.output,
                    is_error: !outcome.success,
                };
                results.push(tool_result.clone());

                if !send(&tx, AgentEvent::ToolResult { tool_result }).await {
                    return;
                }
            }

            self.memory.add(Message::tool_results(results));
            if !self.emit_token_update(&tx).await {
                return;
            }
        }

        info!("turn complete: {} messages in memory", self.memory.count());
    }

    /// Emit a token update; `false` means the receiver is gone.
    async fn emit_token_update(&self, tx: &mpsc::Sender<AgentEvent>) -> bool {
        let Some(manager) = &self.context_manager else {
            return true;
        };

        let snapshot = manager.budget_snapshot(self.memory.total());
        send(
            tx,
            AgentEvent::TokenUpdate(TokenUpdate {
                current_tokens: snapshot.current_context_tokens,
                max_tokens: snapshot.max_context_tokens,
                usage_percent: snapshot.usage_percent,
                session_tokens: snapshot.session_input_tokens + snapshot.session_output_tokens,
                cost: snapshot.session_cost,
                at_warning: snapshot.at_warning_level,
            }),
        )
        .await
    }
}

/// Move any buffered text into an assistant text block.
fn flush_text(buffer: &mut String, blocks: &mut Vec<ContentBlock>) {
    if !buffer.is_empty() {
        blocks.push(ContentBlock::text(std::mem::take(buffer)));
    }
}

/// Forward an event; `false` means the receiver dropped (cancellation).
async fn send(tx: &mpsc::Sender<AgentEvent>, event: AgentEvent) -> bool {
    tx.send(event).await.is_ok()
}

/// Confirmation bridge: publishes the preview as a [`AgentEvent::ToolPreview`]
/// and blocks on the confirmation channel for the decision. A closed
/// channel resolves as deny.
struct ChannelConfirm<'a> {
    event_tx: &'a mpsc::Sender<AgentEvent>,
    confirm_rx: &'a tokio::sync::Mutex<mpsc::Receiver<Decision>>,
}

impl ConfirmHandler for ChannelConfirm<'_> {
    fn confirm(&self, tool_use: &ToolUse, _action: &str, preview: &str) -> ConfirmFuture<'_> {
        let preview = preview.to_string();
        let tool_use = tool_use.clone();
        Box::pin(async move {
            if self
                .event_tx
                .send(AgentEvent::ToolPreview {
                    content: preview,
                    tool_use,
                })
                .await
                .is_err()
            {
                return Decision::Deny;
            }

            let mut rx = self.confirm_rx.lock().await;
            rx.recv().await.unwrap_or(Decision::Deny)
        })
    }
}
