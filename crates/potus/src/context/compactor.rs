//! Conversation compaction: replace the oldest history with an
//! LLM-generated summary, preserving a recent suffix verbatim.
//!
//! Compaction trades one cheap summarization call for a large context
//! reduction. The summarized prefix becomes a two-message synthetic
//! exchange (a user message carrying the summary, an assistant
//! acknowledgment), so the next real turn always continues from a
//! user-continuable position.

use std::sync::Arc;

use tracing::debug;

use crate::context::estimator::{SimpleEstimator, TokenEstimator};
use crate::providers::Provider;
use crate::{ChatEvent, ChatRequest, ContentBlock, Message, MessageRole};

/// System prompt for the summarization call.
pub const SUMMARY_SYSTEM_PROMPT: &str = "You are a conversation summarizer. Be concise and \
     preserve key technical details. Focus on information that would be needed to continue \
     the conversation effectively.";

/// Template wrapped around the formatted conversation text.
pub const SUMMARY_PROMPT_TEMPLATE: &str = "Summarize this conversation concisely, preserving:
1. Key decisions made
2. Important file paths and code discussed
3. Any errors encountered and solutions found
4. Current task state and next steps

Keep the summary focused and actionable. Maximum 500 words.

Conversation:
{conversation}

Provide a concise summary:";

const DEFAULT_PROTECTED_MESSAGES: usize = 6;
const DEFAULT_MAX_SUMMARY_TOKENS: u32 = 1000;

/// Configuration for a [`Compactor`].
#[derive(Clone, Default)]
pub struct CompactorConfig {
    /// Model used for the summarization call.
    pub model: String,
    /// Number of trailing messages preserved verbatim; non-positive
    /// selects the default 6.
    pub protected_messages: usize,
    /// Token cap for the summary response; non-positive selects the
    /// default 1000.
    pub max_summary_tokens: u32,
}

/// Outcome of one compaction pass.
#[derive(Debug, Clone, Default)]
pub struct CompactResult {
    pub original_messages: usize,
    pub compacted_messages: usize,
    pub original_tokens: usize,
    pub compacted_tokens: usize,
    pub summarized_messages: usize,
    pub summary: String,
}

/// Replaces the oldest conversation prefix with an LLM-generated summary.
pub struct Compactor {
    provider: Arc<dyn Provider>,
    estimator: Box<dyn TokenEstimator>,
    model: String,
    protected_messages: usize,
    max_summary_tokens: u32,
}

impl Compactor {
    pub fn new(provider: Arc<dyn Provider>, cfg: CompactorConfig) -> Self {
        let protected_messages = if cfg.protected_messages > 0 {
            cfg.protected_messages
        } else {
            DEFAULT_PROTECTED_MESSAGES
        };
        let max_summary_tokens = if cfg.max_summary_tokens > 0 {
            cfg.max_summary_tokens
        } else {
            DEFAULT_MAX_SUMMARY_TOKENS
        };

        Self {
            provider,
            estimator: Box::new(SimpleEstimator::new()),
            model: cfg.model,
            protected_messages,
            max_summary_tokens,
        }
    }

    /// Compact the conversation: summarize everything except the last
    /// `protected_messages`, then return the synthetic prefix plus the
    /// preserved suffix.
    ///
    /// On a summarization failure nothing is compacted — the caller keeps
    /// its original messages.
    pub async fn compact(
        &self,
        messages: &[Message],
    ) -> Result<(Vec<Message>, CompactResult), String> {
        let mut result = CompactResult {
            original_messages: messages.len(),
            original_tokens: self.estimator.estimate_messages(messages),
            ..Default::default()
        };

        if messages.len() <= self.protected_messages {
            result.compacted_messages = messages.len();
            result.compacted_tokens = result.original_tokens;
            return Ok((messages.to_vec(), result));
        }

        let split = messages.len() - self.protected_messages;
        let to_summarize = &messages[..split];
        let to_preserve = &messages[split..];
        result.summarized_messages = to_summarize.len();

        let summary = self.generate_summary(to_summarize).await?;
        debug!(
            "compacted {} messages into a {}-char summary",
            to_summarize.len(),
            summary.len()
        );
        result.summary = summary.clone();

        let mut compacted = Vec::with_capacity(to_preserve.len() + 2);
        compacted.push(Message::user(format!(
            "[Previous Conversation Summary]\n{summary}\n[End Summary]"
        )));
        compacted.push(Message::assistant_text(
            "I understand the context from our previous conversation. I'll continue helping \
             you with this understanding.",
        ));
        compacted.extend(to_preserve.iter().cloned());

        result.compacted_messages = compacted.len();
        result.compacted_tokens = self.estimator.estimate_messages(&compacted);

        Ok((compacted, result))
    }

    /// Whether the conversation is both long enough and full enough to
    /// bother compacting.
    pub fn should_compact(
        &self,
        messages: &[Message],
        current_tokens: usize,
        max_tokens: usize,
    ) -> bool {
        if messages.len() <= self.protected_messages + 2 {
            return false;
        }
        current_tokens as f64 >= max_tokens as f64 * 0.90
    }

    /// Rough estimate of the tokens a compaction pass would free,
    /// assuming the summary lands around 20% of the input plus overhead.
    pub fn estimate_savings(&self, messages: &[Message]) -> i64 {
        if messages.len() <= self.protected_messages {
            return 0;
        }

        let to_summarize = &messages[..messages.len() - self.protected_messages];
        let summarizable = self.estimator.estimate_messages(to_summarize) as i64;
        let estimated_summary = (summarizable as f64 * 0.20) as i64 + 200;

        summarizable - estimated_summary
    }

    async fn generate_summary(&self, messages: &[Message]) -> Result<String, String> {
        let conversation = format_conversation(messages);
        let prompt = SUMMARY_PROMPT_TEMPLATE.replace("{conversation}", &conversation);

        let req = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message::user(prompt)],
            system: SUMMARY_SYSTEM_PROMPT.to_string(),
            max_tokens: self.max_summary_tokens,
            ..Default::default()
        };

        let mut events = self
            .provider
            .chat(req)
            .await
            .map_err(|e| format!("summary chat failed: {e}"))?;

        let mut summary = String::new();
        while let Some(event) = events.recv().await {
            match event {
                ChatEvent::TextDelta(text) => summary.push_str(&text),
                ChatEvent::Error(err) => return Err(err),
                _ => {}
            }
        }

        Ok(summary.trim().to_string())
    }
}

/// Render messages as plain text for the summarization prompt. Tool
/// results are truncated to 500 characters.
fn format_conversation(messages: &[Message]) -> String {
    let mut out = String::new();

    for msg in messages {
        let role = display_role(msg.role);
        for block in &msg.content {
            match block {
                ContentBlock::Text { text } => {
                    out.push_str(&format!("{role}: {text}\n"));
                }
                ContentBlock::ToolUse(tu) => {
                    out.push_str(&format!("{role}: [Called tool: {}]\n", tu.name));
                }
                ContentBlock::ToolResult(tr) => {
                    let content: String = if tr.content.chars().count() > 500 {
                        let truncated: String = tr.content.chars().take(500).collect();
                        format!("{truncated}...[truncated]")
                    } else {
                        tr.content.clone()
                    };
                    let status = if tr.is_error { "error" } else { "success" };
                    out.push_str(&format!("Tool Result ({status}): {content}\n"));
                }
                ContentBlock::Image { .. } => {}
            }
        }
    }

    out
}

fn display_role(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "User",
        MessageRole::Assistant => "Assistant",
        MessageRole::System => "System",
        MessageRole::Tool => "Tool",
    }
}
