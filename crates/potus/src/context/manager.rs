//! The context policy surface: one `prepare()` call per agent iteration
//! that decides between doing nothing, warning, compacting, or pruning.

use std::path::Path;
use std::sync::{Arc, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::context::budget::{Budget, BudgetConfig, BudgetSnapshot};
use crate::context::compactor::{CompactResult, Compactor, CompactorConfig};
use crate::context::estimator::{SimpleEstimator, TokenInfo};
use crate::context::events::ContextEvent;
use crate::context::project_files::{ProjectContext, ProjectFiles, ProjectFilesConfig};
use crate::context::pruner::{PruneResult, Pruner, PrunerConfig};
use crate::providers::Provider;
use crate::Message;

/// What `prepare()` decided to do for this iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextAction {
    None,
    Warn,
    Prune,
    Compact,
}

impl std::fmt::Display for ContextAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContextAction::None => "none",
            ContextAction::Warn => "warn",
            ContextAction::Prune => "prune",
            ContextAction::Compact => "compact",
        };
        write!(f, "{s}")
    }
}

/// Configuration for a [`Manager`].
#[derive(Clone, Default)]
pub struct ManagerConfig {
    /// Provider used for compaction summaries. `None` disables compaction.
    pub provider: Option<Arc<dyn Provider>>,
    /// Model passed to the compaction summary call.
    pub model: String,
    pub max_tokens: usize,
    pub reserve_for_response: usize,
    pub model_context_size: usize,
    pub warn_threshold: f64,
    pub compact_threshold: f64,
    pub auto_compact: bool,
    pub auto_prune: bool,
    /// Extra protected tool names for the pruner.
    pub protected_tools: Vec<String>,
    /// Recognized project-context file names; empty selects defaults.
    pub project_context_files: Vec<String>,
    pub max_project_tokens: usize,
    /// Optional subscriber for context events. Events are dropped, never
    /// queued, when the channel is full or closed.
    pub event_tx: Option<mpsc::Sender<ContextEvent>>,
}

/// Combines [`Budget`], [`Pruner`], [`Compactor`], and [`ProjectFiles`]
/// into the single policy object the agent holds for a session.
pub struct Manager {
    estimator: Arc<SimpleEstimator>,
    budget: Budget,
    pruner: Pruner,
    compactor: Option<Compactor>,
    project_files: ProjectFiles,
    project_context: RwLock<Option<ProjectContext>>,
    auto_compact: bool,
    auto_prune: bool,
    event_tx: Option<mpsc::Sender<ContextEvent>>,
}

impl Manager {
    pub fn new(cfg: ManagerConfig) -> Self {
        let estimator = Arc::new(SimpleEstimator::new());

        let budget = Budget::new(BudgetConfig {
            max_tokens: cfg.max_tokens,
            reserve_for_response: cfg.reserve_for_response,
            model_context_size: cfg.model_context_size,
            warn_threshold: cfg.warn_threshold,
            compact_threshold: cfg.compact_threshold,
        });

        let pruner = Pruner::new(PrunerConfig {
            protected_tools: cfg.protected_tools,
            ..Default::default()
        });

        let compactor = cfg.provider.map(|provider| {
            Compactor::new(
                provider,
                CompactorConfig {
                    model: cfg.model,
                    ..Default::default()
                },
            )
        });

        let project_files = ProjectFiles::new(ProjectFilesConfig {
            context_file_names: cfg.project_context_files,
            max_tokens: cfg.max_project_tokens,
        });

        Self {
            estimator,
            budget,
            pruner,
            compactor,
            project_files,
            project_context: RwLock::new(None),
            auto_compact: cfg.auto_compact,
            auto_prune: cfg.auto_prune,
            event_tx: cfg.event_tx,
        }
    }

    /// Load project-context files for the session.
    pub fn load_project_context(&self, workdir: &Path) {
        let ctx = self.project_files.load(workdir, self.estimator.as_ref());
        debug!(
            "loaded {} project context file(s), {} tokens",
            ctx.files.len(),
            ctx.total_tokens
        );
        *self
            .project_context
            .write()
            .expect("project context lock poisoned") = Some(ctx);
    }

    /// Markdown section for the system prompt; empty when nothing loaded.
    pub fn project_context_for_prompt(&self) -> String {
        let guard = self
            .project_context
            .read()
            .expect("project context lock poisoned");
        match guard.as_ref() {
            Some(ctx) => self.project_files.format_for_system_prompt(ctx),
            None => String::new(),
        }
    }

    pub fn project_context_tokens(&self) -> usize {
        let guard = self
            .project_context
            .read()
            .expect("project context lock poisoned");
        guard.as_ref().map(|c| c.total_tokens).unwrap_or(0)
    }

    pub fn loaded_project_files(&self) -> Vec<std::path::PathBuf> {
        let guard = self
            .project_context
            .read()
            .expect("project context lock poisoned");
        match guard.as_ref() {
            Some(ctx) => self.project_files.loaded_files(ctx),
            None => Vec::new(),
        }
    }

    /// Classify the current context size against the budget thresholds.
    pub fn check_context(&self, current_tokens: usize) -> ContextAction {
        let snapshot = self.budget.snapshot(current_tokens);
        if snapshot.at_compact_level {
            ContextAction::Compact
        } else if snapshot.at_warning_level {
            ContextAction::Warn
        } else {
            ContextAction::None
        }
    }

    /// Apply context policy before a provider call.
    ///
    /// Returns the message set the request should use. When the returned
    /// set differs from the input, the caller must replace its memory
    /// wholesale. Compaction is preferred over pruning when both apply;
    /// a compaction failure surfaces as an error without touching the
    /// messages.
    pub async fn prepare(
        &self,
        messages: &[Message],
        token_info: &[TokenInfo],
    ) -> Result<Vec<Message>, String> {
        let current: usize = token_info.iter().map(|i| i.tokens).sum();
        let action = self.check_context(current);

        match action {
            ContextAction::None | ContextAction::Prune => Ok(messages.to_vec()),

            ContextAction::Warn => {
                self.emit(ContextEvent::warning(
                    current,
                    self.effective_limit_usize(),
                    "Approaching context limit",
                ));
                Ok(messages.to_vec())
            }

            ContextAction::Compact => {
                if self.auto_compact {
                    if let Some(compactor) = &self.compactor {
                        return match compactor.compact(messages).await {
                            Ok((compacted, result)) => {
                                self.emit_compacted(&result);
                                Ok(compacted)
                            }
                            Err(e) => {
                                self.emit(ContextEvent::error(&e));
                                Err(e)
                            }
                        };
                    }
                }

                if self.auto_prune && self.pruner.should_prune(token_info) {
                    let (pruned, result) = self.pruner.prune(messages, token_info);
                    self.emit_pruned(&result);
                    return Ok(pruned);
                }

                self.emit(ContextEvent::warning(
                    current,
                    self.effective_limit_usize(),
                    "Context limit reached, consider starting a new conversation",
                ));
                Ok(messages.to_vec())
            }
        }
    }

    pub fn estimator(&self) -> Arc<SimpleEstimator> {
        self.estimator.clone()
    }

    pub fn record_usage(&self, input_tokens: u64, output_tokens: u64) {
        self.budget.record_usage(input_tokens, output_tokens);
    }

    pub fn set_pricing(&self, input_per_1m: f64, output_per_1m: f64) {
        self.budget.set_pricing(input_per_1m, output_per_1m);
    }

    pub fn budget_snapshot(&self, current_tokens: usize) -> BudgetSnapshot {
        self.budget.snapshot(current_tokens)
    }

    pub fn effective_limit(&self) -> i64 {
        self.budget.effective_limit()
    }

    pub fn update_model_context_size(&self, size: usize) {
        self.budget.update_model_context_size(size);
    }

    /// Direct pruning access (bypasses policy), used by explicit
    /// `/prune`-style commands.
    pub fn prune(&self, messages: &[Message], token_info: &[TokenInfo]) -> (Vec<Message>, PruneResult) {
        self.pruner.prune(messages, token_info)
    }

    /// Direct compaction access (bypasses policy).
    pub async fn compact(
        &self,
        messages: &[Message],
    ) -> Result<(Vec<Message>, CompactResult), String> {
        match &self.compactor {
            Some(compactor) => compactor.compact(messages).await,
            None => Err("compactor not available (no provider configured)".to_string()),
        }
    }

    fn effective_limit_usize(&self) -> usize {
        self.budget.effective_limit().max(0) as usize
    }

    fn emit_compacted(&self, result: &CompactResult) {
        self.emit(ContextEvent::compacted(
            result.compacted_tokens,
            self.effective_limit_usize(),
            format!(
                "Compacted {} messages, saved ~{} tokens",
                result.summarized_messages,
                result.original_tokens as i64 - result.compacted_tokens as i64
            ),
        ));
    }

    fn emit_pruned(&self, result: &PruneResult) {
        self.emit(ContextEvent::pruned(format!(
            "Pruned {} tool results, saved ~{} tokens",
            result.messages_pruned, result.tokens_saved
        )));
    }

    fn emit(&self, event: ContextEvent) {
        if let Some(tx) = &self.event_tx {
            // Non-blocking: a slow or absent subscriber drops events
            // rather than stalling the loop.
            if let Err(e) = tx.try_send(event) {
                warn!("context event dropped: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::estimator::TokenEstimator;
    use crate::providers::testing::MockProvider;
    use crate::{ChatEvent, ToolResult};

    fn token_index(messages: &[Message], tool_names: &[&str]) -> Vec<TokenInfo> {
        let e = SimpleEstimator::new();
        messages
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let mut info = TokenInfo::for_message(i, m, &e);
                if let Some(name) = tool_names.get(i) {
                    info.tool_name = (*name).to_string();
                }
                info
            })
            .collect()
    }

    fn manager(cfg: ManagerConfig) -> Manager {
        Manager::new(cfg)
    }

    #[test]
    fn check_context_classification() {
        let m = manager(ManagerConfig {
            max_tokens: 1000,
            ..Default::default()
        });
        assert_eq!(m.check_context(100), ContextAction::None);
        assert_eq!(m.check_context(800), ContextAction::Warn);
        assert_eq!(m.check_context(900), ContextAction::Compact);
    }

    #[tokio::test]
    async fn prepare_below_thresholds_is_identity() {
        let m = manager(ManagerConfig {
            max_tokens: 100_000,
            ..Default::default()
        });
        let messages = vec![Message::user("hi")];
        let info = token_index(&messages, &[]);

        let out = m.prepare(&messages, &info).await.unwrap();
        assert_eq!(out, messages);
    }

    #[tokio::test]
    async fn prepare_at_warn_returns_unchanged_and_emits() {
        let (tx, mut rx) = mpsc::channel(8);
        let m = manager(ManagerConfig {
            max_tokens: 100,
            event_tx: Some(tx),
            ..Default::default()
        });

        // One ~85-token message: warn zone but below compact.
        let messages = vec![Message::user("x".repeat(324))];
        let info = token_index(&messages, &[]);
        assert_eq!(info[0].tokens, 85);

        let out = m.prepare(&messages, &info).await.unwrap();
        assert_eq!(out, messages);

        let ev = rx.try_recv().unwrap();
        assert_eq!(ev.kind, crate::context::ContextEventKind::Warning);
    }

    #[tokio::test]
    async fn prepare_prefers_compaction_when_available() {
        let provider = Arc::new(MockProvider::new(vec![vec![
            ChatEvent::MessageStart,
            ChatEvent::TextDelta("summary".into()),
            ChatEvent::MessageDone(None),
        ]]));
        let m = manager(ManagerConfig {
            provider: Some(provider),
            max_tokens: 100,
            auto_compact: true,
            auto_prune: true,
            ..Default::default()
        });

        let messages: Vec<Message> = (0..10)
            .map(|i| Message::user(format!("message {i} {}", "pad".repeat(20))))
            .collect();
        let info = token_index(&messages, &[]);

        let out = m.prepare(&messages, &info).await.unwrap();
        assert_eq!(out.len(), 6 + 2);
        assert!(out[0].text().contains("[Previous Conversation Summary]"));
    }

    #[tokio::test]
    async fn prepare_falls_back_to_pruning() {
        let m = manager(ManagerConfig {
            max_tokens: 100,
            auto_compact: false,
            auto_prune: true,
            ..Default::default()
        });

        let big_result = |id: &str| {
            Message::tool_results(vec![ToolResult {
                tool_use_id: id.into(),
                content: "x".repeat(2000),
                is_error: false,
            }])
        };
        let messages = vec![
            big_result("t1"),
            big_result("t2"),
            big_result("t3"),
            Message::user("recent tail that stays"),
        ];
        let info = token_index(&messages, &["bash", "bash", "bash", ""]);

        let out = m.prepare(&messages, &info).await.unwrap();
        assert_eq!(
            out[0].tool_results_blocks()[0].content,
            crate::context::pruner::PRUNED_PLACEHOLDER
        );
        // The tail window (last 30% of tokens) keeps the newest result.
        assert_eq!(out[2], messages[2]);
        assert_eq!(out[3], messages[3]);

        let e = SimpleEstimator::new();
        assert!(e.estimate_messages(&out) < e.estimate_messages(&messages));
    }

    #[tokio::test]
    async fn prepare_without_options_warns_at_limit() {
        let (tx, mut rx) = mpsc::channel(8);
        let m = manager(ManagerConfig {
            max_tokens: 10,
            auto_compact: false,
            auto_prune: false,
            event_tx: Some(tx),
            ..Default::default()
        });

        let messages = vec![Message::user("x".repeat(400))];
        let info = token_index(&messages, &[]);

        let out = m.prepare(&messages, &info).await.unwrap();
        assert_eq!(out, messages);
        let ev = rx.try_recv().unwrap();
        assert!(ev.message.contains("consider starting a new conversation"));
    }

    #[tokio::test]
    async fn compaction_failure_surfaces_error_without_rewrite() {
        let provider = Arc::new(MockProvider::new(vec![vec![
            ChatEvent::MessageStart,
            ChatEvent::Error("summary backend down".into()),
        ]]));
        let m = manager(ManagerConfig {
            provider: Some(provider),
            max_tokens: 10,
            auto_compact: true,
            ..Default::default()
        });

        let messages: Vec<Message> = (0..10).map(|i| Message::user(format!("m{i}"))).collect();
        let info = token_index(&messages, &[]);

        let err = m.prepare(&messages, &info).await.unwrap_err();
        assert!(err.contains("summary backend down"));
    }

    #[test]
    fn project_context_empty_until_loaded() {
        let m = manager(ManagerConfig::default());
        assert_eq!(m.project_context_for_prompt(), "");
        assert_eq!(m.project_context_tokens(), 0);

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("POTUS.md"), "project facts").unwrap();
        m.load_project_context(dir.path());

        assert!(m.project_context_for_prompt().contains("project facts"));
        assert!(m.project_context_tokens() > 0);
        assert_eq!(m.loaded_project_files().len(), 1);
    }

    #[test]
    fn events_dropped_when_channel_full() {
        let (tx, _rx) = mpsc::channel(1);
        let m = manager(ManagerConfig {
            max_tokens: 100,
            event_tx: Some(tx),
            ..Default::default()
        });

        // Second emit overflows the buffer-1 channel; must not block or
        // panic.
        m.emit(ContextEvent::warning(1, 2, "one"));
        m.emit(ContextEvent::warning(1, 2, "two"));
    }
}
