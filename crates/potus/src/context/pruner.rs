//! Tool-result pruning: rewrite stale tool results into a fixed
//! placeholder, preserving identity.
//!
//! Tool results are the single largest context consumer in the loop — a
//! `file_read` can inject tens of kilobytes the model has long since
//! processed. Pruning replaces their bodies with a one-line placeholder
//! while keeping `tool_use_id` and `is_error` intact, so the conversation
//! structure the providers require survives unchanged.

use std::collections::HashSet;

use crate::context::estimator::{SimpleEstimator, TokenEstimator, TokenInfo};
use crate::{ContentBlock, Message, ToolResult};

/// Placeholder written in place of a pruned tool result body.
pub const PRUNED_PLACEHOLDER: &str = "[Previous tool result pruned for context management]";

/// Tools whose results are never pruned by default. Read-style results
/// are the ones the model most often needs to re-reference.
pub const DEFAULT_PROTECTED_TOOLS: &[&str] =
    &["file_read", "read_file", "search_content", "grep", "glob"];

/// Configuration for a [`Pruner`].
#[derive(Debug, Clone)]
pub struct PrunerConfig {
    /// Additional protected tool names (merged with the defaults).
    pub protected_tools: Vec<String>,
    /// Fraction of total tokens preserved at the end of the conversation;
    /// out-of-range values select the default 0.30.
    pub protection_ratio: f64,
    /// Minimum prunable share of total tokens before pruning is worth it.
    pub min_prunable_ratio: f64,
}

impl Default for PrunerConfig {
    fn default() -> Self {
        Self {
            protected_tools: Vec::new(),
            protection_ratio: 0.30,
            min_prunable_ratio: 0.10,
        }
    }
}

/// Outcome of one pruning pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PruneResult {
    pub original_messages: usize,
    pub pruned_messages: usize,
    pub tokens_saved: i64,
    pub messages_pruned: usize,
}

/// Rewrites old tool-result blocks into placeholders subject to
/// protection rules.
#[derive(Debug)]
pub struct Pruner {
    protected_tools: HashSet<String>,
    protection_ratio: f64,
    min_prunable_ratio: f64,
}

impl Pruner {
    pub fn new(cfg: PrunerConfig) -> Self {
        let mut protected_tools: HashSet<String> = DEFAULT_PROTECTED_TOOLS
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        protected_tools.extend(cfg.protected_tools);

        let protection_ratio = if cfg.protection_ratio > 0.0 && cfg.protection_ratio < 1.0 {
            cfg.protection_ratio
        } else {
            0.30
        };

        Self {
            protected_tools,
            protection_ratio,
            min_prunable_ratio: cfg.min_prunable_ratio,
        }
    }

    /// Prune old, unprotected tool results.
    ///
    /// The cutoff is found by walking from the end of the conversation and
    /// accumulating tokens until `protection_ratio` of the total is
    /// covered; everything strictly before the cutoff is a candidate.
    pub fn prune(&self, messages: &[Message], token_info: &[TokenInfo]) -> (Vec<Message>, PruneResult) {
        let mut result = PruneResult {
            original_messages: messages.len(),
            ..Default::default()
        };

        if messages.is_empty() || token_info.is_empty() {
            result.pruned_messages = messages.len();
            return (messages.to_vec(), result);
        }

        let total_tokens: usize = token_info.iter().map(|i| i.tokens).sum();
        let protected_threshold = (total_tokens as f64 * self.protection_ratio) as usize;

        let mut running = 0usize;
        let mut cutoff = messages.len();
        for i in (0..token_info.len()).rev() {
            running += token_info[i].tokens;
            if running >= protected_threshold {
                cutoff = i;
                break;
            }
        }

        let estimator = SimpleEstimator::new();
        let mut pruned = Vec::with_capacity(messages.len());

        for (i, msg) in messages.iter().enumerate() {
            if i >= cutoff {
                pruned.push(msg.clone());
                continue;
            }

            let info = token_info.get(i);
            let prunable = info.map(|info| info.is_prunable).unwrap_or(false);
            if !prunable {
                pruned.push(msg.clone());
                continue;
            }
            if let Some(info) = info {
                if self.is_protected(&info.tool_name) {
                    pruned.push(msg.clone());
                    continue;
                }

                let rewritten = prune_message(msg);
                let new_tokens = estimator.estimate_message(&rewritten);
                result.tokens_saved += info.tokens as i64 - new_tokens as i64;
                result.messages_pruned += 1;
                pruned.push(rewritten);
            }
        }

        result.pruned_messages = pruned.len();
        (pruned, result)
    }

    /// Whether pruning would recover a meaningful share of the window:
    /// unprotected prunable messages must hold at least
    /// `min_prunable_ratio` of the total tokens.
    pub fn should_prune(&self, token_info: &[TokenInfo]) -> bool {
        let mut prunable = 0usize;
        let mut total = 0usize;

        for info in token_info {
            total += info.tokens;
            if info.is_prunable && !self.is_protected(&info.tool_name) {
                prunable += info.tokens;
            }
        }

        prunable > 0 && total > 0 && prunable as f64 / total as f64 >= self.min_prunable_ratio
    }

    pub fn add_protected_tool(&mut self, name: impl Into<String>) {
        self.protected_tools.insert(name.into());
    }

    pub fn remove_protected_tool(&mut self, name: &str) {
        self.protected_tools.remove(name);
    }

    pub fn protected_tools(&self) -> Vec<String> {
        self.protected_tools.iter().cloned().collect()
    }

    fn is_protected(&self, tool_name: &str) -> bool {
        self.protected_tools.contains(tool_name)
    }
}

/// Rewrite every tool-result block to the placeholder, keeping id and
/// error flag. Other block kinds pass through untouched.
fn prune_message(msg: &Message) -> Message {
    let content = msg
        .content
        .iter()
        .map(|block| match block {
            ContentBlock::ToolResult(tr) => ContentBlock::ToolResult(ToolResult {
                tool_use_id: tr.tool_use_id.clone(),
                content: PRUNED_PLACEHOLDER.to_string(),
                is_error: tr.is_error,
            }),
            other => other.clone(),
        })
        .collect();

    Message {
        role: msg.role,
        content,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::estimator::TokenInfo;

    fn tool_msg(id: &str, content: &str, is_error: bool) -> Message {
        Message::tool_results(vec![ToolResult {
            tool_use_id: id.into(),
            content: content.into(),
            is_error,
        }])
    }

    fn index(messages: &[Message], tool_names: &[&str]) -> Vec<TokenInfo> {
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

    #[test]
    fn prunes_old_unprotected_results() {
        let messages = vec![
            Message::user("run things"),
            tool_msg("t1", &"a".repeat(4000), false),
            tool_msg("t2", &"b".repeat(4000), false),
            tool_msg("t3", &"c".repeat(4000), false),
        ];
        let info = index(&messages, &["", "bash", "bash", "bash"]);

        let pruner = Pruner::new(PrunerConfig::default());
        let (pruned, result) = pruner.prune(&messages, &info);

        assert_eq!(pruned.len(), messages.len());
        assert!(result.messages_pruned >= 1);
        assert!(result.tokens_saved > 0);
        // The earliest result is rewritten; the newest is preserved by the
        // 30% tail window.
        assert_eq!(
            pruned[1].tool_results_blocks()[0].content,
            PRUNED_PLACEHOLDER
        );
        assert_eq!(
            pruned[3].tool_results_blocks()[0].content,
            "c".repeat(4000)
        );
    }

    #[test]
    fn preserves_id_and_error_flag() {
        let messages = vec![
            tool_msg("t1", &"x".repeat(4000), true),
            tool_msg("t2", &"y".repeat(4000), false),
            Message::user(&"tail ".repeat(300)),
        ];
        let info = index(&messages, &["bash", "bash", ""]);

        let pruner = Pruner::new(PrunerConfig::default());
        let (pruned, _) = pruner.prune(&messages, &info);

        let first = pruned[0].tool_results_blocks()[0];
        assert_eq!(first.tool_use_id, "t1");
        assert!(first.is_error);
        assert_eq!(first.content, PRUNED_PLACEHOLDER);
    }

    #[test]
    fn protected_tools_never_rewritten() {
        let messages = vec![
            tool_msg("t1", &"a".repeat(8000), false),
            tool_msg("t2", &"b".repeat(8000), false),
            tool_msg("t3", &"c".repeat(8000), false),
            Message::user("tail"),
        ];
        let info = index(&messages, &["file_read", "bash", "bash", ""]);

        let pruner = Pruner::new(PrunerConfig::default());
        let (pruned, result) = pruner.prune(&messages, &info);

        assert_eq!(
            pruned[0].tool_results_blocks()[0].content,
            "a".repeat(8000),
            "file_read results are protected"
        );
        assert_eq!(
            pruned[1].tool_results_blocks()[0].content,
            PRUNED_PLACEHOLDER
        );
        assert_eq!(result.messages_pruned, 1);
    }

    #[test]
    fn repruning_is_identity() {
        let messages = vec![
            tool_msg("t1", &"a".repeat(8000), false),
            tool_msg("t2", &"b".repeat(8000), false),
            Message::user(&"tail ".repeat(600)),
        ];
        let names = &["bash", "bash", ""];
        let info = index(&messages, names);
        let pruner = Pruner::new(PrunerConfig::default());

        let (once, first) = pruner.prune(&messages, &info);
        assert!(first.messages_pruned >= 1);

        let info_again = index(&once, names);
        let (twice, result) = pruner.prune(&once, &info_again);

        assert_eq!(once, twice);
        assert_eq!(result.tokens_saved, 0);
    }

    #[test]
    fn empty_input_passes_through() {
        let pruner = Pruner::new(PrunerConfig::default());
        let (out, result) = pruner.prune(&[], &[]);
        assert!(out.is_empty());
        assert_eq!(result.messages_pruned, 0);
    }

    #[test]
    fn should_prune_requires_minimum_share() {
        let pruner = Pruner::new(PrunerConfig::default());

        // Large unprotected tool result dominates: prune.
        let messages = vec![Message::user("hi"), tool_msg("t1", &"x".repeat(4000), false)];
        let info = index(&messages, &["", "bash"]);
        assert!(pruner.should_prune(&info));

        // Tiny tool result share: not worth it.
        let messages = vec![
            Message::user(&"long ".repeat(2000)),
            tool_msg("t1", "tiny", false),
        ];
        let info = index(&messages, &["", "bash"]);
        assert!(!pruner.should_prune(&info));
    }

    #[test]
    fn should_prune_ignores_protected() {
        let pruner = Pruner::new(PrunerConfig::default());
        let messages = vec![tool_msg("t1", &"x".repeat(4000), false)];
        let info = index(&messages, &["grep"]);
        assert!(!pruner.should_prune(&info));
    }

    #[test]
    fn protected_set_is_editable() {
        let mut pruner = Pruner::new(PrunerConfig::default());
        pruner.add_protected_tool("bash");
        assert!(pruner.protected_tools().contains(&"bash".to_string()));
        pruner.remove_protected_tool("bash");
        assert!(!pruner.protected_tools().contains(&"bash".to_string()));
    }
}
