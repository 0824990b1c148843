//! Tool execution with a permission gate.
//!
//! Destructive tools (`file_write`, `file_edit`, `file_delete`, `bash`)
//! go through a confirmation round-trip before running: the executor
//! renders a plain-text preview, asks the installed [`ConfirmHandler`],
//! and blocks until a [`Decision`] arrives. `AlwaysAllow` decisions are
//! persisted to the project-local settings document so the same tool is
//! not prompted again.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::permissions::Settings;
use crate::tools::core::{ToolOutcome, ToolRegistry};
use crate::tools::diff;
use crate::tools::fs::resolve_path;
use crate::ToolUse;

/// Tools requiring confirmation unless settings record an always-allow.
const CONFIRMATION_TOOLS: &[&str] = &["file_write", "file_edit", "file_delete", "bash"];

/// The user's answer to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Deny,
    AlwaysAllow,
}

/// Boxed future returned by [`ConfirmHandler::confirm`].
pub type ConfirmFuture<'a> = Pin<Box<dyn Future<Output = Decision> + Send + 'a>>;

/// Mediates between the executor and whatever UI answers confirmation
/// prompts. The call must block until a decision exists; cancellation
/// resolves as [`Decision::Deny`].
pub trait ConfirmHandler: Send + Sync {
    fn confirm(&self, tool_use: &ToolUse, action: &str, preview: &str) -> ConfirmFuture<'_>;
}

/// Dispatches tool calls, gating destructive ones behind confirmation.
pub struct Executor {
    registry: Arc<ToolRegistry>,
    settings: Option<Arc<Settings>>,
    workdir: PathBuf,
}

impl Executor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        settings: Option<Arc<Settings>>,
        workdir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            settings,
            workdir: workdir.into(),
        }
    }

    /// Execute one tool call.
    ///
    /// Never fails outward: lookup errors, denials, tool errors, and
    /// panics all come back as `ToolOutcome { success: false, .. }` so
    /// the model can recover.
    pub async fn execute(
        &self,
        tool_use: &ToolUse,
        confirm: Option<&dyn ConfirmHandler>,
    ) -> ToolOutcome {
        let tool = match self.registry.get(&tool_use.name) {
            Ok(t) => t,
            Err(_) => return ToolOutcome::error(format!("tool not found: {}", tool_use.name)),
        };

        if self.needs_confirmation(&tool_use.name) {
            if let Some(handler) = confirm {
                let preview = self.generate_preview(tool_use);
                let action = self.describe_action(tool_use);

                match handler.confirm(tool_use, &action, &preview).await {
                    Decision::Deny => {
                        debug!("tool {} denied by user", tool_use.name);
                        return ToolOutcome::error("operation denied by user");
                    }
                    Decision::AlwaysAllow => {
                        if let Some(settings) = &self.settings {
                            settings.set_allow(&tool_use.name);
                            settings.save_or_warn();
                        }
                    }
                    Decision::Approve => {}
                }
            }
        }

        // Run on a detached task so a panicking tool unwinds there and
        // comes back as an error result instead of killing the loop.
        let params = tool_use.input.clone();
        let handle = tokio::spawn(async move { tool.execute(&params).await });
        match handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("tool {} panicked: {e}", tool_use.name);
                ToolOutcome::error(format!("tool execution failed: {e}"))
            }
        }
    }

    /// Whether this tool name is gated (and not already always-allowed).
    pub fn needs_confirmation(&self, name: &str) -> bool {
        if let Some(settings) = &self.settings {
            if settings.is_allowed(name) {
                return false;
            }
        }
        CONFIRMATION_TOOLS.contains(&name)
    }

    /// Short human-readable description of the pending action.
    pub fn describe_action(&self, tool_use: &ToolUse) -> String {
        let path = tool_use.input["path"].as_str();
        match tool_use.name.as_str() {
            "file_write" => match path {
                Some(p) => format!("Create file: {p}"),
                None => "Create file".to_string(),
            },
            "file_edit" => match path {
                Some(p) => format!("Edit file: {p}"),
                None => "Edit file".to_string(),
            },
            "file_delete" => match path {
                Some(p) => format!("Delete file: {p}"),
                None => "Delete file".to_string(),
            },
            "bash" => match tool_use.input["command"].as_str() {
                Some(cmd) if cmd.chars().count() > 50 => {
                    let head: String = cmd.chars().take(50).collect();
                    format!("Run: {head}...")
                }
                Some(cmd) => format!("Run: {cmd}"),
                None => "Execute bash command".to_string(),
            },
            other => other.to_string(),
        }
    }

    /// Plain-string preview for the confirmation prompt.
    pub fn generate_preview(&self, tool_use: &ToolUse) -> String {
        match tool_use.name.as_str() {
            "file_write" => self.preview_file_write(tool_use),
            "file_edit" => self.preview_file_edit(tool_use),
            "file_delete" => self.preview_file_delete(tool_use),
            "bash" => {
                diff::format_bash_command(tool_use.input["command"].as_str().unwrap_or_default())
            }
            other => format!("Tool: {other}\nParams: {}", tool_use.input),
        }
    }

    fn preview_file_write(&self, tool_use: &ToolUse) -> String {
        let path = tool_use.input["path"].as_str().unwrap_or_default();
        let content = tool_use.input["content"].as_str().unwrap_or_default();
        diff::format_new_file(path, content)
    }

    fn preview_file_edit(&self, tool_use: &ToolUse) -> String {
        let path = tool_use.input["path"].as_str().unwrap_or_default();
        let search = tool_use.input["search"].as_str().unwrap_or_default();
        let replace = tool_use.input["replace"].as_str().unwrap_or_default();

        let full_path = match resolve_path(&self.workdir, path) {
            Ok(p) => p,
            Err(e) => return format!("Cannot preview: {e}"),
        };
        let old_content = match std::fs::read_to_string(&full_path) {
            Ok(c) => c,
            Err(e) => return format!("Cannot preview: {e}"),
        };

        if !old_content.contains(search) {
            return format!("Search text not found in {path}");
        }

        let new_content = old_content.replacen(search, replace, 1);
        diff::generate_unified_diff(&old_content, &new_content, path)
    }

    fn preview_file_delete(&self, tool_use: &ToolUse) -> String {
        let path = tool_use.input["path"].as_str().unwrap_or_default();

        let full_path = match resolve_path(&self.workdir, path) {
            Ok(p) => p,
            Err(_) => return format!("--- {path} (to be deleted)"),
        };
        match std::fs::read_to_string(&full_path) {
            Ok(content) => diff::format_delete_file(path, &content),
            Err(_) => format!("--- {path} (to be deleted)"),
        }
    }
}
