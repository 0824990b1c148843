//! The `bash` tool: timeout-bounded shell execution in the working
//! directory.

use std::path::PathBuf;
use std::time::Duration;

use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

use crate::json_schema_for;
use crate::tools::core::{parse_args, Tool, ToolFuture, ToolOutcome};

/// Default command execution timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Command substrings refused outright.
pub const DEFAULT_BLOCKED_PATTERNS: &[&str] = &["rm -rf /", "mkfs", "> /dev/"];

#[derive(Deserialize, JsonSchema)]
struct BashArgs {
    /// The bash command to execute
    command: String,
}

/// Execute a shell command, capturing stdout and stderr.
pub struct BashTool {
    workdir: PathBuf,
    timeout: Duration,
    blocked_patterns: Vec<String>,
}

impl BashTool {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            timeout: DEFAULT_TIMEOUT,
            blocked_patterns: DEFAULT_BLOCKED_PATTERNS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_blocked_patterns(mut self, patterns: Vec<String>) -> Self {
        self.blocked_patterns = patterns;
        self
    }

    fn validate(&self, command: &str) -> Result<(), String> {
        let command = command.trim();
        for blocked in &self.blocked_patterns {
            if command.contains(blocked.as_str()) {
                return Err(format!("command contains blocked pattern: {blocked}"));
            }
        }
        Ok(())
    }
}

impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a bash command in the working directory. Returns stdout and stderr."
    }

    fn schema(&self) -> serde_json::Value {
        json_schema_for::<BashArgs>()
    }

    fn execute(&self, params: &serde_json::Value) -> ToolFuture<'_> {
        let args: Result<BashArgs, String> = parse_args(params);
        Box::pin(async move {
            let args = match args {
                Ok(a) => a,
                Err(e) => return ToolOutcome::error(e),
            };
            if let Err(e) = self.validate(&args.command) {
                return ToolOutcome::error(e);
            }

            debug!("bash: {}", args.command);

            let child = tokio::process::Command::new("sh")
                .arg("-c")
                .arg(&args.command)
                .current_dir(&self.workdir)
                .kill_on_drop(true)
                .output();

            let output = match tokio::time::timeout(self.timeout, child).await {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => return ToolOutcome::error(format!("command failed: {e}")),
                Err(_) => {
                    return ToolOutcome::error(format!(
                        "command timed out after {:?}",
                        self.timeout
                    ));
                }
            };

            let mut text = String::from_utf8_lossy(&output.stdout).to_string();
            if !output.stderr.is_empty() {
                text.push_str("\nSTDERR:\n");
                text.push_str(&String::from_utf8_lossy(&output.stderr));
            }

            if !output.status.success() {
                return ToolOutcome::error(format!(
                    "command failed: exit status {}\n{text}",
                    output.status.code().unwrap_or(-1)
                ));
            }

            ToolOutcome::ok(text)
        })
    }
}
